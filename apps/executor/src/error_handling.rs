//! Error handling and sanitization
//!
//! Failures reaching HTTP clients become `{error, code}` bodies. Egress failures are reported
//! as-is because they describe the remote call; internal failures are logged in full and
//! replaced with a generic message.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use egress_tunnel_common::{ErrorCode, FallbackError};
use thiserror::Error;
use tracing::error;

use crate::egress::EgressError;

/// Errors returned by the HTTP endpoints
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Egress(#[from] EgressError),

    #[error("Invalid request body: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Egress(e) if e.is_validation() => StatusCode::BAD_REQUEST,
            ApiError::Egress(EgressError::Setup(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Egress(_) => StatusCode::BAD_GATEWAY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Body sent to the client
    pub fn to_body(&self) -> FallbackError {
        match self {
            ApiError::Egress(e) => FallbackError {
                error: client_message(e),
                code: Some(e.code().to_string()),
            },
            ApiError::BadRequest(message) => FallbackError {
                error: message.clone(),
                code: Some(ErrorCode::InvalidUrl.to_string()),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_body())).into_response()
    }
}

/// Log the full detail internally and hand the client a generic message
///
/// # Examples
///
/// ```
/// use egress_executor::error_handling::sanitize_error;
///
/// let sanitized = sanitize_error("proxy pool exhausted at 10.0.1.5:9050");
/// assert_eq!(sanitized, "Internal server error");
/// ```
pub fn sanitize_error(detail: &str) -> String {
    error!("Internal error: {}", detail);
    "Internal server error".to_string()
}

/// Message describing an egress failure, safe to show the caller
///
/// Setup failures mention local proxy configuration, so they are sanitized.
pub fn client_message(e: &EgressError) -> String {
    if is_safe_error(e) {
        e.to_string()
    } else {
        sanitize_error(&e.to_string())
    }
}

/// Whether an egress error can be shown to the client unchanged
pub fn is_safe_error(e: &EgressError) -> bool {
    !matches!(e, EgressError::Setup(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_error_hides_details() {
        let sanitized = sanitize_error("socks proxy at 10.0.1.5:9050 rejected credentials");

        assert_eq!(sanitized, "Internal server error");
        assert!(!sanitized.contains("10.0.1.5"));
    }

    #[test]
    fn test_status_codes() {
        let err = ApiError::from(EgressError::InvalidUrl("nope".into()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = ApiError::from(EgressError::Timeout(30000));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);

        let err = ApiError::from(EgressError::ConnectionRefused("refused".into()));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);

        let err = ApiError::BadRequest("missing url".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = ApiError::from(EgressError::Setup("bad proxy".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_egress_errors_keep_their_message() {
        let err = ApiError::from(EgressError::Timeout(30000));
        let body = err.to_body();

        assert_eq!(body.error, "timeout of 30000ms exceeded");
        assert_eq!(body.code.as_deref(), Some("ETIMEDOUT"));
    }

    #[test]
    fn test_setup_errors_are_sanitized() {
        let err = ApiError::from(EgressError::Setup("bad proxy url socks5h://secret".into()));
        let body = err.to_body();

        assert_eq!(body.error, "Internal server error");
        assert_eq!(body.code.as_deref(), Some("EINTERNAL"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
