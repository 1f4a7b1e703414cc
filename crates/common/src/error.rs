use thiserror::Error;

use crate::validation::ValidationError;

/// Error types for the egress tunnel
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Connection lost while waiting for response")]
    ConnectionLost,

    #[error("Timeout waiting for response")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Executor error: {message}")]
    Executor {
        message: String,
        code: Option<String>,
    },

    #[error("Connection manager is shutting down")]
    ShuttingDown,

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Where a failure happened, from the caller's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOrigin {
    /// The request was rejected before anything went on the wire
    Request,
    /// The request could not be delivered, or no answer came back
    Delivery,
    /// The executor ran the outbound call and it failed
    Remote,
    /// A bug or unexpected internal condition
    Internal,
}

impl TunnelError {
    /// Wrap a lower-level transport failure, keeping it as the error source
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TunnelError::Transport(Box::new(err))
    }

    /// Classify the failure so callers can decide whether another route is worth trying
    pub fn origin(&self) -> FailureOrigin {
        match self {
            TunnelError::Validation(_) => FailureOrigin::Request,
            TunnelError::ConnectionLost
            | TunnelError::Timeout
            | TunnelError::Transport(_)
            | TunnelError::ShuttingDown
            | TunnelError::ConnectionError(_)
            | TunnelError::WebSocketError(_) => FailureOrigin::Delivery,
            TunnelError::Executor { .. } => FailureOrigin::Remote,
            TunnelError::InvalidMessage(_)
            | TunnelError::SerializationError(_)
            | TunnelError::Base64Error(_)
            | TunnelError::HttpError(_)
            | TunnelError::InternalError(_) => FailureOrigin::Internal,
        }
    }

    /// True when the remote fetch itself failed, as opposed to the request never making it
    pub fn is_remote(&self) -> bool {
        self.origin() == FailureOrigin::Remote
    }
}

/// Type alias for Results using TunnelError
pub type Result<T> = std::result::Result<T, TunnelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TunnelError::InvalidMessage("test".to_string());
        assert_eq!(err.to_string(), "Invalid message format: test");

        let err = TunnelError::Timeout;
        assert_eq!(err.to_string(), "Timeout waiting for response");

        let err = TunnelError::Executor {
            message: "connect ECONNREFUSED".to_string(),
            code: Some("ECONNREFUSED".to_string()),
        };
        assert_eq!(err.to_string(), "Executor error: connect ECONNREFUSED");
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json");
        assert!(json_err.is_err());

        let tunnel_err: TunnelError = json_err.unwrap_err().into();
        assert!(matches!(tunnel_err, TunnelError::SerializationError(_)));
    }

    #[test]
    fn test_transport_keeps_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = TunnelError::transport(io);
        assert_eq!(err.to_string(), "Transport error: refused");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_failure_origin() {
        let validation: TunnelError = ValidationError::InvalidUrl("nope".to_string()).into();
        assert_eq!(validation.origin(), FailureOrigin::Request);

        assert_eq!(TunnelError::ConnectionLost.origin(), FailureOrigin::Delivery);
        assert_eq!(TunnelError::Timeout.origin(), FailureOrigin::Delivery);
        assert_eq!(TunnelError::ShuttingDown.origin(), FailureOrigin::Delivery);

        let remote = TunnelError::Executor {
            message: "dns failure".to_string(),
            code: None,
        };
        assert!(remote.is_remote());
        assert!(!TunnelError::Timeout.is_remote());
    }
}
