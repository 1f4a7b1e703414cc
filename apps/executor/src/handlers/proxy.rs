//! Stateless fallback endpoint
//!
//! `POST /api/proxy` performs one request with the same semantics as a tunneled
//! `proxy-request`, for clients that have no open channel.

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use egress_tunnel_common::{FallbackRequest, HttpResponse, generate_request_id};
use tracing::{debug, warn};

use crate::{AppState, error_handling::ApiError};

pub async fn handle_proxy(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FallbackRequest>, JsonRejection>,
) -> Result<Json<HttpResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let request = request.into_proxy_request(generate_request_id());
    debug!(
        "Fallback request {}: {} {}",
        request.request_id, request.method, request.url
    );

    match state.egress.execute(request).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            warn!("Fallback request failed: {}", e);
            Err(e.into())
        }
    }
}
