//! Egress status and executor introspection

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use egress_tunnel_common::{StatusReport, iso_timestamp};
use serde::Serialize;

use crate::AppState;

/// `GET /api/status`: probe the egress; 500 when the probe fails
pub async fn handle_status(State(state): State<Arc<AppState>>) -> (StatusCode, Json<StatusReport>) {
    let report = state.egress.probe().await;
    let status = if report.is_connected() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(report))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub active_connections: usize,
    pub host: String,
    pub port: u16,
    pub uptime_secs: f64,
    pub timestamp: String,
}

/// `GET /api/stats`
pub async fn handle_stats(State(state): State<Arc<AppState>>) -> Json<StatsReport> {
    Json(StatsReport {
        active_connections: state.connections.count().await,
        host: state.egress_host.clone(),
        port: state.egress_port,
        uptime_secs: state.started_at.elapsed().as_secs_f64(),
        timestamp: iso_timestamp(),
    })
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub service: &'static str,
    pub timestamp: String,
}

/// `GET /health`
pub async fn handle_health() -> Json<HealthReport> {
    Json(HealthReport {
        status: "healthy",
        service: "egress-executor",
        timestamp: iso_timestamp(),
    })
}
