//! Tunnel executor
//!
//! Accepts persistent WebSocket connections from any number of clients, performs each tunneled
//! request through the configured egress and answers on the originating connection. The same
//! capability is exposed over a stateless HTTP endpoint.

use std::{net::SocketAddr, sync::Arc, time::Instant};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use egress_tunnel_common::constants::{
    FALLBACK_PATH, MAX_BODY_SIZE_BYTES, STATUS_PATH, WEBSOCKET_PATH,
};
use tokio::{net::TcpListener, sync::watch};
use tracing::info;

pub mod config;
pub mod connections;
pub mod egress;
pub mod error_handling;
pub mod handlers;

use config::EgressConfig;
use connections::ConnectionRegistry;
use egress::Egress;

/// State shared by every handler
pub struct AppState {
    pub egress: Arc<dyn Egress>,
    pub connections: ConnectionRegistry,

    /// Egress proxy location, reported by the introspection endpoints
    pub egress_host: String,
    pub egress_port: u16,

    pub started_at: Instant,

    shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(
        egress: Arc<dyn Egress>,
        egress_config: &EgressConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            egress,
            connections: ConnectionRegistry::new(),
            egress_host: egress_config.socks_host.clone(),
            egress_port: egress_config.socks_port,
            started_at: Instant::now(),
            shutdown,
        }
    }

    /// Receiver that flips to `true` when the server begins shutting down
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }
}

/// Build the executor's routes
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(WEBSOCKET_PATH, get(handlers::handle_socket_upgrade))
        .route(FALLBACK_PATH, post(handlers::handle_proxy))
        .route(STATUS_PATH, get(handlers::handle_status))
        .route("/api/stats", get(handlers::handle_stats))
        .route("/health", get(handlers::handle_health))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE_BYTES))
        .with_state(state)
}

/// Serve until `shutdown` flips to `true`
///
/// Open sockets watch the same signal and close themselves with a close frame, which lets the
/// graceful shutdown drain.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    let mut shutdown = state.shutdown_signal();
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();

    info!("Executor listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow_and_update() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
}
