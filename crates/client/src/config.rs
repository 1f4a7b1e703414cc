use std::time::Duration;

use egress_tunnel_common::{
    Result, TunnelError,
    constants::{
        CONNECT_TIMEOUT_SECS, DEFAULT_USER_AGENT, FALLBACK_PATH, HEARTBEAT_INTERVAL_SECS,
        MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY_MS, REQUEST_TIMEOUT_SECS, STATUS_PATH,
    },
    validation::ValidationError,
};
use url::Url;

/// Configuration for the connection manager
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Executor WebSocket endpoint (e.g., "wss://executor.example.test/ws")
    pub websocket_url: String,

    /// Stateless fallback endpoint (`POST`)
    pub fallback_url: String,

    /// Stateless status endpoint (`GET`)
    pub status_url: String,

    /// Time allowed for the socket to open and the executor to acknowledge it
    pub connect_timeout: Duration,

    /// How long a tunneled request may wait for its answer
    pub request_timeout: Duration,

    /// Heartbeat interval
    pub heartbeat_interval: Duration,

    /// Reconnection strategy
    pub reconnect: ReconnectPolicy,

    /// User-Agent added to requests that don't carry one; `None` leaves headers untouched
    pub user_agent: Option<String>,
}

/// Bounded reconnection with a fixed delay between attempts
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            delay: Duration::from_millis(RECONNECT_DELAY_MS),
        }
    }
}

impl ManagerConfig {
    /// Build a configuration from the executor's WebSocket URL
    ///
    /// The fallback and status endpoints live on the same host, so they are derived by
    /// switching `ws`/`wss` to `http`/`https` and replacing the path.
    pub fn from_endpoint(websocket_url: &str) -> Result<Self> {
        let endpoint = Url::parse(websocket_url.trim())
            .map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;

        let http_scheme = match endpoint.scheme() {
            "ws" => "http",
            "wss" => "https",
            other => return Err(ValidationError::UnsupportedScheme(other.to_string()).into()),
        };

        let mut base = endpoint.clone();
        base.set_scheme(http_scheme).map_err(|_| {
            TunnelError::InternalError(format!("cannot derive http endpoint from {}", endpoint))
        })?;
        base.set_query(None);
        base.set_fragment(None);

        let mut fallback = base.clone();
        fallback.set_path(FALLBACK_PATH);
        let mut status = base;
        status.set_path(STATUS_PATH);

        Ok(Self {
            websocket_url: endpoint.to_string(),
            fallback_url: fallback.to_string(),
            status_url: status.to_string(),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            reconnect: ReconnectPolicy::default(),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
        })
    }

    pub fn with_fallback_url(mut self, url: impl Into<String>) -> Self {
        self.fallback_url = url.into();
        self
    }

    pub fn with_status_url(mut self, url: impl Into<String>) -> Self {
        self.status_url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}
