/// Time a caller waits for a correlated response before giving up (30 seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Time allowed for the WebSocket handshake plus `connection-ack` (10 seconds)
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Reconnection attempts after the persistent channel drops, before fallback-only mode
pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Fixed delay between reconnection attempts (5 seconds)
pub const RECONNECT_DELAY_MS: u64 = 5000;

/// Heartbeat interval for application-level ping frames (30 seconds)
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Capacity of the per-connection outgoing frame queue
pub const OUTGOING_QUEUE_CAPACITY: usize = 100;

/// Well-known probe used to discover the externally visible address of the egress
pub const STATUS_PROBE_URL: &str = "https://httpbin.org/ip";

/// WebSocket route served by the executor
pub const WEBSOCKET_PATH: &str = "/ws";

/// Stateless fallback route served by the executor
pub const FALLBACK_PATH: &str = "/api/proxy";

/// Egress status route served by the executor
pub const STATUS_PATH: &str = "/api/status";

/// Default executor listen port
pub const DEFAULT_EXECUTOR_PORT: u16 = 3000;

/// Default SOCKS5 egress proxy address
pub const DEFAULT_SOCKS_HOST: &str = "127.0.0.1";
pub const DEFAULT_SOCKS_PORT: u16 = 9050;

/// User agent applied to tunneled requests that do not carry one
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Maximum request/response body size accepted on the fallback endpoint (10 MB)
pub const MAX_BODY_SIZE_BYTES: usize = 10 * 1024 * 1024;
