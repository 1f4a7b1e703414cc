//! Handler modules
//!
//! - `socket`: persistent WebSocket connections carrying tunneled requests
//! - `proxy`: the stateless fallback endpoint
//! - `status`: egress status and executor introspection

pub mod proxy;
pub mod socket;
pub mod status;

pub use proxy::handle_proxy;
pub use socket::handle_socket_upgrade;
pub use status::{handle_health, handle_stats, handle_status};
