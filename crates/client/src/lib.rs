//! Connection manager for the egress tunnel
//!
//! Callers hand outbound HTTP requests to a [`ConnectionManager`], which tunnels them over a
//! single persistent WebSocket to the executor and correlates each answer by token. When the
//! channel is unavailable the same request goes through the executor's stateless endpoint.
//!
//! ```no_run
//! use egress_tunnel_client::{ConnectionManager, ManagerConfig, RequestOptions};
//!
//! # async fn run() -> egress_tunnel_common::Result<()> {
//! let config = ManagerConfig::from_endpoint("wss://executor.example.test/ws")?;
//! let manager = ConnectionManager::connect(config).await?;
//!
//! let response = manager
//!     .request("https://example.test/ip", RequestOptions::get())
//!     .await?;
//! println!("{} {}", response.status, response.data);
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod channel;
mod config;
mod fallback;
mod manager;

pub use config::{ManagerConfig, ReconnectPolicy};
pub use manager::{ChannelState, ConnectionManager, RequestOptions};
