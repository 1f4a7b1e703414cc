//! Common utilities and types for the egress tunnel
//!
//! This crate provides the wire protocol, error taxonomy, correlation bookkeeping and helpers
//! shared by the connection manager (client) and the tunnel executor (server).

pub mod constants;
pub mod error;
pub mod models;
pub mod protocol;
pub mod utils;
pub mod validation;

// Re-export commonly used types for convenience
pub use error::{FailureOrigin, Result, TunnelError};
pub use models::{ConnectionMetadata, ConnectionPhase, PendingRequest, PendingTable};
pub use protocol::{
    BodyEncoding, EgressState, ErrorCode, FallbackError, FallbackRequest, HttpResponse, Message,
    ProxyError, ProxyRequest, ProxyResponse, StatusReport,
};
pub use utils::{
    current_timestamp_millis, decode_body, decode_payload, encode_body, encode_payload,
    generate_connection_id, generate_request_id, headers_to_map, iso_timestamp, map_to_headers,
};
