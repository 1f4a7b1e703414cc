mod connection;
mod pending;

pub use connection::{ConnectionMetadata, ConnectionPhase};
pub use pending::{PendingRequest, PendingTable};
