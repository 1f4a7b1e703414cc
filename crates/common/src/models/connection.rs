use serde::{Deserialize, Serialize};

use crate::utils::iso_timestamp;

/// Lifecycle of a persistent connection on the executor side
///
/// `Accepted -> Acknowledged -> Active -> Closed`; a connection may also close straight from
/// any earlier phase, and nothing leaves `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    Accepted,
    Acknowledged,
    Active,
    Closed,
}

impl ConnectionPhase {
    pub fn can_transition_to(self, next: ConnectionPhase) -> bool {
        use ConnectionPhase::*;

        matches!(
            (self, next),
            (Accepted, Acknowledged)
                | (Acknowledged, Active)
                | (Accepted, Closed)
                | (Acknowledged, Closed)
                | (Active, Closed)
        )
    }
}

/// Accounting record for one active persistent connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMetadata {
    /// Executor-assigned connection identifier
    pub connection_id: String,

    /// Peer address, when the transport exposes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,

    /// RFC 3339 time the connection was accepted
    pub connected_at: String,

    pub phase: ConnectionPhase,
}

impl ConnectionMetadata {
    /// Create metadata for a freshly accepted connection
    pub fn new(connection_id: String) -> Self {
        Self {
            connection_id,
            remote_addr: None,
            connected_at: iso_timestamp(),
            phase: ConnectionPhase::Accepted,
        }
    }

    pub fn with_remote_addr(mut self, remote_addr: impl Into<String>) -> Self {
        self.remote_addr = Some(remote_addr.into());
        self
    }

    /// Move to the next phase; returns false and leaves the phase alone when not allowed
    pub fn advance(&mut self, next: ConnectionPhase) -> bool {
        if self.phase.can_transition_to(next) {
            self.phase = next;
            true
        } else {
            false
        }
    }
}
