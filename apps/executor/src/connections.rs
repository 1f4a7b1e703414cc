use std::collections::HashMap;

use egress_tunnel_common::{ConnectionMetadata, ConnectionPhase, generate_connection_id};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Active persistent connections, kept for accounting only
///
/// Responses always go back on the socket that carried the request, so nothing here is used
/// for routing.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, ConnectionMetadata>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly accepted connection under a unique id
    pub async fn register(&self, remote_addr: Option<String>) -> String {
        let mut connections = self.connections.write().await;

        let mut connection_id = generate_connection_id();
        while connections.contains_key(&connection_id) {
            connection_id = generate_connection_id();
        }

        let mut metadata = ConnectionMetadata::new(connection_id.clone());
        if let Some(addr) = remote_addr {
            metadata = metadata.with_remote_addr(addr);
        }
        connections.insert(connection_id.clone(), metadata);

        debug!("Registered connection {}", connection_id);
        connection_id
    }

    /// Move a connection to its next lifecycle phase
    pub async fn advance(&self, connection_id: &str, next: ConnectionPhase) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get_mut(connection_id) {
            Some(metadata) => {
                let moved = metadata.advance(next);
                if !moved {
                    warn!(
                        "Connection {} cannot move from {:?} to {:?}",
                        connection_id, metadata.phase, next
                    );
                }
                moved
            }
            None => false,
        }
    }

    /// Remove a connection, returning its final record
    pub async fn unregister(&self, connection_id: &str) -> Option<ConnectionMetadata> {
        let mut removed = self.connections.write().await.remove(connection_id)?;
        removed.advance(ConnectionPhase::Closed);
        debug!("Unregistered connection {}", connection_id);
        Some(removed)
    }

    pub async fn get(&self, connection_id: &str) -> Option<ConnectionMetadata> {
        self.connections.read().await.get(connection_id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }
}
