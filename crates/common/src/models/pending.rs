use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, oneshot};

use crate::error::{Result, TunnelError};

/// One in-flight request waiting for its correlated answer
#[derive(Debug)]
pub struct PendingRequest<T> {
    /// Correlation token
    pub request_id: String,

    /// When the request was registered
    pub issued_at: Instant,

    responder: oneshot::Sender<Result<T>>,
}

impl<T> PendingRequest<T> {
    fn new(request_id: String, responder: oneshot::Sender<Result<T>>) -> Self {
        Self {
            request_id,
            issued_at: Instant::now(),
            responder,
        }
    }

    /// Time since the request was registered
    pub fn age(&self) -> Duration {
        self.issued_at.elapsed()
    }

    /// Check if the request has outlived the given timeout
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.age() > timeout
    }

    /// Deliver the outcome; false when the caller already stopped waiting
    fn resolve(self, outcome: Result<T>) -> bool {
        self.responder.send(outcome).is_ok()
    }
}

/// Table of in-flight requests for a single connection
///
/// Each token resolves at most once. Closing the table rejects every entry and refuses new
/// registrations, so a closed connection never holds pending work.
#[derive(Debug)]
pub struct PendingTable<T> {
    inner: Mutex<TableInner<T>>,
}

#[derive(Debug)]
struct TableInner<T> {
    entries: HashMap<String, PendingRequest<T>>,
    closed: bool,
}

impl<T> PendingTable<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner {
                entries: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Register a token and return the receiver its outcome will be delivered on
    pub async fn register(&self, request_id: String) -> Result<oneshot::Receiver<Result<T>>> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(TunnelError::ConnectionLost);
        }
        if inner.entries.contains_key(&request_id) {
            return Err(TunnelError::InternalError(format!(
                "duplicate request id: {}",
                request_id
            )));
        }

        let (tx, rx) = oneshot::channel();
        inner
            .entries
            .insert(request_id.clone(), PendingRequest::new(request_id, tx));
        Ok(rx)
    }

    /// Resolve a token; false when no such request is waiting
    pub async fn resolve(&self, request_id: &str, outcome: Result<T>) -> bool {
        let entry = self.inner.lock().await.entries.remove(request_id);
        match entry {
            Some(pending) => pending.resolve(outcome),
            None => false,
        }
    }

    /// Drop a token without resolving it (the caller gave up waiting)
    pub async fn remove(&self, request_id: &str) -> Option<PendingRequest<T>> {
        self.inner.lock().await.entries.remove(request_id)
    }

    /// Reject every pending request and refuse further registrations
    ///
    /// Returns how many requests were rejected.
    pub async fn close_with<F>(&self, reason: F) -> usize
    where
        F: Fn() -> TunnelError,
    {
        let drained: Vec<PendingRequest<T>> = {
            let mut inner = self.inner.lock().await;
            inner.closed = true;
            inner.entries.drain().map(|(_, pending)| pending).collect()
        };

        let count = drained.len();
        for pending in drained {
            pending.resolve(Err(reason()));
        }
        count
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.closed
    }
}

impl<T> Default for PendingTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
