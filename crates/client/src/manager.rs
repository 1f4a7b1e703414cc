use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::Duration,
};

use egress_tunnel_common::{
    HttpResponse, ProxyRequest, Result, StatusReport, TunnelError, generate_request_id,
    utils::has_header,
    validation::{sanitize_headers, validate_method, validate_target_url},
};
use serde_json::Value;
use tokio::{
    sync::{Mutex, RwLock, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    ManagerConfig,
    channel::{Channel, Dispatch},
    fallback::FallbackClient,
};

/// Grace period for the close frame to leave before the socket is dropped
const CLOSE_FRAME_GRACE: Duration = Duration::from_secs(1);

/// Lifecycle of the persistent channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Opening a socket or waiting for the executor's acknowledgement
    Connecting,
    /// Acknowledged; requests are tunneled
    Open,
    /// No channel; requests use the stateless fallback
    Closed,
}

/// Options for a single outbound request
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// HTTP method, GET when absent
    pub method: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: Some("POST".to_string()),
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Multiplexes outbound HTTP requests over one persistent channel to the executor
///
/// The manager keeps at most one channel open, reconnects a bounded number of times when it
/// drops, and routes requests through the stateless fallback whenever no channel is open.
/// Cloning is cheap; all clones share the same channel.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: ManagerConfig,
    fallback: FallbackClient,
    state_tx: watch::Sender<ChannelState>,
    channel: RwLock<Option<Arc<Channel>>>,
    reconnect_attempts: AtomicU32,
    shutdown_tx: watch::Sender<bool>,
    shutting_down: AtomicBool,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a manager without connecting; requests use the fallback until [`start`](Self::start)
    pub fn new(config: ManagerConfig) -> Result<Self> {
        let fallback = FallbackClient::new(&config)?;
        let (state_tx, _) = watch::channel(ChannelState::Closed);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                fallback,
                state_tx,
                channel: RwLock::new(None),
                reconnect_attempts: AtomicU32::new(0),
                shutdown_tx,
                shutting_down: AtomicBool::new(false),
                supervisor: Mutex::new(None),
            }),
        })
    }

    /// Create a manager and start opening the persistent channel in the background
    pub async fn connect(config: ManagerConfig) -> Result<Self> {
        let manager = Self::new(config)?;
        manager.start().await;
        Ok(manager)
    }

    /// Start the connect/reconnect sequence unless one is already running
    pub async fn start(&self) {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return;
        }

        let mut supervisor = self.inner.supervisor.lock().await;
        if let Some(handle) = supervisor.take() {
            if self.state() != ChannelState::Closed && !handle.is_finished() {
                debug!("Connection supervisor already running");
                *supervisor = Some(handle);
                return;
            }
            // Closed is only published on the supervisor's way out
            if let Err(e) = handle.await {
                warn!("Connection supervisor ended abnormally: {}", e);
            }
        }

        self.inner.reconnect_attempts.store(0, Ordering::SeqCst);
        self.inner.set_state(ChannelState::Connecting);
        *supervisor = Some(tokio::spawn(supervise(self.inner.clone())));
    }

    /// Re-arm the reconnection sequence after the attempt budget was exhausted
    pub async fn reconnect(&self) {
        info!("Reconnection requested");
        self.start().await;
    }

    pub fn state(&self) -> ChannelState {
        *self.inner.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.state_tx.subscribe()
    }

    /// Wait until the channel reaches `target`; false on timeout
    pub async fn wait_for_state(&self, target: ChannelState, timeout: Duration) -> bool {
        let mut rx = self.inner.state_tx.subscribe();
        tokio::time::timeout(timeout, async move {
            rx.wait_for(|state| *state == target).await.is_ok()
        })
        .await
        .unwrap_or(false)
    }

    /// Reconnection attempts made since the channel was last open
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Identifier the executor assigned to the open channel
    pub async fn connection_id(&self) -> Option<String> {
        self.inner
            .current_channel()
            .await
            .map(|channel| channel.connection_id().to_string())
    }

    /// Requests in flight on the open channel
    pub async fn pending_requests(&self) -> usize {
        match self.inner.current_channel().await {
            Some(channel) => channel.pending_count().await,
            None => 0,
        }
    }

    /// Perform an outbound HTTP request through the executor's egress
    ///
    /// Validation happens before anything is sent. When the channel is open the request is
    /// tunneled and correlated by a fresh token; otherwise it goes through the stateless
    /// fallback with no extra delay.
    pub async fn request(&self, target: &str, options: RequestOptions) -> Result<HttpResponse> {
        let url = validate_target_url(target)?;
        let method = validate_method(options.method.as_deref().unwrap_or("GET"))?;
        let mut headers = sanitize_headers(&options.headers)?;

        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(TunnelError::ShuttingDown);
        }

        if let Some(user_agent) = &self.inner.config.user_agent
            && !has_header(&headers, "user-agent")
        {
            headers.insert("user-agent".to_string(), user_agent.clone());
        }

        let mut request = ProxyRequest {
            request_id: generate_request_id(),
            url: url.into(),
            method: method.to_string(),
            headers,
            body: options.body,
        };

        if let Some(channel) = self.inner.current_channel().await {
            match channel
                .dispatch(request, self.inner.config.request_timeout)
                .await
            {
                Dispatch::Completed(outcome) => return outcome,
                Dispatch::Unavailable(unsent) => request = unsent,
            }
        }

        debug!("No open channel, using stateless fallback for {}", request.url);
        self.inner.fallback.request(request.into()).await
    }

    /// Probe the executor's egress, preferring the open channel
    pub async fn check_status(&self) -> Result<StatusReport> {
        if let Some(channel) = self.inner.current_channel().await {
            match channel
                .query_status(self.inner.config.request_timeout)
                .await
            {
                Ok(report) => return Ok(report),
                Err(e) => warn!("Status query over channel failed: {}, using fallback", e),
            }
        }

        self.inner.fallback.status().await
    }

    /// Close the channel, reject everything in flight and stop reconnecting
    pub async fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down connection manager");

        self.inner.shutdown_tx.send_replace(true);

        let supervisor = self.inner.supervisor.lock().await.take();
        if let Some(handle) = supervisor
            && let Err(e) = handle.await
        {
            warn!("Connection supervisor ended abnormally: {}", e);
        }

        self.inner.set_state(ChannelState::Closed);
    }
}

impl Inner {
    fn set_state(&self, state: ChannelState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("Channel state: {:?} -> {:?}", previous, state);
        }
    }

    async fn current_channel(&self) -> Option<Arc<Channel>> {
        self.channel.read().await.clone()
    }
}

/// Resolves once shutdown has been requested
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Connect/reconnect loop
///
/// Makes one initial attempt plus at most `max_attempts` reconnections with a fixed delay. The
/// counter resets whenever a channel opens. Once the budget is spent the state stays `Closed`
/// until [`ConnectionManager::reconnect`] is called.
async fn supervise(inner: Arc<Inner>) {
    let mut shutdown = inner.shutdown_tx.subscribe();
    let policy = inner.config.reconnect;

    loop {
        inner.set_state(ChannelState::Connecting);

        let opened = tokio::select! {
            result = Channel::open(&inner.config) => result,
            _ = shutdown_requested(&mut shutdown) => break,
        };

        match opened {
            Ok((channel, io)) => {
                inner.reconnect_attempts.store(0, Ordering::SeqCst);
                *inner.channel.write().await = Some(channel.clone());
                inner.set_state(ChannelState::Open);
                info!("Channel open: {}", channel.connection_id());

                let shutting_down = tokio::select! {
                    _ = channel.read_loop(io.read) => false,
                    _ = shutdown_requested(&mut shutdown) => true,
                };

                // Unpublish first so no new request picks up this channel
                *inner.channel.write().await = None;
                io.heartbeat.abort();

                if shutting_down {
                    let rejected = channel.close_with(|| TunnelError::ShuttingDown).await;
                    info!(
                        "Closing channel {}, rejected {} pending requests",
                        channel.connection_id(),
                        rejected
                    );
                    channel.send_close().await;
                    let mut writer = io.writer;
                    if tokio::time::timeout(CLOSE_FRAME_GRACE, &mut writer)
                        .await
                        .is_err()
                    {
                        writer.abort();
                    }
                    break;
                }

                inner.set_state(ChannelState::Connecting);
                let rejected = channel.close_with(|| TunnelError::ConnectionLost).await;
                io.writer.abort();
                warn!(
                    "Channel {} lost, rejected {} pending requests",
                    channel.connection_id(),
                    rejected
                );
            }
            Err(e) => {
                warn!("Failed to open channel: {}", e);
            }
        }

        let attempts = inner.reconnect_attempts.load(Ordering::SeqCst);
        if attempts >= policy.max_attempts {
            warn!(
                "Max reconnection attempts ({}) reached, using stateless fallback",
                policy.max_attempts
            );
            break;
        }

        let attempt = attempts + 1;
        inner.reconnect_attempts.store(attempt, Ordering::SeqCst);
        info!(
            "Reconnecting in {:?} (attempt {}/{})",
            policy.delay, attempt, policy.max_attempts
        );

        tokio::select! {
            _ = tokio::time::sleep(policy.delay) => {}
            _ = shutdown_requested(&mut shutdown) => break,
        }
    }

    inner.set_state(ChannelState::Closed);
    debug!("Connection supervisor exiting");
}
