//! One persistent WebSocket connection to the executor
//!
//! A `Channel` lives from the moment the executor acknowledges the socket until the socket
//! closes. It owns the table of requests in flight on that socket; nothing outlives it.

use std::{mem, sync::Arc, time::Duration};

use egress_tunnel_common::{
    HttpResponse, Message, PendingTable, ProxyRequest, Result, StatusReport, TunnelError,
    constants::OUTGOING_QUEUE_CAPACITY, current_timestamp_millis,
    validation::validate_connection_id,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use tokio::{
    sync::{Mutex, mpsc, oneshot},
    task::JoinHandle,
    time::Instant,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage,
};
use tracing::{debug, error, info, warn};

use crate::ManagerConfig;

type WebSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Shared handle used by request callers while the channel is open
#[derive(Debug)]
pub(crate) struct Channel {
    connection_id: String,
    outgoing: mpsc::Sender<WsMessage>,
    pending: PendingTable<HttpResponse>,
    status_waiters: Mutex<Vec<oneshot::Sender<StatusReport>>>,
}

/// Socket halves and background tasks, owned by the supervisor
pub(crate) struct ChannelIo {
    pub read: SplitStream<WebSocket>,
    pub writer: JoinHandle<()>,
    pub heartbeat: JoinHandle<()>,
}

/// What happened to a request handed to the channel
pub(crate) enum Dispatch {
    /// The request reached the executor and this is its outcome
    Completed(Result<HttpResponse>),
    /// The request never left; the caller may route it elsewhere
    Unavailable(ProxyRequest),
}

impl Channel {
    /// Connect, wait for the executor's acknowledgement and start the write/heartbeat tasks
    pub(crate) async fn open(config: &ManagerConfig) -> Result<(Arc<Self>, ChannelIo)> {
        let (ws_stream, connection_id) = establish_connection(config).await?;
        let (write, read) = ws_stream.split();

        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_QUEUE_CAPACITY);

        let writer = tokio::spawn(spawn_write_task(write, outgoing_rx));
        let heartbeat = tokio::spawn(spawn_heartbeat_task(
            outgoing_tx.clone(),
            config.heartbeat_interval,
        ));

        let channel = Arc::new(Self {
            connection_id,
            outgoing: outgoing_tx,
            pending: PendingTable::new(),
            status_waiters: Mutex::new(Vec::new()),
        });

        Ok((
            channel,
            ChannelIo {
                read,
                writer,
                heartbeat,
            },
        ))
    }

    pub(crate) fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub(crate) async fn pending_count(&self) -> usize {
        self.pending.len().await
    }

    async fn send(&self, message: &Message) -> Result<()> {
        let json = message.to_json()?;
        self.outgoing
            .send(WsMessage::Text(json.into()))
            .await
            .map_err(|e| TunnelError::WebSocketError(e.to_string()))
    }

    /// Send a request and wait for its correlated answer
    pub(crate) async fn dispatch(&self, request: ProxyRequest, timeout: Duration) -> Dispatch {
        let request_id = request.request_id.clone();

        let receiver = match self.pending.register(request_id.clone()).await {
            Ok(receiver) => receiver,
            Err(TunnelError::ConnectionLost) => return Dispatch::Unavailable(request),
            Err(e) => return Dispatch::Completed(Err(e)),
        };

        debug!("Tunneling request {}: {} {}", request_id, request.method, request.url);

        // One deadline covers queueing behind a stalled writer as well as the reply
        let deadline = Instant::now() + timeout;

        match tokio::time::timeout_at(deadline, self.send(&Message::ProxyRequest(request.clone())))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                // Reclaiming the entry means nobody else will answer it
                if self.pending.remove(&request_id).await.is_some() {
                    debug!("Channel refused request {}: {}", request_id, e);
                    return Dispatch::Unavailable(request);
                }
            }
            Err(_) => {
                if self.pending.remove(&request_id).await.is_some() {
                    warn!("Request {} could not be queued within {:?}", request_id, timeout);
                    return Dispatch::Completed(Err(TunnelError::Timeout));
                }
            }
        }

        match tokio::time::timeout_at(deadline, receiver).await {
            Ok(Ok(outcome)) => Dispatch::Completed(outcome),
            Ok(Err(_)) => Dispatch::Completed(Err(TunnelError::ConnectionLost)),
            Err(_) => {
                self.pending.remove(&request_id).await;
                warn!("Request {} timed out after {:?}", request_id, timeout);
                Dispatch::Completed(Err(TunnelError::Timeout))
            }
        }
    }

    /// Ask the executor to probe its egress
    pub(crate) async fn query_status(&self, timeout: Duration) -> Result<StatusReport> {
        let (tx, rx) = oneshot::channel();
        self.status_waiters.lock().await.push(tx);
        self.send(&Message::StatusQuery).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(_)) => Err(TunnelError::ConnectionLost),
            Err(_) => Err(TunnelError::Timeout),
        }
    }

    /// Route incoming frames until the socket ends
    pub(crate) async fn read_loop(&self, mut read: SplitStream<WebSocket>) {
        while let Some(message) = read.next().await {
            match message {
                Ok(WsMessage::Text(text)) => {
                    if let Err(e) = self.handle_text_message(&text).await {
                        warn!("Error handling message: {}", e);
                    }
                }
                Ok(WsMessage::Binary(_)) => {
                    warn!("Received unexpected binary message");
                }
                Ok(WsMessage::Ping(data)) => {
                    debug!("Received WebSocket ping");
                    if let Err(e) = self.outgoing.send(WsMessage::Pong(data)).await {
                        error!("Failed to send pong: {}", e);
                        break;
                    }
                }
                Ok(WsMessage::Pong(_)) => {
                    debug!("Received WebSocket pong");
                }
                Ok(WsMessage::Close(_)) => {
                    info!("Executor closed connection {}", self.connection_id);
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }

        debug!("Read loop exiting");
    }

    async fn handle_text_message(&self, text: &str) -> Result<()> {
        let message: Message = serde_json::from_str(text)
            .map_err(|e| TunnelError::InvalidMessage(format!("Failed to parse message: {}", e)))?;

        match message {
            Message::ProxyResponse(response) => {
                let request_id = response.request_id.clone();
                if !self.pending.resolve(&request_id, Ok(response.into())).await {
                    debug!("Dropping response for unknown or expired request {}", request_id);
                }
            }

            Message::ProxyError(failure) => {
                let outcome = Err(TunnelError::Executor {
                    message: failure.error,
                    code: failure.code,
                });
                if !self.pending.resolve(&failure.request_id, outcome).await {
                    debug!(
                        "Dropping error for unknown or expired request {}",
                        failure.request_id
                    );
                }
            }

            Message::StatusReply(report) => {
                let waiters = mem::take(&mut *self.status_waiters.lock().await);
                if waiters.is_empty() {
                    debug!("Status reply with nobody waiting: {:?}", report.status);
                }
                for waiter in waiters {
                    let _ = waiter.send(report.clone());
                }
            }

            Message::Ping { .. } => {
                self.send(&Message::Pong {
                    timestamp: current_timestamp_millis(),
                })
                .await?;
            }

            Message::Pong { .. } => {
                debug!("Received pong");
            }

            Message::Error { message } => {
                warn!("Executor reported: {}", message);
            }

            other => {
                warn!("Received unexpected {} message", other.kind());
            }
        }

        Ok(())
    }

    /// Reject everything in flight and refuse new work
    pub(crate) async fn close_with<F>(&self, reason: F) -> usize
    where
        F: Fn() -> TunnelError,
    {
        let rejected = self.pending.close_with(reason).await;
        self.status_waiters.lock().await.clear();
        rejected
    }

    /// Queue a close frame; the write task stops after sending it
    pub(crate) async fn send_close(&self) {
        if self.outgoing.send(WsMessage::Close(None)).await.is_err() {
            debug!("Write task already gone, skipping close frame");
        }
    }
}

/// Establish WebSocket connection and wait for the executor's acknowledgement
async fn establish_connection(config: &ManagerConfig) -> Result<(WebSocket, String)> {
    debug!("Connecting to {}", config.websocket_url);

    let (mut ws_stream, _) = tokio::time::timeout(
        config.connect_timeout,
        connect_async(config.websocket_url.as_str()),
    )
    .await
    .map_err(|_| TunnelError::ConnectionError("Connection timeout".to_string()))?
    .map_err(|e| TunnelError::ConnectionError(e.to_string()))?;

    debug!("WebSocket connected, waiting for connection-ack");

    let handshake = tokio::time::timeout(config.connect_timeout, async {
        while let Some(message) = ws_stream.next().await {
            match message {
                Ok(WsMessage::Text(text)) => {
                    if let Ok(Message::ConnectionAck {
                        connection_id,
                        message,
                    }) = serde_json::from_str::<Message>(&text)
                    {
                        debug!("Executor says: {}", message);
                        if let Err(e) = validate_connection_id(&connection_id) {
                            warn!("Unexpected connection id from executor: {}", e);
                        }
                        return Ok(connection_id);
                    }
                }
                Ok(WsMessage::Close(_)) => {
                    return Err(TunnelError::ConnectionError(
                        "Executor closed connection during handshake".to_string(),
                    ));
                }
                Err(e) => {
                    return Err(TunnelError::WebSocketError(e.to_string()));
                }
                _ => {}
            }
        }
        Err(TunnelError::ConnectionError(
            "Connection closed before handshake".to_string(),
        ))
    });

    let connection_id = handshake.await.map_err(|_| {
        TunnelError::ConnectionError("Connection handshake timeout".to_string())
    })??;

    Ok((ws_stream, connection_id))
}

/// Write task sends outgoing messages through WebSocket
async fn spawn_write_task(
    mut write: SplitSink<WebSocket, WsMessage>,
    mut outgoing_rx: mpsc::Receiver<WsMessage>,
) {
    while let Some(message) = outgoing_rx.recv().await {
        let closing = matches!(message, WsMessage::Close(_));
        if let Err(e) = write.send(message).await {
            error!("Failed to send message: {}", e);
            break;
        }
        if closing {
            break;
        }
    }

    debug!("Write task exiting");
}

/// Heartbeat task sends periodic ping messages
async fn spawn_heartbeat_task(outgoing_tx: mpsc::Sender<WsMessage>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        let ping = Message::Ping {
            timestamp: current_timestamp_millis(),
        };
        let ping_json = match ping.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize heartbeat: {}", e);
                break;
            }
        };

        if let Err(e) = outgoing_tx.send(WsMessage::Text(ping_json.into())).await {
            debug!("Failed to send heartbeat: {}", e);
            break;
        }

        debug!("Sent heartbeat");
    }

    debug!("Heartbeat task exiting");
}
