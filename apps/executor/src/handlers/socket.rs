//! Persistent connection handler
//!
//! Each socket gets a writer task fed by an mpsc channel; every tunneled request and status
//! query runs in its own task so a slow outbound call never blocks reading the next frame.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{
        ConnectInfo, State,
        ws::{CloseFrame, Message as WsMessage, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
};
use egress_tunnel_common::{
    ConnectionPhase, ErrorCode, Message, ProxyError, ProxyRequest, Result, TunnelError,
    constants::OUTGOING_QUEUE_CAPACITY, current_timestamp_millis,
    validation::validate_request_id,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::{AppState, connections::ConnectionRegistry, error_handling::client_message};

const CLOSE_FRAME_GRACE: Duration = Duration::from_secs(1);

pub async fn handle_socket_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, remote))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, remote: SocketAddr) {
    let connection_id = state.connections.register(Some(remote.to_string())).await;
    info!("Client connected: {} ({})", connection_id, remote);

    let (write, mut read) = socket.split();
    let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_QUEUE_CAPACITY);
    let mut writer = tokio::spawn(spawn_write_task(write, outgoing_rx));

    if !acknowledge(&state.connections, &connection_id, &outgoing_tx).await {
        state.connections.unregister(&connection_id).await;
        writer.abort();
        info!("Client disconnected: {}", connection_id);
        return;
    }

    let mut shutdown = state.shutdown_signal();
    let mut shutting_down = false;

    loop {
        let frame = tokio::select! {
            frame = read.next() => frame,
            _ = shutdown_requested(&mut shutdown) => {
                shutting_down = true;
                break;
            }
        };

        match frame {
            Some(Ok(WsMessage::Text(text))) => {
                handle_text_message(text.as_str(), &state, &outgoing_tx).await;
            }
            Some(Ok(WsMessage::Binary(_))) => {
                warn!("Received unexpected binary message on {}", connection_id);
            }
            Some(Ok(WsMessage::Close(_))) | None => {
                break;
            }
            Some(Err(e)) => {
                warn!("WebSocket error on {}: {}", connection_id, e);
                break;
            }
            Some(Ok(_)) => {}
        }
    }

    state.connections.unregister(&connection_id).await;

    if shutting_down {
        info!("Closing {} for shutdown", connection_id);
        let close = WsMessage::Close(Some(CloseFrame {
            code: close_code::AWAY,
            reason: Utf8Bytes::from_static("Executor shutting down"),
        }));
        if outgoing_tx.send(close).await.is_ok()
            && tokio::time::timeout(CLOSE_FRAME_GRACE, &mut writer)
                .await
                .is_err()
        {
            writer.abort();
        }
    } else {
        // In-flight calls keep running; their results have nowhere to go
        writer.abort();
    }

    info!("Client disconnected: {}", connection_id);
}

/// Send `connection-ack` and move the connection to `Active`
///
/// Returns false when the ack could not be queued; the connection is never served then.
async fn acknowledge(
    connections: &ConnectionRegistry,
    connection_id: &str,
    outgoing: &mpsc::Sender<WsMessage>,
) -> bool {
    let ack = Message::ConnectionAck {
        connection_id: connection_id.to_string(),
        message: "Connected to egress tunnel".to_string(),
    };
    if let Err(e) = send_message(outgoing, &ack).await {
        error!("Failed to acknowledge {}: {}", connection_id, e);
        return false;
    }

    connections
        .advance(connection_id, ConnectionPhase::Acknowledged)
        .await
        && connections
            .advance(connection_id, ConnectionPhase::Active)
            .await
}

async fn handle_text_message(text: &str, state: &Arc<AppState>, outgoing: &mpsc::Sender<WsMessage>) {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            debug!("Unparseable frame: {}", e);
            reply_error(outgoing, "Invalid JSON message").await;
            return;
        }
    };

    let message: Message = match serde_json::from_value(value.clone()) {
        Ok(message) => message,
        Err(e) => {
            reject_frame(&value, e, outgoing).await;
            return;
        }
    };

    match message {
        Message::ProxyRequest(request) => {
            if let Err(e) = validate_request_id(&request.request_id) {
                warn!("Rejecting request: {}", e);
                if request.request_id.is_empty() {
                    reply_error(outgoing, "Invalid request id").await;
                } else {
                    reply_proxy_error(
                        outgoing,
                        request.request_id,
                        e.to_string(),
                        ErrorCode::InvalidRequestId,
                    )
                    .await;
                }
                return;
            }
            tokio::spawn(handle_proxy_request(
                state.clone(),
                request,
                outgoing.clone(),
            ));
        }

        Message::StatusQuery => {
            let state = state.clone();
            let outgoing = outgoing.clone();
            tokio::spawn(async move {
                let report = state.egress.probe().await;
                if let Err(e) = send_message(&outgoing, &Message::StatusReply(report)).await {
                    debug!("Discarding status reply: {}", e);
                }
            });
        }

        Message::Ping { .. } => {
            let pong = Message::Pong {
                timestamp: current_timestamp_millis(),
            };
            if let Err(e) = send_message(outgoing, &pong).await {
                debug!("Failed to send pong: {}", e);
            }
        }

        Message::Pong { .. } => {
            debug!("Received pong");
        }

        other => {
            warn!("Received unexpected {} message", other.kind());
            reply_error(outgoing, "Unknown message type").await;
        }
    }
}

/// Answer a well-formed JSON frame that doesn't decode as a known message
///
/// A malformed `proxy-request` that still carries its token gets a `proxy-error`, so the
/// caller isn't left waiting for a timeout.
async fn reject_frame(value: &Value, err: serde_json::Error, outgoing: &mpsc::Sender<WsMessage>) {
    let kind = value.get("type").and_then(Value::as_str);
    let request_id = value.get("requestId").and_then(Value::as_str);

    match (kind, request_id) {
        (Some("proxy-request"), Some(request_id)) if !request_id.is_empty() => {
            reply_proxy_error(
                outgoing,
                request_id.to_string(),
                format!("Invalid proxy-request: {}", err),
                ErrorCode::InvalidUrl,
            )
            .await;
        }
        _ => {
            debug!("Unrecognized frame: {}", err);
            reply_error(outgoing, "Unknown message type").await;
        }
    }
}

/// Run one tunneled request and answer on the originating connection
async fn handle_proxy_request(
    state: Arc<AppState>,
    request: ProxyRequest,
    outgoing: mpsc::Sender<WsMessage>,
) {
    let request_id = request.request_id.clone();
    debug!("Proxy request {}: {} {}", request_id, request.method, request.url);

    let reply = match state.egress.execute(request).await {
        Ok(response) => Message::ProxyResponse(response.into_proxy_response(request_id.clone())),
        Err(e) => {
            warn!("Request {} failed: {}", request_id, e);
            Message::ProxyError(ProxyError {
                request_id: request_id.clone(),
                error: client_message(&e),
                code: Some(e.code().to_string()),
            })
        }
    };

    if let Err(e) = send_message(&outgoing, &reply).await {
        debug!("Discarding result for {}: {}", request_id, e);
    }
}

/// Answer a request that will never reach the egress
async fn reply_proxy_error(
    outgoing: &mpsc::Sender<WsMessage>,
    request_id: String,
    error: String,
    code: ErrorCode,
) {
    let failure = Message::ProxyError(ProxyError {
        request_id,
        error,
        code: Some(code.to_string()),
    });
    if let Err(e) = send_message(outgoing, &failure).await {
        debug!("Failed to reject request: {}", e);
    }
}

async fn reply_error(outgoing: &mpsc::Sender<WsMessage>, message: &str) {
    let complaint = Message::Error {
        message: message.to_string(),
    };
    if let Err(e) = send_message(outgoing, &complaint).await {
        debug!("Failed to send error frame: {}", e);
    }
}

async fn send_message(outgoing: &mpsc::Sender<WsMessage>, message: &Message) -> Result<()> {
    let json = message.to_json()?;
    outgoing
        .send(WsMessage::Text(json.into()))
        .await
        .map_err(|e| TunnelError::WebSocketError(e.to_string()))
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Write task sends outgoing messages through the socket
async fn spawn_write_task(
    mut write: SplitSink<WebSocket, WsMessage>,
    mut outgoing_rx: mpsc::Receiver<WsMessage>,
) {
    while let Some(message) = outgoing_rx.recv().await {
        let closing = matches!(message, WsMessage::Close(_));
        if let Err(e) = write.send(message).await {
            debug!("Failed to send message: {}", e);
            break;
        }
        if closing {
            break;
        }
    }

    debug!("Write task exiting");
}
