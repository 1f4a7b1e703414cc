//! In-process executor stand-in for driving the connection manager

#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{any, get, post},
};
use egress_tunnel_client::{ManagerConfig, ReconnectPolicy};
use egress_tunnel_common::{
    FallbackRequest, HttpResponse, Message, ProxyError, ProxyRequest, StatusReport,
};
use serde_json::json;
use tokio::{net::TcpListener, sync::Mutex};

/// How the stub answers tunneled requests
#[derive(Clone)]
pub enum Mode {
    /// Answer immediately, echoing url/method/body back as data
    Echo,
    /// Answer every request with the same response
    Fixed(HttpResponse),
    /// Hold requests until this many arrived, then answer newest first
    Reversed(usize),
    /// Never answer
    Silent,
    /// Answer after a delay
    Late(Duration),
    /// Close the socket once this many requests arrived, without answering
    DropAfter(usize),
    /// Report every request as failed
    Fail { error: String, code: String },
}

pub struct StubState {
    pub mode: Mode,
    pub accepting: AtomicBool,
    pub ws_attempts: AtomicUsize,
    pub fallback_hits: AtomicUsize,
    pub received: Mutex<Vec<ProxyRequest>>,
    pub channel_ip: String,
    pub fallback_ip: String,
}

pub struct StubExecutor {
    pub addr: SocketAddr,
    pub state: Arc<StubState>,
}

impl StubExecutor {
    pub async fn start(mode: Mode) -> Self {
        Self::start_with(mode, true).await
    }

    pub async fn start_refusing(mode: Mode) -> Self {
        Self::start_with(mode, false).await
    }

    async fn start_with(mode: Mode, accepting: bool) -> Self {
        let state = Arc::new(StubState {
            mode,
            accepting: AtomicBool::new(accepting),
            ws_attempts: AtomicUsize::new(0),
            fallback_hits: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
            channel_ip: "5.6.7.8".to_string(),
            fallback_ip: "9.9.9.9".to_string(),
        });

        let app = Router::new()
            .route("/ws", any(ws_handler))
            .route("/api/proxy", post(fallback_handler))
            .route("/api/status", get(status_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn config(&self) -> ManagerConfig {
        let mut config = ManagerConfig::from_endpoint(&format!("ws://{}/ws", self.addr))
            .unwrap()
            .with_request_timeout(Duration::from_secs(2))
            .with_reconnect(ReconnectPolicy {
                max_attempts: 3,
                delay: Duration::from_millis(20),
            });
        config.connect_timeout = Duration::from_secs(2);
        config
    }

    pub fn ws_attempts(&self) -> usize {
        self.state.ws_attempts.load(Ordering::SeqCst)
    }

    pub fn fallback_hits(&self) -> usize {
        self.state.fallback_hits.load(Ordering::SeqCst)
    }

    pub fn set_accepting(&self, accepting: bool) {
        self.state.accepting.store(accepting, Ordering::SeqCst);
    }

    pub async fn received(&self) -> Vec<ProxyRequest> {
        self.state.received.lock().await.clone()
    }

    /// Poll until the stub has seen `count` tunneled requests
    pub async fn wait_for_received(&self, count: usize) {
        for _ in 0..200 {
            if self.state.received.lock().await.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("stub never received {} requests", count);
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<StubState>>) -> Response {
    state.ws_attempts.fetch_add(1, Ordering::SeqCst);
    if !state.accepting.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send(socket: &mut WebSocket, message: &Message) -> bool {
    let json = message.to_json().unwrap();
    socket.send(AxumMessage::Text(json.into())).await.is_ok()
}

fn echo_response(req: &ProxyRequest) -> Message {
    let mut response = HttpResponse::new(200, "OK");
    response.data = json!({
        "url": req.url,
        "method": req.method,
        "body": req.body,
    });
    Message::ProxyResponse(response.into_proxy_response(req.request_id.clone()))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<StubState>) {
    let ack = Message::ConnectionAck {
        connection_id: "stub001".to_string(),
        message: "Connected to egress tunnel".to_string(),
    };
    if !send(&mut socket, &ack).await {
        return;
    }

    let mut held: Vec<ProxyRequest> = Vec::new();

    while let Some(Ok(frame)) = socket.recv().await {
        let AxumMessage::Text(text) = frame else {
            continue;
        };
        let Ok(message) = serde_json::from_str::<Message>(text.as_str()) else {
            continue;
        };

        match message {
            Message::ProxyRequest(req) => {
                let count = {
                    let mut received = state.received.lock().await;
                    received.push(req.clone());
                    received.len()
                };

                match &state.mode {
                    Mode::Echo => {
                        send(&mut socket, &echo_response(&req)).await;
                    }
                    Mode::Fixed(response) => {
                        let reply = Message::ProxyResponse(
                            response.clone().into_proxy_response(req.request_id.clone()),
                        );
                        send(&mut socket, &reply).await;
                    }
                    Mode::Reversed(batch) => {
                        held.push(req);
                        if held.len() == *batch {
                            for req in held.drain(..).rev() {
                                send(&mut socket, &echo_response(&req)).await;
                            }
                        }
                    }
                    Mode::Silent => {}
                    Mode::Late(delay) => {
                        tokio::time::sleep(*delay).await;
                        send(&mut socket, &echo_response(&req)).await;
                    }
                    Mode::DropAfter(limit) => {
                        if count >= *limit {
                            return;
                        }
                    }
                    Mode::Fail { error, code } => {
                        let reply = Message::ProxyError(ProxyError {
                            request_id: req.request_id.clone(),
                            error: error.clone(),
                            code: Some(code.clone()),
                        });
                        send(&mut socket, &reply).await;
                    }
                }
            }
            Message::StatusQuery => {
                let reply = Message::StatusReply(StatusReport::connected(state.channel_ip.clone()));
                send(&mut socket, &reply).await;
            }
            _ => {}
        }
    }
}

async fn fallback_handler(
    State(state): State<Arc<StubState>>,
    Json(req): Json<FallbackRequest>,
) -> Response {
    state.fallback_hits.fetch_add(1, Ordering::SeqCst);

    if let Mode::Fail { error, code } = &state.mode {
        let body = json!({ "error": error, "code": code });
        return (StatusCode::BAD_GATEWAY, Json(body)).into_response();
    }

    let mut response = HttpResponse::new(200, "OK");
    response.data = json!({ "via": "fallback", "url": req.url, "method": req.method });
    Json(response).into_response()
}

async fn status_handler(State(state): State<Arc<StubState>>) -> Json<StatusReport> {
    Json(StatusReport::connected(state.fallback_ip.clone()))
}
