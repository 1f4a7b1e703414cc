use serde::{Deserialize, Serialize};

use super::{ProxyError, ProxyRequest, ProxyResponse, StatusReport};

/// All WebSocket frames are wrapped in this typed envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Message {
    /// Sent once by the executor right after accepting a connection
    ConnectionAck {
        connection_id: String,
        message: String,
    },

    /// Data plane messages
    ProxyRequest(ProxyRequest),
    ProxyResponse(ProxyResponse),
    ProxyError(ProxyError),

    /// Egress introspection, not part of request multiplexing
    StatusQuery,
    StatusReply(StatusReport),

    /// Heartbeats
    Ping {
        timestamp: u64,
    },
    Pong {
        timestamp: u64,
    },

    /// Protocol-level complaint about a frame that carried no usable token
    Error {
        message: String,
    },
}

impl Message {
    /// Correlation token carried by the frame, if any
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Message::ProxyRequest(req) => Some(&req.request_id),
            Message::ProxyResponse(res) => Some(&res.request_id),
            Message::ProxyError(err) => Some(&err.request_id),
            _ => None,
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Message::ConnectionAck { .. } => "connection-ack",
            Message::ProxyRequest(_) => "proxy-request",
            Message::ProxyResponse(_) => "proxy-response",
            Message::ProxyError(_) => "proxy-error",
            Message::StatusQuery => "status-query",
            Message::StatusReply(_) => "status-reply",
            Message::Ping { .. } => "ping",
            Message::Pong { .. } => "pong",
            Message::Error { .. } => "error",
        }
    }

    /// Serialize to the JSON text carried by a WebSocket frame
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Failure codes reported in `proxy-error` and fallback error replies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidUrl,
    InvalidRequestId,
    InvalidMethod,
    Timeout,
    ConnectionRefused,
    RequestFailed,
    BodyFailed,
    Internal,
}

impl ErrorCode {
    /// Wire representation; peers treat codes as opaque strings
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidUrl => "EINVALIDURL",
            ErrorCode::InvalidRequestId => "EINVALIDID",
            ErrorCode::InvalidMethod => "EINVALIDMETHOD",
            ErrorCode::Timeout => "ETIMEDOUT",
            ErrorCode::ConnectionRefused => "ECONNREFUSED",
            ErrorCode::RequestFailed => "EREQUEST",
            ErrorCode::BodyFailed => "EBODY",
            ErrorCode::Internal => "EINTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
