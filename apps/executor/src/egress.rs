//! Egress mechanism
//!
//! Every outbound call the executor makes goes through an [`Egress`]. The default
//! implementation routes through a SOCKS5 proxy given in [`EgressConfig`].

use std::{error::Error as StdError, time::Duration};

use async_trait::async_trait;
use egress_tunnel_common::{
    ErrorCode, HttpResponse, ProxyRequest, StatusReport, constants::MAX_BODY_SIZE_BYTES,
    decode_payload, encode_payload, headers_to_map, map_to_headers,
    utils::has_header,
    validation::{validate_method, validate_target_url},
};
use reqwest::{Client, Method, Proxy, Response, header::CONTENT_TYPE};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::EgressConfig;

/// Failure of an outbound call, carrying enough to build a `proxy-error`
#[derive(Debug, Error)]
pub enum EgressError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported HTTP method: {0}")]
    InvalidMethod(String),

    #[error("timeout of {0}ms exceeded")]
    Timeout(u128),

    #[error("{0}")]
    ConnectionRefused(String),

    #[error("{0}")]
    Request(String),

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("Egress setup failed: {0}")]
    Setup(String),
}

impl EgressError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EgressError::InvalidUrl(_) => ErrorCode::InvalidUrl,
            EgressError::InvalidMethod(_) => ErrorCode::InvalidMethod,
            EgressError::Timeout(_) => ErrorCode::Timeout,
            EgressError::ConnectionRefused(_) => ErrorCode::ConnectionRefused,
            EgressError::Request(_) => ErrorCode::RequestFailed,
            EgressError::Body(_) => ErrorCode::BodyFailed,
            EgressError::Setup(_) => ErrorCode::Internal,
        }
    }

    /// The request itself was bad; nothing was sent
    pub fn is_validation(&self) -> bool {
        matches!(self, EgressError::InvalidUrl(_) | EgressError::InvalidMethod(_))
    }
}

/// "Perform this HTTP request" through whatever egress the executor was given
#[async_trait]
pub trait Egress: Send + Sync {
    /// Perform the call, accepting any status code from the origin
    async fn execute(&self, request: ProxyRequest) -> Result<HttpResponse, EgressError>;

    /// Fetch the well-known probe URL and report the external address
    async fn probe(&self) -> StatusReport;
}

/// Egress through a SOCKS5 proxy
pub struct SocksEgress {
    client: Client,
    config: EgressConfig,
}

impl SocksEgress {
    pub fn new(config: EgressConfig) -> Result<Self, EgressError> {
        let proxy =
            Proxy::all(config.proxy_url()).map_err(|e| EgressError::Setup(e.to_string()))?;

        let client = Client::builder()
            .proxy(proxy)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EgressError::Setup(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &EgressConfig {
        &self.config
    }

    fn classify(&self, err: reqwest::Error) -> EgressError {
        if err.is_timeout() {
            EgressError::Timeout(self.config.request_timeout.as_millis())
        } else if err.is_connect() {
            EgressError::ConnectionRefused(error_chain(&err))
        } else {
            EgressError::Request(error_chain(&err))
        }
    }
}

#[async_trait]
impl Egress for SocksEgress {
    async fn execute(&self, request: ProxyRequest) -> Result<HttpResponse, EgressError> {
        let url =
            validate_target_url(&request.url).map_err(|e| EgressError::InvalidUrl(e.to_string()))?;
        let method =
            validate_method(&request.method).map_err(|e| EgressError::InvalidMethod(e.to_string()))?;

        debug!("Egress call: {} {}", method, url);

        let mut builder = self
            .client
            .request(method.clone(), url)
            .headers(map_to_headers(&request.headers));

        if let Some(body) = outbound_body(&method, request.body.as_ref()) {
            let (bytes, content_type) = encode_payload(body);
            if let Some(content_type) = content_type
                && !has_header(&request.headers, "content-type")
            {
                builder = builder.header(CONTENT_TYPE, content_type);
            }
            builder = builder.body(bytes);
        }

        let response = builder.send().await.map_err(|e| self.classify(e))?;

        let status = response.status();
        let headers = headers_to_map(response.headers());
        let bytes = read_body(response, self.config.request_timeout).await?;
        let (data, data_encoding) = decode_payload(&bytes);

        debug!("Egress response: {} ({} bytes)", status, bytes.len());

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            data,
            data_encoding,
        })
    }

    async fn probe(&self) -> StatusReport {
        let request = ProxyRequest::new(
            "status-probe".to_string(),
            self.config.status_probe_url.clone(),
            "GET".to_string(),
        );

        let report = match self.execute(request).await {
            Ok(response) if response.is_success() => {
                StatusReport::connected(external_ip(&response.data))
            }
            Ok(response) => StatusReport::failed(format!(
                "Probe returned {} {}",
                response.status, response.status_text
            )),
            Err(e) => {
                warn!("Egress probe failed: {}", e);
                StatusReport::failed(e.to_string())
            }
        };

        report.with_egress(self.config.socks_host.clone(), self.config.socks_port)
    }
}

/// Read the origin body, giving up as soon as it passes the size cap
async fn read_body(mut response: Response, request_timeout: Duration) -> Result<Vec<u8>, EgressError> {
    if let Some(length) = response.content_length() {
        check_body_size(usize::try_from(length).unwrap_or(usize::MAX))?;
    }

    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|e| {
        if e.is_timeout() {
            EgressError::Timeout(request_timeout.as_millis())
        } else {
            EgressError::Body(error_chain(&e))
        }
    })? {
        check_body_size(bytes.len() + chunk.len())?;
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

fn check_body_size(len: usize) -> Result<(), EgressError> {
    if len > MAX_BODY_SIZE_BYTES {
        return Err(EgressError::Body(format!(
            "response body exceeds {} bytes",
            MAX_BODY_SIZE_BYTES
        )));
    }
    Ok(())
}

/// Body to attach, if any; GET and HEAD never carry one
pub fn outbound_body<'a>(method: &Method, body: Option<&'a Value>) -> Option<&'a Value> {
    if *method == Method::GET || *method == Method::HEAD {
        return None;
    }
    body.filter(|b| !b.is_null())
}

/// Pull the address out of a probe reply (`{"origin": "..."}` or plain text)
pub fn external_ip(data: &Value) -> String {
    match data {
        Value::Object(map) => map
            .get("origin")
            .or_else(|| map.get("ip"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Value::String(text) => text.trim().to_string(),
        other => other.to_string(),
    }
}

// reqwest's Display stops at the outermost error
fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_codes() {
        assert_eq!(EgressError::InvalidUrl("x".into()).code().as_str(), "EINVALIDURL");
        assert_eq!(EgressError::Timeout(30000).code().as_str(), "ETIMEDOUT");
        assert_eq!(
            EgressError::ConnectionRefused("refused".into()).code().as_str(),
            "ECONNREFUSED"
        );
        assert_eq!(EgressError::Request("reset".into()).code().as_str(), "EREQUEST");
        assert_eq!(EgressError::Body("truncated".into()).code().as_str(), "EBODY");
        assert_eq!(EgressError::Setup("bad proxy".into()).code().as_str(), "EINTERNAL");
    }

    #[test]
    fn test_timeout_message() {
        assert_eq!(EgressError::Timeout(30000).to_string(), "timeout of 30000ms exceeded");
    }

    #[test]
    fn test_validation_errors() {
        assert!(EgressError::InvalidUrl("x".into()).is_validation());
        assert!(EgressError::InvalidMethod("BREW".into()).is_validation());
        assert!(!EgressError::Timeout(1).is_validation());
    }

    #[test]
    fn test_outbound_body_rules() {
        let body = json!({"q": "naruto"});

        assert!(outbound_body(&Method::GET, Some(&body)).is_none());
        assert!(outbound_body(&Method::HEAD, Some(&body)).is_none());
        assert_eq!(outbound_body(&Method::POST, Some(&body)), Some(&body));
        assert_eq!(outbound_body(&Method::DELETE, Some(&body)), Some(&body));
        assert!(outbound_body(&Method::PUT, Some(&Value::Null)).is_none());
        assert!(outbound_body(&Method::PATCH, None).is_none());
    }

    #[test]
    fn test_body_size_cap() {
        assert!(check_body_size(0).is_ok());
        assert!(check_body_size(MAX_BODY_SIZE_BYTES).is_ok());

        let err = check_body_size(MAX_BODY_SIZE_BYTES + 1).unwrap_err();
        assert!(matches!(err, EgressError::Body(_)));
        assert_eq!(err.code().as_str(), "EBODY");
    }

    async fn serve_body(body: fn() -> axum::body::Body) -> String {
        let app = axum::Router::new().route("/", axum::routing::get(move || async move { body() }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}/", addr)
    }

    async fn fetch_body(url: &str) -> Result<Vec<u8>, EgressError> {
        let client = Client::builder().no_proxy().build().unwrap();
        let response = client.get(url).send().await.unwrap();
        read_body(response, Duration::from_secs(5)).await
    }

    #[tokio::test]
    async fn test_read_body_within_cap() {
        let url = serve_body(|| axum::body::Body::from("hello")).await;
        assert_eq!(fetch_body(&url).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_read_body_rejects_declared_oversize() {
        let url = serve_body(|| axum::body::Body::from(vec![b'a'; MAX_BODY_SIZE_BYTES + 1])).await;
        let err = fetch_body(&url).await.unwrap_err();
        assert!(matches!(err, EgressError::Body(_)));
    }

    #[tokio::test]
    async fn test_read_body_rejects_streamed_oversize() {
        // Chunked, so no content-length to check up front
        let url = serve_body(|| {
            let chunks = (0..11).map(|_| Ok::<_, std::io::Error>(vec![b'a'; 1024 * 1024]));
            axum::body::Body::from_stream(futures_util::stream::iter(chunks))
        })
        .await;
        let err = fetch_body(&url).await.unwrap_err();
        assert!(matches!(err, EgressError::Body(_)));
    }

    #[test]
    fn test_external_ip() {
        assert_eq!(external_ip(&json!({"origin": "1.2.3.4"})), "1.2.3.4");
        assert_eq!(external_ip(&json!({"ip": "5.6.7.8"})), "5.6.7.8");
        assert_eq!(external_ip(&json!("9.9.9.9\n")), "9.9.9.9");
        assert_eq!(external_ip(&json!({"unexpected": true})), "");
    }

    #[test]
    fn test_socks_egress_builds() {
        let egress = SocksEgress::new(EgressConfig::default()).unwrap();
        assert_eq!(egress.config().proxy_url(), "socks5h://127.0.0.1:9050");
    }

    #[tokio::test]
    async fn test_execute_rejects_invalid_input() {
        let egress = SocksEgress::new(EgressConfig::default()).unwrap();

        let bad_url = ProxyRequest::new("r1".into(), "/relative".into(), "GET".into());
        let err = egress.execute(bad_url).await.unwrap_err();
        assert!(matches!(err, EgressError::InvalidUrl(_)));

        let bad_method =
            ProxyRequest::new("r2".into(), "https://example.test/".into(), "BREW".into());
        let err = egress.execute(bad_method).await.unwrap_err();
        assert!(matches!(err, EgressError::InvalidMethod(_)));
    }
}
