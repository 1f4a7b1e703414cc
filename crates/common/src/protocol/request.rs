use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A request the client asks the executor to perform through the egress
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    /// Unique identifier to correlate request and response
    pub request_id: String,

    /// Absolute target URL
    pub url: String,

    /// HTTP method (GET, POST, PUT, DELETE, etc.)
    #[serde(default = "default_method")]
    pub method: String,

    /// Request headers; one value per name
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Optional body: strings are sent verbatim, other JSON values as JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl ProxyRequest {
    /// Create a new proxy request without headers or body
    pub fn new(request_id: String, url: String, method: String) -> Self {
        Self {
            request_id,
            url,
            method,
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Check if the request has a body
    pub fn has_body(&self) -> bool {
        self.body.as_ref().is_some_and(|b| !b.is_null())
    }
}

/// Body of a stateless fallback call (`POST /api/proxy`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackRequest {
    pub url: String,

    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl FallbackRequest {
    /// Attach a correlation token, producing the equivalent tunneled request
    pub fn into_proxy_request(self, request_id: String) -> ProxyRequest {
        ProxyRequest {
            request_id,
            url: self.url,
            method: self.method,
            headers: self.headers,
            body: self.data,
        }
    }
}

impl From<ProxyRequest> for FallbackRequest {
    fn from(req: ProxyRequest) -> Self {
        Self {
            url: req.url,
            method: req.method,
            headers: req.headers,
            data: req.body,
        }
    }
}

fn default_method() -> String {
    "GET".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_proxy_request_creation() {
        let req = ProxyRequest::new(
            "req_123".to_string(),
            "https://example.test/".to_string(),
            "GET".to_string(),
        );

        assert_eq!(req.method, "GET");
        assert_eq!(req.request_id, "req_123");
        assert!(req.headers.is_empty());
        assert!(!req.has_body());
    }

    #[test]
    fn test_proxy_request_defaults() {
        let json = r#"{"requestId":"req_1","url":"https://example.test/"}"#;
        let parsed: ProxyRequest = serde_json::from_str(json).unwrap();

        assert_eq!(parsed.method, "GET");
        assert!(parsed.headers.is_empty());
        assert!(parsed.body.is_none());
    }

    #[test]
    fn test_proxy_request_body_skipped_when_absent() {
        let req = ProxyRequest::new(
            "req_1".to_string(),
            "https://example.test/".to_string(),
            "GET".to_string(),
        );
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("body"));
        assert!(json.contains(r#""requestId":"req_1""#));
    }

    #[test]
    fn test_null_body_is_no_body() {
        let mut req = ProxyRequest::new(
            "req_1".to_string(),
            "https://example.test/".to_string(),
            "POST".to_string(),
        );
        req.body = Some(Value::Null);
        assert!(!req.has_body());

        req.body = Some(json!({"q": "naruto"}));
        assert!(req.has_body());
    }

    #[test]
    fn test_fallback_request_into_proxy_request() {
        let fallback: FallbackRequest = serde_json::from_value(json!({
            "url": "https://example.test/search",
            "method": "POST",
            "headers": {"content-type": "application/json"},
            "data": {"q": "naruto"}
        }))
        .unwrap();

        let req = fallback.into_proxy_request("req_7".to_string());
        assert_eq!(req.request_id, "req_7");
        assert_eq!(req.method, "POST");
        assert_eq!(req.body, Some(json!({"q": "naruto"})));
        assert_eq!(req.headers.get("content-type").unwrap(), "application/json");
    }
}
