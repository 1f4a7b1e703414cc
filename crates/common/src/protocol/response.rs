use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// How `data` should be interpreted when it is not plain JSON or text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    /// `data` is a base64 string holding the raw (non UTF-8) body bytes
    Base64,
}

/// Outcome of an outbound call as seen by the caller of `request()`
///
/// This is also the success body of the stateless fallback endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    /// HTTP status code returned by the origin (any value, never a local failure)
    pub status: u16,

    #[serde(default)]
    pub status_text: String,

    /// Response headers; repeated names are joined with ", "
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Parsed JSON, plain text, or base64 per `data_encoding`
    #[serde(default)]
    pub data: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_encoding: Option<BodyEncoding>,
}

impl HttpResponse {
    /// Create a new response with an empty body
    pub fn new(status: u16, status_text: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers: HashMap::new(),
            data: Value::Null,
            data_encoding: None,
        }
    }

    /// Check if the response is successful (2xx status code)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if the response is a client error (4xx status code)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Check if the response is a server error (5xx status code)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Attach a correlation token, producing the tunneled form
    pub fn into_proxy_response(self, request_id: String) -> ProxyResponse {
        ProxyResponse {
            request_id,
            status: self.status,
            status_text: self.status_text,
            headers: self.headers,
            data: self.data,
            data_encoding: self.data_encoding,
        }
    }
}

/// Tunneled response, correlated to a `ProxyRequest` by `request_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    /// Must match the request_id from the corresponding ProxyRequest
    pub request_id: String,

    pub status: u16,

    #[serde(default)]
    pub status_text: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub data: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_encoding: Option<BodyEncoding>,
}

impl From<ProxyResponse> for HttpResponse {
    fn from(res: ProxyResponse) -> Self {
        Self {
            status: res.status,
            status_text: res.status_text,
            headers: res.headers,
            data: res.data,
            data_encoding: res.data_encoding,
        }
    }
}

/// Tunneled failure of the executor's outbound call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyError {
    pub request_id: String,

    /// Human readable reason reported by the executor
    pub error: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Failure body of the stateless fallback endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackError {
    pub error: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl From<ProxyError> for FallbackError {
    fn from(err: ProxyError) -> Self {
        Self {
            error: err.error,
            code: err.code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_response_creation() {
        let res = HttpResponse::new(200, "OK");

        assert_eq!(res.status, 200);
        assert_eq!(res.status_text, "OK");
        assert!(res.headers.is_empty());
        assert!(res.data.is_null());
        assert!(res.data_encoding.is_none());
    }

    #[test]
    fn test_status_code_ranges() {
        let codes = vec![
            (100, false, false, false),
            (200, true, false, false),
            (299, true, false, false),
            (300, false, false, false),
            (404, false, true, false),
            (499, false, true, false),
            (500, false, false, true),
            (599, false, false, true),
        ];

        for (code, is_success, is_client_err, is_server_err) in codes {
            let res = HttpResponse::new(code, "");
            assert_eq!(res.is_success(), is_success, "status {}", code);
            assert_eq!(res.is_client_error(), is_client_err, "status {}", code);
            assert_eq!(res.is_server_error(), is_server_err, "status {}", code);
        }
    }

    #[test]
    fn test_http_response_wire_shape() {
        let json = json!({
            "status": 200,
            "statusText": "OK",
            "headers": {},
            "data": {"origin": "1.2.3.4"}
        });

        let parsed: HttpResponse = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(parsed.data["origin"], "1.2.3.4");
        assert_eq!(serde_json::to_value(&parsed).unwrap(), json);
    }

    #[test]
    fn test_proxy_response_conversions() {
        let mut res = HttpResponse::new(201, "Created");
        res.headers
            .insert("content-type".to_string(), "text/plain".to_string());
        res.data = json!("done");

        let tunneled = res.clone().into_proxy_response("req_1".to_string());
        assert_eq!(tunneled.request_id, "req_1");
        assert_eq!(tunneled.status, 201);

        let back: HttpResponse = tunneled.into();
        assert_eq!(back, res);
    }

    #[test]
    fn test_base64_encoding_flag() {
        let json = json!({
            "status": 200,
            "statusText": "OK",
            "headers": {"content-type": "image/png"},
            "data": "iVBORw0KGgo=",
            "dataEncoding": "base64"
        });

        let parsed: HttpResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.data_encoding, Some(BodyEncoding::Base64));
    }

    #[test]
    fn test_fallback_error_from_proxy_error() {
        let err = ProxyError {
            request_id: "req_1".to_string(),
            error: "timeout of 30000ms exceeded".to_string(),
            code: Some("ETIMEDOUT".to_string()),
        };

        let fallback: FallbackError = err.into();
        let value = serde_json::to_value(&fallback).unwrap();
        assert_eq!(value, json!({"error": "timeout of 30000ms exceeded", "code": "ETIMEDOUT"}));
    }
}
