use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value;

use crate::protocol::BodyEncoding;

/// Encode bytes to Base64 string
pub fn encode_body(body: &[u8]) -> String {
    STANDARD.encode(body)
}

/// Decode Base64 string to bytes
pub fn decode_body(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(encoded)
}

/// Turn a raw response body into the `data` carried on the wire
///
/// JSON bodies are parsed, other UTF-8 bodies become strings, anything else is base64.
pub fn decode_payload(body: &[u8]) -> (Value, Option<BodyEncoding>) {
    match std::str::from_utf8(body) {
        Ok(text) => match serde_json::from_str::<Value>(text) {
            Ok(json) => (json, None),
            Err(_) => (Value::String(text.to_string()), None),
        },
        Err(_) => (Value::String(encode_body(body)), Some(BodyEncoding::Base64)),
    }
}

/// Turn a request `body` into bytes for the outbound call
///
/// Returns the implied content type for JSON values; strings are sent verbatim.
pub fn encode_payload(body: &Value) -> (Vec<u8>, Option<&'static str>) {
    match body {
        Value::String(text) => (text.clone().into_bytes(), None),
        other => (other.to_string().into_bytes(), Some("application/json")),
    }
}
