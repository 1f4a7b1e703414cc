use http::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;

/// Convert HTTP headers to the wire format
///
/// Repeated header names are folded into one comma-separated value.
pub fn headers_to_map(headers: &HeaderMap) -> HashMap<String, String> {
    let mut map: HashMap<String, String> = HashMap::new();

    for (name, value) in headers.iter() {
        let val = value.to_str().unwrap_or("");
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(val);
            })
            .or_insert_with(|| val.to_string());
    }

    map
}

/// Convert wire headers to an HTTP HeaderMap, skipping entries that are not valid HTTP
pub fn map_to_headers(map: &HashMap<String, String>) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, value) in map.iter() {
        if let (Ok(header_name), Ok(header_value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(header_name, header_value);
        }
    }

    headers
}

/// Case-insensitive presence check on wire headers
pub fn has_header(map: &HashMap<String, String>, name: &str) -> bool {
    map.keys().any(|k| k.eq_ignore_ascii_case(name))
}
