//! Input validation for tunneled requests
//!
//! Everything a caller or a peer hands us is checked here before it reaches the network:
//! target URLs, methods, correlation tokens and header fields.

use std::collections::HashMap;

use http::Method;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use url::Url;

/// Correlation tokens: printable, URL-safe, bounded
static REQUEST_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.:-]{1,128}$").unwrap());

/// Connection identifiers assigned by the executor
static CONNECTION_ID_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]{1,32}$").unwrap());

/// Maximum length for HTTP header values
pub const MAX_HEADER_VALUE_LENGTH: usize = 8192;

/// Maximum length for target URLs
pub const MAX_URL_LENGTH: usize = 8192;

/// Methods the executor is willing to perform
pub const SUPPORTED_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL too long: {0} bytes (max: {1})")]
    UrlTooLong(usize, usize),

    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("Invalid request ID format: {0}")]
    InvalidRequestId(String),

    #[error("Invalid connection ID format: {0}")]
    InvalidConnectionId(String),

    #[error("Header value too long: {0} bytes (max: {1})")]
    HeaderValueTooLong(usize, usize),

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(String),
}

/// Validate that a target is an absolute http(s) URL
///
/// # Examples
///
/// ```
/// use egress_tunnel_common::validation::validate_target_url;
///
/// assert!(validate_target_url("https://example.test/ip").is_ok());
/// assert!(validate_target_url("/relative/path").is_err());
/// assert!(validate_target_url("ftp://example.test/file").is_err());
/// ```
pub fn validate_target_url(target: &str) -> Result<Url, ValidationError> {
    if target.len() > MAX_URL_LENGTH {
        return Err(ValidationError::UrlTooLong(target.len(), MAX_URL_LENGTH));
    }

    let url = Url::parse(target.trim())
        .map_err(|e| ValidationError::InvalidUrl(format!("{}: {}", truncate(target), e)))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(ValidationError::UnsupportedScheme(other.to_string())),
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(ValidationError::InvalidUrl(format!(
            "{}: missing host",
            truncate(target)
        )));
    }

    Ok(url)
}

/// Validate and normalize an HTTP method (case-insensitive, defaults handled by callers)
pub fn validate_method(method: &str) -> Result<Method, ValidationError> {
    let upper = method.trim().to_ascii_uppercase();
    if !SUPPORTED_METHODS.contains(&upper.as_str()) {
        return Err(ValidationError::UnsupportedMethod(truncate(method)));
    }

    Method::from_bytes(upper.as_bytes())
        .map_err(|_| ValidationError::UnsupportedMethod(truncate(method)))
}

/// Validate correlation token format
pub fn validate_request_id(id: &str) -> Result<(), ValidationError> {
    if !REQUEST_ID_REGEX.is_match(id) {
        return Err(ValidationError::InvalidRequestId(truncate(id)));
    }
    Ok(())
}

/// Validate connection identifier format
pub fn validate_connection_id(id: &str) -> Result<(), ValidationError> {
    if !CONNECTION_ID_REGEX.is_match(id) {
        return Err(ValidationError::InvalidConnectionId(truncate(id)));
    }
    Ok(())
}

/// Sanitize HTTP header value
///
/// - Removes dangerous control characters (except tab)
/// - Enforces length limits
pub fn sanitize_header_value(value: &str) -> Result<String, ValidationError> {
    if value.len() > MAX_HEADER_VALUE_LENGTH {
        return Err(ValidationError::HeaderValueTooLong(
            value.len(),
            MAX_HEADER_VALUE_LENGTH,
        ));
    }

    Ok(value
        .chars()
        .filter(|c| !c.is_control() || *c == '\t')
        .collect())
}

/// Sanitize header name
///
/// Header names must be ASCII and contain no control characters.
pub fn sanitize_header_name(name: &str) -> Result<String, ValidationError> {
    if !name.is_ascii() {
        return Err(ValidationError::InvalidHeaderName(truncate(name)));
    }

    let sanitized: String = name.chars().filter(|c| !c.is_control()).collect();
    if sanitized.trim().is_empty() {
        return Err(ValidationError::InvalidHeaderName(truncate(name)));
    }

    Ok(sanitized.to_lowercase())
}

/// Sanitize a whole header map, rejecting the first invalid entry
pub fn sanitize_headers(
    headers: &HashMap<String, String>,
) -> Result<HashMap<String, String>, ValidationError> {
    headers
        .iter()
        .map(|(name, value)| Ok((sanitize_header_name(name)?, sanitize_header_value(value)?)))
        .collect()
}

// Limit what ends up in error messages and logs
fn truncate(input: &str) -> String {
    input.chars().take(50).collect()
}
