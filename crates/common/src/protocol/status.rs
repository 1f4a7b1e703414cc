use serde::{Deserialize, Serialize};

use crate::utils::iso_timestamp;

/// Whether the egress mechanism answered the well-known probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EgressState {
    Connected,
    Error,
}

/// Egress reachability report, used by `status-reply` and `GET /api/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: EgressState,

    /// Externally visible address presented by the egress
    #[serde(rename = "externalIP", default, skip_serializing_if = "Option::is_none")]
    pub external_ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Egress proxy host, reported by the executor for observability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// RFC 3339 time the probe completed
    pub timestamp: String,
}

impl StatusReport {
    /// Successful probe
    pub fn connected(external_ip: impl Into<String>) -> Self {
        Self {
            status: EgressState::Connected,
            external_ip: Some(external_ip.into()),
            error: None,
            host: None,
            port: None,
            timestamp: iso_timestamp(),
        }
    }

    /// Failed probe
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: EgressState::Error,
            external_ip: None,
            error: Some(error.into()),
            host: None,
            port: None,
            timestamp: iso_timestamp(),
        }
    }

    /// Record which egress proxy produced this report
    pub fn with_egress(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = Some(port);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.status == EgressState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connected_report() {
        let report = StatusReport::connected("1.2.3.4").with_egress("127.0.0.1", 9050);
        assert!(report.is_connected());

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "connected");
        assert_eq!(value["externalIP"], "1.2.3.4");
        assert_eq!(value["host"], "127.0.0.1");
        assert_eq!(value["port"], 9050);
        assert!(value.get("error").is_none());
        assert!(value["timestamp"].as_str().is_some());
    }

    #[test]
    fn test_failed_report() {
        let report = StatusReport::failed("SOCKS connection refused");
        assert!(!report.is_connected());

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"], "SOCKS connection refused");
        assert!(value.get("externalIP").is_none());
    }

    #[test]
    fn test_report_parses_minimal_reply() {
        let parsed: StatusReport = serde_json::from_value(json!({
            "status": "error",
            "error": "probe failed",
            "timestamp": "2026-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(parsed.status, EgressState::Error);
        assert!(parsed.host.is_none());
        assert!(parsed.port.is_none());
    }
}
