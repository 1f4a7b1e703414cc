use std::{net::SocketAddr, time::Duration};

use clap::Parser;
use egress_tunnel_common::constants::{
    DEFAULT_EXECUTOR_PORT, DEFAULT_SOCKS_HOST, DEFAULT_SOCKS_PORT, REQUEST_TIMEOUT_SECS,
    STATUS_PROBE_URL,
};

/// CLI arguments for the tunnel executor
#[derive(Parser, Debug, Clone)]
#[command(name = "egress-executor")]
#[command(about = "Executes tunneled HTTP requests through a SOCKS5 egress", long_about = None)]
#[command(version)]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_EXECUTOR_PORT)]
    pub port: u16,

    /// SOCKS5 proxy host used for every outbound call
    #[arg(long, env = "SOCKS_HOST", default_value = DEFAULT_SOCKS_HOST)]
    pub socks_host: String,

    /// SOCKS5 proxy port
    #[arg(long, env = "SOCKS_PORT", default_value_t = DEFAULT_SOCKS_PORT)]
    pub socks_port: u16,

    /// Outbound request timeout in seconds
    #[arg(long, default_value_t = REQUEST_TIMEOUT_SECS)]
    pub request_timeout: u64,

    /// URL fetched through the egress to learn the external address
    #[arg(long, default_value = STATUS_PROBE_URL)]
    pub status_probe_url: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Egress proxy settings, handed explicitly to the egress implementation
#[derive(Debug, Clone)]
pub struct EgressConfig {
    pub socks_host: String,
    pub socks_port: u16,
    pub request_timeout: Duration,
    pub status_probe_url: String,
}

impl EgressConfig {
    /// Proxy URL; `socks5h` resolves hostnames on the proxy side
    pub fn proxy_url(&self) -> String {
        format!("socks5h://{}:{}", self.socks_host, self.socks_port)
    }
}

/// Configuration for the executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub host: String,
    pub port: u16,
    pub egress: EgressConfig,
}

impl ExecutorConfig {
    pub fn from_args(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            egress: EgressConfig {
                socks_host: args.socks_host,
                socks_port: args.socks_port,
                request_timeout: Duration::from_secs(args.request_timeout),
                status_probe_url: args.status_probe_url,
            },
        }
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address {}: {}", addr, e))
    }
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            socks_host: DEFAULT_SOCKS_HOST.to_string(),
            socks_port: DEFAULT_SOCKS_PORT,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            status_probe_url: STATUS_PROBE_URL.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["egress-executor"]);
        let config = ExecutorConfig::from_args(args);

        assert_eq!(config.port, 3000);
        assert_eq!(config.egress.socks_host, "127.0.0.1");
        assert_eq!(config.egress.socks_port, 9050);
        assert_eq!(config.egress.request_timeout, Duration::from_secs(30));
        assert_eq!(config.egress.status_probe_url, "https://httpbin.org/ip");
    }

    #[test]
    fn test_flags_override() {
        let args = Args::parse_from([
            "egress-executor",
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
            "--socks-host",
            "tor",
            "--socks-port",
            "9150",
            "--request-timeout",
            "5",
        ]);
        let config = ExecutorConfig::from_args(args);

        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:8080");
        assert_eq!(config.egress.proxy_url(), "socks5h://tor:9150");
        assert_eq!(config.egress.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_bind_addr() {
        let config = ExecutorConfig {
            host: "not a host".to_string(),
            port: 3000,
            egress: EgressConfig::default(),
        };
        assert!(config.bind_addr().is_err());
    }
}
