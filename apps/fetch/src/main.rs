use std::{collections::HashMap, time::Duration};

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use egress_tunnel_client::{ChannelState, ConnectionManager, ManagerConfig, RequestOptions};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// CLI arguments for the fetcher
#[derive(Parser, Debug)]
#[command(name = "etf")]
#[command(about = "Fetch URLs through the egress tunnel", long_about = None)]
#[command(version)]
struct Args {
    /// Executor WebSocket endpoint
    #[arg(
        short,
        long,
        env = "ETF_ENDPOINT",
        default_value = "ws://127.0.0.1:3000/ws"
    )]
    endpoint: String,

    /// Override the stateless fallback URL derived from the endpoint
    #[arg(long)]
    fallback_url: Option<String>,

    /// Override the status URL derived from the endpoint
    #[arg(long)]
    status_url: Option<String>,

    /// Seconds to wait for the persistent channel before using the fallback
    #[arg(long, default_value = "5")]
    connect_wait: u64,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    request_timeout: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Perform one request and print the response as JSON
    Get {
        /// Absolute http(s) URL
        url: String,

        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Header in "Name: value" form, repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request body; sent as JSON when it parses as JSON, verbatim otherwise
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Report whether the egress is reachable and its external address
    Status,
}

fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("Invalid header (expected \"Name: value\"): {}", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("Invalid header (empty name): {}", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_body(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

fn build_options(method: String, headers: &[String], data: Option<String>) -> Result<RequestOptions> {
    let headers = headers
        .iter()
        .map(|raw| parse_header(raw))
        .collect::<Result<HashMap<_, _>>>()?;

    Ok(RequestOptions {
        method: Some(method),
        headers,
        body: data.map(parse_body),
    })
}

fn build_config(args: &Args) -> Result<ManagerConfig> {
    let mut config = ManagerConfig::from_endpoint(&args.endpoint)?
        .with_request_timeout(Duration::from_secs(args.request_timeout));
    if let Some(url) = &args.fallback_url {
        config = config.with_fallback_url(url.clone());
    }
    if let Some(url) = &args.status_url {
        config = config.with_status_url(url.clone());
    }
    Ok(config)
}

async fn run(manager: &ConnectionManager, command: Command) -> Result<Value> {
    match command {
        Command::Get {
            url,
            method,
            headers,
            data,
        } => {
            let options = build_options(method, &headers, data)?;
            let response = manager.request(&url, options).await?;
            Ok(serde_json::to_value(response)?)
        }
        Command::Status => {
            let report = manager.check_status().await?;
            Ok(serde_json::to_value(report)?)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging (stderr, so stdout stays machine readable)
    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    info!("Egress tunnel fetcher v{}", env!("CARGO_PKG_VERSION"));
    info!("Executor endpoint: {}", args.endpoint);

    let config = build_config(&args)?;
    let manager = ConnectionManager::connect(config).await?;

    let wait = Duration::from_secs(args.connect_wait);
    if !manager.wait_for_state(ChannelState::Open, wait).await {
        warn!("Channel not open after {:?}, using stateless fallback", wait);
    }

    // Run until done or interrupted
    let outcome = tokio::select! {
        result = run(&manager, args.command) => Some(result),
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down...");
            None
        }
    };

    manager.shutdown().await;

    if let Some(result) = outcome {
        println!("{}", serde_json::to_string_pretty(&result?)?);
    }

    Ok(())
}
