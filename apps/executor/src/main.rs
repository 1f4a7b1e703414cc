use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use egress_executor::{
    AppState,
    config::{Args, ExecutorConfig},
    egress::SocksEgress,
    serve,
};
use tokio::{net::TcpListener, sync::watch};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    info!("Egress Executor v{}", env!("CARGO_PKG_VERSION"));

    let config = ExecutorConfig::from_args(args);
    let bind_addr = config.bind_addr()?;

    let egress = SocksEgress::new(config.egress.clone())?;
    info!("Egress proxy: {}", config.egress.proxy_url());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = Arc::new(AppState::new(Arc::new(egress), &config.egress, shutdown_rx));

    let listener = TcpListener::bind(bind_addr).await?;
    info!("WebSocket endpoint: ws://{}/ws", bind_addr);
    info!("REST API: http://{}/api", bind_addr);

    let mut server = tokio::spawn(serve(listener, state));

    tokio::select! {
        result = &mut server => {
            result??;
            error!("Server exited unexpectedly");
            return Ok(());
        }
        _ = shutdown_signal() => {
            info!("Shutting down gracefully...");
        }
    }

    shutdown_tx.send_replace(true);
    server.await??;
    info!("Server closed");

    Ok(())
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl-C");
    }
}
