//! Siftgate - credential-injecting gateway in front of the Sift backend.
//!
//! Listens on `--bind`:`--port`, forwards everything under the configured
//! prefix to `BACKEND_URL` with `SIFT_API_KEY` attached, and shuts down
//! gracefully on SIGINT/SIGTERM.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use clap::Parser;
use std::time::Duration;
use siftgate::config::GatewayConfig;
use siftgate::gateway::{GatewayState, router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Command line options for the gateway server.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Config {
    /// Port to listen on (default: 3000, or SIFTGATE_PORT env var)
    #[arg(short, long, env = "SIFTGATE_PORT", default_value = "3000")]
    port: u16,

    /// Bind address (default: 127.0.0.1)
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    /// Graceful shutdown timeout in seconds (default: 30)
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value = "30")]
    shutdown_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli_config = Config::parse();
    let gateway_config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid gateway configuration");
            return Err(e.into());
        }
    };

    let addr = format!("{}:{}", cli_config.bind, cli_config.port);
    let listener = TcpListener::bind(&addr).await?;

    let upstream_timeout = gateway_config
        .upstream_timeout
        .map(|t| humantime::format_duration(t).to_string())
        .unwrap_or_else(|| "none".to_string());

    info!(
        addr = %addr,
        prefix = %gateway_config.prefix,
        backend = %gateway_config.backend_url,
        upstream_timeout = %upstream_timeout,
        connect_timeout = %humantime::format_duration(gateway_config.connect_timeout),
        max_body_bytes = gateway_config.max_body_bytes,
        shutdown_timeout = cli_config.shutdown_timeout,
        "Siftgate starting"
    );

    let app = router(GatewayState::new(gateway_config));

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut server_rx = shutdown_rx.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = server_rx.wait_for(|stop| *stop).await;
    });
    let mut server = tokio::spawn(async move { server.await });

    tokio::select! {
        result = &mut server => {
            result??;
            return Ok(());
        }
        _ = shutdown_rx.wait_for(|stop| *stop) => {}
    }

    info!(
        timeout_seconds = cli_config.shutdown_timeout,
        "Waiting for in-flight requests to drain"
    );

    let deadline = Duration::from_secs(cli_config.shutdown_timeout);
    match tokio::time::timeout(deadline, &mut server).await {
        Ok(result) => {
            result??;
            info!("All requests drained, shutting down cleanly");
        }
        Err(_) => {
            warn!("Shutdown timeout reached, forcing exit");
            server.abort();
        }
    }

    Ok(())
}

/// Resolve on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGINT");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, initiating graceful shutdown");
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
