//! api-cartographer
//!
//! `discover` logs into the configured application in a headless browser,
//! records its API traffic, and writes `catalog.json` plus `session.json`.
//! `serve` loads `session.json` and runs the lifecycle service that refreshes
//! it on demand for downstream consumers.

mod chrome;
mod config;
mod crawl;
mod discovery;
mod error;
mod metrics;
mod relogin;
mod server;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use session_lifecycle::LifecycleManager;
use site_auth::SessionSnapshot;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Config;
use crate::relogin::ChromeRelogin;
use crate::server::{ServerState, build_router};

const USAGE: &str = "usage: api-cartographer <discover|serve> [--config PATH]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Discover,
    Serve,
}

/// Parse `<command> [--config PATH]`.
fn parse_args(args: &[String]) -> Result<(Command, Option<&str>)> {
    let command = match args.get(1).map(String::as_str) {
        Some("discover") => Command::Discover,
        Some("serve") => Command::Serve,
        Some(other) => anyhow::bail!("unknown command {other:?}\n{USAGE}"),
        None => anyhow::bail!(USAGE),
    };
    let config_path = match args.iter().position(|a| a == "--config") {
        Some(i) => Some(
            args.get(i + 1)
                .map(String::as_str)
                .context("--config needs a path")?,
        ),
        None => None,
    };
    Ok((command, config_path))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let (command, cli_config_path) = parse_args(&args)?;

    let config_path = Config::resolve_path(cli_config_path);
    info!(command = ?command, path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    info!(
        instance = %config.target.url,
        output = %config.output.dir.display(),
        probe = config.probe.enabled,
        crawl_paths = config.crawl.paths.len(),
        "configuration loaded"
    );

    match command {
        Command::Discover => discover(config).await,
        Command::Serve => serve(config).await,
    }
}

async fn discover(config: Config) -> Result<()> {
    let prometheus = metrics::install_recorder();
    let result = discovery::discover(&config).await;
    info!(metrics = ?metrics::samples(&prometheus), "discovery metrics");

    match result {
        Ok(report) => {
            info!(
                catalog = %report.catalog_path.display(),
                session = %report.session_path.display(),
                "artifacts written"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "discovery failed");
            Err(e).context("discovery failed")
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus = metrics::install_recorder();

    let session_path = config.output.session_path();
    let snapshot = SessionSnapshot::load(&session_path)
        .await
        .with_context(|| {
            format!(
                "no usable session at {}; run `api-cartographer discover` first",
                session_path.display()
            )
        })?;

    let config = Arc::new(config);
    let manager = LifecycleManager::new(
        snapshot,
        config.lifecycle.cooldown(),
        Arc::new(ChromeRelogin::new(config.clone())),
    )
    .with_artifact_path(session_path);

    let state = ServerState::new(Arc::new(manager), config.output.catalog_path(), prometheus);
    let app = build_router(state);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "lifecycle service accepting requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
