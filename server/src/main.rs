use anyhow::{Context, Result};
use clap::Parser;
use slotfactory_server::{Adapters, App, AppConfig, Mode};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Slotfactory game server")]
struct Args {
    /// YAML config file; every field is optional.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host interface to bind (default: localhost).
    #[arg(long)]
    host: Option<IpAddr>,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(long, value_enum)]
    mode: Option<Mode>,

    #[arg(long)]
    redis_url: Option<String>,

    /// One of trace, debug, info, warn, error.
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// File, then environment, then flags.
    fn resolve(&self) -> Result<AppConfig> {
        let mut config = AppConfig::load(self.config.as_deref()).context("failed to load config")?;
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(url) = &self.redis_url {
            config.redis.url = Some(url.clone());
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        config.validate().context("invalid config")?;
        Ok(config)
    }
}

fn init_tracing(level: tracing::Level) {
    tracing_subscriber::fmt().with_max_level(level).init();
}

/// Cancels `shutdown` on Ctrl+C or SIGTERM.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.resolve()?;
    init_tracing(config.log_level()?);

    let shutdown = CancellationToken::new();
    let adapters = Adapters::from_config(&config)?;
    let app = App::start(&config, adapters, shutdown.clone()).await?;

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, mode = ?config.mode, "listening");
    axum::serve(
        listener,
        app.router()
            .into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await
    .context("axum server error")?;

    app.finish().await;
    info!("server exiting");
    Ok(())
}
