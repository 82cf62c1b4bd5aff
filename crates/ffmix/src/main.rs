//! ffmix daemon binary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ffmix_conf::FfmixConfig;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// RME Fireface control daemon
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a config file (overrides the discovered ones)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// UDP port to listen on for OSC clients
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory holding snapshots and session settings
    #[arg(short, long)]
    state_dir: Option<PathBuf>,

    /// Load the last saved state on startup
    #[arg(long)]
    autoload: bool,

    /// Log verbosity (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_string()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;

    info!("ffmix {} starting", env!("CARGO_PKG_VERSION"));

    let mut config = FfmixConfig::load_from(cli.config.as_deref())
        .context("configuration load failed")?;
    if let Some(port) = cli.port {
        config.gui.listen_port = port;
    }
    if let Some(state_dir) = cli.state_dir {
        config.paths.state_dir = state_dir;
    }
    if cli.autoload {
        config.state.autoload = true;
    }

    let shutdown = CancellationToken::new();

    // SIGINT and SIGTERM both trigger a graceful shutdown
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received SIGINT, shutting down");
            }
            _ = async {
                #[cfg(unix)]
                {
                    use tokio::signal::unix::{signal, SignalKind};
                    match signal(SignalKind::terminate()) {
                        Ok(mut sigterm) => { sigterm.recv().await; }
                        Err(_) => std::future::pending::<()>().await,
                    }
                }
                #[cfg(not(unix))]
                {
                    std::future::pending::<()>().await;
                }
            } => {
                info!("received SIGTERM, shutting down");
            }
        }
        signal_token.cancel();
    });

    ffmix::daemon::run(config, shutdown).await?;

    info!("ffmix shutdown complete");
    Ok(())
}
