//! Keeper gRPC server binary

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use keeper::{Config, ServiceRunner};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[clap(name = "keeper-server")]
#[clap(about = "Keeper - password and secret storage server")]
struct Args {
    /// Path to the TOML configuration file
    #[clap(long, env = "KEEPER_CONFIG", default_value = "config/keeper.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenv().ok();

    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let _log_guard = monitoring::init_logging(config.env.as_str())?;

    info!("Starting keeper server ({})", config.env.as_str());

    let runner = ServiceRunner::new(config).await?;
    if let Err(e) = runner.run(shutdown_signal()).await {
        error!("Service error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal, draining in-flight calls");
}
