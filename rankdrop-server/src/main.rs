//! HTTP leaderboard server backed by the rankdrop engine.
//!
//! Loads (or creates) a data directory, starts the reset scheduler and
//! serves the JSON API until the process is stopped. Webhook notifications
//! are enabled and take their target from the settings store.

mod api;

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rankdrop::{EngineConfig, Rankdrop};
use tracing_subscriber::EnvFilter;

/// rankdrop-server: Leaderboard HTTP API.
#[derive(Parser)]
#[command(name = "rankdrop-server", version, about)]
struct Cli {
    /// Path to the data directory.
    #[arg(long, default_value = "./rankdrop-data")]
    data_dir: PathBuf,

    /// Path to an engine configuration file (JSON).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port for the HTTP API.
    #[arg(long, default_value = "8080")]
    port: u16,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        tracing::error!("server failed: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let rankdrop = Arc::new(
        Rankdrop::builder(config)
            .data_dir(&cli.data_dir)
            .webhooks()
            .build()?,
    );
    tracing::info!(
        data_dir = %cli.data_dir.display(),
        leaderboards = rankdrop.leaderboards()?.len(),
        "data directory loaded"
    );

    let scheduler = rankdrop.start_scheduler()?;

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = TcpListener::bind(&addr).map_err(|e| format!("bind failed on {addr}: {e}"))?;
    tracing::info!("listening on {addr}");

    api::run_api_server(listener, Arc::clone(&rankdrop));

    scheduler.stop();
    rankdrop.flush()?;
    tracing::info!("server exited cleanly");
    Ok(())
}
