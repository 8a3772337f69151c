use std::path::PathBuf;

use clap::Parser;
use guardian_server::{
    AppState, Coordinator, api,
    config::{Config, StoreConfig},
    run_scheduler,
    store::{MemoryStore, SqliteStore, Store},
};
use jiff::Timestamp;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "guardian-server")]
#[command(about = "Motion-triggered power-cut guardian")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "guardian.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "guardian_server=info,guardian_core=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    info!(
        http_addr = %config.server.http_addr,
        device_id = %config.device.id,
        countdown_secs = config.device.countdown_secs,
        policy = ?config.device.policy,
        "Starting guardian"
    );

    match config.store {
        StoreConfig::Memory => {
            info!("Using in-memory store");
            run_server(config, MemoryStore::default()).await?;
        }
        StoreConfig::Sqlite { ref path } => {
            info!(path = ?path, "Using SQLite store");
            let store = SqliteStore::new(path).await?;
            run_server(config, store).await?;
        }
    }

    Ok(())
}

async fn run_server<S: Store>(config: Config, store: S) -> color_eyre::Result<()> {
    let coordinator = Coordinator::new(&config.device, store);
    coordinator.announce_startup(Timestamp::now()).await;

    let cancel = CancellationToken::new();

    let scheduler = tokio::spawn(run_scheduler(
        coordinator.clone(),
        config.device.tick_interval(),
        config.device.sample_interval(),
        cancel.clone(),
    ));

    let app = api::router().with_state(AppState { coordinator });

    let listener = TcpListener::bind(config.server.http_addr).await?;
    info!(http_addr = %config.server.http_addr, "HTTP server listening");

    let cancel_clone = cancel.clone();
    tokio::select! {
        result = axum::serve(listener, app).with_graceful_shutdown(async move {
            cancel_clone.cancelled().await;
        }) => {
            if let Err(e) = result {
                error!(error = ?e, "HTTP server error");
            }
            info!("HTTP server shut down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    cancel.cancel();
    if let Err(e) = scheduler.await {
        error!(error = ?e, "scheduler task failed");
    }

    Ok(())
}
