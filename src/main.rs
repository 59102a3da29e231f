//! Fleet swap scheduled-job binding.
//!
//! Thin wrapper around the library: loads configuration, then runs the
//! periodic summary rollover until shut down. Reads configuration from a
//! TOML file (~/.config/fleet-swap/config.toml).

use std::sync::Arc;

use tracing::{error, info};

use fleet_swap::application::{RolloverConfig, RolloverMonitor, SummaryService};
use fleet_swap::support::shutdown::{listen_for_shutdown_signals, ShutdownSignal};
use fleet_swap::{default_config_path, AppConfig, InMemoryStorage};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Load configuration ─────────────────────────────────────
    let config_path = std::env::var("FLEET_SWAP_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| default_config_path());
    let app_cfg = match AppConfig::load(&config_path) {
        Ok(cfg) => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level)),
                )
                .init();
            info!("Configuration loaded from {}", config_path.display());
            cfg
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
                .init();
            error!("Failed to load config: {}. Using defaults.", e);
            AppConfig::default()
        }
    };

    info!("Starting fleet swap rollover service...");

    // In-memory backend; a durable Storage implementation plugs in here
    let storage = Arc::new(InMemoryStorage::new());
    let summaries = Arc::new(SummaryService::new(storage.clone()));

    let shutdown = ShutdownSignal::new();
    let monitor = RolloverMonitor::new(storage, summaries).with_config(RolloverConfig {
        interval_secs: app_cfg.rollover.interval_secs,
    });
    monitor.start(shutdown.clone());

    tokio::spawn(listen_for_shutdown_signals(shutdown.clone()));
    shutdown.notified().wait().await;

    info!("Fleet swap rollover service stopped");
    Ok(())
}
