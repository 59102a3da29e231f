//! Rollover Monitor Service
//!
//! Periodically rolls every active driver's summaries forward, so
//! aggregates stay current even for drivers with no recent exchanges.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::infrastructure::Storage;
use crate::support::shutdown::ShutdownSignal;

use super::SummaryService;

/// Configuration for the periodic rollover task
#[derive(Debug, Clone)]
pub struct RolloverConfig {
    /// How often to roll summaries forward (in seconds)
    pub interval_secs: u64,
}

impl Default for RolloverConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600, // hourly; intervals are a day wide
        }
    }
}

/// Rollover Monitor Service
///
/// Runs in the background and keeps every active driver's summary sequence
/// extended up to the current time.
pub struct RolloverMonitor {
    storage: Arc<dyn Storage>,
    summaries: Arc<SummaryService>,
    config: RolloverConfig,
    /// Running state
    running: Arc<RwLock<bool>>,
}

impl RolloverMonitor {
    pub fn new(storage: Arc<dyn Storage>, summaries: Arc<SummaryService>) -> Self {
        Self {
            storage,
            summaries,
            config: RolloverConfig::default(),
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub fn with_config(mut self, config: RolloverConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the rollover monitor background task
    pub fn start(&self, shutdown: ShutdownSignal) {
        let storage = self.storage.clone();
        let summaries = self.summaries.clone();
        let config = self.config.clone();
        let running = self.running.clone();

        tokio::spawn(async move {
            {
                let mut r = running.write().await;
                *r = true;
            }

            info!(
                "Rollover monitor started (interval: {}s)",
                config.interval_secs
            );

            let mut interval = tokio::time::interval(Duration::from_secs(config.interval_secs));

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        run_rollover(&storage, &summaries).await;
                    }
                    _ = shutdown.notified().wait() => {
                        info!("Rollover monitor shutting down");
                        break;
                    }
                }
            }

            {
                let mut r = running.write().await;
                *r = false;
            }

            info!("Rollover monitor stopped");
        });
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

async fn run_rollover(storage: &Arc<dyn Storage>, summaries: &Arc<SummaryService>) {
    let now = Utc::now();
    match summaries.rollover_all(now).await {
        Ok(count) => {
            debug!("Rolled over summaries for {} active drivers", count);
            if tracing::enabled!(tracing::Level::DEBUG) {
                if let Err(e) = log_latest_summaries(storage, now).await {
                    warn!("Could not export summaries for logging: {}", e);
                }
            }
        }
        Err(e) => {
            warn!("Rollover run failed: {}", e);
        }
    }
}

/// Dump each active driver's latest summary as a JSON line at debug level
async fn log_latest_summaries(
    storage: &Arc<dyn Storage>,
    now: chrono::DateTime<Utc>,
) -> crate::domain::DomainResult<()> {
    for driver in storage.active_drivers(now).await? {
        if let Some(summary) = storage.latest_summary_for_driver(driver.id).await? {
            match serde_json::to_string(&summary) {
                Ok(json) => debug!(driver = driver.id, "latest summary: {}", json),
                Err(e) => warn!(driver = driver.id, "summary not serializable: {}", e),
            }
        }
    }
    Ok(())
}
