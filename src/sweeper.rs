//! Readiness sweeper
//!
//! Periodic background task promoting sealed capsules whose opening
//! condition has matured. Runs on its own timer, concurrent with request
//! handling, and coordinates with it only through the record store - the
//! guarded promotion in the db layer makes overlapping runs harmless.
//! Stopped through the process-wide shutdown broadcast.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::services::CapsuleService;

/// Configuration for the readiness sweeper
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Seconds between sweep runs
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

/// Spawn the sweeper task
///
/// The first sweep runs immediately, then on the configured interval.
/// The task exits when the shutdown channel fires or closes.
pub fn spawn(
    service: Arc<CapsuleService>,
    config: SweeperConfig,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = Duration::from_secs(config.interval_secs.max(1));
        let mut ticker = tokio::time::interval(interval);

        info!(interval_secs = config.interval_secs, "Readiness sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = service.process_due_capsules() {
                        // Next tick retries; individual records are already
                        // isolated inside the sweep body
                        warn!(error = %e, "Sweep run failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Readiness sweeper stopping");
                    break;
                }
            }
        }
    })
}
