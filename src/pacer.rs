use crate::repositories::MemoryStore;
use crate::services::AuctionService;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

/// Background task that advances the countdown of the running auction and
/// broadcasts the remaining time
pub struct Pacer {
    service: Arc<AuctionService>,
    tick_interval: Duration,
}

impl Pacer {
    /// Create a pacer ticking every 250ms
    pub fn new(service: Arc<AuctionService>) -> Self {
        Self {
            service,
            tick_interval: Duration::from_millis(250),
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Start the pacer loop
    pub async fn start(self) {
        let mut interval = time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Pacer started, ticking every {:?}", self.tick_interval);

        loop {
            interval.tick().await;

            match self.service.tick_current(Utc::now()).await {
                Ok(Some(state)) if !state.running => {
                    debug!("Current auction timer is stopped at {}ms", state.left_ms);
                }
                Ok(_) => {}
                Err(e) => error!("Error ticking auction timer: {}", e),
            }
        }
    }
}

/// Background task that periodically writes the in-memory store to its
/// snapshot file
pub struct SnapshotWriter {
    store: MemoryStore,
    interval: Duration,
}

impl SnapshotWriter {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            interval: Duration::from_secs(30),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn start(self) {
        let mut interval = time::interval(self.interval);
        // the first tick completes immediately
        interval.tick().await;
        info!(
            "Snapshot writer started, saving to {:?} every {:?}",
            self.store.snapshot_path(),
            self.interval
        );

        loop {
            interval.tick().await;

            if let Err(e) = self.store.save_snapshot().await {
                error!("Error writing snapshot: {}", e);
            }
        }
    }
}
