//! Periodic purge of long-expired session records.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use common::AppResult;

use super::SessionStore;
use crate::clock::Clock;

/// Used when a zero interval is supplied; `tokio::time::interval` rejects zero.
const FALLBACK_INTERVAL: Duration = Duration::from_secs(1);

/// Deletes sessions that expired more than `retention` ago.
pub struct SessionSweeper {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    retention: chrono::Duration,
    interval: Duration,
}

/// Stops a running sweeper.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper and wait for it to finish its current pass.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Session sweeper ended abnormally: {}", e);
        }
    }
}

impl SessionSweeper {
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        retention: chrono::Duration,
        interval: Duration,
    ) -> Self {
        let interval = if interval.is_zero() {
            warn!("Zero sweep interval, using {:?}", FALLBACK_INTERVAL);
            FALLBACK_INTERVAL
        } else {
            interval
        };

        Self {
            store,
            clock,
            retention,
            interval,
        }
    }

    /// Run one purge pass.
    pub async fn sweep_once(&self) -> AppResult<u64> {
        let cutoff = self.clock.now() - self.retention;
        let purged = self.store.purge_expired(cutoff).await?;
        if purged > 0 {
            info!(purged, cutoff = %cutoff, "Purged expired sessions");
        } else {
            debug!(cutoff = %cutoff, "No expired sessions to purge");
        }
        Ok(purged)
    }

    /// Run passes on a fixed interval until the handle is shut down.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown, mut signal) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            warn!("Session sweep failed: {}", e);
                        }
                    }
                    _ = signal.changed() => break,
                }
            }
            debug!("Session sweeper stopped");
        });

        SweeperHandle { shutdown, task }
    }
}
