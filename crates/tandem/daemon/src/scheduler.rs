//! Background housekeeping

use crate::config::SchedulerConfig;
use std::sync::Arc;
use tandem_core::Coordinator;
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Periodically collects finished tasks and their entries.
pub struct Scheduler {
    config: SchedulerConfig,
    coordinator: Arc<Coordinator>,
    running: Arc<RwLock<bool>>,
    stop_tx: watch::Sender<bool>,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(config: SchedulerConfig, coordinator: Arc<Coordinator>) -> Arc<Self> {
        let (stop_tx, _) = watch::channel(false);
        Arc::new(Self {
            config,
            coordinator,
            running: Arc::new(RwLock::new(false)),
            stop_tx,
        })
    }

    /// Run the garbage-collection loop until [`Scheduler::stop`] is called.
    /// Returns at once if the scheduler was stopped before it started.
    pub async fn start(self: Arc<Self>) {
        let mut stop = self.stop_tx.subscribe();
        if *stop.borrow_and_update() {
            return;
        }
        *self.running.write().await = true;

        tracing::info!(
            interval_secs = self.config.gc_interval_secs,
            "Scheduler started"
        );

        let mut interval = interval(Duration::from_secs(self.config.gc_interval_secs.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.wait_for(|stopped| *stopped) => break,
                _ = interval.tick() => {
                    self.collect_garbage();
                }
            }
        }

        *self.running.write().await = false;
        tracing::info!("Scheduler stopped");
    }

    /// One collection pass
    pub fn collect_garbage(&self) -> usize {
        let collected = self.coordinator.collect_garbage();
        if collected > 0 {
            tracing::debug!(collected, "Garbage collection pass");
        }
        collected
    }

    /// Stop the scheduler, including a loop that has not started yet
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}
