//! Periodic synchronization.
//!
//! The loop runs one pass immediately, then one per interval, until the stop
//! signal fires or `max_passes` is reached. A pass is never interrupted; the
//! stop signal is only observed between passes.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::sync::synchronizer::Synchronizer;

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub interval: Duration,
    /// Stop on its own after this many passes. `None` runs until stopped.
    pub max_passes: Option<usize>,
}

impl WatchOptions {
    pub fn every(interval: Duration) -> Self {
        Self { interval, max_passes: None }
    }

    pub fn max_passes(mut self, passes: usize) -> Self {
        self.max_passes = Some(passes);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WatchReport {
    pub passes: usize,
    pub failed_passes: usize,
    pub total_appended: usize,
}

impl Synchronizer {
    /// Run sync passes until `stop` turns true (or its sender is dropped).
    pub async fn watch(&mut self, options: WatchOptions, mut stop: watch::Receiver<bool>) -> WatchReport {
        info!("Watching {} every {:?}", self.agents_root().display(), options.interval);

        let mut ticker = tokio::time::interval(options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut report = WatchReport::default();

        loop {
            if *stop.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            report.passes += 1;
            match self.synchronize_all() {
                Ok(summary) => report.total_appended += summary.total_appended,
                Err(e) => {
                    error!("Sync pass {} failed: {}", report.passes, e);
                    report.failed_passes += 1;
                }
            }

            if options.max_passes.is_some_and(|max| report.passes >= max) {
                break;
            }
        }

        info!(
            "Watch stopped after {} passes ({} messages appended)",
            report.passes, report.total_appended
        );
        report
    }

    /// Move the synchronizer onto a tokio task running [`Synchronizer::watch`].
    pub fn spawn_watch(self, options: WatchOptions) -> WatchHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut sync = self;
            let report = sync.watch(options, stop_rx).await;
            (sync, report)
        });
        WatchHandle { stop_tx, task }
    }
}

/// Control handle for a spawned watch loop.
pub struct WatchHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<(Synchronizer, WatchReport)>,
}

impl WatchHandle {
    /// Signal the loop, wait for the in-flight pass to finish, and hand the
    /// synchronizer back.
    pub async fn stop(self) -> anyhow::Result<(Synchronizer, WatchReport)> {
        let _ = self.stop_tx.send(true);
        Ok(self.task.await?)
    }

    /// Wait for the loop to end on its own (`max_passes`).
    pub async fn join(self) -> anyhow::Result<(Synchronizer, WatchReport)> {
        let WatchHandle { stop_tx, task } = self;
        let result = task.await;
        drop(stop_tx);
        Ok(result?)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
