//! Periodic reclamation of expired task directories
//!
//! The scheduler sweeps once on start and then every `interval`. Each sweep
//! removes directories older than `ttl` together with their task records.

pub mod sweep;

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CleanupConfig;
use crate::orchestrator::DownloadManager;
use crate::tasks::TaskId;

pub use sweep::{SweepReport, sweep_expired};

/// Runs one sweep on the blocking pool and drops the records of removed
/// directories. Returns the number of directories deleted.
pub async fn run_sweep(manager: &DownloadManager, ttl: Duration) -> usize {
    let dirs = manager.dirs().clone();
    let result =
        tokio::task::spawn_blocking(move || sweep_expired(&dirs, ttl, SystemTime::now())).await;

    let report = match result {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => {
            warn!(error = %e, "Cleanup sweep failed");
            return 0;
        }
        Err(e) => {
            warn!(error = %e, "Cleanup sweep worker failed");
            return 0;
        }
    };

    for dir in &report.removed {
        let task_id = dir
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.parse::<TaskId>().ok());
        if let Some(task_id) = task_id {
            manager.store().delete(&task_id);
        }
    }

    let removed = report.removed_count();
    manager.metrics().directories_swept(removed as u64);
    if removed > 0 || report.failed > 0 {
        info!(
            scanned = report.scanned,
            removed,
            failed = report.failed,
            "Cleanup sweep finished"
        );
    } else {
        debug!(scanned = report.scanned, "Cleanup sweep found nothing to remove");
    }
    removed
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct CleanupScheduler {
    manager: DownloadManager,
    ttl: Duration,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl CleanupScheduler {
    pub fn new(manager: DownloadManager, ttl: Duration, interval: Duration) -> Self {
        Self {
            manager,
            ttl,
            interval,
            running: Mutex::new(None),
        }
    }

    pub fn from_config(manager: DownloadManager, config: &CleanupConfig) -> Self {
        Self::new(
            manager,
            config.ttl.as_duration(),
            config.interval.as_duration(),
        )
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Spawns the sweep loop. Returns `false` if it was already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return false;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let manager = self.manager.clone();
        let ttl = self.ttl;
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        run_sweep(&manager, ttl).await;
                    }
                }
            }
            debug!("Cleanup loop exited");
        });

        info!(
            ttl_secs = ttl.as_secs(),
            interval_secs = period.as_secs(),
            "Cleanup scheduler started"
        );
        *running = Some(Running { cancel, handle });
        true
    }

    /// Stops the loop and waits for an in-progress sweep to finish.
    /// Returns `false` if it was not running.
    pub async fn stop(&self) -> bool {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(Running { cancel, handle }) = running else {
            return false;
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "Cleanup loop ended abnormally");
        }
        info!("Cleanup scheduler stopped");
        true
    }

    /// On-demand sweep with the scheduler's TTL
    pub async fn perform_cleanup(&self) -> usize {
        run_sweep(&self.manager, self.ttl).await
    }
}
