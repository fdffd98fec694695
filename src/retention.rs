//! Background retention job.
//!
//! Every cleanup interval the job sweeps expired analyses out of the cache,
//! deletes their stored uploads, and prunes finished exports older than the
//! retention window together with their files. Failures are logged and the
//! job keeps running.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::AnalysisCache;
use crate::pipeline::uploads::remove_upload;
use crate::report::ExportTasks;

/// What one sweep removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub analyses: usize,
    pub uploads_removed: usize,
    pub exports_removed: usize,
    pub errors: usize,
}

/// Run a single retention pass.
pub async fn sweep_once(
    cache: &AnalysisCache,
    exports: &ExportTasks,
    retention: chrono::Duration,
) -> SweepReport {
    let mut report = SweepReport::default();

    for record in cache.sweep() {
        report.analyses += 1;
        match remove_upload(&record.metadata.stored_path).await {
            Ok(()) => report.uploads_removed += 1,
            Err(e) => {
                report.errors += 1;
                tracing::error!(
                    file_id = %record.content_hash,
                    path = %record.metadata.stored_path.display(),
                    error = %e,
                    "Failed to remove stored upload"
                );
            }
        }
    }

    for path in exports.prune(retention) {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => report.exports_removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                report.errors += 1;
                tracing::error!(path = %path.display(), error = %e, "Failed to remove export file");
            }
        }
    }

    report
}

/// Handle to the running job. Dropping it stops the job.
pub struct RetentionHandle {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl RetentionHandle {
    /// Stop the job and wait for an in-progress sweep to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Retention task ended abnormally");
            }
        }
    }
}

impl Drop for RetentionHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Spawn the retention loop on the current runtime.
pub fn spawn(
    cache: Arc<AnalysisCache>,
    exports: Arc<ExportTasks>,
    interval: Duration,
    retention: chrono::Duration,
) -> RetentionHandle {
    let (shutdown, mut stop) = watch::channel(false);

    let handle = tokio::spawn(async move {
        tracing::info!(
            interval_secs = interval.as_secs(),
            retention_hours = retention.num_hours(),
            "Retention job started"
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = sweep_once(&cache, &exports, retention).await;
                    tracing::info!(
                        analyses = report.analyses,
                        uploads = report.uploads_removed,
                        exports = report.exports_removed,
                        errors = report.errors,
                        "Cleanup completed"
                    );
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Retention job shutting down");
    });

    RetentionHandle {
        shutdown,
        handle: Some(handle),
    }
}
