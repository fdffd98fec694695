//! Background export tasks: render a cached analysis to a file and track
//! its progress so the client can poll and download it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{render, report_file_name, ReportError, ReportFormat};
use crate::clock::SharedClock;
use crate::models::AnalysisRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportTask {
    pub task_id: Uuid,
    pub analysis_id: String,
    pub status: ExportStatus,
    pub format: ReportFormat,
    /// Download name offered to the client.
    pub file_name: String,
    #[serde(skip)]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportCounts {
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Table of export tasks plus the directory their files are written to.
pub struct ExportTasks {
    dir: PathBuf,
    clock: SharedClock,
    tasks: Mutex<HashMap<Uuid, ExportTask>>,
}

impl ExportTasks {
    pub fn new(dir: impl Into<PathBuf>, clock: SharedClock) -> Self {
        Self {
            dir: dir.into(),
            clock,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, ExportTask>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a task and render it in the background. Returns the task
    /// as it stands right after registration (`processing`).
    pub fn start(self: &Arc<Self>, record: AnalysisRecord, format: ReportFormat) -> ExportTask {
        let task = ExportTask {
            task_id: Uuid::new_v4(),
            analysis_id: record.content_hash.clone(),
            status: ExportStatus::Processing,
            format,
            file_name: report_file_name(record.file_stem(), format),
            path: None,
            error: None,
            created_at: self.clock.now(),
            completed_at: None,
        };
        self.lock().insert(task.task_id, task.clone());
        tracing::info!(
            task_id = %task.task_id,
            file_id = %task.analysis_id,
            format = format.extension(),
            "Export started"
        );

        let this = Arc::clone(self);
        let task_id = task.task_id;
        let file_name = task.file_name.clone();
        tokio::spawn(async move {
            let outcome = this.write_report(task_id, &file_name, record, format).await;
            if let Some(orphan) = this.finish(task_id, outcome) {
                remove_orphan(&orphan).await;
            }
        });
        task
    }

    async fn write_report(
        &self,
        task_id: Uuid,
        file_name: &str,
        record: AnalysisRecord,
        format: ReportFormat,
    ) -> Result<PathBuf, ReportError> {
        let bytes = tokio::task::spawn_blocking(move || render(&record, format))
            .await
            .map_err(|e| ReportError::Task(e.to_string()))??;
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{task_id}_{file_name}"));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Record the outcome. Returns the written file when the task is no
    /// longer tracked, since nothing will ever serve or prune it.
    fn finish(&self, task_id: Uuid, outcome: Result<PathBuf, ReportError>) -> Option<PathBuf> {
        let now = self.clock.now();
        let mut tasks = self.lock();
        let Some(task) = tasks.get_mut(&task_id) else {
            tracing::warn!(task_id = %task_id, "Export finished for an untracked task");
            return outcome.ok();
        };
        task.completed_at = Some(now);
        match outcome {
            Ok(path) => {
                tracing::info!(task_id = %task_id, path = %path.display(), "Export completed");
                task.status = ExportStatus::Completed;
                task.path = Some(path);
            }
            Err(e) => {
                tracing::error!(
                    task_id = %task_id,
                    file_id = %task.analysis_id,
                    error = %e,
                    "Export failed"
                );
                task.status = ExportStatus::Failed;
                task.error = Some(e.to_string());
            }
        }
        None
    }

    pub fn get(&self, task_id: &Uuid) -> Option<ExportTask> {
        self.lock().get(task_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn counts(&self) -> ExportCounts {
        self.lock()
            .values()
            .fold(ExportCounts::default(), |mut counts, task| {
                match task.status {
                    ExportStatus::Processing => counts.processing += 1,
                    ExportStatus::Completed => counts.completed += 1,
                    ExportStatus::Failed => counts.failed += 1,
                }
                counts
            })
    }

    /// Drop finished tasks that completed more than `older_than` ago and
    /// return the files they owned so the caller can delete them.
    pub fn prune(&self, older_than: chrono::Duration) -> Vec<PathBuf> {
        let cutoff = self.clock.now() - older_than;
        let mut tasks = self.lock();
        let expired: Vec<Uuid> = tasks
            .values()
            .filter(|t| t.completed_at.is_some_and(|done| done <= cutoff))
            .map(|t| t.task_id)
            .collect();
        expired
            .iter()
            .filter_map(|id| tasks.remove(id))
            .filter_map(|task| task.path)
            .collect()
    }
}

async fn remove_orphan(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed orphaned export file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove orphaned export file")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::fixtures::sample_record;
    use std::time::Duration;

    async fn wait_until_done(tasks: &ExportTasks, id: Uuid) -> ExportTask {
        for _ in 0..200 {
            let task = tasks.get(&id).unwrap();
            if task.status != ExportStatus::Processing {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("export {id} never finished");
    }

    fn setup() -> (tempfile::TempDir, Arc<ManualClock>, Arc<ExportTasks>) {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let tasks = Arc::new(ExportTasks::new(dir.path().join("exports"), clock.clone()));
        (dir, clock, tasks)
    }

    #[tokio::test]
    async fn export_completes_with_file_on_disk() {
        let (_dir, _clock, tasks) = setup();
        let started = tasks.start(sample_record("abc"), ReportFormat::Json);
        assert_eq!(started.status, ExportStatus::Processing);
        assert_eq!(started.file_name, "services_agreement_analysis.json");

        let done = wait_until_done(&tasks, started.task_id).await;
        assert_eq!(done.status, ExportStatus::Completed);
        let path = done.path.unwrap();
        assert!(path.starts_with(tasks.dir()));
        let body: serde_json::Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(body["document"]["analysis_id"], "abc");
    }

    #[tokio::test]
    async fn pdf_export_writes_pdf() {
        let (_dir, _clock, tasks) = setup();
        let started = tasks.start(sample_record("abc"), ReportFormat::Pdf);
        let done = wait_until_done(&tasks, started.task_id).await;
        let bytes = std::fs::read(done.path.unwrap()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn unwritable_directory_marks_task_failed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let tasks = Arc::new(ExportTasks::new(
            blocker.join("exports"),
            Arc::new(ManualClock::starting_now()),
        ));

        let started = tasks.start(sample_record("abc"), ReportFormat::Json);
        let done = wait_until_done(&tasks, started.task_id).await;
        assert_eq!(done.status, ExportStatus::Failed);
        assert!(done.error.is_some());
        assert!(done.path.is_none());
        assert_eq!(tasks.counts().failed, 1);
    }

    #[tokio::test]
    async fn prune_only_removes_old_finished_tasks() {
        let (_dir, clock, tasks) = setup();
        let old = tasks.start(sample_record("old"), ReportFormat::Json);
        let old_path = wait_until_done(&tasks, old.task_id).await.path.unwrap();

        clock.advance(chrono::Duration::hours(25));
        let fresh = tasks.start(sample_record("fresh"), ReportFormat::Json);
        wait_until_done(&tasks, fresh.task_id).await;

        let removed = tasks.prune(chrono::Duration::hours(24));
        assert_eq!(removed, vec![old_path]);
        assert!(tasks.get(&old.task_id).is_none());
        assert!(tasks.get(&fresh.task_id).is_some());
        assert_eq!(tasks.len(), 1);
    }

    #[tokio::test]
    async fn untracked_finish_hands_back_file_for_removal() {
        let (dir, _clock, tasks) = setup();
        let path = dir.path().join("stray_analysis.json");
        std::fs::write(&path, b"{}").unwrap();

        let orphan = tasks.finish(Uuid::new_v4(), Ok(path.clone()));
        assert_eq!(orphan.as_deref(), Some(path.as_path()));
        remove_orphan(&path).await;
        assert!(!path.exists());
        // Already gone: quiet no-op.
        remove_orphan(&path).await;

        let failed = tasks.finish(Uuid::new_v4(), Err(ReportError::Task("boom".into())));
        assert!(failed.is_none());
        assert!(tasks.is_empty());
    }

    #[test]
    fn unknown_task_is_none() {
        let tasks = ExportTasks::new("/tmp", Arc::new(ManualClock::starting_now()));
        assert!(tasks.get(&Uuid::new_v4()).is_none());
        assert!(tasks.is_empty());
        assert_eq!(tasks.counts(), ExportCounts::default());
    }
}
