// crates/jobs/src/state.rs
//! Session tracking for a single batch.

use chrono::Utc;
use claude_batch_core::error::StoreError;
use claude_batch_core::{SessionHandle, SessionStore};
use claude_batch_types::{ExecutionResult, Session};
use tokio::sync::broadcast;

use crate::types::{BatchProgress, ProgressEvent};

/// Owns a batch's `Session` snapshot and keeps the store in step with it.
///
/// Every mutation is persisted immediately so a separate query process sees
/// near-real-time state. Persistence failures after creation are logged and
/// counted but never abort the batch.
pub struct SessionTracker {
    store: SessionStore,
    handle: SessionHandle,
    session: Session,
    persist_failures: usize,
    progress_tx: broadcast::Sender<BatchProgress>,
}

impl SessionTracker {
    /// Allocate the session in the store and write its initial snapshot.
    pub fn create(store: SessionStore, session: Session) -> Result<Self, StoreError> {
        let handle = store.create(&session.session_id)?;
        store.write(&handle, &session)?;
        tracing::info!(
            session_id = %session.session_id,
            total = session.total,
            "session created"
        );
        Ok(Self::from_parts(store, handle, session))
    }

    /// Pick up a session that was created by another process.
    pub fn resume(store: SessionStore, session_id: &str) -> Result<Self, StoreError> {
        let session = store.read(session_id)?;
        let handle = store.create(session_id)?;
        Ok(Self::from_parts(store, handle, session))
    }

    fn from_parts(store: SessionStore, handle: SessionHandle, session: Session) -> Self {
        let (progress_tx, _) = broadcast::channel(256);
        Self {
            store,
            handle,
            session,
            persist_failures: 0,
            progress_tx,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Number of snapshot writes that failed.
    pub fn persist_failures(&self) -> usize {
        self.persist_failures
    }

    /// Subscribe to progress updates for this batch.
    pub fn subscribe(&self) -> broadcast::Receiver<BatchProgress> {
        self.progress_tx.subscribe()
    }

    /// A job was admitted and its worker launched.
    pub fn mark_running(&mut self, job_id: &str) {
        if self.session.mark_running(job_id) {
            self.persist();
            self.broadcast(job_id, ProgressEvent::Started);
        }
    }

    /// A worker exited.
    pub fn record(&mut self, result: &ExecutionResult) {
        if self.session.record_result(result) {
            self.persist();
            self.broadcast(
                &result.job_id,
                ProgressEvent::Finished {
                    success: result.success,
                    exit_code: result.exit_code,
                },
            );
        } else {
            tracing::warn!(job_id = %result.job_id, "result for unknown or already completed job ignored");
        }
    }

    /// Close the session as `completed`.
    pub fn complete(&mut self) {
        if self.session.complete(Utc::now()) {
            self.persist();
            tracing::info!(
                session_id = %self.session.session_id,
                completed = self.session.completed,
                successful = self.session.successful,
                "session completed"
            );
        }
    }

    /// Close the session as `error`.
    pub fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.session.fail(Utc::now(), reason.clone()) {
            self.persist();
            tracing::error!(session_id = %self.session.session_id, reason = %reason, "session failed");
        }
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.write(&self.handle, &self.session) {
            self.persist_failures += 1;
            tracing::error!(
                session_id = %self.session.session_id,
                error = %e,
                "failed to persist session snapshot"
            );
        }
    }

    fn broadcast(&self, job_id: &str, event: ProgressEvent) {
        let task_num = self
            .session
            .task(job_id)
            .map(|t| t.task_num)
            .unwrap_or_default();
        let progress = BatchProgress {
            session_id: self.session.session_id.clone(),
            job_id: job_id.to_string(),
            task_num,
            event,
            completed: self.session.completed,
            successful: self.session.successful,
            total: self.session.total,
            timestamp: Utc::now().to_rfc3339(),
        };
        // Ignore send errors (no subscribers is fine).
        let _ = self.progress_tx.send(progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claude_batch_types::{Job, SessionStatus, TaskStatus};
    use tempfile::TempDir;

    fn tracker(dir: &TempDir) -> SessionTracker {
        let jobs = vec![Job::new("a", "first", 1), Job::new("b", "second", 2)];
        let session = Session::new("batch-1", &jobs, Utc::now());
        SessionTracker::create(SessionStore::new(dir.path()), session).unwrap()
    }

    #[test]
    fn test_create_persists_initial_snapshot() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir);
        let on_disk = tracker.store().read("batch-1").unwrap();
        assert_eq!(&on_disk, tracker.session());
        assert!(on_disk.tasks.iter().all(|t| t.status == TaskStatus::Pending));
    }

    #[test]
    fn test_every_mutation_is_persisted() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);
        let store = tracker.store().clone();

        tracker.mark_running("a");
        assert_eq!(store.read("batch-1").unwrap().tasks[0].status, TaskStatus::Running);

        tracker.record(&ExecutionResult::new("a", 0, 1, None));
        let snap = store.read("batch-1").unwrap();
        assert_eq!(snap.completed, 1);
        assert_eq!(snap.successful, 1);

        tracker.complete();
        let snap = store.read("batch-1").unwrap();
        assert_eq!(snap.overall_status, SessionStatus::Completed);
        assert!(snap.end_time.is_some());
        assert_eq!(tracker.persist_failures(), 0);
    }

    #[test]
    fn test_fail_after_complete_is_ignored() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);
        tracker.complete();
        tracker.fail("too late");
        let snap = tracker.store().read("batch-1").unwrap();
        assert_eq!(snap.overall_status, SessionStatus::Completed);
        assert!(snap.error.is_none());
    }

    #[test]
    fn test_resume_reads_existing_snapshot() {
        let dir = TempDir::new().unwrap();
        let mut first = tracker(&dir);
        first.mark_running("b");

        let resumed = SessionTracker::resume(SessionStore::new(dir.path()), "batch-1").unwrap();
        assert_eq!(resumed.session().tasks[1].status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn test_subscribe_receives_progress() {
        let dir = TempDir::new().unwrap();
        let mut tracker = tracker(&dir);
        let mut rx = tracker.subscribe();

        tracker.mark_running("a");
        tracker.record(&ExecutionResult::new("a", 3, 0, None));

        let started = rx.recv().await.unwrap();
        assert_eq!(started.event, ProgressEvent::Started);
        assert_eq!(started.task_num, 1);

        let finished = rx.recv().await.unwrap();
        assert_eq!(
            finished.event,
            ProgressEvent::Finished {
                success: false,
                exit_code: 3
            }
        );
        assert_eq!(finished.completed, 1);
        assert_eq!(finished.successful, 0);
    }
}
