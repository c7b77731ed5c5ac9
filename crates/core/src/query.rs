// crates/core/src/query.rs
//! Read-only queries over the session store.
//!
//! Stateless between calls: every operation re-reads the store, so a query
//! process sees whatever the runner process last persisted.

use chrono::{DateTime, Utc};
use claude_batch_types::{Session, SessionStatus, TaskStatus};
use serde::Serialize;

use crate::error::StoreError;
use crate::store::SessionStore;

/// Captured output of one job, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOutput {
    pub task_num: usize,
    pub job_id: String,
    pub status: TaskStatus,
    pub success: bool,
    /// `None` until the job has produced output.
    pub output: Option<String>,
}

/// One row of `list()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub status: SessionStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub total: usize,
    pub completed: usize,
    pub successful: usize,
    /// Snapshot missing or unreadable; `status` is `error`.
    pub corrupt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SessionSummary {
    fn from_session(session: &Session) -> Self {
        Self {
            session_id: session.session_id.clone(),
            status: session.overall_status,
            start_time: Some(session.start_time),
            end_time: session.end_time,
            total: session.total,
            completed: session.completed,
            successful: session.successful,
            corrupt: false,
            message: session.error.clone(),
        }
    }

    fn unreadable(session_id: String, message: String) -> Self {
        Self {
            session_id,
            status: SessionStatus::Error,
            start_time: None,
            end_time: None,
            total: 0,
            completed: 0,
            successful: 0,
            corrupt: true,
            message: Some(message),
        }
    }
}

/// Aggregate counts across all sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Overview {
    pub sessions: usize,
    pub running: usize,
    pub completed: usize,
    pub errored: usize,
    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub successful_jobs: usize,
    /// `successful_jobs / completed_jobs`, 0.0 when nothing has completed.
    pub success_rate: f64,
}

/// Query service over a [`SessionStore`].
#[derive(Debug, Clone)]
pub struct SessionQuery {
    store: SessionStore,
}

impl SessionQuery {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Full snapshot of one session.
    pub fn status(&self, session_id: &str) -> Result<Session, StoreError> {
        self.store.read(session_id)
    }

    /// Output blob of every job in a session.
    pub fn results(&self, session_id: &str) -> Result<Vec<JobOutput>, StoreError> {
        let session = self.store.read(session_id)?;
        session
            .tasks
            .iter()
            .map(|task| {
                Ok(JobOutput {
                    task_num: task.task_num,
                    job_id: task.transaction_id.clone(),
                    status: task.status,
                    success: task.success,
                    output: self.store.read_output(session_id, &task.transaction_id)?,
                })
            })
            .collect()
    }

    /// Every session, newest first. Unreadable snapshots are listed as
    /// `error` entries instead of failing the listing.
    pub fn list(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let mut summaries: Vec<SessionSummary> = self
            .store
            .list_ids()?
            .into_iter()
            .map(|id| match self.store.read(&id) {
                Ok(session) => SessionSummary::from_session(&session),
                Err(e) => {
                    tracing::warn!(session_id = %id, error = %e, "unreadable session snapshot");
                    SessionSummary::unreadable(id, e.to_string())
                }
            })
            .collect();

        // Newest first; entries without a start time go last, by id.
        summaries.sort_by(|a, b| match (a.start_time, b.start_time) {
            (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.session_id.cmp(&b.session_id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.session_id.cmp(&b.session_id),
        });
        Ok(summaries)
    }

    /// Aggregate counts across every session.
    pub fn overview(&self) -> Result<Overview, StoreError> {
        let mut overview = Overview::default();
        for summary in self.list()? {
            overview.sessions += 1;
            match summary.status {
                SessionStatus::Running => overview.running += 1,
                SessionStatus::Completed => overview.completed += 1,
                SessionStatus::Error => overview.errored += 1,
            }
            overview.total_jobs += summary.total;
            overview.completed_jobs += summary.completed;
            overview.successful_jobs += summary.successful;
        }
        if overview.completed_jobs > 0 {
            overview.success_rate = overview.successful_jobs as f64 / overview.completed_jobs as f64;
        }
        Ok(overview)
    }
}
