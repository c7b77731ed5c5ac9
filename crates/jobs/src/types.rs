// crates/jobs/src/types.rs
//! Types for the batch scheduler.

use std::path::PathBuf;
use std::time::Instant;

use claude_batch_core::error::{LaunchError, StoreError};
use claude_batch_core::Workspace;
use claude_batch_types::Job;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Knobs for one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Maximum simultaneous workers; `None` means one per job.
    pub max_concurrency: Option<usize>,
    /// Redirect each worker's stdout/stderr into the session's output blob.
    pub capture_output: bool,
}

/// Where isolated jobs get their worktrees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsolationOptions {
    pub repo_root: PathBuf,
    pub base_branch: String,
    pub worktree_dir: PathBuf,
}

/// Everything a detached runner process needs to execute a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchManifest {
    pub jobs: Vec<Job>,
    pub worker: PathBuf,
    #[serde(default)]
    pub worker_args: Vec<String>,
    pub options: BatchOptions,
    #[serde(default)]
    pub isolation: Option<IsolationOptions>,
}

/// A job whose worker process is in flight.
///
/// Owned by the scheduler loop; created at admission, dropped at reap.
#[derive(Debug)]
pub struct RunningJob {
    /// Position of the job in the batch.
    pub index: usize,
    pub job_id: String,
    pub pid: Option<u32>,
    pub started: Instant,
    pub workspace: Option<Workspace>,
}

/// What happened to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProgressEvent {
    Started,
    Finished { success: bool, exit_code: i32 },
}

/// Progress update broadcast after every admission and every reap.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub session_id: String,
    pub job_id: String,
    pub task_num: usize,
    pub event: ProgressEvent,
    pub completed: usize,
    pub successful: usize,
    pub total: usize,
    pub timestamp: String,
}

/// Errors that end a batch early.
#[derive(Debug, Error)]
pub enum BatchError {
    /// A worker could not be spawned. Already running jobs were allowed to
    /// finish and are recorded in the session.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Session {0} has already finished")]
    SessionClosed(String),

    #[error("Failed to start detached runner: {0}")]
    Detach(#[source] std::io::Error),
}

/// Effective concurrency: the cap clamped to `1..=jobs`.
pub fn effective_concurrency(max_concurrency: Option<usize>, jobs: usize) -> usize {
    max_concurrency.unwrap_or(jobs).clamp(1, jobs.max(1))
}
