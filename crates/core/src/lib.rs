//! Core building blocks for claude-batch: input normalization, the worker
//! abstraction, git worktree isolation, and the file-backed session store
//! with its read-only query service.

pub mod error;
pub mod input;
pub mod paths;
pub mod query;
pub mod store;
pub mod worker;
pub mod worktree;

pub use error::*;
pub use input::{load_jobs_from_path, load_jobs_from_reader, parse_jobs};
pub use query::{JobOutput, Overview, SessionQuery, SessionSummary};
pub use store::{generate_session_id, SessionHandle, SessionStore};
pub use worker::{resolve_worker_binary, ClaudeCliWorker, LaunchedWorker, Worker, WorkerLaunch};
pub use worktree::{GitWorktrees, Workspace, WorkspaceProvisioner};
