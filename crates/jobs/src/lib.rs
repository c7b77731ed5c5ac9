// crates/jobs/src/lib.rs
//! Batch execution for claude-batch.
//!
//! Provides:
//! - `BatchRunner`: bounded parallel scheduler over worker processes
//! - `SessionTracker`: persisted session state plus progress broadcast
//! - `spawn_detached` / `run_session`: running a batch in a background process
//! - `BatchProgress`: per-job progress updates

pub mod detach;
pub mod runner;
pub mod state;
pub mod types;

pub use detach::{run_session, spawn_detached, RUN_SESSION_COMMAND};
pub use runner::{BatchRunner, Isolation};
pub use state::SessionTracker;
pub use types::{
    effective_concurrency, BatchError, BatchManifest, BatchOptions, BatchProgress,
    IsolationOptions, ProgressEvent, RunningJob,
};
