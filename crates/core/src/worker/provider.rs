// crates/core/src/worker/provider.rs
//! Worker trait defining the interface the scheduler launches jobs through.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::error::LaunchError;

/// Resolves to the worker's exit code once the process is gone.
pub type ExitFuture = Pin<Box<dyn Future<Output = std::io::Result<i32>> + Send + 'static>>;

/// Everything needed to start one worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerLaunch {
    pub job_id: String,
    /// Full instruction text, including any workspace note.
    pub instruction: String,
    /// Working directory; inherited when `None`.
    pub cwd: Option<PathBuf>,
    /// File receiving stdout and stderr; inherited when `None`.
    pub output: Option<PathBuf>,
}

/// A started worker process.
pub struct LaunchedWorker {
    pub pid: Option<u32>,
    pub exit: ExitFuture,
}

impl std::fmt::Debug for LaunchedWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchedWorker")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

/// Something that can run a job as an independent process.
///
/// Implementations include:
/// - `ClaudeCliWorker`: spawns the `claude` CLI
/// - in-process fakes used by the scheduler tests
pub trait Worker: Send + Sync {
    /// Start the worker. Must not wait for it to finish.
    ///
    /// An error here means the process could not be created at all, which
    /// the scheduler treats as fatal to the batch.
    fn launch(&self, launch: &WorkerLaunch) -> Result<LaunchedWorker, LaunchError>;

    /// Name for logging/display (e.g. "claude-cli").
    fn name(&self) -> &str;
}
