// crates/jobs/src/detach.rs
//! Detached batches.
//!
//! The invoking process writes the batch manifest next to the session
//! snapshot and re-executes its own binary with a hidden subcommand. That
//! child owns the scheduler loop until the batch finishes; the invoker
//! returns as soon as the child has been spawned.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

use claude_batch_core::{ClaudeCliWorker, GitWorktrees, SessionStore};
use claude_batch_types::Session;

use crate::runner::{BatchRunner, Isolation};
use crate::state::SessionTracker;
use crate::types::{BatchError, BatchManifest, BatchOptions};

/// Hidden subcommand the runner process is started with.
pub const RUN_SESSION_COMMAND: &str = "run-session";

/// Persist `manifest` and start a background runner for the tracked
/// session. Returns the runner's pid.
///
/// If the runner cannot be started the session is closed as `error`, so it
/// never lingers in `running`.
pub fn spawn_detached(
    tracker: &mut SessionTracker,
    manifest: &BatchManifest,
) -> Result<u32, BatchError> {
    if let Err(e) = tracker.store().write_batch(tracker.handle(), manifest) {
        tracker.fail(format!("failed to persist batch: {e}"));
        return Err(e.into());
    }

    let spawned = std::env::current_exe().and_then(|exe| {
        runner_command(&exe, tracker.session().session_id.as_str(), tracker.store().root())
            .spawn()
    });
    match spawned {
        Ok(child) => {
            tracing::info!(
                session_id = %tracker.session().session_id,
                pid = child.id(),
                "detached runner started"
            );
            Ok(child.id())
        }
        Err(e) => {
            tracker.fail(format!("failed to start detached runner: {e}"));
            Err(BatchError::Detach(e))
        }
    }
}

/// Command line for the runner process. Stdio is discarded and, on unix,
/// the child gets its own process group so it outlives the terminal.
fn runner_command(exe: &Path, session_id: &str, sessions_dir: &Path) -> Command {
    let mut cmd = Command::new(exe);
    cmd.arg(RUN_SESSION_COMMAND)
        .arg(session_id)
        .arg("--sessions-dir")
        .arg(sessions_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd
}

/// Body of the runner process: load the manifest written by
/// [`spawn_detached`] and drive the batch to completion.
pub async fn run_session(store: SessionStore, session_id: &str) -> Result<Session, BatchError> {
    let mut tracker = SessionTracker::resume(store, session_id)?;
    if tracker.session().is_terminal() {
        return Err(BatchError::SessionClosed(session_id.to_string()));
    }

    let manifest: BatchManifest = match tracker.store().read_batch(session_id) {
        Ok(manifest) => manifest,
        Err(e) => {
            tracker.fail(format!("failed to load batch: {e}"));
            return Err(e.into());
        }
    };

    let worker = ClaudeCliWorker::new(&manifest.worker).with_extra_args(manifest.worker_args);
    let options = BatchOptions {
        capture_output: true,
        ..manifest.options
    };
    let mut runner = BatchRunner::new(Arc::new(worker), options);
    if let Some(isolation) = manifest.isolation {
        runner = runner.with_isolation(Isolation {
            provisioner: Arc::new(GitWorktrees::new(isolation.repo_root)),
            base_branch: isolation.base_branch,
            worktree_dir: isolation.worktree_dir,
        });
    }

    runner.run(&manifest.jobs, &mut tracker).await?;
    Ok(tracker.into_session())
}
