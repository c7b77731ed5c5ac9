// crates/core/src/worker/claude_cli.rs
//! Claude CLI worker: spawns `claude -p "<instruction>"` per job.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::process::Command as TokioCommand;

use super::provider::{LaunchedWorker, Worker, WorkerLaunch};
use crate::error::LaunchError;

/// Flag telling the CLI not to stop for interactive permission prompts.
pub const SKIP_PERMISSIONS_FLAG: &str = "--skip-permission-prompts";

/// Env vars that make a nested CLI believe it runs inside another session.
const NESTED_SESSION_VARS: [&str; 3] = ["CLAUDECODE", "CLAUDE_CODE_SSE_PORT", "CLAUDE_CODE_ENTRYPOINT"];

/// Worker that runs the Claude CLI binary headless.
#[derive(Debug, Clone)]
pub struct ClaudeCliWorker {
    binary: PathBuf,
    extra_args: Vec<String>,
}

impl ClaudeCliWorker {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            extra_args: Vec::new(),
        }
    }

    /// Arguments appended after the standard ones (e.g. `--model sonnet`).
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Build the command without spawning it.
    fn command(&self, launch: &WorkerLaunch) -> std::io::Result<TokioCommand> {
        let mut cmd = TokioCommand::new(&self.binary);
        cmd.arg("-p")
            .arg(&launch.instruction)
            .arg(SKIP_PERMISSIONS_FLAG)
            .args(&self.extra_args)
            // Null stdin so the child never blocks waiting for input
            .stdin(Stdio::null());

        if let Some(cwd) = &launch.cwd {
            cmd.current_dir(cwd);
        }

        if let Some(path) = &launch.output {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            cmd.stdout(Stdio::from(file.try_clone()?))
                .stderr(Stdio::from(file));
        }

        for var in nested_session_vars() {
            cmd.env_remove(var);
        }
        Ok(cmd)
    }
}

impl Worker for ClaudeCliWorker {
    fn launch(&self, launch: &WorkerLaunch) -> Result<LaunchedWorker, LaunchError> {
        let launch_error = |source| LaunchError {
            job_id: launch.job_id.clone(),
            source,
        };

        let mut child = self
            .command(launch)
            .and_then(|mut cmd| cmd.spawn())
            .map_err(|e| {
                tracing::error!(job_id = %launch.job_id, error = %e, "worker: failed to spawn");
                launch_error(e)
            })?;

        let pid = child.id();
        tracing::debug!(job_id = %launch.job_id, pid = ?pid, "worker: spawned");

        Ok(LaunchedWorker {
            pid,
            exit: Box::pin(async move {
                let status = child.wait().await?;
                Ok(exit_code(status))
            }),
        })
    }

    fn name(&self) -> &str {
        "claude-cli"
    }
}

/// Exit code of a finished process; `-1` when killed by a signal.
pub fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// The known nested-session vars plus any other `CLAUDE_CODE_*` var present now.
fn nested_session_vars() -> Vec<String> {
    let extra = std::env::vars()
        .map(|(k, _)| k)
        .filter(|k| k.starts_with("CLAUDE_CODE_") && !NESTED_SESSION_VARS.contains(&k.as_str()));
    NESTED_SESSION_VARS
        .iter()
        .map(|s| s.to_string())
        .chain(extra)
        .collect()
}
