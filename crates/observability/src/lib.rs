// crates/observability/src/lib.rs
//! Tracing setup for the claude-batch binary.
//!
//! Two sinks: the terminal (interactive commands) and a per-session
//! `runner.log` (the detached runner, whose stdio is discarded).

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

fn env_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbosity).into())
}

/// Log to stderr. `RUST_LOG` wins over `verbosity`.
pub fn init_terminal(verbosity: u8) -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(env_filter(verbosity))
        .try_init()
        .context("failed to install tracing subscriber")
}

/// Append log lines to `path` through a background writer.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes pending lines.
pub fn init_session_log(path: &Path) -> Result<WorkerGuard> {
    let (Some(dir), Some(file_name)) = (path.parent(), path.file_name()) else {
        anyhow::bail!("invalid log file path {}", path.display());
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(env_filter(1))
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        for v in 0..3 {
            assert!(EnvFilter::try_new(default_filter(v)).is_ok(), "verbosity {v}");
        }
    }

    #[test]
    fn test_session_log_written() {
        let dir = tempfile::TempDir::new().unwrap();
        let log_path = dir.path().join("batch-1").join("runner.log");
        let guard = init_session_log(&log_path).unwrap();
        tracing::info!(target: "claude_batch_jobs", job_id = "a", "job started");
        drop(guard);

        let log = std::fs::read_to_string(&log_path).unwrap();
        assert!(log.contains("job started"));
        assert!(log.contains("job_id=\"a\"") || log.contains("job_id=a"));
    }
}
