// crates/core/src/worker/detect.rs
//! Worker executable detection.
//!
//! Checked once before a session is created, so a missing CLI fails the
//! invocation up front instead of failing every job.

use std::path::{Path, PathBuf};

use crate::error::WorkerNotAvailable;

/// Default worker binary name.
pub const DEFAULT_WORKER: &str = "claude";

/// Environment variable overriding the worker binary.
pub const WORKER_ENV: &str = "CLAUDE_BATCH_WORKER";

/// Resolve a worker executable.
///
/// Names containing a path separator must point at an executable file.
/// Bare names are searched on `PATH`, then in the usual per-user install
/// locations.
pub fn resolve_worker_binary(name: &str) -> Result<PathBuf, WorkerNotAvailable> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return if !candidate.is_file() {
            Err(WorkerNotAvailable::NotFound(name.to_string()))
        } else if !is_executable(candidate) {
            Err(WorkerNotAvailable::NotExecutable {
                path: candidate.to_path_buf(),
            })
        } else {
            Ok(candidate.to_path_buf())
        };
    }

    search_path(name)
        .or_else(|| scan_known_paths(name))
        .ok_or_else(|| WorkerNotAvailable::NotFound(name.to_string()))
}

fn search_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|p| p.is_file() && is_executable(p))
}

/// Known installation locations that are often missing from a non-login PATH.
fn scan_known_paths(name: &str) -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    [
        home.join(".local/bin").join(name),
        home.join(".claude/local").join(name),
        PathBuf::from("/opt/homebrew/bin").join(name),
        PathBuf::from("/usr/local/bin").join(name),
    ]
    .into_iter()
    .find(|p| p.is_file() && is_executable(p))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
