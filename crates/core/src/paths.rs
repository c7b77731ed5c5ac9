//! Centralized path functions for all app storage locations.
//!
//! Single source of truth for where sessions live. `CLAUDE_BATCH_HOME`
//! overrides the platform cache directory.

use std::path::{Path, PathBuf};

/// Environment variable overriding the state root.
pub const HOME_ENV: &str = "CLAUDE_BATCH_HOME";

/// App state root: `$CLAUDE_BATCH_HOME`, else `~/.cache/claude-batch/` (Linux)
/// or `~/Library/Caches/claude-batch/` (macOS).
pub fn app_state_dir() -> Option<PathBuf> {
    std::env::var_os(HOME_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| dirs::cache_dir().map(|d| d.join("claude-batch")))
}

/// Session snapshots directory: `<app_state_dir>/sessions/`.
pub fn sessions_dir() -> Option<PathBuf> {
    app_state_dir().map(|d| d.join("sessions"))
}

/// Default directory for per-job git worktrees: a sibling of the repository,
/// `<repo_parent>/<repo_name>-worktrees/`.
pub fn default_worktree_dir(repo_root: &Path) -> PathBuf {
    let name = repo_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "repo".to_string());
    let parent = repo_root.parent().unwrap_or(repo_root);
    parent.join(format!("{name}-worktrees"))
}
