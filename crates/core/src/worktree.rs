// crates/core/src/worktree.rs
//! Per-job git worktrees.
//!
//! Each isolated job gets its own branch `{base}-task-{job_id}` checked out
//! in a fresh worktree directory. The directory is removed once the job
//! exits; the branch is kept so successful work can be merged afterwards.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::WorkspaceError;

/// Timeout for `git worktree add/remove`.
const GIT_MUTATE_TIMEOUT_SECS: u64 = 30;
/// Timeout for read-only git queries.
const GIT_QUERY_TIMEOUT_SECS: u64 = 5;

/// An isolated checkout for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub base_branch: String,
    pub branch_name: String,
    pub path: PathBuf,
}

/// Branch name for a job: deterministic in `(base_branch, job_id)`.
pub fn branch_name(base_branch: &str, job_id: &str) -> String {
    format!("{base_branch}-task-{job_id}")
}

/// Note appended to a job's instruction when it runs in a worktree.
pub fn isolation_note(workspace: &Workspace) -> String {
    format!(
        "\n\n---\nYou are working in an isolated git worktree at {} on branch `{}` \
         (created from `{}`). Keep all changes inside this directory and commit them \
         to this branch before finishing.",
        workspace.path.display(),
        workspace.branch_name,
        workspace.base_branch,
    )
}

/// Creates and tears down per-job workspaces.
#[async_trait]
pub trait WorkspaceProvisioner: Send + Sync {
    /// Branch currently checked out. Fails with `NotAWorkspace` outside a
    /// work tree or on a detached HEAD.
    async fn current_branch(&self) -> Result<String, WorkspaceError>;

    /// Create `{base}-task-{job_id}` from `base_branch` and check it out
    /// under `base_dir`.
    async fn create(
        &self,
        base_branch: &str,
        job_id: &str,
        base_dir: &Path,
    ) -> Result<Workspace, WorkspaceError>;

    /// Remove the workspace directory. Never deletes the branch. Failures
    /// are logged, not returned.
    async fn destroy(&self, workspace: &Workspace);
}

/// `WorkspaceProvisioner` backed by `git worktree`.
#[derive(Debug, Clone)]
pub struct GitWorktrees {
    repo_root: PathBuf,
}

impl GitWorktrees {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    /// Locate the work tree containing `dir`.
    pub async fn discover(dir: &Path) -> Result<Self, WorkspaceError> {
        let toplevel = run_git(
            dir,
            &["rev-parse", "--show-toplevel"],
            GIT_QUERY_TIMEOUT_SECS,
        )
        .await
        .map_err(|e| match e {
            WorkspaceError::Command { stderr, .. } => WorkspaceError::NotAWorkspace(stderr),
            other => other,
        })?;
        Ok(Self::new(toplevel))
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    async fn git(&self, args: &[&str], timeout_secs: u64) -> Result<String, WorkspaceError> {
        run_git(&self.repo_root, args, timeout_secs).await
    }
}

#[async_trait]
impl WorkspaceProvisioner for GitWorktrees {
    async fn current_branch(&self) -> Result<String, WorkspaceError> {
        let branch = self
            .git(&["rev-parse", "--abbrev-ref", "HEAD"], GIT_QUERY_TIMEOUT_SECS)
            .await
            .map_err(|e| match e {
                WorkspaceError::Command { stderr, .. } => WorkspaceError::NotAWorkspace(stderr),
                other => other,
            })?;
        if branch.is_empty() || branch == "HEAD" {
            return Err(WorkspaceError::NotAWorkspace(
                "HEAD is detached; check out a branch first".to_string(),
            ));
        }
        Ok(branch)
    }

    async fn create(
        &self,
        base_branch: &str,
        job_id: &str,
        base_dir: &Path,
    ) -> Result<Workspace, WorkspaceError> {
        let branch = branch_name(base_branch, job_id);
        let path = base_dir.join(branch.replace('/', "-"));

        tokio::fs::create_dir_all(base_dir)
            .await
            .map_err(|source| WorkspaceError::CreateDir {
                path: base_dir.to_path_buf(),
                source,
            })?;

        let path_arg = path.to_string_lossy().into_owned();
        self.git(
            &["worktree", "add", "-b", &branch, &path_arg, base_branch],
            GIT_MUTATE_TIMEOUT_SECS,
        )
        .await?;

        tracing::info!(branch = %branch, path = %path.display(), "worktree created");
        Ok(Workspace {
            base_branch: base_branch.to_string(),
            branch_name: branch,
            path,
        })
    }

    async fn destroy(&self, workspace: &Workspace) {
        let path_arg = workspace.path.to_string_lossy().into_owned();
        match self
            .git(
                &["worktree", "remove", "--force", &path_arg],
                GIT_MUTATE_TIMEOUT_SECS,
            )
            .await
        {
            Ok(_) => {
                tracing::debug!(path = %workspace.path.display(), "worktree removed");
                return;
            }
            Err(e) => {
                tracing::warn!(
                    path = %workspace.path.display(),
                    error = %e,
                    "git worktree remove failed, removing directory directly"
                );
            }
        }

        if workspace.path.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(&workspace.path).await {
                tracing::warn!(path = %workspace.path.display(), error = %e, "failed to remove worktree directory");
            }
        }
        if let Err(e) = self.git(&["worktree", "prune"], GIT_QUERY_TIMEOUT_SECS).await {
            tracing::warn!(error = %e, "git worktree prune failed");
        }
    }
}

/// Run `git <args>` in `dir`, returning trimmed stdout.
async fn run_git(dir: &Path, args: &[&str], timeout_secs: u64) -> Result<String, WorkspaceError> {
    let command = args.iter().take(2).copied().collect::<Vec<_>>().join(" ");
    let output = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        Command::new("git")
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| WorkspaceError::Timeout {
        command: command.clone(),
        secs: timeout_secs,
    })?
    .map_err(WorkspaceError::Spawn)?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(WorkspaceError::Command {
            command,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(["-c", "user.name=test", "-c", "user.email=test@example.com"])
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap()
            .status;
        assert!(status.success(), "git {args:?} failed");
    }

    /// A repository with one commit on `main`.
    fn init_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "-q"]);
        git(dir.path(), &["checkout", "-q", "-b", "main"]);
        std::fs::write(dir.path().join("README.md"), "hello\n").unwrap();
        git(dir.path(), &["add", "README.md"]);
        git(dir.path(), &["commit", "-q", "-m", "init"]);
        dir
    }

    fn branch_exists(dir: &Path, branch: &str) -> bool {
        std::process::Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", branch])
            .current_dir(dir)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_branch_name_deterministic() {
        assert_eq!(branch_name("main", "abc123"), "main-task-abc123");
        assert_eq!(branch_name("main", "abc123"), branch_name("main", "abc123"));
        assert_ne!(branch_name("main", "a"), branch_name("main", "b"));
    }

    #[test]
    fn test_isolation_note_mentions_branch_and_path() {
        let ws = Workspace {
            base_branch: "main".into(),
            branch_name: "main-task-x".into(),
            path: PathBuf::from("/tmp/wt/main-task-x"),
        };
        let note = isolation_note(&ws);
        assert!(note.contains("main-task-x"));
        assert!(note.contains("/tmp/wt/main-task-x"));
    }

    #[tokio::test]
    async fn test_create_and_destroy_keeps_branch() {
        if !git_available() {
            return;
        }
        let repo = init_repo();
        let wt_dir = TempDir::new().unwrap();
        let git_wt = GitWorktrees::discover(repo.path()).await.unwrap();

        let base = git_wt.current_branch().await.unwrap();
        assert_eq!(base, "main");

        let ws = git_wt.create(&base, "job1", wt_dir.path()).await.unwrap();
        assert_eq!(ws.branch_name, "main-task-job1");
        assert!(ws.path.join("README.md").exists());

        git_wt.destroy(&ws).await;
        assert!(!ws.path.exists());
        assert!(branch_exists(repo.path(), "main-task-job1"));
    }

    #[tokio::test]
    async fn test_create_fails_for_missing_base() {
        if !git_available() {
            return;
        }
        let repo = init_repo();
        let wt_dir = TempDir::new().unwrap();
        let git_wt = GitWorktrees::new(repo.path());

        let err = git_wt
            .create("no-such-branch", "job1", wt_dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::Command { .. }));
    }

    #[tokio::test]
    async fn test_create_fails_on_path_collision() {
        if !git_available() {
            return;
        }
        let repo = init_repo();
        let wt_dir = TempDir::new().unwrap();
        let git_wt = GitWorktrees::new(repo.path());

        let first = git_wt.create("main", "dup", wt_dir.path()).await.unwrap();
        let err = git_wt.create("main", "dup", wt_dir.path()).await.unwrap_err();
        assert!(matches!(err, WorkspaceError::Command { .. }));
        git_wt.destroy(&first).await;
    }

    #[tokio::test]
    async fn test_create_reports_unusable_worktree_dir() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();
        let base_dir = blocker.join("worktrees");
        let git_wt = GitWorktrees::new(dir.path());

        let err = git_wt.create("main", "job1", &base_dir).await.unwrap_err();
        match &err {
            WorkspaceError::CreateDir { path, .. } => assert_eq!(path, &base_dir),
            other => panic!("expected CreateDir, got {other:?}"),
        }
        let message = err.to_string();
        assert!(message.starts_with("Cannot create worktree directory"));
        assert!(message.contains("not-a-dir"));
        assert!(!message.contains("Failed to run git"));
    }

    #[tokio::test]
    async fn test_detached_head_is_not_a_workspace() {
        if !git_available() {
            return;
        }
        let repo = init_repo();
        git(repo.path(), &["checkout", "-q", "--detach"]);
        let git_wt = GitWorktrees::new(repo.path());

        let err = git_wt.current_branch().await.unwrap_err();
        assert!(matches!(err, WorkspaceError::NotAWorkspace(_)));
    }

    #[tokio::test]
    async fn test_discover_outside_repo() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        // A temp dir may itself live inside a repo on some machines.
        if let Err(err) = GitWorktrees::discover(dir.path()).await {
            assert!(matches!(err, WorkspaceError::NotAWorkspace(_)));
        }
    }
}
