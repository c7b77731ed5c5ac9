// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while normalizing the batch input document.
///
/// All of these are fatal before any job starts.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Cannot read batch input {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Batch input is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("Batch input must be an array of prompts or an object with a \"prompts\" array")]
    MissingPrompts,

    #[error("Batch input contains no prompts")]
    Empty,

    #[error("Prompt #{index}: {message}")]
    InvalidItem { index: usize, message: String },

    #[error("Prompt #{index}: invalid id {id:?} (use letters, digits, '.', '_' or '-')")]
    InvalidId { index: usize, id: String },

    #[error("Prompt #{index}: duplicate id {id:?}")]
    DuplicateId { index: usize, id: String },
}

/// The worker executable cannot be used at all.
#[derive(Debug, Error)]
pub enum WorkerNotAvailable {
    #[error("Worker executable not found: {0}")]
    NotFound(String),

    #[error("Worker executable is not executable: {path}")]
    NotExecutable { path: PathBuf },
}

/// Subprocess creation failed. Fatal to the whole batch.
#[derive(Debug, Error)]
#[error("Failed to launch worker for job {job_id}: {source}")]
pub struct LaunchError {
    pub job_id: String,
    #[source]
    pub source: std::io::Error,
}

/// Errors from the git worktree provisioner.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Not inside a git work tree on a named branch: {0}")]
    NotAWorkspace(String),

    #[error("git {command} failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("git {command} timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("Failed to run git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Cannot create worktree directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the session state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session {session_id} has an unreadable snapshot: {message}")]
    SessionCorrupt { session_id: String, message: String },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Could not determine a state directory (set CLAUDE_BATCH_HOME)")]
    NoStateDir,
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::DuplicateId {
            index: 3,
            id: "job-1".into(),
        };
        assert_eq!(err.to_string(), "Prompt #3: duplicate id \"job-1\"");
        assert_eq!(
            ValidationError::Empty.to_string(),
            "Batch input contains no prompts"
        );
    }

    #[test]
    fn test_launch_error_display() {
        let err = LaunchError {
            job_id: "a1".into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "EAGAIN"),
        };
        assert_eq!(err.to_string(), "Failed to launch worker for job a1: EAGAIN");
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::SessionNotFound("batch-x".into());
        assert_eq!(err.to_string(), "Session not found: batch-x");
    }
}
