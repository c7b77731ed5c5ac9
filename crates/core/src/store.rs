// crates/core/src/store.rs
//! File-backed session state store.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<session_id>/status.json        snapshot, replaced atomically
//! <root>/<session_id>/batch.json         jobs + options for a detached runner
//! <root>/<session_id>/output/<job>.log   captured worker stdout/stderr
//! <root>/<session_id>/runner.log         detached runner's own log
//! ```
//!
//! The snapshot is the only channel between the process running a batch and
//! any process querying it. Every write goes to a temp file that is synced
//! and renamed over the target, so readers see either the old or the new
//! document, never a torn one.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use claude_batch_types::Session;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;
use crate::input::is_valid_id;

const STATUS_FILE: &str = "status.json";
const BATCH_FILE: &str = "batch.json";
const OUTPUT_DIR: &str = "output";
const RUNNER_LOG: &str = "runner.log";

/// Generate a fresh session id: `batch-YYYYMMDD-HHMMSS-xxxxxxxx`.
pub fn generate_session_id(now: DateTime<Utc>) -> String {
    let mut suffix = uuid::Uuid::new_v4().simple().to_string();
    suffix.truncate(8);
    format!("batch-{}-{}", now.format("%Y%m%d-%H%M%S"), suffix)
}

/// Handle to one session's namespace in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    session_id: String,
    dir: PathBuf,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn status_path(&self) -> PathBuf {
        self.dir.join(STATUS_FILE)
    }

    pub fn batch_path(&self) -> PathBuf {
        self.dir.join(BATCH_FILE)
    }

    pub fn runner_log_path(&self) -> PathBuf {
        self.dir.join(RUNNER_LOG)
    }

    /// Output blob for one job.
    pub fn output_path(&self, job_id: &str) -> PathBuf {
        self.dir.join(OUTPUT_DIR).join(format!("{job_id}.log"))
    }
}

/// Sessions stored as directories under a root.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store at the default location (see [`crate::paths::sessions_dir`]).
    pub fn open_default() -> Result<Self, StoreError> {
        crate::paths::sessions_dir()
            .map(Self::new)
            .ok_or(StoreError::NoStateDir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Handle for an existing or future session, without touching disk.
    pub fn handle(&self, session_id: &str) -> Result<SessionHandle, StoreError> {
        if !is_valid_id(session_id) {
            return Err(StoreError::SessionNotFound(session_id.to_string()));
        }
        Ok(SessionHandle {
            session_id: session_id.to_string(),
            dir: self.root.join(session_id),
        })
    }

    /// Allocate the namespace for `session_id`. Idempotent.
    pub fn create(&self, session_id: &str) -> Result<SessionHandle, StoreError> {
        let handle = self.handle(session_id)?;
        let output_dir = handle.dir.join(OUTPUT_DIR);
        fs::create_dir_all(&output_dir).map_err(|e| StoreError::io(&output_dir, e))?;
        Ok(handle)
    }

    /// Replace the session snapshot.
    pub fn write(&self, handle: &SessionHandle, session: &Session) -> Result<(), StoreError> {
        write_json_atomic(&handle.status_path(), session)
    }

    /// Read the current snapshot of a session.
    pub fn read(&self, session_id: &str) -> Result<Session, StoreError> {
        let handle = self.handle(session_id)?;
        let path = handle.status_path();
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::SessionNotFound(session_id.to_string()))
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        let session: Session =
            serde_json::from_slice(&raw).map_err(|e| StoreError::SessionCorrupt {
                session_id: session_id.to_string(),
                message: e.to_string(),
            })?;
        session
            .check_counters()
            .map_err(|message| StoreError::SessionCorrupt {
                session_id: session_id.to_string(),
                message,
            })?;
        Ok(session)
    }

    /// Persist the batch handed to a detached runner.
    pub fn write_batch<T: Serialize>(&self, handle: &SessionHandle, batch: &T) -> Result<(), StoreError> {
        write_json_atomic(&handle.batch_path(), batch)
    }

    /// Load the batch written by [`SessionStore::write_batch`].
    pub fn read_batch<T: DeserializeOwned>(&self, session_id: &str) -> Result<T, StoreError> {
        let handle = self.handle(session_id)?;
        let path = handle.batch_path();
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::SessionNotFound(session_id.to_string()))
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        serde_json::from_slice(&raw).map_err(|e| StoreError::SessionCorrupt {
            session_id: session_id.to_string(),
            message: e.to_string(),
        })
    }

    /// All session ids present under the root, sorted by name.
    pub fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.root, e)),
        };
        let mut ids: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| is_valid_id(name))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Captured output of one job, `None` if it has produced none yet.
    pub fn read_output(&self, session_id: &str, job_id: &str) -> Result<Option<String>, StoreError> {
        let path = self.handle(session_id)?.output_path(job_id);
        match fs::read(&path) {
            Ok(raw) => Ok(Some(String::from_utf8_lossy(&raw).into_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }
}

/// Serialize `value` to `path` via temp file + fsync + rename.
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let content = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");

    let mut file = File::create(&tmp_path).map_err(|e| StoreError::io(&tmp_path, e))?;
    file.write_all(&content)
        .and_then(|()| file.sync_all())
        .map_err(|e| StoreError::io(&tmp_path, e))?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|e| StoreError::io(path, e))
}
