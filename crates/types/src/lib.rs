//! Shared data model for claude-batch.
//!
//! Everything here is plain data: jobs as normalized from the input document,
//! the persisted session snapshot, and the per-job execution result. The
//! on-disk snapshot format is defined by the serde attributes in `session`.

pub mod job;
pub mod result;
pub mod session;

pub use job::Job;
pub use result::ExecutionResult;
pub use session::{prompt_preview, Session, SessionStatus, TaskRecord, TaskStatus, PREVIEW_CHARS};
