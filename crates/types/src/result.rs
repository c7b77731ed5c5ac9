// crates/types/src/result.rs
use serde::{Deserialize, Serialize};

/// Outcome of one reaped worker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub job_id: String,
    /// Process exit code; `-1` when the process was terminated by a signal
    /// or could not be waited on.
    pub exit_code: i32,
    pub success: bool,
    /// Whole seconds from admission to reap.
    pub duration_secs: u64,
    /// Branch the job worked on, `None` when it ran without isolation.
    pub branch_name: Option<String>,
}

impl ExecutionResult {
    pub fn new(
        job_id: impl Into<String>,
        exit_code: i32,
        duration_secs: u64,
        branch_name: Option<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            exit_code,
            success: exit_code == 0,
            duration_secs,
            branch_name,
        }
    }
}
