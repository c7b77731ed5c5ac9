// crates/types/src/job.rs
use serde::{Deserialize, Serialize};

/// One unit of work: a single instruction handed to one worker invocation.
///
/// Built once by the input normalizer and never mutated afterwards. The
/// scheduler and the session refer to jobs by position or by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Stable identifier, unique within the batch.
    pub id: String,
    /// Instruction payload passed to the worker.
    pub text: String,
    /// 1-based position in the original input. Display only.
    pub sequence_number: usize,
}

impl Job {
    pub fn new(id: impl Into<String>, text: impl Into<String>, sequence_number: usize) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            sequence_number,
        }
    }
}
