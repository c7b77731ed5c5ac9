// crates/types/src/session.rs
//! Persisted batch session snapshot.
//!
//! The snapshot is the only channel between the process running a batch and
//! any later process querying it, so the field names here are the on-disk
//! format. Mutators enforce the counter and status invariants:
//! `completed <= total`, `successful <= completed`, and the overall status
//! only ever leaves `running` once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::Job;
use crate::result::ExecutionResult;

/// Maximum number of characters kept in `TaskRecord::prompt_preview`.
pub const PREVIEW_CHARS: usize = 60;

/// Overall state of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::Running => "\u{25d0}",
            Self::Completed => "\u{2713}",
            Self::Error => "\u{2717}",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Per-job lifecycle inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
}

impl TaskStatus {
    /// Human label for a `(status, success)` pair.
    pub fn label(self, success: bool) -> &'static str {
        match (self, success) {
            (Self::Pending, _) => "pending",
            (Self::Running, _) => "running",
            (Self::Completed, true) => "success",
            (Self::Completed, false) => "failed",
        }
    }

    /// Icon for a `(status, success)` pair.
    pub fn icon(self, success: bool) -> &'static str {
        match (self, success) {
            (Self::Pending, _) => "\u{25cb}",
            (Self::Running, _) => "\u{25d0}",
            (Self::Completed, true) => "\u{2713}",
            (Self::Completed, false) => "\u{2717}",
        }
    }
}

/// Status snapshot of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_num: usize,
    pub transaction_id: String,
    pub prompt_preview: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub success: bool,
    /// Whole seconds, present once the job completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
}

impl TaskRecord {
    pub fn pending(job: &Job) -> Self {
        Self {
            task_num: job.sequence_number,
            transaction_id: job.id.clone(),
            prompt_preview: prompt_preview(&job.text),
            status: TaskStatus::Pending,
            success: false,
            duration: None,
            exit_code: None,
            branch_name: None,
        }
    }

    pub fn label(&self) -> &'static str {
        self.status.label(self.success)
    }

    pub fn icon(&self) -> &'static str {
        self.status.icon(self.success)
    }
}

/// Durable record of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub overall_status: SessionStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub total: usize,
    pub completed: usize,
    pub successful: usize,
    pub tasks: Vec<TaskRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub isolated: bool,
    /// Reason the batch ended in `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Session {
    /// A fresh `running` session with every job pending.
    pub fn new(session_id: impl Into<String>, jobs: &[Job], start_time: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            overall_status: SessionStatus::Running,
            start_time,
            end_time: None,
            total: jobs.len(),
            completed: 0,
            successful: 0,
            tasks: jobs.iter().map(TaskRecord::pending).collect(),
            max_concurrency: None,
            isolated: false,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.overall_status.is_terminal()
    }

    pub fn failed(&self) -> usize {
        self.completed.saturating_sub(self.successful)
    }

    /// Check the counters against each other and the task list. Snapshots
    /// read from disk may violate what the methods here guarantee.
    pub fn check_counters(&self) -> Result<(), String> {
        if self.total != self.tasks.len() {
            return Err(format!(
                "total is {} but there are {} tasks",
                self.total,
                self.tasks.len()
            ));
        }
        if self.completed > self.total {
            return Err(format!(
                "completed ({}) exceeds total ({})",
                self.completed, self.total
            ));
        }
        if self.successful > self.completed {
            return Err(format!(
                "successful ({}) exceeds completed ({})",
                self.successful, self.completed
            ));
        }
        Ok(())
    }

    /// True when the batch ended in `error` or any completed job failed.
    pub fn has_failures(&self) -> bool {
        self.overall_status == SessionStatus::Error || self.successful < self.completed
    }

    pub fn task(&self, job_id: &str) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.transaction_id == job_id)
    }

    fn task_mut(&mut self, job_id: &str) -> Option<&mut TaskRecord> {
        self.tasks.iter_mut().find(|t| t.transaction_id == job_id)
    }

    /// Move a pending job to `running`. Returns false if the job is unknown
    /// or not pending.
    pub fn mark_running(&mut self, job_id: &str) -> bool {
        match self.task_mut(job_id) {
            Some(task) if task.status == TaskStatus::Pending => {
                task.status = TaskStatus::Running;
                true
            }
            _ => false,
        }
    }

    /// Fold a reaped job into the snapshot. A job is counted at most once;
    /// returns false for unknown or already completed jobs.
    pub fn record_result(&mut self, result: &ExecutionResult) -> bool {
        let Some(task) = self.task_mut(&result.job_id) else {
            return false;
        };
        if task.status == TaskStatus::Completed {
            return false;
        }
        task.status = TaskStatus::Completed;
        task.success = result.success;
        task.duration = Some(result.duration_secs);
        task.exit_code = Some(result.exit_code);
        task.branch_name = result.branch_name.clone();

        self.completed += 1;
        if result.success {
            self.successful += 1;
        }
        true
    }

    /// `running → completed`. No-op on a terminal session.
    pub fn complete(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.overall_status = SessionStatus::Completed;
        self.end_time = Some(at);
        true
    }

    /// `running → error`. No-op on a terminal session.
    pub fn fail(&mut self, at: DateTime<Utc>, reason: impl Into<String>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.overall_status = SessionStatus::Error;
        self.end_time = Some(at);
        self.error = Some(reason.into());
        true
    }

    /// Elapsed seconds between start and end, if the session has ended.
    pub fn duration_secs(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_seconds().max(0))
    }
}

/// Truncated single-line preview of a job's text.
pub fn prompt_preview(text: &str) -> String {
    let flat: String = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let mut preview: String = flat.chars().take(PREVIEW_CHARS).collect();
    preview.push_str("...");
    preview
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn jobs() -> Vec<Job> {
        vec![
            Job::new("a", "first prompt", 1),
            Job::new("b", "second prompt", 2),
        ]
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 5, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_new_session_all_pending() {
        let session = Session::new("batch-1", &jobs(), t0());
        assert_eq!(session.overall_status, SessionStatus::Running);
        assert_eq!(session.total, 2);
        assert_eq!(session.completed, 0);
        assert!(session.tasks.iter().all(|t| t.status == TaskStatus::Pending));
        assert_eq!(session.tasks[1].task_num, 2);
        assert_eq!(session.tasks[1].transaction_id, "b");
    }

    #[test]
    fn test_record_result_counts_once() {
        let mut session = Session::new("batch-1", &jobs(), t0());
        assert!(session.mark_running("a"));
        let result = ExecutionResult::new("a", 0, 4, None);
        assert!(session.record_result(&result));
        assert!(!session.record_result(&result));
        assert_eq!(session.completed, 1);
        assert_eq!(session.successful, 1);

        let task = session.task("a").unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.duration, Some(4));
        assert!(task.success);
    }

    #[test]
    fn test_record_failure_keeps_successful() {
        let mut session = Session::new("batch-1", &jobs(), t0());
        session.record_result(&ExecutionResult::new("b", 2, 1, None));
        assert_eq!(session.completed, 1);
        assert_eq!(session.successful, 0);
        assert_eq!(session.failed(), 1);
        assert!(session.has_failures());
    }

    #[test]
    fn test_unknown_job_ignored() {
        let mut session = Session::new("batch-1", &jobs(), t0());
        assert!(!session.mark_running("zzz"));
        assert!(!session.record_result(&ExecutionResult::new("zzz", 0, 1, None)));
        assert_eq!(session.completed, 0);
    }

    #[test]
    fn test_status_never_moves_backward() {
        let mut session = Session::new("batch-1", &jobs(), t0());
        assert!(session.complete(t0()));
        assert!(!session.fail(t0(), "late failure"));
        assert_eq!(session.overall_status, SessionStatus::Completed);
        assert!(session.error.is_none());

        let mut session = Session::new("batch-2", &jobs(), t0());
        assert!(session.fail(t0(), "spawn failed"));
        assert!(!session.complete(t0()));
        assert_eq!(session.overall_status, SessionStatus::Error);
        assert!(session.has_failures());
    }

    #[test]
    fn test_counter_check_on_foreign_snapshot() {
        let mut session = Session::new("batch-1", &jobs(), t0());
        assert_eq!(session.check_counters(), Ok(()));

        session.completed = 1;
        session.successful = 2;
        assert_eq!(session.failed(), 0);
        assert_eq!(
            session.check_counters(),
            Err("successful (2) exceeds completed (1)".to_string())
        );

        session.successful = 0;
        session.completed = 3;
        assert!(session.check_counters().unwrap_err().contains("exceeds total"));

        session.completed = 0;
        session.tasks.pop();
        assert_eq!(
            session.check_counters(),
            Err("total is 2 but there are 1 tasks".to_string())
        );
    }

    #[test]
    fn test_snapshot_wire_format() {
        let mut session = Session::new("batch-1", &jobs(), t0());
        session.record_result(&ExecutionResult::new("a", 0, 7, Some("main-task-a".into())));
        let json = serde_json::to_value(&session).unwrap();

        assert_eq!(json["overall_status"], "running");
        assert_eq!(json["tasks"][0]["task_num"], 1);
        assert_eq!(json["tasks"][0]["transaction_id"], "a");
        assert_eq!(json["tasks"][0]["status"], "completed");
        assert_eq!(json["tasks"][0]["success"], true);
        assert_eq!(json["tasks"][0]["duration"], 7);
        assert_eq!(json["tasks"][0]["branch_name"], "main-task-a");
        assert!(json["tasks"][1].get("duration").is_none());
        assert!(json.get("end_time").is_none());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut session = Session::new("batch-1", &jobs(), t0());
        session.max_concurrency = Some(2);
        session.isolated = true;
        session.mark_running("b");
        session.record_result(&ExecutionResult::new("a", 1, 3, None));
        session.fail(t0() + chrono::Duration::seconds(9), "launch failed");

        let json = serde_json::to_string_pretty(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
        assert_eq!(back.duration_secs(), Some(9));
    }

    #[test]
    fn test_minimal_snapshot_deserializes() {
        let json = r#"{
            "session_id": "batch-x",
            "overall_status": "completed",
            "start_time": "2026-02-05T12:00:00Z",
            "end_time": "2026-02-05T12:01:00Z",
            "total": 1,
            "completed": 1,
            "successful": 1,
            "tasks": [{"task_num": 1, "transaction_id": "t1", "prompt_preview": "hi", "status": "completed", "success": true, "duration": 60}]
        }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.tasks[0].duration, Some(60));
        assert!(!session.isolated);
        assert_eq!(session.max_concurrency, None);
    }

    #[test]
    fn test_presentation_is_pure() {
        assert_eq!(TaskStatus::Pending.label(true), "pending");
        assert_eq!(TaskStatus::Completed.label(true), "success");
        assert_eq!(TaskStatus::Completed.label(false), "failed");
        assert_eq!(TaskStatus::Completed.icon(false), "\u{2717}");
        assert_eq!(TaskStatus::Running.icon(false), TaskStatus::Running.icon(true));
    }

    #[test]
    fn test_prompt_preview() {
        assert_eq!(prompt_preview("fix  the\nbug"), "fix the bug");
        let long = "x".repeat(100);
        let preview = prompt_preview(&long);
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
        assert!(preview.ends_with("..."));
        // multi-byte characters are cut on a char boundary
        let wide = "\u{00e9}".repeat(80);
        assert!(prompt_preview(&wide).starts_with("\u{00e9}"));
    }
}
