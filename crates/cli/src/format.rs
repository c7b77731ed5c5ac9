// crates/cli/src/format.rs
//! Terminal rendering.
//!
//! Every function here is a pure function of its input, so rendering the
//! same snapshot twice yields identical text.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use claude_batch_core::{JobOutput, Overview, SessionSummary};
use claude_batch_types::{Session, TaskStatus};

/// `12s`, `3m 05s`, `1h 02m 03s`.
pub fn format_duration(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

fn format_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Full status view of one session.
pub fn render_status(session: &Session) -> String {
    let mut out = String::new();
    let status = session.overall_status;
    let _ = writeln!(out, "{} {}  {}", status.icon(), session.session_id, status.as_str());
    let _ = writeln!(out, "  Started:  {}", format_time(session.start_time));
    if let Some(end) = session.end_time {
        let _ = writeln!(out, "  Finished: {}", format_time(end));
    }
    if let Some(secs) = session.duration_secs() {
        let _ = writeln!(out, "  Duration: {}", format_duration(secs as u64));
    }
    let _ = writeln!(
        out,
        "  Progress: {}/{} completed, {} successful, {} failed",
        session.completed,
        session.total,
        session.successful,
        session.failed()
    );
    if let Some(n) = session.max_concurrency {
        let _ = writeln!(out, "  Workers:  {n}");
    }
    if session.isolated {
        let _ = writeln!(out, "  Isolated: yes (one git worktree per job)");
    }
    if let Some(err) = &session.error {
        let _ = writeln!(out, "  Error:    {err}");
    }

    out.push('\n');
    for task in &session.tasks {
        let _ = write!(
            out,
            "  {} #{} {} [{}]",
            task.icon(),
            task.task_num,
            task.transaction_id,
            task.label()
        );
        let mut details = Vec::new();
        if let Some(d) = task.duration {
            details.push(format_duration(d));
        }
        if let Some(code) = task.exit_code.filter(|c| *c != 0) {
            details.push(format!("exit {code}"));
        }
        if let Some(branch) = &task.branch_name {
            details.push(format!("branch {branch}"));
        }
        if !details.is_empty() {
            let _ = write!(out, " ({})", details.join(", "));
        }
        out.push('\n');
        let _ = writeln!(out, "      {}", task.prompt_preview);
    }
    out
}

/// Captured output of each job, verbatim.
pub fn render_results(session_id: &str, results: &[JobOutput]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Results for {session_id}");
    for job in results {
        let _ = writeln!(
            out,
            "\n=== #{} {} {} {} ===",
            job.task_num,
            job.job_id,
            job.status.icon(job.success),
            job.status.label(job.success)
        );
        match &job.output {
            Some(text) => out.push_str(text),
            None => out.push_str("(no output yet)\n"),
        }
    }
    out
}

/// One line per session.
pub fn render_list(sessions: &[SessionSummary]) -> String {
    if sessions.is_empty() {
        return "No sessions found.\n".to_string();
    }
    let mut out = String::new();
    for s in sessions {
        let started = s
            .start_time
            .map(format_time)
            .unwrap_or_else(|| "-".to_string());
        let _ = write!(
            out,
            "{} {:<34} {:<9} {}/{} done, {} ok  {}",
            s.status.icon(),
            s.session_id,
            s.status.as_str(),
            s.completed,
            s.total,
            s.successful,
            started
        );
        if s.corrupt {
            out.push_str("  (unreadable)");
        }
        out.push('\n');
    }
    out
}

pub fn render_overview(overview: &Overview) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Sessions: {} ({} running, {} completed, {} error)",
        overview.sessions, overview.running, overview.completed, overview.errored
    );
    let _ = writeln!(
        out,
        "Jobs:     {} total, {} completed, {} successful",
        overview.total_jobs, overview.completed_jobs, overview.successful_jobs
    );
    let _ = writeln!(out, "Success:  {:.1}%", overview.success_rate * 100.0);
    out
}

/// Closing summary of a blocking run.
pub fn render_summary(session: &Session) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {}: {}/{} successful",
        session.overall_status.icon(),
        session.session_id,
        session.successful,
        session.total
    );
    for task in session.tasks.iter().filter(|t| t.status == TaskStatus::Completed && !t.success) {
        let _ = writeln!(
            out,
            "  {} #{} {} (exit {})",
            task.icon(),
            task.task_num,
            task.transaction_id,
            task.exit_code.unwrap_or(-1)
        );
    }
    if let Some(err) = &session.error {
        let _ = writeln!(out, "  Error: {err}");
    }
    out
}

/// What to tell the user after starting a detached batch.
pub fn render_detached(session_id: &str, jobs: usize) -> String {
    format!(
        "Started {session_id} ({jobs} jobs) in the background.\n\n  \
         claude-batch status {session_id}\n  \
         claude-batch results {session_id}\n"
    )
}
