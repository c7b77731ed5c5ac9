// crates/cli/src/run.rs
//! `run` and the hidden `run-session` command.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use claude_batch_core::paths::default_worktree_dir;
use claude_batch_core::{
    generate_session_id, load_jobs_from_path, load_jobs_from_reader, resolve_worker_binary,
    ClaudeCliWorker, GitWorktrees, SessionStore, WorkspaceProvisioner,
};
use claude_batch_jobs::{
    effective_concurrency, spawn_detached, BatchManifest, BatchOptions, BatchProgress,
    BatchRunner, Isolation, IsolationOptions, ProgressEvent, SessionTracker,
};
use claude_batch_types::{Job, Session};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast;

use crate::args::RunArgs;
use crate::format;
use crate::Outcome;

pub async fn run(args: RunArgs, store: SessionStore) -> Result<Outcome> {
    let jobs = read_jobs(&args)?;
    let worker = resolve_worker_binary(&args.worker)?;
    let isolation = if args.isolate {
        Some(resolve_isolation(&args).await?)
    } else {
        None
    };
    tracing::debug!(jobs = jobs.len(), worker = %worker.display(), "batch prepared");

    let mut session = Session::new(generate_session_id(Utc::now()), &jobs, Utc::now());
    session.max_concurrency = Some(effective_concurrency(args.max_concurrency(), jobs.len()));
    session.isolated = isolation.is_some();
    let mut tracker = SessionTracker::create(store, session)
        .context("failed to create session")?;

    let manifest = BatchManifest {
        jobs,
        worker,
        worker_args: args.worker_args.clone(),
        options: BatchOptions {
            max_concurrency: args.max_concurrency(),
            capture_output: args.capture_output,
        },
        isolation,
    };

    if args.wait {
        run_blocking(manifest, tracker).await
    } else {
        spawn_detached(&mut tracker, &manifest)?;
        print!(
            "{}",
            format::render_detached(&tracker.session().session_id, manifest.jobs.len())
        );
        Ok(Outcome::Success)
    }
}

fn read_jobs(args: &RunArgs) -> Result<Vec<Job>> {
    let jobs = match args.input.as_deref() {
        Some(path) if !args.reads_stdin() => load_jobs_from_path(path)?,
        _ => {
            let stdin = std::io::stdin();
            if stdin.is_terminal() {
                anyhow::bail!("no input: pass a prompts file or pipe JSON on stdin");
            }
            load_jobs_from_reader(stdin.lock())?
        }
    };
    Ok(jobs)
}

/// Work out repo, base branch and worktree directory for `--isolate`.
async fn resolve_isolation(args: &RunArgs) -> Result<IsolationOptions> {
    let cwd = std::env::current_dir().context("cannot determine current directory")?;
    let repo = GitWorktrees::discover(&cwd).await?;
    let base_branch = match &args.base_branch {
        Some(branch) => branch.clone(),
        None => repo.current_branch().await?,
    };
    let worktree_dir = args
        .worktree_dir
        .clone()
        .unwrap_or_else(|| default_worktree_dir(repo.repo_root()));
    Ok(IsolationOptions {
        repo_root: repo.repo_root().to_path_buf(),
        base_branch,
        worktree_dir,
    })
}

/// Run the batch in this process, showing a spinner until it finishes.
async fn run_blocking(manifest: BatchManifest, mut tracker: SessionTracker) -> Result<Outcome> {
    let BatchManifest {
        jobs,
        worker,
        worker_args,
        options,
        isolation,
    } = manifest;

    let mut runner = BatchRunner::new(
        Arc::new(ClaudeCliWorker::new(worker).with_extra_args(worker_args)),
        options,
    );
    if let Some(isolation) = isolation {
        runner = runner.with_isolation(Isolation {
            provisioner: Arc::new(GitWorktrees::new(isolation.repo_root)),
            base_branch: isolation.base_branch,
            worktree_dir: isolation.worktree_dir,
        });
    }

    eprintln!(
        "Running {} ({} jobs)",
        tracker.session().session_id,
        jobs.len()
    );
    let spinner = progress_spinner(tracker.session().total);
    let progress = tokio::spawn(follow_progress(tracker.subscribe(), spinner.clone()));

    let result = runner.run(&jobs, &mut tracker).await;
    // Dropping the tracker closes the channel once the backlog is drained.
    let session = tracker.into_session();
    let _ = progress.await;
    spinner.finish_and_clear();

    print!("{}", format::render_summary(&session));
    result?;
    Ok(if session.has_failures() {
        Outcome::JobsFailed
    } else {
        Outcome::Success
    })
}

fn progress_spinner(total: usize) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner} {msg} [{elapsed}]") {
        pb.set_style(style);
    }
    pb.set_message(format!("0/{total} jobs done"));
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

async fn follow_progress(mut rx: broadcast::Receiver<BatchProgress>, pb: ProgressBar) {
    loop {
        match rx.recv().await {
            Ok(update) => {
                if let ProgressEvent::Finished { success, exit_code } = update.event {
                    let mark = if success { "\u{2713}" } else { "\u{2717}" };
                    pb.println(format!(
                        "  {mark} #{} {} (exit {exit_code})",
                        update.task_num, update.job_id
                    ));
                }
                pb.set_message(format!(
                    "{}/{} jobs done, {} successful",
                    update.completed, update.total, update.successful
                ));
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Body of the detached runner process.
pub async fn run_session(store: SessionStore, session_id: &str) -> Result<Outcome> {
    let handle = store.handle(session_id)?;
    let _guard = claude_batch_observability::init_session_log(&handle.runner_log_path())?;
    tracing::info!(session_id, pid = std::process::id(), "runner process started");

    match claude_batch_jobs::run_session(store, session_id).await {
        Ok(session) => Ok(if session.has_failures() {
            Outcome::JobsFailed
        } else {
            Outcome::Success
        }),
        Err(e) => {
            tracing::error!(session_id, error = %e, "runner process failed");
            Err(e.into())
        }
    }
}
