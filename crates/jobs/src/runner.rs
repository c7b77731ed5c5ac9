// crates/jobs/src/runner.rs
//! Bounded parallel scheduler.
//!
//! One loop owns everything: the cursor over pending jobs, the in-flight
//! map, and the session tracker. It alternates between admitting jobs up to
//! the concurrency cap and waiting for whichever worker exits first. Nothing
//! is shared across threads, so no locking is needed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use claude_batch_core::error::LaunchError;
use claude_batch_core::worker::ExitFuture;
use claude_batch_core::worktree::isolation_note;
use claude_batch_core::{Worker, WorkerLaunch, Workspace, WorkspaceProvisioner};
use claude_batch_types::{ExecutionResult, Job};
use futures_util::stream::{FuturesUnordered, StreamExt};

use crate::state::SessionTracker;
use crate::types::{effective_concurrency, BatchError, BatchOptions, RunningJob};

/// Isolation settings bound to a provisioner.
pub struct Isolation {
    pub provisioner: Arc<dyn WorkspaceProvisioner>,
    pub base_branch: String,
    pub worktree_dir: std::path::PathBuf,
}

/// Runs a batch of jobs as worker processes, at most N at a time.
pub struct BatchRunner {
    worker: Arc<dyn Worker>,
    isolation: Option<Isolation>,
    options: BatchOptions,
}

impl BatchRunner {
    pub fn new(worker: Arc<dyn Worker>, options: BatchOptions) -> Self {
        Self {
            worker,
            isolation: None,
            options,
        }
    }

    /// Give every job its own worktree.
    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = Some(isolation);
        self
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Execute every job exactly once and return their results in input
    /// order.
    ///
    /// A launch failure stops admission, marks the session `error`, waits
    /// for the jobs already running, then returns `BatchError::Launch`.
    pub async fn run(
        &self,
        jobs: &[Job],
        tracker: &mut SessionTracker,
    ) -> Result<Vec<ExecutionResult>, BatchError> {
        if tracker.session().is_terminal() {
            return Err(BatchError::SessionClosed(
                tracker.session().session_id.clone(),
            ));
        }

        let limit = effective_concurrency(self.options.max_concurrency, jobs.len());
        tracing::info!(
            session_id = %tracker.session().session_id,
            jobs = jobs.len(),
            max_concurrency = limit,
            worker = self.worker.name(),
            isolated = self.isolation.is_some(),
            "batch starting"
        );

        let mut pending = jobs.iter().enumerate();
        let mut in_flight: HashMap<usize, RunningJob> = HashMap::with_capacity(limit);
        let mut exits = FuturesUnordered::new();
        let mut results: Vec<Option<ExecutionResult>> = vec![None; jobs.len()];
        let mut launch_failure: Option<LaunchError> = None;

        loop {
            // Admission: never blocks on worker completion, only on the cap.
            while launch_failure.is_none() && in_flight.len() < limit {
                let Some((index, job)) = pending.next() else {
                    break;
                };
                match self.admit(index, job, tracker).await {
                    Ok((running, exit)) => {
                        exits.push(wait_exit(index, exit));
                        in_flight.insert(index, running);
                    }
                    Err(e) => {
                        tracker.fail(e.to_string());
                        launch_failure = Some(e);
                    }
                }
            }

            // Reap whichever worker exits first.
            let Some((index, exit)) = exits.next().await else {
                break;
            };
            let Some(running) = in_flight.remove(&index) else {
                tracing::error!(index, "exit for a job that is not in flight");
                continue;
            };
            let result = self.reap(running, exit).await;
            tracker.record(&result);
            results[index] = Some(result);
        }

        if let Some(e) = launch_failure {
            return Err(BatchError::Launch(e));
        }

        tracker.complete();
        Ok(results.into_iter().flatten().collect())
    }

    /// Provision (optionally) and launch one job.
    async fn admit(
        &self,
        index: usize,
        job: &Job,
        tracker: &mut SessionTracker,
    ) -> Result<(RunningJob, ExitFuture), LaunchError> {
        // Duration covers worktree setup as well as the worker itself.
        let started = Instant::now();
        let workspace = self.provision(job).await;

        let mut instruction = job.text.clone();
        if let Some(ws) = &workspace {
            instruction.push_str(&isolation_note(ws));
        }
        let launch = WorkerLaunch {
            job_id: job.id.clone(),
            instruction,
            cwd: workspace.as_ref().map(|ws| ws.path.clone()),
            output: self
                .options
                .capture_output
                .then(|| tracker.handle().output_path(&job.id)),
        };

        let launched = match self.worker.launch(&launch) {
            Ok(launched) => launched,
            Err(e) => {
                if let Some(ws) = &workspace {
                    self.teardown(ws).await;
                }
                return Err(e);
            }
        };

        tracing::info!(
            job_id = %job.id,
            task_num = job.sequence_number,
            pid = ?launched.pid,
            branch = workspace.as_ref().map(|ws| ws.branch_name.as_str()),
            "job started"
        );
        tracker.mark_running(&job.id);

        let running = RunningJob {
            index,
            job_id: job.id.clone(),
            pid: launched.pid,
            started,
            workspace,
        };
        Ok((running, launched.exit))
    }

    /// Create a worktree for the job. Failure is non-fatal: the job runs
    /// without isolation.
    async fn provision(&self, job: &Job) -> Option<Workspace> {
        let isolation = self.isolation.as_ref()?;
        match isolation
            .provisioner
            .create(&isolation.base_branch, &job.id, &isolation.worktree_dir)
            .await
        {
            Ok(ws) => Some(ws),
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id,
                    error = %e,
                    "workspace setup failed, running without isolation"
                );
                None
            }
        }
    }

    async fn teardown(&self, workspace: &Workspace) {
        if let Some(isolation) = &self.isolation {
            isolation.provisioner.destroy(workspace).await;
        }
    }

    /// Turn an exit event into a result and release the job's workspace.
    async fn reap(&self, running: RunningJob, exit: std::io::Result<i32>) -> ExecutionResult {
        let duration_secs = running.started.elapsed().as_secs();
        let exit_code = exit.unwrap_or_else(|e| {
            tracing::warn!(job_id = %running.job_id, error = %e, "failed to wait for worker");
            -1
        });

        if let Some(ws) = &running.workspace {
            self.teardown(ws).await;
        }

        let result = ExecutionResult::new(
            running.job_id,
            exit_code,
            duration_secs,
            running.workspace.map(|ws| ws.branch_name),
        );
        if result.success {
            tracing::info!(job_id = %result.job_id, duration_secs, "job succeeded");
        } else {
            tracing::warn!(job_id = %result.job_id, exit_code, duration_secs, "job failed");
        }
        result
    }
}

async fn wait_exit(index: usize, exit: ExitFuture) -> (usize, std::io::Result<i32>) {
    (index, exit.await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use claude_batch_core::error::LaunchError;
    use claude_batch_core::{LaunchedWorker, SessionStore};
    use claude_batch_types::{Session, SessionStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Exits with the code given by the job text after a short sleep.
    struct ScriptedWorker {
        launched: AtomicUsize,
        fail_launch_at: Option<usize>,
        launches: Mutex<Vec<WorkerLaunch>>,
    }

    impl ScriptedWorker {
        fn new() -> Self {
            Self {
                launched: AtomicUsize::new(0),
                fail_launch_at: None,
                launches: Mutex::new(Vec::new()),
            }
        }
    }

    impl Worker for ScriptedWorker {
        fn launch(&self, launch: &WorkerLaunch) -> Result<LaunchedWorker, LaunchError> {
            let n = self.launched.fetch_add(1, Ordering::SeqCst);
            if self.fail_launch_at == Some(n) {
                return Err(LaunchError {
                    job_id: launch.job_id.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::WouldBlock, "fork: EAGAIN"),
                });
            }
            self.launches.lock().unwrap().push(launch.clone());
            let code: i32 = launch.instruction.parse().unwrap_or(0);
            Ok(LaunchedWorker {
                pid: Some(1000 + n as u32),
                exit: Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(code)
                }),
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn setup(dir: &TempDir, texts: &[&str]) -> (Vec<Job>, SessionTracker) {
        let jobs: Vec<Job> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Job::new(format!("job{}", i + 1), *t, i + 1))
            .collect();
        let session = Session::new("batch-test", &jobs, Utc::now());
        let tracker = SessionTracker::create(SessionStore::new(dir.path()), session).unwrap();
        (jobs, tracker)
    }

    #[tokio::test]
    async fn test_results_in_input_order() {
        let dir = TempDir::new().unwrap();
        let (jobs, mut tracker) = setup(&dir, &["0", "2", "0"]);
        let runner = BatchRunner::new(Arc::new(ScriptedWorker::new()), BatchOptions::default());

        let results = runner.run(&jobs, &mut tracker).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.job_id.as_str()).collect();
        assert_eq!(ids, vec!["job1", "job2", "job3"]);
        assert!(!results[1].success);
        assert_eq!(results[1].exit_code, 2);
        assert!(results.iter().all(|r| r.branch_name.is_none()));

        let session = tracker.session();
        assert_eq!(session.overall_status, SessionStatus::Completed);
        assert_eq!(session.completed, 3);
        assert_eq!(session.successful, 2);
    }

    #[tokio::test]
    async fn test_capture_output_points_into_session() {
        let dir = TempDir::new().unwrap();
        let (jobs, mut tracker) = setup(&dir, &["0"]);
        let worker = Arc::new(ScriptedWorker::new());
        let runner = BatchRunner::new(
            worker.clone(),
            BatchOptions {
                max_concurrency: None,
                capture_output: true,
            },
        );
        runner.run(&jobs, &mut tracker).await.unwrap();

        let launches = worker.launches.lock().unwrap();
        assert_eq!(
            launches[0].output.as_deref(),
            Some(tracker.handle().output_path("job1").as_path())
        );
    }

    #[tokio::test]
    async fn test_launch_failure_aborts_admission() {
        let dir = TempDir::new().unwrap();
        let (jobs, mut tracker) = setup(&dir, &["0", "0", "0", "0"]);
        let mut worker = ScriptedWorker::new();
        worker.fail_launch_at = Some(1);
        let runner = BatchRunner::new(
            Arc::new(worker),
            BatchOptions {
                max_concurrency: Some(1),
                capture_output: false,
            },
        );

        let err = runner.run(&jobs, &mut tracker).await.unwrap_err();
        assert!(matches!(err, BatchError::Launch(_)));

        let on_disk = tracker.store().read("batch-test").unwrap();
        assert_eq!(on_disk.overall_status, SessionStatus::Error);
        assert!(on_disk.error.is_some());
        // The first job was already running and is still recorded.
        assert_eq!(on_disk.completed, 1);
        assert_eq!(on_disk.tasks[3].status, claude_batch_types::TaskStatus::Pending);
    }

    /// Provisioner whose `create` takes a while, like a large checkout.
    struct SlowWorktrees {
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl WorkspaceProvisioner for SlowWorktrees {
        async fn current_branch(&self) -> Result<String, claude_batch_core::error::WorkspaceError> {
            Ok("main".to_string())
        }

        async fn create(
            &self,
            base_branch: &str,
            job_id: &str,
            base_dir: &std::path::Path,
        ) -> Result<Workspace, claude_batch_core::error::WorkspaceError> {
            tokio::time::sleep(self.delay).await;
            let branch_name = format!("{base_branch}-task-{job_id}");
            Ok(Workspace {
                base_branch: base_branch.to_string(),
                path: base_dir.join(&branch_name),
                branch_name,
            })
        }

        async fn destroy(&self, _workspace: &Workspace) {}
    }

    #[tokio::test]
    async fn test_duration_includes_workspace_setup() {
        let dir = TempDir::new().unwrap();
        let (jobs, mut tracker) = setup(&dir, &["0"]);
        let runner = BatchRunner::new(Arc::new(ScriptedWorker::new()), BatchOptions::default())
            .with_isolation(Isolation {
                provisioner: Arc::new(SlowWorktrees {
                    delay: Duration::from_millis(1100),
                }),
                base_branch: "main".to_string(),
                worktree_dir: dir.path().join("wt"),
            });

        let results = runner.run(&jobs, &mut tracker).await.unwrap();
        // The worker itself exits after 10ms.
        assert!(results[0].duration_secs >= 1);
        assert_eq!(tracker.session().tasks[0].duration, Some(results[0].duration_secs));
    }

    #[tokio::test]
    async fn test_closed_session_is_not_rerun() {
        let dir = TempDir::new().unwrap();
        let (jobs, mut tracker) = setup(&dir, &["0"]);
        tracker.complete();
        let runner = BatchRunner::new(Arc::new(ScriptedWorker::new()), BatchOptions::default());
        let err = runner.run(&jobs, &mut tracker).await.unwrap_err();
        assert!(matches!(err, BatchError::SessionClosed(_)));
    }
}
