// crates/cli/src/args.rs
//! Command-line interface.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use claude_batch_core::worker::detect::{DEFAULT_WORKER, WORKER_ENV};

#[derive(Debug, Parser)]
#[command(
    name = "claude-batch",
    version,
    about = "Run batches of prompts through the Claude CLI with bounded parallelism"
)]
pub struct Cli {
    /// More log output (-v, -vv). `RUST_LOG` overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Session store directory [default: $CLAUDE_BATCH_HOME/sessions or the
    /// platform cache dir]
    #[arg(long, global = true, value_name = "DIR")]
    pub sessions_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a batch. Detached by default; prints the session id.
    Run(RunArgs),

    /// Show the state of every job in a session.
    Status {
        session_id: String,
        /// Print the raw snapshot as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the captured output of every job in a session.
    Results { session_id: String },

    /// List all sessions, newest first.
    List {
        #[arg(long)]
        json: bool,
    },

    /// Aggregate counts across all sessions.
    Overview {
        #[arg(long)]
        json: bool,
    },

    /// Execute a prepared session in the current process.
    #[command(name = "run-session", hide = true)]
    RunSession { session_id: String },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// JSON file with prompts; `-` or absent reads stdin
    #[arg(value_name = "INPUT")]
    pub input: Option<PathBuf>,

    /// Maximum number of workers running at once [default: one per prompt]
    #[arg(short = 'j', long = "max-concurrency", value_name = "N",
          value_parser = clap::value_parser!(u64).range(1..))]
    pub max_concurrency: Option<u64>,

    /// Give every job its own git worktree and branch
    #[arg(long)]
    pub isolate: bool,

    /// Branch the worktrees are created from [default: current branch]
    #[arg(long, value_name = "BRANCH", requires = "isolate")]
    pub base_branch: Option<String>,

    /// Where worktrees are created [default: <repo>-worktrees next to the repo]
    #[arg(long, value_name = "DIR", requires = "isolate")]
    pub worktree_dir: Option<PathBuf>,

    /// Run in the foreground and wait for every job
    #[arg(long)]
    pub wait: bool,

    /// Capture worker output into the session even with --wait
    #[arg(long)]
    pub capture_output: bool,

    /// Worker executable
    #[arg(long, env = WORKER_ENV, default_value = DEFAULT_WORKER, value_name = "BIN")]
    pub worker: String,

    /// Extra argument passed to every worker (repeatable)
    #[arg(long = "worker-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub worker_args: Vec<String>,
}

impl RunArgs {
    /// True when prompts come from stdin.
    pub fn reads_stdin(&self) -> bool {
        self.input
            .as_deref()
            .map_or(true, |p| p.as_os_str() == "-")
    }

    pub fn max_concurrency(&self) -> Option<usize> {
        self.max_concurrency.map(|n| n as usize)
    }
}
