// crates/cli/src/main.rs
//! claude-batch binary.
//!
//! Exit codes: 0 on success, 1 when a job failed (or a queried session has
//! failures), 2 for anything that stopped the command itself: bad input,
//! missing worker, unknown session, launch failure.

mod args;
mod format;
mod query;
mod run;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use claude_batch_core::SessionStore;

use crate::args::{Cli, Command};

/// How a command that ran to the end went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    JobsFailed,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => ExitCode::SUCCESS,
            Outcome::JobsFailed => ExitCode::from(1),
        }
    }
}

const EXIT_ERROR: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // The detached runner logs to its session directory instead.
    if !matches!(cli.command, Command::RunSession { .. }) {
        if let Err(e) = claude_batch_observability::init_terminal(cli.verbose) {
            eprintln!("warning: {e:#}");
        }
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start async runtime: {e}");
            return ExitCode::from(EXIT_ERROR);
        }
    };

    match runtime.block_on(dispatch(cli)) {
        Ok(outcome) => outcome.into(),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

async fn dispatch(cli: Cli) -> Result<Outcome> {
    let store = match cli.sessions_dir {
        Some(dir) => SessionStore::new(dir),
        None => SessionStore::open_default()?,
    };

    match cli.command {
        Command::Run(args) => run::run(args, store).await,
        Command::RunSession { session_id } => run::run_session(store, &session_id).await,
        Command::Status { session_id, json } => query::status(store, &session_id, json),
        Command::Results { session_id } => query::results(store, &session_id),
        Command::List { json } => query::list(store, json),
        Command::Overview { json } => query::overview(store, json),
    }
}
