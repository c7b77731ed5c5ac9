// crates/core/src/worker/mod.rs
//! Worker integration.
//!
//! The scheduler only needs to spawn a worker with an instruction, learn its
//! pid, and await its exit code. The `Worker` trait captures exactly that;
//! `ClaudeCliWorker` is the production implementation.

pub mod claude_cli;
pub mod detect;
pub mod provider;

pub use claude_cli::ClaudeCliWorker;
pub use detect::resolve_worker_binary;
pub use provider::{ExitFuture, LaunchedWorker, Worker, WorkerLaunch};
