//! Supervised child processes.
//!
//! A [`ProcessRunner`] launches one command and drains its output on
//! `spawn_blocking` tasks of a shared tokio runtime, so a full pipe never
//! stalls the child:
//! - stderr shares the stdout pipe unless kept separate
//! - input, when given, is written by its own task
//! - a timeout is a single deadline shared by all joins
//! - `stop()` escalates from SIGTERM to SIGKILL after a grace period
//!
//! Waiting blocks the calling thread. From async code, go through
//! [`CommandExecutor::run_cmd_async`](crate::CommandExecutor::run_cmd_async)
//! or `spawn_blocking`.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use cmd_harness::process::ProcessRunner;
//!
//! let outcome = ProcessRunner::new("make -j8")
//!     .timeout(Some(Duration::from_secs(600)))
//!     .run()
//!     .unwrap();
//! println!("{} -> {}", outcome.command, outcome.status);
//!
//! // Background mode: start now, stop later.
//! let mut server = ProcessRunner::new(["python3", "-m", "http.server"]).start().unwrap();
//! // ...
//! let outcome = server.stop().unwrap();
//! assert!(outcome.terminated);
//! ```

mod command;
mod runner;
mod signal;
mod stream;
mod task;

pub use command::{
    CommandLine, LineSink, RunnerOptions, StdinMode, DEFAULT_GRACE_PERIOD, SHELL,
};
pub use runner::{ProcessOutcome, ProcessRunner, RunningProcess};
pub use signal::Signal;
