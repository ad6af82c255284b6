//! # cmd-harness
//!
//! Subprocess execution and supervision for build and test automation.
//!
//! This crate runs external commands and hands back their status and
//! captured output. It keeps long-running or chatty children from stalling
//! on full pipes, bounds them with timeouts, and cleans up whole process
//! groups when they are stopped.
//!
//! ## Features
//!
//! - **Process supervision**: [`ProcessRunner`] with merged or separate
//!   stderr, streamed input, per-line sinks and SIGTERM/SIGKILL escalation
//! - **Command execution**: [`run_cmd`] with status checking, native sysroot
//!   `PATH` handling and a post-command filesystem sync
//! - **Build tool helpers**: [`BuildTool`] for `bitbake` invocations and
//!   variable lookup
//! - **Async bridge**: [`CommandExecutor::run_cmd_async`] on tokio's blocking
//!   pool
//!
//! ## Quick Start
//!
//! ```no_run
//! use cmd_harness::{run_cmd, RunOptions};
//!
//! fn main() -> cmd_harness::Result<()> {
//!     // Initialize logging
//!     cmd_harness::logging::try_init(None).ok();
//!
//!     let result = run_cmd("uname -a", &RunOptions::default())?;
//!     println!("{} (pid {})", result.output, result.pid);
//!
//!     // Non-zero statuses are errors unless ignored.
//!     let result = run_cmd(["test", "-d", "/nonexistent"], &RunOptions::new().ignore_status(true))?;
//!     assert_eq!(result.status, 1);
//!
//!     Ok(())
//! }
//! ```

pub mod buildtool;
pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod logging;
pub mod process;

// Re-export commonly used types
pub use buildtool::BuildTool;
pub use error::{HarnessError, Result};
pub use execution::{run_cmd, CommandExecutor, CommandResult, RunOptions};
pub use process::{
    CommandLine, ProcessOutcome, ProcessRunner, RunnerOptions, RunningProcess, StdinMode,
};
