//! Command execution engine.
//!
//! This module runs commands to completion on top of
//! [`ProcessRunner`](crate::process::ProcessRunner):
//! - Synchronous and asynchronous execution
//! - Per-call `PATH` adjustments for native sysroots
//! - Non-zero exit statuses reported as typed errors
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use cmd_harness::execution::{run_cmd, RunOptions};
//!
//! let result = run_cmd("echo hello", &RunOptions::default()).unwrap();
//! assert_eq!(result.output, "hello");
//!
//! let opts = RunOptions::new()
//!     .ignore_status(true)
//!     .timeout(Duration::from_secs(60));
//! let result = run_cmd(["make", "check"], &opts).unwrap();
//! println!("status {}", result.status);
//! ```

pub mod env;
mod executor;
mod options;
mod result;

pub use executor::{run_cmd, CommandExecutor, OUTPUT_TARGET};
pub use options::RunOptions;
pub use result::CommandResult;
