//! Per-call options for `run_cmd`.

use std::path::PathBuf;
use std::time::Duration;

use crate::process::RunnerOptions;

/// How one command is run and how its exit status is treated.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Return normally even when the command exits non-zero.
    pub ignore_status: bool,
    /// Bound on the total wait for the command's I/O.
    pub timeout: Option<Duration>,
    /// Report non-zero exits as `HarnessError::Assertion` rather than
    /// `HarnessError::Command`.
    pub assert_error: bool,
    /// Flush filesystem buffers after the command.
    pub sync: bool,
    /// Sysroot whose tool directories are put in front of `PATH`.
    pub native_sysroot: Option<PathBuf>,
    /// Target triple whose `usr/bin/<target>` directory goes first.
    pub target_sys: Option<String>,
    /// Keep only the last N output lines in a failure message. 0 keeps all.
    pub limit_output_lines: usize,
    /// Log output lines through tracing as they arrive.
    pub output_log: bool,
    /// Bytes fed to the command's stdin.
    pub input: Option<Vec<u8>>,
    /// Launch options for the underlying runner.
    pub runner: RunnerOptions,
}

impl RunOptions {
    /// Options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Do not fail on a non-zero exit status.
    pub fn ignore_status(mut self, ignore: bool) -> Self {
        self.ignore_status = ignore;
        self
    }

    /// Set the timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Choose between assertion-style and typed command failures.
    pub fn assert_error(mut self, assert: bool) -> Self {
        self.assert_error = assert;
        self
    }

    /// Enable or disable the trailing filesystem sync.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Prefer tools from `sysroot`.
    pub fn native_sysroot(mut self, sysroot: impl Into<PathBuf>) -> Self {
        self.native_sysroot = Some(sysroot.into());
        self
    }

    /// Set the target triple used with the native sysroot.
    pub fn target_sys(mut self, target: impl Into<String>) -> Self {
        self.target_sys = Some(target.into());
        self
    }

    /// Truncate failure messages to the last `lines` output lines.
    pub fn limit_output_lines(mut self, lines: usize) -> Self {
        self.limit_output_lines = lines;
        self
    }

    /// Log output lines as they arrive.
    pub fn output_log(mut self, log: bool) -> Self {
        self.output_log = log;
        self
    }

    /// Feed `data` to stdin.
    pub fn input(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.input = Some(data.into());
        self
    }

    /// Replace the runner options.
    pub fn runner(mut self, runner: RunnerOptions) -> Self {
        self.runner = runner;
        self
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            ignore_status: false,
            timeout: None,
            assert_error: true,
            sync: true,
            native_sysroot: None,
            target_sys: None,
            limit_output_lines: 0,
            output_log: false,
            input: None,
            runner: RunnerOptions::default(),
        }
    }
}
