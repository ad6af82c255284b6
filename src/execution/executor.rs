//! Command execution engine.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::env::{self, EnvGuard, SYNC_PATH_PREFIX};
use super::options::RunOptions;
use super::result::CommandResult;
use crate::error::HarnessError;
use crate::process::{CommandLine, ProcessRunner, RunnerOptions};
use crate::Result;

/// Tracing target for command output forwarded by `output_log`.
pub const OUTPUT_TARGET: &str = "cmd_harness::output";

/// Runs commands to completion and turns failures into errors.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    sync_path_prefix: String,
}

impl CommandExecutor {
    /// Create a new command executor.
    pub fn new() -> Self {
        Self {
            sync_path_prefix: SYNC_PATH_PREFIX.to_string(),
        }
    }

    /// Use `prefix` in front of `PATH` when running `sync`.
    pub fn with_sync_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.sync_path_prefix = prefix.into();
        self
    }

    /// Run `command` synchronously (blocking).
    ///
    /// A non-zero status fails with [`HarnessError::Assertion`] or, when
    /// `assert_error` is off, [`HarnessError::Command`], unless
    /// `ignore_status` is set.
    pub fn run_cmd(&self, command: impl Into<CommandLine>, opts: &RunOptions) -> Result<CommandResult> {
        let command = command.into();
        let runner = self.prepare(&command, opts)?;

        if opts.output_log {
            info!(target: OUTPUT_TARGET, "Running: {command}");
        }
        let outcome = runner.run();

        // Flush even when the command itself failed.
        if opts.sync {
            self.sync_filesystem();
        }

        let result = CommandResult::from(outcome?);
        if result.status != 0 && !opts.ignore_status {
            let output = result.failure_output(opts.limit_output_lines);
            return Err(if opts.assert_error {
                HarnessError::Assertion {
                    status: result.status,
                    command: result.command,
                    output,
                }
            } else {
                HarnessError::Command {
                    status: result.status,
                    command: result.command,
                    output,
                }
            });
        }

        Ok(result)
    }

    /// Run `command` on tokio's blocking pool.
    pub async fn run_cmd_async(
        &self,
        command: impl Into<CommandLine>,
        opts: RunOptions,
    ) -> Result<CommandResult> {
        let command = command.into();
        let executor = self.clone();
        tokio::task::spawn_blocking(move || executor.run_cmd(command, &opts))
            .await
            .map_err(|e| HarnessError::Join(e.to_string()))?
    }

    /// Source `env_file` in a shell and copy the resulting environment into
    /// this process.
    pub fn update_env(&self, env_file: &Path) -> Result<()> {
        // The path travels as `$0` so the shell never re-parses it.
        let command = CommandLine::Argv(vec![
            ". \"$0\"; env -0".to_string(),
            env_file.display().to_string(),
        ]);
        let opts = RunOptions::default()
            .sync(false)
            .runner(RunnerOptions::default().shell(true).separate_stderr());

        // Held across the run so the child sees no temporary PATH widening.
        let mut guard = EnvGuard::acquire();
        let result = self.run_cmd(command, &opts)?;

        let vars = env::parse_env_nul(&result.output);
        debug!(file = %env_file.display(), count = vars.len(), "updating environment");
        for (key, value) in &vars {
            guard.persist(key, value);
        }
        Ok(())
    }

    fn prepare(&self, command: &CommandLine, opts: &RunOptions) -> Result<ProcessRunner> {
        let mut runner_opts = opts.runner.clone();

        if let Some(sysroot) = &opts.native_sysroot {
            let vars = env::with_native_sysroot(
                runner_opts.env.as_ref(),
                sysroot,
                opts.target_sys.as_deref(),
            )?;
            runner_opts.env = Some(vars);
        }

        if opts.output_log {
            if runner_opts.output_sink.is_none() {
                runner_opts.output_sink = Some(Arc::new(|line: &str| {
                    info!(target: OUTPUT_TARGET, "{line}");
                }));
            }
            if !runner_opts.merge_stderr && runner_opts.error_sink.is_none() {
                runner_opts.error_sink = Some(Arc::new(|line: &str| {
                    error!(target: OUTPUT_TARGET, "{line}");
                }));
            }
        }

        let mut runner = ProcessRunner::new(command.clone())
            .options(runner_opts)
            .timeout(opts.timeout);
        if let Some(input) = &opts.input {
            runner = runner.input(input.clone());
        }
        Ok(runner)
    }

    /// Best-effort `sync` so heavy IO from one command does not spill into
    /// the timing of the next.
    fn sync_filesystem(&self) {
        let mut guard = EnvGuard::acquire();
        guard.prepend_path(&self.sync_path_prefix);
        match std::process::Command::new("sync").status() {
            Ok(status) if status.success() => {}
            Ok(status) => warn!(%status, "sync failed"),
            Err(e) => warn!(error = %e, "could not run sync"),
        }
    }
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `command` with a default executor.
pub fn run_cmd(command: impl Into<CommandLine>, opts: &RunOptions) -> Result<CommandResult> {
    CommandExecutor::new().run_cmd(command, opts)
}
