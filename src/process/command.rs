//! Command lines and launch options.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

/// Shell used for `CommandLine::Shell` and for argv commands run with `shell`.
pub const SHELL: &str = "/bin/sh";

/// Default wait between SIGTERM and SIGKILL.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Callback receiving one decoded output line at a time.
pub type LineSink = Arc<dyn Fn(&str) + Send + Sync>;

/// The executable invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Text interpreted by the shell.
    Shell(String),
    /// Program and arguments executed directly.
    Argv(Vec<String>),
}

impl CommandLine {
    /// Whether this command is shell text.
    pub fn is_shell(&self) -> bool {
        matches!(self, Self::Shell(_))
    }

    /// Build the `std::process::Command` that launches this command line.
    ///
    /// With `shell`, a `Shell` string becomes `sh -c <text>` and an `Argv`
    /// becomes `sh -c <argv[0]> <argv[1..]>`, so trailing items are the
    /// script's positional parameters. Without `shell`, a `Shell` string is
    /// taken as a bare program name.
    pub(crate) fn to_command(&self, shell: bool) -> Command {
        match (self, shell) {
            (Self::Shell(text), true) => {
                let mut cmd = Command::new(SHELL);
                cmd.arg("-c").arg(text);
                cmd
            }
            (Self::Shell(text), false) => Command::new(text),
            (Self::Argv(argv), true) => {
                let mut cmd = Command::new(SHELL);
                cmd.arg("-c").args(argv);
                cmd
            }
            (Self::Argv(argv), false) => {
                let mut cmd = Command::new(argv.first().map(String::as_str).unwrap_or_default());
                cmd.args(argv.iter().skip(1));
                cmd
            }
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shell(text) => f.write_str(text),
            Self::Argv(argv) => f.write_str(&argv.join(" ")),
        }
    }
}

impl From<&str> for CommandLine {
    fn from(text: &str) -> Self {
        Self::Shell(text.to_string())
    }
}

impl From<String> for CommandLine {
    fn from(text: String) -> Self {
        Self::Shell(text)
    }
}

impl From<Vec<String>> for CommandLine {
    fn from(argv: Vec<String>) -> Self {
        Self::Argv(argv)
    }
}

impl From<Vec<&str>> for CommandLine {
    fn from(argv: Vec<&str>) -> Self {
        Self::Argv(argv.into_iter().map(String::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for CommandLine {
    fn from(argv: [&str; N]) -> Self {
        Self::Argv(argv.iter().map(|s| s.to_string()).collect())
    }
}

impl From<&[&str]> for CommandLine {
    fn from(argv: &[&str]) -> Self {
        Self::Argv(argv.iter().map(|s| s.to_string()).collect())
    }
}

/// How the child's standard input is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinMode {
    /// A pipe owned by the runner.
    Pipe,
    /// The parent's standard input.
    Inherit,
    /// `/dev/null`.
    Null,
}

/// Launch configuration for a [`ProcessRunner`](super::ProcessRunner).
#[derive(Clone)]
pub struct RunnerOptions {
    /// Interpret the command through the shell. `None` picks shell mode for
    /// `CommandLine::Shell` only.
    pub shell: Option<bool>,
    /// Standard input mode. `None` means a pipe when input is supplied and
    /// `/dev/null` otherwise.
    pub stdin: Option<StdinMode>,
    /// Working directory override.
    pub working_dir: Option<PathBuf>,
    /// Full child environment. `None` inherits the parent's.
    pub env: Option<HashMap<String, String>>,
    /// Send stderr into the stdout pipe. Ignored when an error sink is set.
    pub merge_stderr: bool,
    /// Receives stdout lines as they arrive.
    pub output_sink: Option<LineSink>,
    /// Receives stderr lines as they arrive.
    pub error_sink: Option<LineSink>,
    /// Wait between SIGTERM and SIGKILL during `stop()`.
    pub grace_period: Duration,
}

impl RunnerOptions {
    /// Set shell interpretation explicitly.
    pub fn shell(mut self, shell: bool) -> Self {
        self.shell = Some(shell);
        self
    }

    /// Set the stdin mode.
    pub fn stdin(mut self, mode: StdinMode) -> Self {
        self.stdin = Some(mode);
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Replace the child environment.
    pub fn env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// Keep stderr in its own pipe.
    pub fn separate_stderr(mut self) -> Self {
        self.merge_stderr = false;
        self
    }

    /// Stream stdout lines to `sink`.
    pub fn output_sink(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.output_sink = Some(Arc::new(sink));
        self
    }

    /// Stream stderr lines to `sink`. This also separates stderr from stdout.
    pub fn error_sink(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.error_sink = Some(Arc::new(sink));
        self
    }

    /// Set the termination grace period.
    pub fn grace_period(mut self, period: Duration) -> Self {
        self.grace_period = period;
        self
    }

    /// Whether stderr ends up in the stdout pipe.
    pub fn stderr_merged(&self) -> bool {
        self.merge_stderr && self.error_sink.is_none()
    }

    /// Stdin mode actually used, given whether input bytes are present.
    pub fn effective_stdin(&self, has_input: bool) -> StdinMode {
        if has_input {
            StdinMode::Pipe
        } else {
            self.stdin.unwrap_or(StdinMode::Null)
        }
    }

    /// Shell mode actually used for `command`.
    pub fn effective_shell(&self, command: &CommandLine) -> bool {
        self.shell.unwrap_or_else(|| command.is_shell())
    }
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            shell: None,
            stdin: None,
            working_dir: None,
            env: None,
            merge_stderr: true,
            output_sink: None,
            error_sink: None,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl fmt::Debug for RunnerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerOptions")
            .field("shell", &self.shell)
            .field("stdin", &self.stdin)
            .field("working_dir", &self.working_dir)
            .field("env", &self.env.as_ref().map(|e| e.len()))
            .field("merge_stderr", &self.merge_stderr)
            .field("output_sink", &self.output_sink.is_some())
            .field("error_sink", &self.error_sink.is_some())
            .field("grace_period", &self.grace_period)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_from() {
        assert_eq!(CommandLine::from("echo hi"), CommandLine::Shell("echo hi".into()));
        assert_eq!(
            CommandLine::from(["ls", "-la"]),
            CommandLine::Argv(vec!["ls".into(), "-la".into()])
        );
        assert_eq!(CommandLine::from(vec!["ls", "-la"]).to_string(), "ls -la");
    }

    #[test]
    fn test_to_command_shell() {
        let cmd = CommandLine::from("echo $HOME").to_command(true);
        assert_eq!(cmd.get_program(), SHELL);
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, ["-c", "echo $HOME"]);
    }

    #[test]
    fn test_to_command_argv_with_shell() {
        let cmd = CommandLine::from(["echo $0 $1", "a", "b"]).to_command(true);
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, ["-c", "echo $0 $1", "a", "b"]);
    }

    #[test]
    fn test_to_command_argv() {
        let cmd = CommandLine::from(["printf", "%s", "x"]).to_command(false);
        assert_eq!(cmd.get_program(), "printf");
        assert_eq!(cmd.get_args().count(), 2);
    }

    #[test]
    fn test_options_defaults() {
        let opts = RunnerOptions::default();
        assert!(opts.stderr_merged());
        assert_eq!(opts.effective_stdin(false), StdinMode::Null);
        assert_eq!(opts.effective_stdin(true), StdinMode::Pipe);
        assert_eq!(opts.grace_period, DEFAULT_GRACE_PERIOD);
        assert!(opts.effective_shell(&"true".into()));
        assert!(!opts.effective_shell(&["true"].into()));
    }

    #[test]
    fn test_error_sink_separates_stderr() {
        let opts = RunnerOptions::default().error_sink(|_| {});
        assert!(!opts.stderr_merged());
        assert!(!RunnerOptions::default().separate_stderr().stderr_merged());
    }

    #[test]
    fn test_options_builder_chain() {
        let opts = RunnerOptions::default()
            .shell(false)
            .stdin(StdinMode::Inherit)
            .working_dir("/tmp")
            .env([("A", "1")])
            .grace_period(Duration::from_millis(100));

        assert_eq!(opts.shell, Some(false));
        assert_eq!(opts.effective_stdin(false), StdinMode::Inherit);
        assert_eq!(opts.working_dir, Some(PathBuf::from("/tmp")));
        assert_eq!(opts.env.unwrap().get("A"), Some(&"1".to_string()));
    }
}
