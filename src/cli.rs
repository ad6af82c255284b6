//! Command-line interface for cmd-harness.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::path::PathBuf;

use crate::process::CommandLine;

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Timeout in seconds.
    pub timeout: Option<u64>,
    /// Report a non-zero status instead of failing.
    pub ignore_status: bool,
    /// Skip the post-command `sync`.
    pub no_sync: bool,
    /// Native sysroot whose tool directories go first in `PATH`.
    pub sysroot: Option<PathBuf>,
    /// Target triplet for the sysroot's cross tools.
    pub target_sys: Option<String>,
    /// Trailing output lines kept in failure messages.
    pub limit_lines: Option<usize>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// File fed to the command's stdin.
    pub input: Option<PathBuf>,
    /// Capture stderr separately.
    pub split_stderr: bool,
    /// Log output lines as they arrive.
    pub log_output: bool,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Print the result as JSON.
    pub json: bool,
    /// Run the command directly instead of through the shell.
    pub no_shell: bool,
    /// Command and its arguments.
    pub command: Vec<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

impl Args {
    /// Command to run: a single word runs through the shell unless
    /// `--no-shell` is given, several run as an argument vector.
    pub fn command_line(&self) -> Option<CommandLine> {
        match self.command.as_slice() {
            [] => None,
            [single] if !self.no_shell => Some(CommandLine::Shell(single.clone())),
            argv => Some(CommandLine::Argv(argv.to_vec())),
        }
    }
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('t') | Long("timeout") => {
                let value: String = parser.value()?.parse()?;
                result.timeout = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("timeout", value))?,
                );
            }
            Short('i') | Long("ignore-status") => {
                result.ignore_status = true;
            }
            Long("no-sync") => {
                result.no_sync = true;
            }
            Long("sysroot") => {
                result.sysroot = Some(parser.value()?.parse()?);
            }
            Long("target-sys") => {
                result.target_sys = Some(parser.value()?.parse()?);
            }
            Short('n') | Long("limit-lines") => {
                let value: String = parser.value()?.parse()?;
                result.limit_lines = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("limit-lines", value))?,
                );
            }
            Short('C') | Long("cwd") => {
                result.cwd = Some(parser.value()?.parse()?);
            }
            Long("input") => {
                result.input = Some(parser.value()?.parse()?);
            }
            Long("split-stderr") => {
                result.split_stderr = true;
            }
            Long("log-output") => {
                result.log_output = true;
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Long("json") => {
                result.json = true;
            }
            Long("no-shell") => {
                result.no_shell = true;
            }
            Value(val) => {
                // Everything from the first word on belongs to the command.
                result.command.push(into_string(val)?);
                for rest in parser.raw_args()? {
                    result.command.push(into_string(rest)?);
                }
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

fn into_string(value: OsString) -> Result<String, ArgsError> {
    value
        .into_string()
        .map_err(|v| ArgsError::InvalidValue("command", v.to_string_lossy().into_owned()))
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"cmd-harness {version}
Run a command with output capture, timeouts and process-group cleanup

USAGE:
    cmd-harness [OPTIONS] [--] <COMMAND>...

A single COMMAND word runs through /bin/sh; several words run directly.

OPTIONS:
    -c, --config <FILE>       Path to configuration file (JSON)
    -t, --timeout <SECS>      Stop the command after SECS seconds
    -i, --ignore-status       Exit with the command's status without reporting failure
        --no-sync             Skip the filesystem sync after the command
        --sysroot <DIR>       Put DIR's tool directories first in PATH
        --target-sys <TRIPLET> Cross tool directory inside the sysroot
    -n, --limit-lines <N>     Keep only the last N output lines in failure messages
    -C, --cwd <DIR>           Working directory
        --input <FILE>        Feed FILE to the command's stdin
        --split-stderr        Capture stderr separately from stdout
        --log-output          Log output lines as they arrive
    -l, --log-level <LVL>     Log level (error, warn, info, debug, trace)
        --json                Print the result as JSON
        --no-shell            Never use the shell, even for a single word
    -h, --help                Print help
    -V, --version             Print version

ENVIRONMENT VARIABLES:
    CMD_HARNESS_TIMEOUT       Timeout in seconds (overrides config)
    CMD_HARNESS_LOG_LEVEL     Log level (overrides config)
    RUST_LOG                  Alternative log level setting
    BUILDDIR                  Build directory for the build tool helpers

EXAMPLES:
    # Run a shell snippet with a one minute timeout
    cmd-harness -t 60 'make -j8 && make check'

    # Run a program directly and print the result as JSON
    cmd-harness --json -- ls -l /tmp
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("cmd-harness {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
