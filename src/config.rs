//! Configuration management for cmd-harness.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buildtool::{BuildTool, DEFAULT_BITBAKE, DEFAULT_GETVAR, DEFAULT_POSTCONFIG_NAME};
use crate::cli::Args;
use crate::execution::env::SYNC_PATH_PREFIX;
use crate::execution::{CommandExecutor, RunOptions};
use crate::process::{RunnerOptions, DEFAULT_GRACE_PERIOD};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Command execution settings.
    pub runner: RunnerSection,
    /// Build tool settings.
    pub build: BuildSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Command execution section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSection {
    /// Timeout in seconds; unbounded when absent.
    pub timeout_secs: Option<u64>,
    /// Wait between SIGTERM and SIGKILL, in milliseconds.
    pub grace_period_ms: u64,
    /// Run `sync` after each command.
    pub sync: bool,
    /// Trailing output lines kept in failure messages (0 keeps all).
    pub limit_output_lines: usize,
    /// Directories put in front of `PATH` for `sync`.
    pub sync_path_prefix: String,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            grace_period_ms: DEFAULT_GRACE_PERIOD.as_millis() as u64,
            sync: true,
            limit_output_lines: 0,
            sync_path_prefix: SYNC_PATH_PREFIX.to_string(),
        }
    }
}

/// Build tool section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    /// Build directory; `BUILDDIR` overrides it.
    pub build_dir: Option<PathBuf>,
    /// Build tool program.
    pub bitbake: String,
    /// Variable query program.
    pub getvar: String,
    /// Override file name inside the build directory.
    pub postconfig_name: String,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            build_dir: None,
            bitbake: DEFAULT_BITBAKE.to_string(),
            getvar: DEFAULT_GETVAR.to_string(),
            postconfig_name: DEFAULT_POSTCONFIG_NAME.to_string(),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Filter directive (error, warn, info, debug, trace or a full
    /// `EnvFilter` string); the crate default when absent.
    pub level: Option<String>,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(timeout) = std::env::var("CMD_HARNESS_TIMEOUT") {
            let secs = timeout
                .parse()
                .map_err(|_| ConfigError::InvalidValue("CMD_HARNESS_TIMEOUT", timeout))?;
            self.runner.timeout_secs = Some(secs);
        }

        if let Ok(level) = std::env::var("CMD_HARNESS_LOG_LEVEL") {
            self.logging.level = Some(level);
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = Some(level);
        }

        if let Some(dir) = std::env::var_os("BUILDDIR") {
            self.build.build_dir = Some(PathBuf::from(dir));
        }

        Ok(())
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(timeout) = args.timeout {
            self.runner.timeout_secs = Some(timeout);
        }

        if args.no_sync {
            self.runner.sync = false;
        }

        if let Some(limit) = args.limit_lines {
            self.runner.limit_output_lines = limit;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = Some(level.clone());
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env()?;
        config.apply_args(args);

        Ok(config)
    }

    /// Timeout as a duration.
    pub fn timeout(&self) -> Option<Duration> {
        self.runner.timeout_secs.map(Duration::from_secs)
    }

    /// Default options for `run_cmd`.
    pub fn to_run_options(&self) -> RunOptions {
        let mut opts = RunOptions::new()
            .sync(self.runner.sync)
            .limit_output_lines(self.runner.limit_output_lines)
            .runner(
                RunnerOptions::default()
                    .grace_period(Duration::from_millis(self.runner.grace_period_ms)),
            );
        if let Some(timeout) = self.timeout() {
            opts = opts.timeout(timeout);
        }
        opts
    }

    /// Executor honoring the configured `sync` search path.
    pub fn to_executor(&self) -> CommandExecutor {
        CommandExecutor::new().with_sync_path_prefix(self.runner.sync_path_prefix.clone())
    }

    /// Build tool helper with the configured programs and directory.
    pub fn to_build_tool(&self) -> BuildTool {
        let mut tool = BuildTool::new(self.to_executor())
            .with_defaults(self.to_run_options())
            .with_bitbake(self.build.bitbake.clone())
            .with_getvar(self.build.getvar.clone())
            .with_postconfig_name(self.build.postconfig_name.clone());
        if let Some(ref dir) = self.build.build_dir {
            tool = tool.with_build_dir(dir.clone());
        }
        tool
    }

    /// Get the log filter directive, if one was configured.
    pub fn log_filter(&self) -> Option<&str> {
        self.logging.level.as_deref()
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Unparseable override value.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidValue(name, value) => write!(f, "invalid value for {}: '{}'", name, value),
        }
    }
}

impl std::error::Error for ConfigError {}
