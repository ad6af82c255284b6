//! Build tool invocation helpers.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::layer;
use super::vars::parse_env_dump;
use crate::error::HarnessError;
use crate::execution::{CommandExecutor, CommandResult, RunOptions};
use crate::process::{CommandLine, RunnerOptions};
use crate::Result;

/// Default build tool program.
pub const DEFAULT_BITBAKE: &str = "bitbake";

/// Default single-variable query program.
pub const DEFAULT_GETVAR: &str = "bitbake-getvar";

/// Default name of the transient override file inside the build directory.
pub const DEFAULT_POSTCONFIG_NAME: &str = "oeqa-post.conf";

/// Exit status of the variable query meaning "not set".
const GETVAR_UNSET_STATUS: i32 = 1;

/// Override-configuration file that lives for one invocation.
struct PostConfig {
    path: PathBuf,
}

impl PostConfig {
    fn write(path: PathBuf, content: &str) -> Result<Self> {
        fs::write(&path, content)?;
        debug!(path = %path.display(), "wrote override configuration");
        Ok(Self { path })
    }
}

impl Drop for PostConfig {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove override configuration");
            }
        }
    }
}

/// Runs the build tool and reads its configuration.
#[derive(Debug, Clone)]
pub struct BuildTool {
    executor: CommandExecutor,
    defaults: RunOptions,
    build_dir: Option<PathBuf>,
    bitbake: String,
    getvar: String,
    postconfig_name: String,
}

impl BuildTool {
    /// Create a build tool helper with default programs.
    ///
    /// The build directory falls back to `BUILDDIR` when not set explicitly.
    pub fn new(executor: CommandExecutor) -> Self {
        Self {
            executor,
            defaults: RunOptions::default(),
            build_dir: None,
            bitbake: DEFAULT_BITBAKE.to_string(),
            getvar: DEFAULT_GETVAR.to_string(),
            postconfig_name: DEFAULT_POSTCONFIG_NAME.to_string(),
        }
    }

    /// Options used by the helpers that do not take their own.
    pub fn with_defaults(mut self, defaults: RunOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Set the build directory.
    pub fn with_build_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.build_dir = Some(dir.into());
        self
    }

    /// Set the build tool program.
    pub fn with_bitbake(mut self, program: impl Into<String>) -> Self {
        self.bitbake = program.into();
        self
    }

    /// Set the variable query program.
    pub fn with_getvar(mut self, program: impl Into<String>) -> Self {
        self.getvar = program.into();
        self
    }

    /// Set the override file name.
    pub fn with_postconfig_name(mut self, name: impl Into<String>) -> Self {
        self.postconfig_name = name.into();
        self
    }

    /// Build directory, from configuration or `BUILDDIR`.
    pub fn build_dir(&self) -> Result<PathBuf> {
        self.build_dir
            .clone()
            .or_else(|| std::env::var_os("BUILDDIR").map(PathBuf::from))
            .ok_or_else(|| HarnessError::MissingEnv("BUILDDIR".to_string()))
    }

    /// Run the build tool with `command` appended.
    ///
    /// With `postconfig`, its content is written to an override file passed
    /// with `-R`; the file is removed afterwards whatever the outcome.
    pub fn bitbake(
        &self,
        command: impl Into<CommandLine>,
        postconfig: Option<&str>,
        opts: &RunOptions,
    ) -> Result<CommandResult> {
        let post = match postconfig {
            Some(content) => {
                let path = self.build_dir()?.join(&self.postconfig_name);
                Some(PostConfig::write(path, content)?)
            }
            None => None,
        };

        let command = self.bitbake_command(command.into(), post.as_ref().map(|p| p.path.as_path()));
        self.executor.run_cmd(command, opts)
    }

    fn bitbake_command(&self, command: CommandLine, postconfig: Option<&Path>) -> CommandLine {
        match command {
            CommandLine::Shell(text) => match postconfig {
                Some(path) => CommandLine::Shell(format!("{} -R {} {}", self.bitbake, path.display(), text)),
                None => CommandLine::Shell(format!("{} {}", self.bitbake, text)),
            },
            CommandLine::Argv(args) => {
                let mut argv = Vec::with_capacity(args.len() + 3);
                argv.push(self.bitbake.clone());
                argv.extend(args.into_iter().filter(|a| !a.is_empty()));
                if let Some(path) = postconfig {
                    argv.push("-R".to_string());
                    argv.push(path.display().to_string());
                }
                CommandLine::Argv(argv)
            }
        }
    }

    /// Full environment dump (`bitbake -e`), optionally for one target.
    pub fn build_env(&self, target: Option<&str>, postconfig: Option<&str>) -> Result<String> {
        let mut args = vec!["-e".to_string()];
        args.extend(target.map(String::from));
        Ok(self.bitbake(args, postconfig, &self.defaults)?.output)
    }

    /// Values of several variables from the environment dump.
    ///
    /// With `names`, every requested name is present in the result and maps
    /// to `None` when undefined.
    pub fn get_build_vars(
        &self,
        names: Option<&[&str]>,
        target: Option<&str>,
        postconfig: Option<&str>,
    ) -> Result<HashMap<String, Option<String>>> {
        let dump = self.build_env(target, postconfig)?;
        Ok(parse_env_dump(&dump, names))
    }

    /// Value of one variable, `None` when it is not set.
    pub fn get_build_var(
        &self,
        name: &str,
        target: Option<&str>,
        postconfig: Option<&str>,
    ) -> Result<Option<String>> {
        if postconfig.is_some() {
            let mut vars = self.get_build_vars(Some(&[name]), target, postconfig)?;
            return Ok(vars.remove(name).flatten());
        }

        let mut argv = vec![
            self.getvar.clone(),
            "--quiet".to_string(),
            "--value".to_string(),
            name.to_string(),
        ];
        if let Some(target) = target {
            argv.push("--recipe".to_string());
            argv.push(target.to_string());
        }

        let opts = RunOptions::default()
            .ignore_status(true)
            .sync(false)
            .runner(RunnerOptions::default().separate_stderr());
        let result = self.executor.run_cmd(argv, &opts)?;

        match result.status {
            0 => Ok(Some(result.output.trim().to_string())),
            GETVAR_UNSET_STATUS => Ok(None),
            status => Err(HarnessError::Command {
                status,
                output: result.failure_output(0),
                command: result.command,
            }),
        }
    }

    /// First existing `meta-selftest` layer directory listed in `bblayers`
    /// (or in the `BBLAYERS` variable when not given).
    pub fn test_layer(&self, bblayers: Option<&str>) -> Result<Option<PathBuf>> {
        let bblayers = match bblayers {
            Some(layers) => layers.to_string(),
            None => self.get_build_var("BBLAYERS", None, None)?.unwrap_or_default(),
        };
        Ok(layer::find_test_layer(&bblayers))
    }

    /// Create a layer skeleton in `dir` that is compatible with the current
    /// layer series.
    pub fn create_temp_layer(
        &self,
        dir: &Path,
        name: &str,
        priority: u32,
        recipe_pathspec: &str,
    ) -> Result<()> {
        let corenames = self
            .get_build_var("LAYERSERIES_CORENAMES", None, None)?
            .unwrap_or_default();
        layer::write_layer(dir, name, priority, recipe_pathspec, &corenames)
    }
}
