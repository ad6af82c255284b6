//! Launch, drain, and stop one child process.

use std::io::{self, PipeReader, Read};
use std::process::{Child, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::command::{CommandLine, RunnerOptions, StdinMode};
use super::signal::{self, Signal};
use super::stream::{self, Drained};
use super::task::Task;
use crate::error::HarnessError;
use crate::Result;

/// Lines of output logged when a command exits non-zero.
const FAILURE_TAIL_LINES: usize = 20;

enum TaskOutput {
    Input(io::Result<()>),
    Stdout(Drained),
    Stderr(Drained),
}

/// Record of a finished child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Command as launched.
    pub command: String,
    /// Process ID.
    pub pid: u32,
    /// Exit code, or the negated signal number when killed by a signal.
    pub status: i32,
    /// Captured stdout (and stderr when merged), right-trimmed.
    pub output: String,
    /// Captured stderr when kept separate, right-trimmed.
    pub error: String,
    /// Whether `stop()` had to signal the child.
    pub terminated: bool,
    /// Time from launch to the end of `stop()`.
    pub duration: Duration,
}

/// A configured child process, not yet launched.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    command: CommandLine,
    options: RunnerOptions,
    input: Option<Vec<u8>>,
    timeout: Option<Duration>,
}

impl ProcessRunner {
    /// Create a runner for `command` with default options.
    pub fn new(command: impl Into<CommandLine>) -> Self {
        Self {
            command: command.into(),
            options: RunnerOptions::default(),
            input: None,
            timeout: None,
        }
    }

    /// Replace the launch options.
    pub fn options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    /// Bytes written to the child's stdin before it is closed.
    pub fn input(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.input = Some(data.into());
        self
    }

    /// Bound the total wait in [`run`](Self::run).
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The command this runner launches.
    pub fn command(&self) -> &CommandLine {
        &self.command
    }

    /// Launch, wait for the I/O tasks (bounded by the timeout), then stop.
    pub fn run(self) -> Result<ProcessOutcome> {
        let timeout = self.timeout;
        let mut process = self.start()?;
        process.wait(timeout);
        process.stop().cloned()
    }

    /// Launch the child and its I/O tasks, returning immediately.
    ///
    /// The caller owns the returned handle and must call
    /// [`RunningProcess::stop`] to collect the result.
    pub fn start(self) -> Result<RunningProcess> {
        let command_text = self.command.to_string();
        let launch_err = |source| HarnessError::Launch {
            command: command_text.clone(),
            source,
        };

        let shell = self.options.effective_shell(&self.command);
        let stdin_mode = self.options.effective_stdin(self.input.is_some());
        let merged = self.options.stderr_merged();

        let mut cmd = self.command.to_command(shell);
        if let Some(dir) = &self.options.working_dir {
            cmd.current_dir(dir);
        }
        if let Some(env) = &self.options.env {
            cmd.env_clear().envs(env);
        }
        cmd.stdin(match stdin_mode {
            StdinMode::Pipe => Stdio::piped(),
            StdinMode::Inherit => Stdio::inherit(),
            StdinMode::Null => Stdio::null(),
        });

        let merged_reader: Option<PipeReader> = if merged {
            let (reader, writer) = io::pipe().map_err(launch_err)?;
            cmd.stdout(writer.try_clone().map_err(launch_err)?);
            cmd.stderr(writer);
            Some(reader)
        } else {
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());
            None
        };

        // Signals go to the whole group so shell pipelines die together. A
        // child reading the terminal has to stay in the foreground group.
        #[cfg(unix)]
        let group = stdin_mode != StdinMode::Inherit;
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            if group {
                cmd.process_group(0);
            }
        }
        #[cfg(not(unix))]
        let group = false;

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(launch_err)?;
        // The builder still holds our copies of the pipe write ends.
        drop(cmd);

        let pid = child.id();
        debug!(command = %command_text, pid, shell, merged, "running command");

        let mut tasks = Vec::with_capacity(3);
        let spawned = spawn_tasks(&mut child, &mut tasks, merged_reader, self.input, &self.options);
        if let Err(source) = spawned {
            // Without its drain tasks the child could block forever.
            warn!(command = %command_text, pid, error = %source, "failed to start I/O tasks");
            let _ = child.kill();
            let _ = child.wait();
            return Err(launch_err(source));
        }

        Ok(RunningProcess {
            command: command_text,
            child,
            pid,
            group,
            grace_period: self.options.grace_period,
            tasks,
            started,
            outcome: None,
        })
    }
}

fn spawn_tasks(
    child: &mut Child,
    tasks: &mut Vec<Task<TaskOutput>>,
    merged_reader: Option<PipeReader>,
    input: Option<Vec<u8>>,
    options: &RunnerOptions,
) -> io::Result<()> {
    let stdin = child.stdin.take();
    if let (Some(stdin), Some(data)) = (stdin, input) {
        tasks.push(Task::spawn("stdin", move || {
            TaskOutput::Input(stream::feed(stdin, &data))
        })?);
    }

    if let Some(stderr) = child.stderr.take() {
        let sink = options.error_sink.clone();
        tasks.push(Task::spawn("stderr", move || {
            TaskOutput::Stderr(stream::drain(stderr, sink))
        })?);
    }

    let stdout: Option<Box<dyn Read + Send>> = match merged_reader {
        Some(reader) => Some(Box::new(reader)),
        None => child.stdout.take().map(|s| Box::new(s) as Box<dyn Read + Send>),
    };
    if let Some(stdout) = stdout {
        let sink = options.output_sink.clone();
        tasks.push(Task::spawn("stdout", move || {
            TaskOutput::Stdout(stream::drain(stdout, sink))
        })?);
    }

    Ok(())
}

/// Handle to a launched child and its I/O tasks.
pub struct RunningProcess {
    command: String,
    child: Child,
    pid: u32,
    group: bool,
    grace_period: Duration,
    tasks: Vec<Task<TaskOutput>>,
    started: Instant,
    outcome: Option<ProcessOutcome>,
}

impl RunningProcess {
    /// Process ID of the child.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Command as launched.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The result, once [`stop`](Self::stop) has run.
    pub fn outcome(&self) -> Option<&ProcessOutcome> {
        self.outcome.as_ref()
    }

    /// Whether any I/O task is still running.
    pub fn is_running(&mut self) -> bool {
        self.tasks.iter_mut().any(|t| t.is_alive())
    }

    /// Join the I/O tasks in order, sharing one deadline of `timeout` across
    /// all of them. Returns whether every task finished.
    pub fn wait(&mut self, timeout: Option<Duration>) -> bool {
        match timeout {
            None => {
                for task in &mut self.tasks {
                    task.join();
                }
                true
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                let mut finished = true;
                for task in &mut self.tasks {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    finished &= task.join_timeout(remaining);
                }
                finished
            }
        }
    }

    /// Terminate whatever is still running, collect output, and reap the
    /// child.
    ///
    /// Each still-running task triggers SIGTERM (sent at most once), then is
    /// given the grace period; a task that outlives it triggers SIGKILL (at
    /// most once) and is joined without bound. Calling `stop` again returns
    /// the stored outcome without signalling.
    ///
    /// An I/O task failure is returned by the first call only; the outcome
    /// (with whatever output was captured) is stored either way and later
    /// calls return it as `Ok`.
    pub fn stop(&mut self) -> Result<&ProcessOutcome> {
        if self.outcome.is_none() {
            self.shutdown()?;
        }
        Ok(self.outcome.get_or_insert_with(ProcessOutcome::default))
    }

    fn shutdown(&mut self) -> Result<()> {
        let terminated = self.escalate();

        let mut output = Vec::new();
        let mut error = Vec::new();
        let mut failure = None;
        for task in &mut self.tasks {
            match task.take() {
                Some(TaskOutput::Input(Ok(()))) => {}
                Some(TaskOutput::Input(Err(e))) => {
                    failure.get_or_insert(Failure::Input(e));
                }
                Some(TaskOutput::Stdout(drained)) => {
                    output = drained.chunks;
                    if let Some(e) = drained.error {
                        failure.get_or_insert(Failure::Read("stdout", e));
                    }
                }
                Some(TaskOutput::Stderr(drained)) => {
                    error = drained.chunks;
                    if let Some(e) = drained.error {
                        failure.get_or_insert(Failure::Read("stderr", e));
                    }
                }
                None if task.panicked() => {
                    failure.get_or_insert(Failure::Panicked(task.name()));
                }
                None => {}
            }
        }
        self.tasks.clear();

        let output = stream::finalize(output);
        let error = stream::finalize(error);

        // Every pipe has hit EOF, so the child is done or dying.
        let status = self
            .child
            .wait()
            .map(signal::status_code)
            .map_err(|source| HarnessError::Wait {
                command: self.command.clone(),
                source,
            })?;

        debug!(command = %self.command, status, "command returned");
        if status != 0 {
            let lines: Vec<&str> = output.lines().collect();
            let tail = lines[lines.len().saturating_sub(FAILURE_TAIL_LINES)..].join("\n");
            debug!(command = %self.command, "last {FAILURE_TAIL_LINES} lines:\n{tail}");
        }

        let outcome = self.outcome.insert(ProcessOutcome {
            command: self.command.clone(),
            pid: self.pid,
            status,
            output,
            error,
            terminated,
            duration: self.started.elapsed(),
        });

        match failure {
            None => Ok(()),
            Some(failure) => Err(failure.into_error(&outcome.command, &outcome.output)),
        }
    }

    fn escalate(&mut self) -> bool {
        let mut terminated = false;
        let mut killed = false;

        for task in &mut self.tasks {
            if !task.is_alive() {
                continue;
            }
            if !terminated {
                info!(command = %self.command, pid = self.pid, "terminating command");
                deliver(&mut self.child, self.group, Signal::Terminate);
                terminated = true;
            }
            if !task.join_timeout(self.grace_period) {
                if !killed {
                    warn!(
                        command = %self.command,
                        pid = self.pid,
                        grace_ms = self.grace_period.as_millis() as u64,
                        "command ignored SIGTERM, killing"
                    );
                    deliver(&mut self.child, self.group, Signal::Kill);
                    killed = true;
                }
                task.join();
            }
        }

        terminated
    }
}

#[cfg(unix)]
fn deliver(child: &mut Child, group: bool, sig: Signal) {
    if let Err(e) = signal::send(child.id(), group, sig) {
        warn!(pid = child.id(), signal = ?sig, error = %e, "failed to signal command");
    }
}

#[cfg(not(unix))]
fn deliver(child: &mut Child, _group: bool, _sig: Signal) {
    let _ = child.kill();
}

impl Drop for RunningProcess {
    fn drop(&mut self) {
        if self.outcome.is_none() {
            warn!(command = %self.command, pid = self.pid, "running command dropped without stop()");
            let _ = self.stop();
        }
    }
}

enum Failure {
    Input(io::Error),
    Read(&'static str, io::Error),
    Panicked(&'static str),
}

impl Failure {
    fn into_error(self, command: &str, output: &str) -> HarnessError {
        let command = command.to_string();
        match self {
            Failure::Input(source) => HarnessError::InputWrite {
                command,
                source,
                output: output.to_string(),
            },
            Failure::Read(stream, source) => HarnessError::OutputRead {
                command,
                stream,
                source,
                output: output.to_string(),
            },
            Failure::Panicked(task) => HarnessError::TaskPanicked { command, task },
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_run_echo() {
        let outcome = ProcessRunner::new("echo hello").run().unwrap();
        assert_eq!(outcome.output, "hello");
        assert_eq!(outcome.status, 0);
        assert_eq!(outcome.error, "");
        assert!(!outcome.terminated);
        assert!(outcome.pid > 0);
    }

    #[test]
    fn test_stderr_merged_by_default() {
        let outcome = ProcessRunner::new("echo out; echo err >&2").run().unwrap();
        assert!(outcome.output.contains("out"));
        assert!(outcome.output.contains("err"));
        assert_eq!(outcome.error, "");
    }

    #[test]
    fn test_separate_stderr() {
        let outcome = ProcessRunner::new("echo out; echo err >&2")
            .options(RunnerOptions::default().separate_stderr())
            .run()
            .unwrap();
        assert_eq!(outcome.output, "out");
        assert_eq!(outcome.error, "err");
    }

    #[test]
    fn test_sinks_receive_lines() {
        let out = Arc::new(Mutex::new(Vec::new()));
        let err = Arc::new(Mutex::new(Vec::new()));
        let (o, e) = (out.clone(), err.clone());

        let outcome = ProcessRunner::new("printf 'a\\nb\\n'; printf 'x\\n' >&2")
            .options(
                RunnerOptions::default()
                    .output_sink(move |l| o.lock().unwrap().push(l.to_string()))
                    .error_sink(move |l| e.lock().unwrap().push(l.to_string())),
            )
            .run()
            .unwrap();

        assert_eq!(*out.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(*err.lock().unwrap(), vec!["x"]);
        assert_eq!(outcome.output, "a\nb");
        assert_eq!(outcome.error, "x");
    }

    #[test]
    fn test_argv_without_shell() {
        let outcome = ProcessRunner::new(["printf", "%s-%s", "a b", "c"]).run().unwrap();
        assert_eq!(outcome.output, "a b-c");
    }

    #[test]
    fn test_input_is_fed() {
        let outcome = ProcessRunner::new("cat").input("from stdin\n").run().unwrap();
        assert_eq!(outcome.output, "from stdin");
    }

    #[test]
    fn test_large_input_to_early_exit_is_not_an_error() {
        let outcome = ProcessRunner::new("head -c 1")
            .input(vec![b'x'; 4 * 1024 * 1024])
            .run()
            .unwrap();
        assert_eq!(outcome.output, "x");
        assert_eq!(outcome.status, 0);
    }

    #[test]
    fn test_output_larger_than_pipe_buffer() {
        let outcome = ProcessRunner::new("head -c 1000000 /dev/zero | tr '\\0' a; echo err >&2")
            .options(RunnerOptions::default().separate_stderr())
            .run()
            .unwrap();
        assert_eq!(outcome.output.len(), 1_000_000);
        assert_eq!(outcome.error, "err");
    }

    #[test]
    fn test_exit_status() {
        let outcome = ProcessRunner::new("exit 3").run().unwrap();
        assert_eq!(outcome.status, 3);
    }

    #[test]
    fn test_launch_error() {
        let err = ProcessRunner::new(["/definitely/not/here"]).run().unwrap_err();
        assert!(matches!(err, HarnessError::Launch { .. }));
    }

    #[test]
    fn test_bad_working_dir_is_launch_error() {
        let err = ProcessRunner::new("true")
            .options(RunnerOptions::default().working_dir("/definitely/not/here"))
            .run()
            .unwrap_err();
        assert!(matches!(err, HarnessError::Launch { .. }));
    }

    #[test]
    fn test_working_dir_and_env() {
        let outcome = ProcessRunner::new("pwd; echo $ONLY_VAR")
            .options(
                RunnerOptions::default()
                    .working_dir("/")
                    .env([("ONLY_VAR", "set")]),
            )
            .run()
            .unwrap();
        assert_eq!(outcome.output, "/\nset");
    }

    #[test]
    fn test_timeout_terminates() {
        let start = Instant::now();
        let outcome = ProcessRunner::new("sleep 30")
            .options(RunnerOptions::default().grace_period(Duration::from_secs(2)))
            .timeout(Some(Duration::from_millis(200)))
            .run()
            .unwrap();

        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(outcome.terminated);
        assert_eq!(outcome.status, -libc::SIGTERM);
    }

    #[test]
    fn test_timeout_escalates_to_kill() {
        let start = Instant::now();
        let outcome = ProcessRunner::new("trap '' TERM; sleep 30")
            .options(RunnerOptions::default().grace_period(Duration::from_millis(300)))
            .timeout(Some(Duration::from_millis(200)))
            .run()
            .unwrap();

        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(outcome.terminated);
        assert_eq!(outcome.status, -libc::SIGKILL);
    }

    #[test]
    fn test_background_stop_twice() {
        let mut process = ProcessRunner::new("sleep 30").start().unwrap();
        assert!(process.pid() > 0);
        assert!(process.is_running());
        assert!(process.outcome().is_none());

        let first = process.stop().unwrap().clone();
        assert!(first.terminated);
        assert_eq!(first.status, -libc::SIGTERM);

        let second = process.stop().unwrap().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn test_background_finished_command() {
        let mut process = ProcessRunner::new("echo done").start().unwrap();
        assert!(process.wait(None));
        let outcome = process.stop().unwrap();
        assert_eq!(outcome.output, "done");
        assert!(!outcome.terminated);
    }

    #[test]
    fn test_wait_shares_one_deadline() {
        // Writer, stderr and stdout drain all stay blocked on a sleeping child.
        let mut process = ProcessRunner::new("sleep 30")
            .options(RunnerOptions::default().separate_stderr())
            .input(vec![b'x'; 4 * 1024 * 1024])
            .start()
            .unwrap();

        let budget = Duration::from_millis(300);
        let start = Instant::now();
        assert!(!process.wait(Some(budget)));
        let elapsed = start.elapsed();
        assert!(elapsed >= budget);
        assert!(elapsed < budget * 2, "waited {elapsed:?}");

        let outcome = process.stop().unwrap();
        assert!(outcome.terminated);
        assert_eq!(outcome.status, -libc::SIGTERM);
    }

    #[test]
    fn test_task_failure_reported_once() {
        let mut process = ProcessRunner::new("echo one")
            .options(RunnerOptions::default().output_sink(|_| panic!("sink failed")))
            .start()
            .unwrap();

        let err = process.stop().unwrap_err();
        assert!(matches!(err, HarnessError::TaskPanicked { task: "stdout", .. }));

        let outcome = process.stop().unwrap();
        assert_eq!(outcome.command, "echo one");
        assert!(process.outcome().is_some());
    }

    #[test]
    fn test_wait_with_expired_budget() {
        let mut process = ProcessRunner::new("sleep 30").start().unwrap();
        assert!(!process.wait(Some(Duration::ZERO)));
        assert!(process.stop().unwrap().terminated);
    }
}
