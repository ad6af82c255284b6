//! Blocking workers that can be joined with a deadline.

use std::io;
use std::sync::OnceLock;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

/// Runtime owning the blocking pool used for child I/O.
static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// The shared I/O runtime, built on first use.
///
/// Joining blocks the calling thread, so callers inside an async context go
/// through `spawn_blocking` first.
fn io_runtime() -> io::Result<&'static Runtime> {
    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime);
    }
    let runtime = Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("cmd-harness-io")
        .enable_time()
        .build()?;
    Ok(RUNTIME.get_or_init(|| runtime))
}

enum State<T> {
    Running,
    Finished(T),
    Panicked,
    Taken,
}

/// A named `spawn_blocking` task whose joins can be bounded.
pub(crate) struct Task<T> {
    name: &'static str,
    runtime: &'static Runtime,
    handle: Option<JoinHandle<T>>,
    state: State<T>,
}

impl<T: Send + 'static> Task<T> {
    pub(crate) fn spawn<F>(name: &'static str, body: F) -> io::Result<Self>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let runtime = io_runtime()?;
        let handle = runtime.spawn_blocking(body);

        Ok(Self {
            name,
            runtime,
            handle: Some(handle),
            state: State::Running,
        })
    }
}

impl<T> Task<T> {
    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    /// Non-blocking check; collects the result if the body has finished.
    pub(crate) fn is_alive(&mut self) -> bool {
        let finished = match &self.handle {
            Some(handle) => handle.is_finished(),
            None => return false,
        };
        if finished {
            self.join();
        }
        !finished
    }

    /// Wait up to `timeout` for the body to finish. Returns whether it did.
    pub(crate) fn join_timeout(&mut self, timeout: Duration) -> bool {
        let runtime = self.runtime;
        let Some(handle) = self.handle.as_mut() else {
            return true;
        };
        match runtime.block_on(tokio::time::timeout(timeout, handle)) {
            Ok(result) => {
                self.finish(result);
                true
            }
            Err(_) => false,
        }
    }

    /// Wait for the body without a bound.
    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            let result = self.runtime.block_on(handle);
            self.finish(result);
        }
    }

    /// Take the body's value. `None` if it panicked, is still running, or was
    /// already taken.
    pub(crate) fn take(&mut self) -> Option<T> {
        match std::mem::replace(&mut self.state, State::Taken) {
            State::Finished(value) => Some(value),
            State::Running => {
                self.state = State::Running;
                None
            }
            State::Panicked | State::Taken => None,
        }
    }

    pub(crate) fn panicked(&self) -> bool {
        matches!(self.state, State::Panicked)
    }

    fn finish(&mut self, result: Result<T, JoinError>) {
        self.handle = None;
        self.state = match result {
            Ok(value) => State::Finished(value),
            Err(e) => {
                debug!(task = self.name, error = %e, "I/O task did not complete");
                State::Panicked
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::time::Instant;

    #[test]
    fn test_join_returns_value() {
        let mut task = Task::spawn("value", || 42).unwrap();
        task.join();
        assert!(!task.is_alive());
        assert_eq!(task.take(), Some(42));
        assert_eq!(task.take(), None);
    }

    #[test]
    fn test_join_timeout_expires() {
        let gate = Arc::new(Barrier::new(2));
        let inner = gate.clone();
        let mut task = Task::spawn("blocked", move || {
            inner.wait();
        })
        .unwrap();

        let start = Instant::now();
        assert!(!task.join_timeout(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(task.is_alive());

        gate.wait();
        assert!(task.join_timeout(Duration::from_secs(5)));
        assert!(!task.is_alive());
    }

    #[test]
    fn test_zero_timeout_does_not_block() {
        let gate = Arc::new(Barrier::new(2));
        let inner = gate.clone();
        let mut task = Task::spawn("zero", move || inner.wait()).unwrap();

        assert!(!task.join_timeout(Duration::ZERO));
        gate.wait();
        task.join();
    }

    #[test]
    fn test_runs_on_io_runtime() {
        let mut task = Task::spawn("named", || {
            std::thread::current().name().map(String::from)
        })
        .unwrap();
        task.join();
        assert_eq!(task.take().flatten().as_deref(), Some("cmd-harness-io"));
    }

    #[test]
    fn test_panicked_body() {
        let mut task: Task<()> = Task::spawn("boom", || panic!("boom")).unwrap();
        task.join();
        assert!(task.panicked());
        assert_eq!(task.name(), "boom");
        assert!(task.take().is_none());
    }
}
