//! Termination signals for supervised children.

use std::io;

/// Signal sent by `stop()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// SIGTERM, graceful.
    Terminate,
    /// SIGKILL, forced.
    Kill,
}

#[cfg(unix)]
impl Signal {
    fn as_libc_signal(self) -> libc::c_int {
        match self {
            Signal::Terminate => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        }
    }
}

/// Deliver `signal` to `pid`, or to its whole process group when the child
/// leads one. A target that is already gone is not an error.
#[cfg(unix)]
pub(crate) fn send(pid: u32, group: bool, signal: Signal) -> io::Result<()> {
    let pid = pid as libc::pid_t;
    let result = unsafe {
        if group {
            libc::killpg(pid, signal.as_libc_signal())
        } else {
            libc::kill(pid, signal.as_libc_signal())
        }
    };
    if result == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    Ok(())
}

/// Exit status with the negative-signal convention for killed children.
#[cfg(unix)]
pub(crate) fn status_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .unwrap_or_else(|| -status.signal().unwrap_or(0))
}

#[cfg(not(unix))]
pub(crate) fn status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_status_code_exit() {
        let status = Command::new("/bin/sh").args(["-c", "exit 7"]).status().unwrap();
        assert_eq!(status_code(status), 7);
    }

    #[test]
    fn test_terminate_gives_negative_status() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        send(child.id(), false, Signal::Terminate).unwrap();
        let status = child.wait().unwrap();
        assert_eq!(status_code(status), -libc::SIGTERM);
    }

    #[test]
    fn test_reaped_target_is_not_an_error() {
        let mut child = Command::new("true").spawn().unwrap();
        child.wait().unwrap();
        // pid is free now; ESRCH is swallowed
        assert!(send(child.id(), true, Signal::Kill).is_ok());
    }
}
