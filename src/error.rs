//! Error types for cmd-harness.

use thiserror::Error;

/// Main error type for cmd-harness operations.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// The child process could not be created.
    #[error("failed to launch '{command}': {source}")]
    Launch {
        command: String,
        source: std::io::Error,
    },

    /// Writing input to the child failed for a reason other than a closed pipe.
    #[error("failed to write input to '{command}': {source}")]
    InputWrite {
        command: String,
        source: std::io::Error,
        /// Output captured before the failure.
        output: String,
    },

    /// Reading one of the child's output streams failed.
    #[error("failed to read {stream} of '{command}': {source}")]
    OutputRead {
        command: String,
        stream: &'static str,
        source: std::io::Error,
        /// Output captured before the failure.
        output: String,
    },

    /// A writer or drain task panicked.
    #[error("{task} task of '{command}' panicked")]
    TaskPanicked { command: String, task: &'static str },

    /// Waiting on the child for its exit status failed.
    #[error("failed to wait on '{command}': {source}")]
    Wait {
        command: String,
        source: std::io::Error,
    },

    /// The command ran but exited with a non-zero status.
    #[error("Command '{command}' returned non-zero exit status {status} with output: {output}")]
    Command {
        status: i32,
        command: String,
        output: String,
    },

    /// Assertion-style failure for a non-zero exit status.
    #[error("Command '{command}' returned non-zero exit status {status}:\n{output}")]
    Assertion {
        status: i32,
        command: String,
        output: String,
    },

    /// A required environment variable is missing.
    #[error("environment variable {0} is not set")]
    MissingEnv(String),

    /// A path could not be placed into a search path.
    #[error("invalid search path entry: {0}")]
    InvalidPath(String),

    /// The blocking task backing an async call failed.
    #[error("background task failed: {0}")]
    Join(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Exit status carried by a non-zero exit failure.
    pub fn status(&self) -> Option<i32> {
        match self {
            Self::Command { status, .. } | Self::Assertion { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Output captured before the failure, if any was attached.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::InputWrite { output, .. }
            | Self::OutputRead { output, .. }
            | Self::Command { output, .. }
            | Self::Assertion { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Convenience Result type for cmd-harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_display() {
        let err = HarnessError::Command {
            status: 3,
            command: "exit 3".into(),
            output: "boom".into(),
        };
        assert!(err.to_string().contains("'exit 3'"));
        assert!(err.to_string().contains("exit status 3"));
        assert_eq!(err.status(), Some(3));
    }

    #[test]
    fn test_assertion_display() {
        let err = HarnessError::Assertion {
            status: 1,
            command: "false".into(),
            output: "line1\nline2".into(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Command 'false' returned non-zero exit status 1:\n"));
        assert!(msg.ends_with("line1\nline2"));
        assert_eq!(err.output(), Some("line1\nline2"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: HarnessError = io_err.into();
        assert!(matches!(err, HarnessError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
        assert!(err.status().is_none());
    }

    #[test]
    fn test_launch_display() {
        let err = HarnessError::Launch {
            command: "nope".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("failed to launch 'nope'"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
