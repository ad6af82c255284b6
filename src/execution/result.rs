//! Execution result types.

use serde::Serialize;

use crate::process::ProcessOutcome;

/// Result of a completed `run_cmd` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    /// The command as run.
    pub command: String,
    /// Exit code; negative when the command was killed by a signal.
    pub status: i32,
    /// Captured output, right-trimmed.
    pub output: String,
    /// Captured stderr when it was kept separate.
    pub error: String,
    /// Process ID of the command.
    pub pid: u32,
}

impl CommandResult {
    /// Check if the command succeeded (status 0).
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Get output lines.
    pub fn output_lines(&self) -> impl Iterator<Item = &str> {
        self.output.lines()
    }

    /// Message used when a non-zero status is reported as a failure: output
    /// then error, or only the last `limit` output lines behind a marker when
    /// the output is longer than that.
    pub fn failure_output(&self, limit: usize) -> String {
        if limit > 0 {
            let lines: Vec<&str> = self.output.lines().collect();
            if lines.len() > limit {
                return format!(
                    "\n... (last {limit} lines of output)\n{}",
                    lines[lines.len() - limit..].join("\n")
                );
            }
        }
        format!("{}{}", self.output, self.error)
    }
}

impl From<ProcessOutcome> for CommandResult {
    fn from(outcome: ProcessOutcome) -> Self {
        Self {
            command: outcome.command,
            status: outcome.status,
            output: outcome.output,
            error: outcome.error,
            pid: outcome.pid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: i32, output: &str, error: &str) -> CommandResult {
        CommandResult {
            command: "cmd".into(),
            status,
            output: output.into(),
            error: error.into(),
            pid: 1,
        }
    }

    #[test]
    fn test_success() {
        assert!(result(0, "", "").success());
        assert!(!result(2, "", "").success());
        assert!(!result(-9, "", "").success());
    }

    #[test]
    fn test_output_lines() {
        let r = result(0, "line1\nline2\nline3", "");
        let lines: Vec<_> = r.output_lines().collect();
        assert_eq!(lines, vec!["line1", "line2", "line3"]);
    }

    #[test]
    fn test_failure_output_output_then_error() {
        let r = result(1, "out", "err");
        assert_eq!(r.failure_output(0), "outerr");
    }

    #[test]
    fn test_failure_output_truncated() {
        let r = result(1, "a\nb\nc\nd", "err");
        assert_eq!(r.failure_output(2), "\n... (last 2 lines of output)\nc\nd");
    }

    #[test]
    fn test_failure_output_short_enough() {
        let r = result(1, "a\nb", "");
        assert_eq!(r.failure_output(5), "a\nb");
    }

    #[test]
    fn test_from_outcome() {
        let outcome = ProcessOutcome {
            command: "echo hi".into(),
            pid: 42,
            status: 0,
            output: "hi".into(),
            ..ProcessOutcome::default()
        };
        let r = CommandResult::from(outcome);
        assert_eq!(r.command, "echo hi");
        assert_eq!(r.pid, 42);
        assert_eq!(r.output, "hi");
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&result(3, "o", "e")).unwrap();
        assert!(json.contains("\"status\":3"));
        assert!(json.contains("\"pid\":1"));
    }
}
