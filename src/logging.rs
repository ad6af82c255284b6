//! Logging initialization and configuration.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor an explicit level is given.
pub const DEFAULT_FILTER: &str = "cmd_harness=info";

fn filter(level: Option<&str>) -> EnvFilter {
    match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    }
}

/// Initialize the logging system.
///
/// Uses `level` as the filter directive when given, otherwise the `RUST_LOG`
/// environment variable, falling back to `cmd_harness=info`.
///
/// # Panics
///
/// Panics if called more than once, or if another tracing subscriber
/// has already been set.
pub fn init(level: Option<&str>) {
    tracing_subscriber::registry()
        .with(filter(level))
        .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

/// Try to initialize the logging system.
///
/// Returns `Ok(())` if successful, or `Err` if logging has already been
/// initialized.
pub fn try_init(level: Option<&str>) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(filter(level))
        .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_init_idempotent() {
        let _ = try_init(None);
        let _ = try_init(Some("debug"));
    }

    #[test]
    fn test_explicit_level() {
        let f = filter(Some("cmd_harness=debug"));
        assert!(f.to_string().contains("cmd_harness=debug"));
    }

    #[test]
    fn test_logging_works() {
        let _ = try_init(None);

        tracing::info!(target: "cmd_harness::output", "test info line");
        tracing::error!(target: "cmd_harness::output", "test error line");
    }
}
