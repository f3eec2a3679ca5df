//! Logging configuration
//!
//! Initializes tracing for the application. Logs go to stderr so reports
//! written to stdout stay machine-readable.

/// Environment variable that overrides the log filter
pub const LOG_ENV_VAR: &str = "CHECKLINE_LOG";

/// Initializes logging with the specified default level
///
/// `CHECKLINE_LOG` takes precedence when set, using `EnvFilter` directives
/// such as `checkline=debug`.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(level));

    // A subscriber may already be installed (tests, embedding callers).
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice_does_not_panic() {
        init_logging("debug");
        init_logging("warn");
    }
}
