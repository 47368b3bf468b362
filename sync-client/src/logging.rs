//! Logging initialisation.

use bucketsync_core::LogSink;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter))
}

/// Install a process-wide fmt subscriber.
///
/// `RUST_LOG` overrides `config.filter`. Returns `false` if a global
/// subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .try_init()
        .is_ok()
}

/// A sink writing to stderr with its own filter, independent of the global
/// subscriber.
pub fn stderr_sink(config: &LoggingConfig) -> LogSink {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(std::io::stderr)
        .finish();
    LogSink::from_subscriber(subscriber)
}
