use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Installs the global subscriber once for the whole process.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this again
/// (for example from several tests) leaves the first subscriber in place.
pub fn setup_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_thread_ids(true))
            .try_init()
    };

    if installed.is_ok() {
        ::tracing::debug!(level = %config.level, json = config.json, "Tracing initialized");
    }
}
