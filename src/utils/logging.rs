//! Structured Logging Setup
//!
//! Thin wrapper around `tracing-subscriber` driven by [`LoggingConfig`].
//! Initialization is idempotent: the first caller installs the global
//! subscriber, later calls are no-ops.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber from a logging configuration.
///
/// Honors `RUST_LOG` when set, falling back to the configured level.
/// Returns false when a subscriber was already installed.
pub fn init(config: &LoggingConfig) -> bool {
    if !config.log_to_console {
        return false;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{}={}",
            env!("CARGO_CRATE_NAME"),
            config.log_level.to_string().to_lowercase()
        ))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if config.json_format {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}

/// Install the global subscriber with default settings.
pub fn init_default() -> bool {
    init(&LoggingConfig::default())
}
