//! Process-wide log subscriber.
//!
//! `RUST_LOG` wins over `logging.level` when set. Records emitted through the
//! `log` facade are bridged into the same subscriber.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Fails if one is already installed.
///
/// # Errors
///
/// Returns the subscriber's error when `logging.level` is not a valid filter
/// or a global subscriber exists.
pub fn init(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
}
