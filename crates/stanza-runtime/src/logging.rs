//! Logging setup using `tracing` and `tracing-subscriber`.
//!
//! ```rust,ignore
//! use stanza_runtime::config::StanzaConfig;
//! use stanza_runtime::logging;
//!
//! let config = StanzaConfig::load()?;
//! logging::init_from_config(&config.logging);
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::fmt;

use crate::config::{LogFormat, LoggingConfig};

/// Initializes the global subscriber from configuration.
///
/// The `RUST_LOG` environment variable, when set, overrides the configured
/// filter. Safe to call more than once; only the first call installs a
/// subscriber.
pub fn init_from_config(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = fmt().with_env_filter(filter);

    let result = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Full => builder.try_init(),
    };

    if result.is_err() {
        tracing::debug!("global subscriber already installed");
    }
}
