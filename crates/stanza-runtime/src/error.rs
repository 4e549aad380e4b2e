//! Runtime error types.

use thiserror::Error;

/// Errors that abort driver startup or surface from driver operation.
///
/// Per-update failures are never represented here — they are routed to the
/// global error handler and swallowed so the drivers keep serving. Only
/// registration conflicts and malformed startup configuration are fatal.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Handler registration conflict detected at startup.
    #[error(transparent)]
    Registry(#[from] stanza_framework::RegistryError),

    /// Transport-level failure while starting a driver.
    #[error(transparent)]
    Transport(#[from] stanza_transport::TransportError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
