//! Transport-level error types.

use thiserror::Error;

/// Errors raised while talking to the messaging platform.
///
/// Variants carry string reasons rather than source errors so the type
/// stays `Clone` and crosses task boundaries freely.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The update-fetch request failed at the network level.
    #[error("failed to fetch updates: {reason}")]
    FetchFailed {
        /// Reason for the failure.
        reason: String,
    },

    /// The platform answered the fetch with an error payload.
    #[error("platform rejected the request: {description}")]
    PlatformError {
        /// The platform's error description.
        description: String,
    },

    /// The response body could not be decoded.
    #[error("invalid response payload: {0}")]
    InvalidResponse(String),

    /// Invalid transport configuration.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// I/O error, e.g. while binding the webhook listener.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

#[cfg(feature = "http-client")]
impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::FetchFailed {
            reason: err.to_string(),
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Why a webhook request was denied.
///
/// Authorization failures never surface to handler code; the request is
/// answered with an access-denied response and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The source address is outside the platform's published IPv4 ranges.
    #[error("source address {0} is outside the platform's published ranges")]
    ForbiddenSource(std::net::IpAddr),

    /// Source verification is enabled but no source address is available.
    #[error("no source address available for verification")]
    MissingSource,

    /// The token in the last path segment does not match the secret.
    #[error("webhook path token mismatch")]
    TokenMismatch,
}
