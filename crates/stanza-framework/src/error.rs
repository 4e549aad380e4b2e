//! Framework-level error types.

use thiserror::Error;

/// Errors raised while building the handler registry.
///
/// Registration conflicts are configuration errors and are rejected
/// eagerly, before any update is processed.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// Two exact-match handlers were registered for the same key.
    ///
    /// Only conversation steps may be re-registered (the later registration
    /// silently replaces the former); every other trigger kind must be
    /// unique within its key space.
    #[error("duplicate {kind} handler registered for key `{key}`")]
    DuplicateHandler {
        /// The trigger kind the conflict occurred in.
        kind: &'static str,
        /// The conflicting key.
        key: String,
    },
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
