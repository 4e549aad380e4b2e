//! Unified error types for the Stanza core layer.
//!
//! Each layer of the workspace defines its own per-domain error enum:
//! `ClassifyError` here, `RegistryError` in the framework layer,
//! `TransportError`/`AuthError` in the transport layer. Handler code
//! reports faults through the boxed [`HandlerError`] alias; "stop the chain"
//! is expressed by not invoking the continuation, never by an error.

use thiserror::Error;

/// Errors raised while classifying a raw update payload.
///
/// A payload missing every known variant field is *not* an error — it
/// classifies as [`UpdateKind::Unknown`](crate::UpdateKind::Unknown). Only a
/// payload we cannot identify at all (no update id) is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    /// The payload is not a JSON object.
    #[error("update payload is not a JSON object")]
    NotAnObject,

    /// The payload has no numeric `update_id` field.
    #[error("update payload is missing a numeric `update_id`")]
    MissingUpdateId,
}

/// Result type for update classification.
pub type ClassifyResult<T> = Result<T, ClassifyError>;

/// A fault raised by user handler or middleware code.
///
/// These are genuine errors routed to the global error handler; they are
/// never used for control flow.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by handler callbacks and middleware.
pub type HandlerResult = Result<(), HandlerError>;
