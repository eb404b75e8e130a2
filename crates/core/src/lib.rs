//! Shared primitives for all opslock crates.

#![forbid(unsafe_code)]

use thiserror::Error;

/// Result type used across opslock crates.
pub type AppResult<T> = Result<T, AppError>;

/// Common error categories surfaced by opslock services and adapters.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Write operation conflicts with existing state, including the
    /// store's duplicate-identity signal.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Target is held by a live, non-expired event.
    #[error("event locked: {0}")]
    EventLocked(String),

    /// Cancellation was attempted on an event that does not accept it.
    #[error("event is not cancelable")]
    NotCancelable,

    /// Cancellation found no live record in the expected state.
    #[error("event not found")]
    EventNotFound,

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}
