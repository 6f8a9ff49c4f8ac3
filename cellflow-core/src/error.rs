//! Error types for cellflow.
//!
//! Construction-time and direct-call failures surface as [`CellError`].
//! Failures raised by subscriber callbacks are [`CallbackError`]s; they are
//! contained by the notifier and never reach the writer.

use thiserror::Error;

use crate::reactive::CellId;

/// Boxed error returned by derivation functions and fallible callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T, E = CellError> = std::result::Result<T, E>;

/// Errors surfaced to the immediate caller of a cell operation.
#[derive(Error, Debug)]
pub enum CellError {
    /// Invalid construction arguments or configuration values.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An operation that the cell's kind does not permit.
    #[error("invalid operation on cell {cell}: {reason}")]
    InvalidOperation { cell: CellId, reason: &'static str },

    /// The derivation function of a derived cell failed.
    #[error("failed to compute cell {cell}: {source}")]
    Compute {
        cell: CellId,
        #[source]
        source: BoxError,
    },

    /// Async dispatch was attempted after the shared worker pool shut down.
    #[error("callback executor is unavailable (shut down)")]
    ExecutorUnavailable,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A subscriber callback failed during notification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    /// The callback returned an error.
    #[error("callback failed: {0}")]
    Failed(String),

    /// The callback panicked.
    #[error("callback panicked: {0}")]
    Panicked(String),
}

impl CallbackError {
    /// Build a [`CallbackError::Panicked`] from a `catch_unwind` payload.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        CallbackError::Panicked(message)
    }
}
