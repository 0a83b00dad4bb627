//! Errors raised by this crate itself.
//!
//! Errors coming from the deferred tasks are never wrapped: executors resolve
//! with the task's own error type.

/// Crate-level error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A chunk size must allow at least one task per batch.
    #[error("chunk size must be greater than 0, got {0}")]
    InvalidChunkSize(usize),
}
