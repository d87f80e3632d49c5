//! Error types for typedkv
//!
//! Provides a unified error type for all operations. A failed atomic check is
//! not an error: it is reported as [`crate::CommitResult::CheckFailed`].

use thiserror::Error;

/// Result type alias using TkvError
pub type Result<T> = std::result::Result<T, TkvError>;

/// Unified error type for typedkv operations
#[derive(Debug, Error)]
pub enum TkvError {
    // -------------------------------------------------------------------------
    // Backend Errors
    // -------------------------------------------------------------------------
    #[error("Backend is closed")]
    BackendClosed,

    #[error("Key too large: {size} bytes (max {max})")]
    KeyTooLarge { size: usize, max: usize },

    #[error("Value too large: {size} bytes (max {max})")]
    ValueTooLarge { size: usize, max: usize },

    #[error("Too many checks in atomic operation: {count} (max {max})")]
    TooManyChecks { count: usize, max: usize },

    #[error("Too many mutations in atomic operation: {count} (max {max})")]
    TooManyMutations { count: usize, max: usize },

    // -------------------------------------------------------------------------
    // Key Model Errors
    // -------------------------------------------------------------------------
    #[error("Key decode error: {0}")]
    KeyDecode(String),

    #[error("Key shape mismatch: expected {expected} segments, got {actual}")]
    KeyShape { expected: usize, actual: usize },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // List Errors
    // -------------------------------------------------------------------------
    #[error("Invalid list cursor: {0}")]
    InvalidCursor(String),

    // -------------------------------------------------------------------------
    // Watch Errors
    // -------------------------------------------------------------------------
    #[error("Watch stream closed")]
    WatchClosed,
}

impl From<bincode::Error> for TkvError {
    fn from(err: bincode::Error) -> Self {
        TkvError::Serialization(err.to_string())
    }
}
