//! Error types for dictcache.
//!
//! This module provides the error hierarchy using `thiserror`.
//! Every error is surfaced synchronously to the call that triggered it;
//! nothing inside the cache retries on its own.

use thiserror::Error;

use crate::types::AttributeType;

/// Result type alias using `DictError`.
pub type Result<T> = std::result::Result<T, DictError>;

/// Main error type for all dictcache operations.
#[derive(Debug, Error)]
pub enum DictError {
    // ═══════════════════════════════════════════════════════════════════════════
    // REFILL ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// The update queue is at capacity; the refill request was rejected.
    #[error("Update queue is full: {len} of {capacity} units queued")]
    QueueFull { capacity: usize, len: usize },

    /// An awaited refill did not complete before the deadline.
    #[error("Refill of {keys} keys did not complete within {timeout_ms}ms, source seems unavailable")]
    RefillTimedOut { keys: usize, timeout_ms: u64 },

    /// The update queue has been closed and accepts no more work.
    #[error("Update queue is closed")]
    QueueClosed,

    // ═══════════════════════════════════════════════════════════════════════════
    // SCHEMA ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// An attribute was accessed with an incompatible value type.
    #[error("Type mismatch for attribute '{attribute}': expected {expected}, got {actual}")]
    TypeMismatch {
        attribute: String,
        expected: AttributeType,
        actual: AttributeType,
    },

    /// The named attribute does not exist in the dictionary structure.
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    /// Invalid dictionary structure.
    #[error("Invalid dictionary structure: {0}")]
    InvalidStructure(String),

    /// Invalid argument passed to a lookup.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // SOURCE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// The backing source failed to load keys.
    #[error("Source error: {0}")]
    SourceError(String),

    /// A row returned by the source does not match the structure.
    #[error("Invalid source row for key {key}: {reason}")]
    InvalidRow { key: u64, reason: String },

    // ═══════════════════════════════════════════════════════════════════════════
    // I/O & SERIALIZATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// File I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl DictError {
    /// Returns true if the same call may succeed later without any change.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DictError::QueueFull { .. } | DictError::RefillTimedOut { .. } | DictError::SourceError(_)
        )
    }

    /// Returns true if this error comes from a schema or type problem.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            DictError::TypeMismatch { .. }
                | DictError::UnknownAttribute(_)
                | DictError::InvalidStructure(_)
                | DictError::InvalidRow { .. }
        )
    }
}
