//! Error types for the Tether engine.

use crate::CollectionName;
use thiserror::Error;

/// All possible errors from the Tether engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Configuration errors
    #[error("invalid collection declaration: missing {0}")]
    InvalidCollection(String),

    #[error("collection already declared: {0}")]
    DuplicateCollection(CollectionName),

    #[error("collection not found: {0}")]
    CollectionNotFound(CollectionName),

    #[error("invalid field path: {0:?}")]
    InvalidFieldPath(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // Data errors
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid sync state: {0}")]
    InvalidSyncState(u8),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    // Adapter errors
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Delivered to a mutation's error callback when its record cannot be synced.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MutationError {
    #[error("collection not found: {0}")]
    UnknownCollection(CollectionName),

    #[error("records must be JSON objects, got {0}")]
    NotAnObject(&'static str),

    #[error("remote rejected the record with status {0}")]
    Rejected(u16),

    #[error("remote still failing after {0} attempts")]
    RetriesExhausted(u32),
}
