//! Error types for promsd
//!
//! Provides a unified error type for all store operations.

use thiserror::Error;

/// Result type alias using SdError
pub type Result<T> = std::result::Result<T, SdError>;

/// Unified error type for promsd operations
#[derive(Debug, Error)]
pub enum SdError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL / Checkpoint Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Coordination service error: {0}")]
    Http(String),

    #[error("Could not decode record for target group {group}: {reason}")]
    RecordDecode { group: String, reason: String },

    #[error("Could not acquire lock for target group {group}: {reason}")]
    LockAcquisition { group: String, reason: String },

    #[error("Engine closed")]
    Closed,

    // -------------------------------------------------------------------------
    // Validation Errors
    // -------------------------------------------------------------------------
    #[error("Invalid target group name: {0:?}")]
    InvalidGroup(String),

    #[error("Invalid target: {0:?}")]
    InvalidTarget(String),

    #[error("Invalid label name: {0:?}")]
    InvalidLabel(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl SdError {
    /// Whether the error was caused by the caller's input rather than the
    /// store. Everything else is reported as a server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SdError::InvalidGroup(_) | SdError::InvalidTarget(_) | SdError::InvalidLabel(_)
        )
    }

    /// Whether the error is a storage failure (I/O, network, decode of a
    /// persisted record during a read-modify-write).
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            SdError::Io(_)
                | SdError::WalCorruption(_)
                | SdError::Checkpoint(_)
                | SdError::Storage(_)
                | SdError::Http(_)
                | SdError::RecordDecode { .. }
        )
    }
}

impl From<bincode::Error> for SdError {
    fn from(e: bincode::Error) -> Self {
        SdError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for SdError {
    fn from(e: serde_json::Error) -> Self {
        SdError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for SdError {
    fn from(e: reqwest::Error) -> Self {
        SdError::Http(e.to_string())
    }
}
