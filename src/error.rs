//! Error types for budget-tracking operations.
//!
//! This module provides the error hierarchy for all limiter operations:
//! storage errors, configuration errors, connection errors, and call
//! lifecycle violations.

use thiserror::Error;

use crate::call::CallPhase;
use crate::upstream::UpstreamError;

/// Result type for budget-tracking operations.
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Main error type for budget-tracking operations.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Connection error (e.g., Redis connection failed).
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Upstream call failed before any rate-limit outcome was known.
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// An outbound-call guard was driven out of order.
    #[error("Invalid call transition: cannot {action} from {from:?}")]
    InvalidTransition {
        /// Phase the call was in.
        from: CallPhase,
        /// The attempted operation.
        action: &'static str,
    },
}

/// Storage-related errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Generic storage operation failed.
    #[error("{message}")]
    OperationFailed {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A stored window had missing or non-numeric fields.
    #[error("Malformed window entry for key {0}")]
    MalformedEntry(String),

    /// Connection pool exhausted.
    #[error("Connection pool exhausted")]
    PoolExhausted,
}

impl StorageError {
    /// Create a new operation failed error.
    pub fn operation_failed(message: impl Into<String>, retryable: bool) -> Self {
        Self::OperationFailed {
            message: message.into(),
            retryable,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::OperationFailed { retryable, .. } => *retryable,
            Self::PoolExhausted => true,
            Self::MalformedEntry(_) => false,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Admission threshold outside (0, 1].
    #[error("Invalid admission threshold: {0}")]
    InvalidThreshold(f64),

    /// Invalid window definition.
    #[error("Invalid window definition: {0}")]
    InvalidQuota(String),

    /// A scope was configured with no default windows.
    #[error("No default windows configured for {0} scope")]
    EmptyDefaults(&'static str),
}

/// Connection-related errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Failed to connect.
    #[error("Failed to connect: {0}")]
    ConnectionFailed(String),

    /// Connection timeout.
    #[error("Connection timeout after {0:?}")]
    Timeout(std::time::Duration),
}
