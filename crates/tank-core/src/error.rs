//! Unified error handling for PhoneTank
//!
//! Every fallible operation in the workspace returns [`AppError`]. `NotFound`
//! and `Validation` are expected outcomes surfaced straight to the caller;
//! nothing in the core retries them.

use std::fmt;
use thiserror::Error;

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Domain Errors ====================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Pool exhausted: {message}")]
    PoolExhausted {
        message: String,
        /// Overflow provider fallback identifier, when the subscriber has one
        overflow_fallback_id: Option<String>,
    },

    #[error("{0}")]
    Aggregate(BatchError),

    // ==================== Internal Errors ====================
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Shorthand for a `NotFound` naming the entity kind and the lookup key
    pub fn not_found(kind: &str, key: impl fmt::Display) -> Self {
        AppError::NotFound(format!("{} {}", kind, key))
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation_error",
            AppError::Conflict(_) => "conflict",
            AppError::PoolExhausted { .. } => "pool_exhausted",
            AppError::Aggregate(_) => "aggregate_error",
            AppError::Serialization(_) => "serialization_error",
            AppError::Config(_) => "config_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// True for outcomes the caller is expected to handle (bad input, missing rows)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::NotFound(_)
                | AppError::Validation(_)
                | AppError::Conflict(_)
                | AppError::PoolExhausted { .. }
        )
    }
}

/// Partial failure of a batch operation
///
/// Carries one error per failed element together with the element's
/// position in the submitted batch.
#[derive(Debug, Default)]
pub struct BatchError {
    pub attempted: usize,
    pub failures: Vec<(usize, AppError)>,
}

impl BatchError {
    pub fn new(attempted: usize) -> Self {
        Self {
            attempted,
            failures: Vec::new(),
        }
    }

    pub fn push(&mut self, index: usize, err: AppError) {
        self.failures.push((index, err));
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} batch entries failed",
            self.failures.len(),
            self.attempted
        )?;
        for (index, err) in &self.failures {
            write!(f, "; [{}] {}", index, err)?;
        }
        Ok(())
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::not_found("tank", "abc").error_code(),
            "not_found"
        );
        assert_eq!(
            AppError::Validation("name too short".to_string()).error_code(),
            "validation_error"
        );
        assert_eq!(
            AppError::Aggregate(BatchError::new(3)).error_code(),
            "aggregate_error"
        );
    }

    #[test]
    fn test_not_found_message() {
        let err = AppError::not_found("phone number", 5551234567u64);
        assert_eq!(err.to_string(), "Not found: phone number 5551234567");
        assert!(err.is_recoverable());
        assert!(!AppError::Database("boom".into()).is_recoverable());
    }

    #[test]
    fn test_batch_error_display() {
        let mut batch = BatchError::new(3);
        batch.push(1, AppError::Validation("duplicate phone_number".into()));

        assert_eq!(batch.len(), 1);
        let msg = AppError::Aggregate(batch).to_string();
        assert!(msg.starts_with("1 of 3 batch entries failed"));
        assert!(msg.contains("[1] Validation error: duplicate phone_number"));
    }
}
