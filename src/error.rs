// src/error.rs
use std::time::Duration;

use thiserror::Error;

/// Failures raised by the poll and vote stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    /// Classify a raw sqlx error, pulling unique violations out into their own variant.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                let constraint = db.constraint().unwrap_or("unknown").to_string();
                return StoreError::UniqueViolation(constraint);
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by the lifecycle and voting engines.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

pub type PollResult<T> = Result<T, PollError>;

pub const RETRY_MESSAGE: &str = "Got error, try again";

impl PollError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        PollError::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        PollError::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        PollError::Validation(msg.into())
    }

    /// Text shown to the chat user for this failure.
    ///
    /// Business failures carry their own corrective message; anything from the
    /// storage layer collapses into a generic retry prompt.
    pub fn user_message(&self) -> &str {
        match self {
            PollError::Conflict(msg) | PollError::NotFound(msg) | PollError::Validation(msg) => {
                msg
            }
            PollError::Storage(_) => RETRY_MESSAGE,
        }
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, PollError::Storage(_))
    }
}

/// Failures talking to the Telegram Bot API.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bot api error {code}: {description}")]
    Api { code: i64, description: String },
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Bad or missing environment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_passes_business_text_through() {
        let err = PollError::conflict("You already have new poll");
        assert_eq!(err.user_message(), "You already have new poll");

        let err = PollError::validation("You need two or more variants to finish poll");
        assert_eq!(err.user_message(), "You need two or more variants to finish poll");
    }

    #[test]
    fn test_storage_errors_map_to_retry() {
        let err = PollError::from(StoreError::Timeout(Duration::from_millis(10)));
        assert!(err.is_storage());
        assert_eq!(err.user_message(), RETRY_MESSAGE);
    }

    #[test]
    fn test_non_database_sqlx_error_is_not_unique_violation() {
        let err = StoreError::from_sqlx(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Database(_)));
    }
}
