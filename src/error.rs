use crate::database::DatabaseError;
use crate::payout::PayoutError;
use sqlx::Error as SqlxError;
use thiserror::Error;

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database errors
    #[error("SQL error: {0}")]
    Sqlx(#[from] SqlxError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed input, rejected before any mutation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Actor lacks the authority for the requested transition
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The bet is not in a state that allows the operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Member cannot cover the stake
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: u64, required: u64 },

    /// Duplicate wager or dispute
    #[error("Conflict: {0}")]
    Conflict(String),

    /// External service errors (result oracle)
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Store-level transaction failure
    #[error("Store error: {0}")]
    Store(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Message(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Stable, machine-readable failure reason for UI feedback
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::Sqlx(_) => "database",
            AppError::Config(_) => "config",
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::InvalidState(_) => "invalid_state",
            AppError::InsufficientBalance { .. } => "insufficient_balance",
            AppError::Conflict(_) => "conflict",
            AppError::ExternalService(_) => "external_service",
            AppError::Store(_) => "store",
            AppError::Serialization(_) => "serialization",
            AppError::Message(_) => "internal",
        }
    }

    /// Check if error is a database connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            AppError::Database(DatabaseError::PoolCreation(_))
                | AppError::Database(DatabaseError::ConnectionTimeout)
        )
    }

    /// Check if error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    /// Precondition failures the user may retry after refreshing
    pub fn is_user_retryable(&self) -> bool {
        matches!(
            self,
            AppError::InvalidState(_) | AppError::InsufficientBalance { .. }
        )
    }

    /// Get HTTP status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::NotFound(_) => 404,
            AppError::Unauthorized(_) => 403,
            AppError::Validation(_) => 400,
            AppError::InvalidState(_) | AppError::Conflict(_) => 409,
            AppError::InsufficientBalance { .. } => 422,
            AppError::ExternalService(_) => 502,
            _ => 500,
        }
    }
}

impl From<PayoutError> for AppError {
    fn from(err: PayoutError) -> Self {
        match err {
            PayoutError::KindMismatch { .. } => AppError::Validation(err.to_string()),
            PayoutError::Overflow => AppError::Message(err.to_string()),
        }
    }
}

/// Repository-specific error types
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database query error
    #[error("Query error: {0}")]
    Query(SqlxError),

    /// Record not found
    #[error("Record not found")]
    NotFound(String),

    /// Duplicate record
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Row could not be decoded into a domain record
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => AppError::NotFound(msg),
            RepositoryError::Query(e) => AppError::Sqlx(e),
            RepositoryError::Duplicate(msg) => AppError::Conflict(msg),
            RepositoryError::ConstraintViolation(msg) => AppError::Validation(msg),
            RepositoryError::Corrupt(msg) => AppError::Store(msg),
        }
    }
}

impl From<SqlxError> for RepositoryError {
    fn from(err: SqlxError) -> Self {
        match &err {
            SqlxError::RowNotFound => RepositoryError::NotFound("Record not found".to_string()),
            SqlxError::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                match code.as_deref() {
                    // unique_violation
                    Some("23505") => RepositoryError::Duplicate(db_err.message().to_string()),
                    // foreign_key_violation, check_violation
                    Some("23503") | Some("23514") => {
                        RepositoryError::ConstraintViolation(db_err.message().to_string())
                    }
                    _ => RepositoryError::Query(err),
                }
            }
            _ => RepositoryError::Query(err),
        }
    }
}

/// Convenience function to convert Option<T> to Result<T, AppError>
pub fn option_to_result<T>(opt: Option<T>, error_msg: &str) -> AppResult<T> {
    opt.ok_or_else(|| AppError::NotFound(error_msg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_errors_are_retryable() {
        assert!(AppError::InvalidState("bet is locked".into()).is_user_retryable());
        assert!(AppError::InsufficientBalance { available: 5, required: 10 }.is_user_retryable());
        assert!(!AppError::Validation("bad amount".into()).is_user_retryable());
    }

    #[test]
    fn test_error_kinds_and_codes() {
        let err = AppError::InsufficientBalance { available: 5, required: 10 };
        assert_eq!(err.kind(), "insufficient_balance");
        assert_eq!(err.status_code(), 422);
        assert_eq!(AppError::Conflict("dup".into()).status_code(), 409);
        assert!(err.to_string().contains("available 5"));
    }

    #[test]
    fn test_repository_error_mapping() {
        let app: AppError = RepositoryError::Duplicate("wager".into()).into();
        assert_eq!(app.kind(), "conflict");
        let app: AppError = RepositoryError::NotFound("bet".into()).into();
        assert!(app.is_not_found());
    }
}
