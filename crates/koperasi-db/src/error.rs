//! # Database Error Types
//!
//! Error types for store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  ValidationError / CoreError (koperasi-core)   SQLite Error (sqlx)     │
//! │               │                                      │                  │
//! │               └──────────────┬───────────────────────┘                  │
//! │                              ▼                                          │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ├── kind() == Conflict     → retry_on_conflict() re-runs commit  │
//! │       ├── kind() == Persistence  → "please try again"                  │
//! │       └── otherwise              → reason shown to the operator        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Whatever the error, the commit's transaction has been rolled back: no
//! partial ledger rows exist.

use koperasi_core::{CoreError, ErrorKind};
use thiserror::Error;

/// Store operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// A business rule or validation failure from koperasi-core.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - `fetch_one` returns no rows
    /// - ID doesn't exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Inserting duplicate SKU
    /// - Duplicate member number or supplier code
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// The row changed (or the database was locked) between read and write.
    ///
    /// ## When This Occurs
    /// - Another till sold the same product mid-checkout (version bumped)
    /// - SQLite reported BUSY / LOCKED
    ///
    /// The whole commit must be retried.
    #[error("Concurrent update on {entity} {id}")]
    ConcurrencyConflict { entity: String, id: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed to begin or commit.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates a ConcurrencyConflict error.
    pub fn conflict(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::ConcurrencyConflict {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Classifies the error for the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::Core(err) => err.kind(),
            DbError::NotFound { .. } => ErrorKind::NotFound,
            DbError::UniqueViolation { .. } => ErrorKind::BusinessRule,
            DbError::ForeignKeyViolation { .. } | DbError::Config(_) => ErrorKind::Validation,
            DbError::ConcurrencyConflict { .. } => ErrorKind::Conflict,
            DbError::ConnectionFailed(_)
            | DbError::MigrationFailed(_)
            | DbError::QueryFailed(_)
            | DbError::TransactionFailed(_)
            | DbError::PoolExhausted
            | DbError::Internal(_) => ErrorKind::Persistence,
        }
    }

    /// True when re-running the whole commit may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// Message safe to show at the till.
    ///
    /// Rejections explain themselves; storage failures do not leak SQL.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Persistence => {
                "The transaction could not be saved. Please try again.".to_string()
            }
            ErrorKind::Conflict => {
                "Data changed while saving. Please try again.".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Shorthand for wrapping a core rule violation.
    pub fn core(err: impl Into<CoreError>) -> Self {
        DbError::Core(err.into())
    }
}

impl From<koperasi_core::ValidationError> for DbError {
    fn from(err: koperasi_core::ValidationError) -> Self {
        DbError::Core(err.into())
    }
}

fn is_lock_error(code: Option<&str>, message: &str) -> bool {
    // SQLITE_BUSY (5), SQLITE_LOCKED (6) and their extended codes
    let by_code = code
        .and_then(|c| c.parse::<i32>().ok())
        .map(|c| matches!(c & 0xff, 5 | 6))
        .unwrap_or(false);
    by_code || message.contains("database is locked") || message.contains("database table is locked")
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze code/message for constraint or lock
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // UNIQUE constraint: "UNIQUE constraint failed: <table>.<column>"
                // FK constraint: "FOREIGN KEY constraint failed"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if is_lock_error(db_err.code().as_deref(), msg) {
                    DbError::conflict("database", "locked")
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<toml::de::Error> for DbError {
    fn from(err: toml::de::Error) -> Self {
        DbError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DbError {
    fn from(err: toml::ser::Error) -> Self {
        DbError::Config(err.to_string())
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        DbError::Config(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use koperasi_core::Money;

    #[test]
    fn test_kinds_and_retry() {
        assert!(DbError::conflict("Product", "p1").is_retryable());
        assert!(!DbError::QueryFailed("boom".into()).is_retryable());
        assert_eq!(DbError::PoolExhausted.kind(), ErrorKind::Persistence);
        assert_eq!(DbError::not_found("Sale", "x").kind(), ErrorKind::NotFound);

        let rule = DbError::from(CoreError::Overpayment {
            remaining: Money::zero(),
            attempted: Money::from_rupiah(1),
        });
        assert_eq!(rule.kind(), ErrorKind::BusinessRule);
        assert!(!rule.is_retryable());
    }

    #[test]
    fn test_user_message_hides_storage_detail() {
        let msg = DbError::QueryFailed("no such column: stok".into()).user_message();
        assert!(!msg.contains("stok"));

        let msg = DbError::from(CoreError::EmptyCart).user_message();
        assert_eq!(msg, "Cart is empty");
    }

    #[test]
    fn test_lock_detection() {
        assert!(is_lock_error(Some("5"), ""));
        assert!(is_lock_error(Some("517"), ""));
        assert!(is_lock_error(None, "database is locked"));
        assert!(!is_lock_error(Some("19"), "constraint failed"));
    }
}
