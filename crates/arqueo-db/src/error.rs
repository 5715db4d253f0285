//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ├── Contention ← retried by the sequence allocator ONLY          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Calling business flow ← everything else propagates unchanged          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Contention is the only locally recovered condition, and only inside the
//! allocator's bounded retry loop. No error is silently swallowed.

use arqueo_core::CoreError;
use thiserror::Error;

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and user feedback.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Second closing for the same session
    /// - Duplicate (code, category) state definition
    /// - Duplicate suffix within a sequence partition (should be prevented
    ///   by the allocator's lock; the constraint is the last line of defense)
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Lock conflict (SQLITE_BUSY / SQLITE_LOCKED).
    ///
    /// ## When This Occurs
    /// - Two allocators race for the same partition's write lock
    ///
    /// Retried internally by the sequence allocator; never surfaced unless
    /// retries are exhausted.
    #[error("Lock contention: {0}")]
    Contention(String),

    /// The allocator's bounded retry loop gave up. Fatal and non-retryable:
    /// no code was returned, nothing was persisted.
    #[error("Lock contention persisted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// A business rule violation surfaced from arqueo-core
    /// (invalid transition, unknown state, validation failure).
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// The requested entity type has no current-state binding registered.
    #[error("No workflow binding for entity type '{0}'")]
    UnknownEntityType(String),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

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

    /// Whether this error is lock contention the allocator may retry.
    pub fn is_contention(&self) -> bool {
        matches!(self, DbError::Contention(_))
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound            → DbError::NotFound
/// sqlx::Error::Database ("locked")    → DbError::Contention
/// sqlx::Error::Database (constraint)  → UniqueViolation / ForeignKey
/// sqlx::Error::PoolTimedOut           → DbError::PoolExhausted
/// Other                               → DbError::Internal
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

                // SQLite signals lock contention as SQLITE_BUSY ("database is
                // locked") or SQLITE_LOCKED ("database table is locked").
                if msg.contains("database is locked") || msg.contains("database table is locked") {
                    DbError::Contention(msg.to_string())
                } else if msg.contains("UNIQUE constraint failed") {
                    // Parse the field name from the error message
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

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
