//! # Error Types
//!
//! Domain-specific error types for arqueo-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  arqueo-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  arqueo-db errors (separate crate)                                     │
//! │  └── DbError          - Store failures, contention, retry exhaustion   │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → calling business flow   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (codes, categories, ids)
//! 3. Errors are enum variants, never String
//! 4. A non-zero reconciliation difference is DATA, not an error - there is
//!    deliberately no variant for it

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations. They surface to the
/// calling flow unchanged; nothing here is silently swallowed or retried.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The requested state change has no active rule in the transition table.
    ///
    /// ## When This Occurs
    /// - The `(from, to, category)` rule row is missing or deactivated
    /// - A closing review is re-applied to an already-terminal closing
    ///
    /// The entity is left untouched; the caller decides what to show.
    #[error("invalid transition {from} -> {to} in category '{category}'")]
    InvalidTransition {
        from: String,
        to: String,
        category: String,
    },

    /// A state `(code, category)` pair does not resolve to an active
    /// definition.
    #[error("unknown state '{code}' in category '{category}'")]
    UnknownState { code: String, category: String },

    /// A cash session already has a closing; it is read-only from then on.
    #[error("cash session {0} is closed")]
    SessionClosed(String),

    /// Validation error (wraps ValidationError).
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when caller-supplied input doesn't meet requirements.
/// Used for early validation before any write happens.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must be strictly positive (movement amounts).
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative (opening amounts).
    #[error("{field} must not be negative")]
    MustBeNonNegative { field: String },

    /// Invalid format (e.g., an empty sequence prefix).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
