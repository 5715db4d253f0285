//! # Workflow State Types
//!
//! Types backing the state registry and transition engine, plus the pure
//! legality rule every transition is checked against.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Workflow State Model                              │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌──────────────────────┐                       │
//! │  │ StateDefinition  │   │ StateTransitionRule  │                       │
//! │  │  ──────────────  │   │  ──────────────────  │                       │
//! │  │  id              │◄──│  origin_state_id     │                       │
//! │  │  code ("SENT")   │◄──│  dest_state_id       │                       │
//! │  │  category        │   │  category            │                       │
//! │  │  sort_order      │   │  active              │                       │
//! │  │  active          │   └──────────────────────┘                       │
//! │  └──────────────────┘         configuration data, not code             │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────┐                      │
//! │  │ StateHistoryEntry (append-only audit trail)  │                      │
//! │  │  entity_type · entity_id · from → to ·       │                      │
//! │  │  actor_id · reason · created_at              │                      │
//! │  └──────────────────────────────────────────────┘                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## The Legality Rule
//! A transition is legal iff one of:
//! 1. `from == to` (re-asserting the current state),
//! 2. `from` is null (first assignment, bootstrap case),
//! 3. an **active** rule `(from, to, category)` exists in the table.
//!
//! Case 3 requires a store lookup; [`requires_rule`] tells the engine
//! whether it needs one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// State Definition
// =============================================================================

/// A configured workflow state. Immutable once referenced by history;
/// retiring one means flipping `active`, never deleting the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StateDefinition {
    /// Registry-assigned identifier.
    pub id: i64,

    /// Business code, unique within the category (e.g. "SENT").
    pub code: String,

    /// Workflow namespace this state belongs to.
    pub category: String,

    /// Display ordering within the category.
    pub sort_order: i64,

    /// Whether the state may still be resolved and assigned.
    pub active: bool,
}

// =============================================================================
// State Transition Rule
// =============================================================================

/// One permitted edge of a workflow's state graph. Configuration data:
/// deployments change the graph by editing rows, not code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StateTransitionRule {
    pub id: i64,
    pub origin_state_id: i64,
    pub dest_state_id: i64,
    pub category: String,
    pub active: bool,
}

// =============================================================================
// State History Entry
// =============================================================================

/// One audited state change. Append-only: never updated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StateHistoryEntry {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Type tag of the entity that changed (e.g. "quote").
    pub entity_type: String,

    /// Identifier of the entity that changed.
    pub entity_id: String,

    /// State before the change; `None` on first assignment.
    pub from_state_id: Option<i64>,

    /// State after the change.
    pub to_state_id: i64,

    /// Opaque id of the acting principal, as supplied by the identity
    /// service.
    pub actor_id: String,

    /// Optional free-text justification.
    pub reason: Option<String>,

    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Legality Rule
// =============================================================================

/// Whether a transition needs a rule-table lookup to be legal.
///
/// Returns `false` for the two unconditionally legal cases (bootstrap and
/// same-state); `true` means the engine must find an active
/// `(from, to, category)` rule or fail with `InvalidTransition`.
pub fn requires_rule(from: Option<i64>, to: i64) -> bool {
    match from {
        None => false,
        Some(from) => from != to,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
