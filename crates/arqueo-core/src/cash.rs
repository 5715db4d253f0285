//! # Cash Session Types & Reconciliation Math
//!
//! Types for the cash-session ledger and the closing/reconciliation
//! workflow, plus the arithmetic the presentation layer must never
//! recompute on its own.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Cash Session Lifecycle                              │
//! │                                                                         │
//! │  open(cashier, register, opening)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  CashSession ──► record_movement (inflow/outflow, append-only) ──┐     │
//! │       ▲                                                           │     │
//! │       └───────────────────────────────────────────────────────────┘     │
//! │       │                                                                 │
//! │       ▼  close(counted)                                                 │
//! │  CashClosing { expected, counted, difference, status: PENDING }        │
//! │       │                                                                 │
//! │       ├── approve ──► CONSOLIDATED  (terminal)                          │
//! │       └── reject(reason) ──► REJECTED ── correct ──► CORRECTED          │
//! │                                                                         │
//! │  Once a closing exists the session is read-only.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - `expected = opening + Σ inflow − Σ outflow` over THAT session's
//!   movements only - no cross-session leakage.
//! - `difference = counted − expected`. A non-zero difference is recorded
//!   and surfaced, never an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Movement Kind
// =============================================================================

/// Direction of a cash movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    /// Cash entering the drawer (sale payment, change float top-up).
    Inflow,
    /// Cash leaving the drawer (refund, supplier payout, bank drop).
    Outflow,
}

// =============================================================================
// Cash Session ("apertura")
// =============================================================================

/// The open working period of one cash drawer for one cashier.
///
/// Created on open, mutated only by movement appends, read-only once a
/// closing exists. The one-unclosed-session-per-cashier rule belongs to
/// the calling business layer; the ledger only creates rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashSession {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub cashier_id: String,
    pub register_id: String,
    pub opened_at: DateTime<Utc>,
    /// Cash in the drawer when the session opened.
    pub opening_cents: i64,
}

impl CashSession {
    /// Returns the opening amount as Money.
    #[inline]
    pub fn opening(&self) -> Money {
        Money::from_cents(self.opening_cents)
    }
}

// =============================================================================
// Cash Movement
// =============================================================================

/// One inflow or outflow of a session. Append-only: never edited or
/// removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashMovement {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub session_id: String,
    pub kind: MovementKind,
    /// Always positive; the sign comes from `kind`.
    pub amount_cents: i64,
    pub occurred_at: DateTime<Utc>,
    /// Reference to the document that caused the movement, if any.
    pub document_ref: Option<String>,
}

impl CashMovement {
    /// The movement's contribution to the balance: positive for inflows,
    /// negative for outflows.
    #[inline]
    pub fn signed_cents(&self) -> i64 {
        match self.kind {
            MovementKind::Inflow => self.amount_cents,
            MovementKind::Outflow => -self.amount_cents,
        }
    }

    /// Returns the amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Closing Status
// =============================================================================

/// Review status of a cash closing.
///
/// Status changes are validated against the transition-rule table under
/// the `cash_closing` category, so a deployment can reshape the review
/// graph (e.g. let CORRECTED re-enter review) without code changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum ClosingStatus {
    /// Awaiting administrator review.
    Pending,
    /// Approved; terminal.
    Consolidated,
    /// Rejected with a mandatory reason; may be corrected.
    Rejected,
    /// Re-counted after rejection; terminal by default.
    Corrected,
}

impl ClosingStatus {
    /// The state-registry code this status is registered under
    /// (category `cash_closing`).
    pub const fn state_code(&self) -> &'static str {
        match self {
            ClosingStatus::Pending => "PENDING",
            ClosingStatus::Consolidated => "CONSOLIDATED",
            ClosingStatus::Rejected => "REJECTED",
            ClosingStatus::Corrected => "CORRECTED",
        }
    }
}

impl Default for ClosingStatus {
    fn default() -> Self {
        ClosingStatus::Pending
    }
}

// =============================================================================
// Cash Closing ("cierre")
// =============================================================================

/// The finalize record of a session: expected vs counted cash and the
/// review status. Created once per session; only the review fields evolve
/// afterwards (`expected_cents` stays frozen even through correction).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashClosing {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub session_id: String,
    /// Snapshot of the session balance at close time.
    pub expected_cents: i64,
    /// What the cashier physically counted.
    pub counted_cents: i64,
    /// `counted - expected`. Negative = shortage.
    pub difference_cents: i64,
    pub status: ClosingStatus,
    /// Mandatory when rejected.
    pub rejection_reason: Option<String>,
    /// Whether the cashier must open a fresh session to keep working;
    /// set from business rule configuration on rejection.
    pub requires_reopening: bool,
    pub closed_at: DateTime<Utc>,
    /// When an administrator last reviewed it (approve or reject).
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl CashClosing {
    /// Returns the difference as Money (negative = shortage).
    #[inline]
    pub fn difference(&self) -> Money {
        Money::from_cents(self.difference_cents)
    }
}

// =============================================================================
// Reconciliation Arithmetic
// =============================================================================

/// Expected cash for a session: opening plus signed movements.
///
/// The caller is responsible for passing only that session's movements;
/// the store query is scoped by session id.
pub fn expected_cents(opening_cents: i64, movements: &[CashMovement]) -> i64 {
    opening_cents + movements.iter().map(CashMovement::signed_cents).sum::<i64>()
}

/// Reconciliation difference: `counted - expected`.
#[inline]
pub fn difference_cents(counted_cents: i64, expected_cents: i64) -> i64 {
    counted_cents - expected_cents
}

// =============================================================================
// Reconciliation Policy
// =============================================================================

/// Business-rule configuration the closing workflow consults.
///
/// Deliberately external: whether a rejection forces the cashier to open a
/// fresh session, and whether a correction re-enters review, vary per
/// deployment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReconciliationPolicy {
    /// Set on `requires_reopening` when a closing is rejected.
    pub reject_requires_reopening: bool,
    /// When true, a corrected closing goes back to PENDING instead of the
    /// terminal CORRECTED (the matching rule row must also exist).
    pub correction_reenters_review: bool,
}

impl Default for ReconciliationPolicy {
    fn default() -> Self {
        ReconciliationPolicy {
            reject_requires_reopening: true,
            correction_reenters_review: false,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(kind: MovementKind, amount_cents: i64) -> CashMovement {
        CashMovement {
            id: "m".to_string(),
            session_id: "s".to_string(),
            kind,
            amount_cents,
            occurred_at: Utc::now(),
            document_ref: None,
        }
    }

    #[test]
    fn test_expected_balance() {
        // opening=100.00, inflow 50.00, outflow 20.00 -> 130.00
        let movements = vec![
            movement(MovementKind::Inflow, 5_000),
            movement(MovementKind::Outflow, 2_000),
        ];
        assert_eq!(expected_cents(10_000, &movements), 13_000);
    }

    #[test]
    fn test_expected_with_no_movements_is_opening() {
        assert_eq!(expected_cents(10_000, &[]), 10_000);
    }

    #[test]
    fn test_difference_sign() {
        // counted=125.00 against expected=130.00 -> short by 5.00
        assert_eq!(difference_cents(12_500, 13_000), -500);
        // overage
        assert_eq!(difference_cents(13_200, 13_000), 200);
    }

    #[test]
    fn test_movement_kind_storage_repr() {
        // The lowercase form is the storage contract (CHECK constraint).
        assert_eq!(
            serde_json::to_string(&MovementKind::Inflow).unwrap(),
            "\"inflow\""
        );
        assert_eq!(
            serde_json::to_string(&ClosingStatus::Consolidated).unwrap(),
            "\"consolidated\""
        );
    }

    #[test]
    fn test_status_state_codes() {
        assert_eq!(ClosingStatus::Pending.state_code(), "PENDING");
        assert_eq!(ClosingStatus::Corrected.state_code(), "CORRECTED");
    }
}
