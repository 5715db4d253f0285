//! # Closing & Reconciliation Engine
//!
//! Finalizes a cash session into a closing record, runs the review
//! workflow (approve / reject / correct) and consolidates closings in
//! batches.
//!
//! ## Review Workflow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  close(session, counted)                                                │
//! │       │   expected = fresh session balance (snapshotted, then frozen)  │
//! │       │   difference = counted − expected (recorded, never an error)   │
//! │       ▼                                                                 │
//! │   PENDING ──approve──► CONSOLIDATED   (terminal)                        │
//! │       │                                                                 │
//! │       └──reject(reason required)──► REJECTED                            │
//! │                                        │                                │
//! │                       correct(new count, vs FROZEN expected)            │
//! │                                        ▼                                │
//! │                                   CORRECTED   (terminal by default)     │
//! │                                                                         │
//! │  Every edge is validated against the rule table under the              │
//! │  `cash_closing` category, so a deployment can reshape the graph        │
//! │  (e.g. REJECTED → PENDING for corrections re-entering review) with     │
//! │  configuration rows, not code. Re-asserting the current status is      │
//! │  refused here: approving an already-consolidated closing is a caller   │
//! │  bug, not a re-assertion.                                              │
//! │                                                                         │
//! │  Every status change appends a state_history row in the SAME           │
//! │  transaction as the update.                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

use arqueo_core::cash::difference_cents;
use arqueo_core::{
    Actor, CashClosing, ClosingStatus, CoreError, ReconciliationPolicy, ValidationError,
    CASH_CLOSING_CATEGORY, CASH_CLOSING_ENTITY_TYPE,
};

use crate::error::{DbError, DbResult};
use crate::repository::state::{rule_exists, StateRegistry};
use crate::repository::transition::insert_history;

// =============================================================================
// Review Decision
// =============================================================================

/// An administrator's verdict on a pending closing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    /// Accept the count; the closing becomes CONSOLIDATED.
    Approve,
    /// Refuse the count; the closing becomes REJECTED. A reason is
    /// mandatory.
    Reject,
}

impl ReviewDecision {
    fn target_status(&self) -> ClosingStatus {
        match self {
            ReviewDecision::Approve => ClosingStatus::Consolidated,
            ReviewDecision::Reject => ClosingStatus::Rejected,
        }
    }
}

// =============================================================================
// Batch Consolidation Outcome
// =============================================================================

/// Per-item result of a batch consolidation. Items are independent: one
/// failure never rolls back its siblings. Serializable for the review
/// screen's report.
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidationOutcome {
    pub closing_id: String,
    pub consolidated: bool,
    /// Rendered error when `consolidated` is false.
    pub error: Option<String>,
}

// =============================================================================
// Closing Engine
// =============================================================================

/// Engine for closing cash sessions and reviewing the results.
#[derive(Debug, Clone)]
pub struct ClosingEngine {
    pool: SqlitePool,
    states: StateRegistry,
    policy: ReconciliationPolicy,
}

impl ClosingEngine {
    /// Creates a new ClosingEngine under the given policy.
    pub fn new(pool: SqlitePool, states: StateRegistry, policy: ReconciliationPolicy) -> Self {
        ClosingEngine {
            pool,
            states,
            policy,
        }
    }

    /// Closes a session against a physical count.
    ///
    /// Snapshots the session balance as `expected_cents` (frozen from here
    /// on, even through correction), records `counted − expected` as the
    /// difference and creates the closing in PENDING. The insert and its
    /// history row commit together.
    ///
    /// ## Errors
    /// - `DbError::UniqueViolation` when the session already has a closing
    /// - `ValidationError::MustBeNonNegative` for a negative count
    pub async fn close(
        &self,
        session_id: &str,
        counted_cents: i64,
        actor: &Actor,
    ) -> DbResult<CashClosing> {
        if counted_cents < 0 {
            return Err(CoreError::from(ValidationError::MustBeNonNegative {
                field: "counted_cents".to_string(),
            })
            .into());
        }

        // Resolved before the transaction: registry lookups go through the
        // pool, and the pool may hold a single connection.
        let pending = self
            .states
            .resolve_state(ClosingStatus::Pending.state_code(), CASH_CLOSING_CATEGORY)
            .await?;

        let mut tx = self.pool.begin().await?;

        let expected: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT s.opening_cents + COALESCE(SUM(
                       CASE m.kind WHEN 'inflow' THEN m.amount_cents
                                   ELSE -m.amount_cents END), 0)
            FROM cash_sessions s
            LEFT JOIN cash_movements m ON m.session_id = s.id
            WHERE s.id = ?1
            GROUP BY s.id, s.opening_cents
            "#,
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?;

        let expected = expected.ok_or_else(|| DbError::not_found("CashSession", session_id))?;

        let already_closed: i64 =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM cash_closings WHERE session_id = ?1)")
                .bind(session_id)
                .fetch_one(&mut *tx)
                .await?;
        if already_closed != 0 {
            return Err(DbError::duplicate("cash_closings.session_id", session_id));
        }

        let closing = CashClosing {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            expected_cents: expected,
            counted_cents,
            difference_cents: difference_cents(counted_cents, expected),
            status: ClosingStatus::Pending,
            rejection_reason: None,
            requires_reopening: false,
            closed_at: Utc::now(),
            reviewed_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO cash_closings (id, session_id, expected_cents, counted_cents,
                                       difference_cents, status, rejection_reason,
                                       requires_reopening, closed_at, reviewed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&closing.id)
        .bind(&closing.session_id)
        .bind(closing.expected_cents)
        .bind(closing.counted_cents)
        .bind(closing.difference_cents)
        .bind(closing.status)
        .bind(&closing.rejection_reason)
        .bind(closing.requires_reopening)
        .bind(closing.closed_at)
        .bind(closing.reviewed_at)
        .execute(&mut *tx)
        .await?;

        insert_history(
            &mut tx,
            CASH_CLOSING_ENTITY_TYPE,
            &closing.id,
            None,
            pending.id,
            &actor.id,
            None,
        )
        .await?;

        tx.commit().await?;

        debug!(
            session_id,
            closing_id = %closing.id,
            expected_cents = closing.expected_cents,
            counted_cents,
            difference_cents = closing.difference_cents,
            "Session closed, awaiting review"
        );

        Ok(closing)
    }

    /// Reviews a pending closing: approve or reject.
    ///
    /// The target edge must exist in the rule table under `cash_closing`.
    /// Reviewing a closing that is already in the decision's target status
    /// fails as an invalid transition, and the status update is guarded so
    /// that of two racing reviewers exactly one lands the transition.
    ///
    /// ## Errors
    /// - `ValidationError::Required` when rejecting without a reason
    /// - `CoreError::InvalidTransition` for a forbidden or repeated review
    pub async fn review(
        &self,
        closing_id: &str,
        decision: ReviewDecision,
        actor: &Actor,
        reason: Option<&str>,
    ) -> DbResult<CashClosing> {
        let target = decision.target_status();

        if decision == ReviewDecision::Reject && reason.map_or(true, |r| r.trim().is_empty()) {
            return Err(CoreError::from(ValidationError::Required {
                field: "reason".to_string(),
            })
            .into());
        }

        let mut closing = self.get(closing_id).await?;

        if closing.status == target {
            return Err(CoreError::InvalidTransition {
                from: closing.status.state_code().to_string(),
                to: target.state_code().to_string(),
                category: CASH_CLOSING_CATEGORY.to_string(),
            }
            .into());
        }

        let from = self
            .states
            .resolve_state(closing.status.state_code(), CASH_CLOSING_CATEGORY)
            .await?;
        let to = self
            .states
            .resolve_state(target.state_code(), CASH_CLOSING_CATEGORY)
            .await?;

        let requires_reopening = match decision {
            ReviewDecision::Approve => false,
            ReviewDecision::Reject => self.policy.reject_requires_reopening,
        };
        let rejection_reason = match decision {
            ReviewDecision::Approve => None,
            ReviewDecision::Reject => reason.map(str::to_string),
        };
        let reviewed_at = Utc::now();

        let mut tx = self.pool.begin().await?;

        if !rule_exists(&mut tx, from.id, to.id, CASH_CLOSING_CATEGORY).await? {
            return Err(CoreError::InvalidTransition {
                from: from.code,
                to: to.code,
                category: CASH_CLOSING_CATEGORY.to_string(),
            }
            .into());
        }

        // Guarded write: applies only while the status is still the one the
        // rule was validated against, so two racing reviewers cannot both
        // land the same transition.
        let updated = sqlx::query(
            r#"
            UPDATE cash_closings
            SET status = ?1, rejection_reason = ?2, requires_reopening = ?3, reviewed_at = ?4
            WHERE id = ?5 AND status = ?6
            "#,
        )
        .bind(target)
        .bind(&rejection_reason)
        .bind(requires_reopening)
        .bind(reviewed_at)
        .bind(closing_id)
        .bind(closing.status)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let current = status_in_tx(&mut tx, closing_id).await?;
            return Err(CoreError::InvalidTransition {
                from: current.state_code().to_string(),
                to: target.state_code().to_string(),
                category: CASH_CLOSING_CATEGORY.to_string(),
            }
            .into());
        }

        insert_history(
            &mut tx,
            CASH_CLOSING_ENTITY_TYPE,
            closing_id,
            Some(from.id),
            to.id,
            &actor.id,
            reason,
        )
        .await?;

        tx.commit().await?;

        debug!(
            closing_id,
            ?decision,
            actor = %actor.id,
            "Closing reviewed"
        );

        closing.status = target;
        closing.rejection_reason = rejection_reason;
        closing.requires_reopening = requires_reopening;
        closing.reviewed_at = Some(reviewed_at);
        Ok(closing)
    }

    /// Re-counts a rejected closing.
    ///
    /// The new difference is computed against the FROZEN `expected_cents`
    /// snapshot, never against a recomputed balance. The target status is
    /// CORRECTED, or PENDING when the policy sends corrections back into
    /// review (the matching rule row must exist either way).
    pub async fn correct(
        &self,
        closing_id: &str,
        new_counted_cents: i64,
        actor: &Actor,
        reason: Option<&str>,
    ) -> DbResult<CashClosing> {
        if new_counted_cents < 0 {
            return Err(CoreError::from(ValidationError::MustBeNonNegative {
                field: "new_counted_cents".to_string(),
            })
            .into());
        }

        let target = if self.policy.correction_reenters_review {
            ClosingStatus::Pending
        } else {
            ClosingStatus::Corrected
        };

        let mut closing = self.get(closing_id).await?;

        if closing.status != ClosingStatus::Rejected {
            return Err(CoreError::InvalidTransition {
                from: closing.status.state_code().to_string(),
                to: target.state_code().to_string(),
                category: CASH_CLOSING_CATEGORY.to_string(),
            }
            .into());
        }

        let from = self
            .states
            .resolve_state(closing.status.state_code(), CASH_CLOSING_CATEGORY)
            .await?;
        let to = self
            .states
            .resolve_state(target.state_code(), CASH_CLOSING_CATEGORY)
            .await?;

        let new_difference = difference_cents(new_counted_cents, closing.expected_cents);

        let mut tx = self.pool.begin().await?;

        if !rule_exists(&mut tx, from.id, to.id, CASH_CLOSING_CATEGORY).await? {
            return Err(CoreError::InvalidTransition {
                from: from.code,
                to: to.code,
                category: CASH_CLOSING_CATEGORY.to_string(),
            }
            .into());
        }

        // The rejection reason stays on the record for audit. Same guarded
        // write as review(): the row must still be REJECTED.
        let updated = sqlx::query(
            r#"
            UPDATE cash_closings
            SET counted_cents = ?1, difference_cents = ?2, status = ?3
            WHERE id = ?4 AND status = ?5
            "#,
        )
        .bind(new_counted_cents)
        .bind(new_difference)
        .bind(target)
        .bind(closing_id)
        .bind(closing.status)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let current = status_in_tx(&mut tx, closing_id).await?;
            return Err(CoreError::InvalidTransition {
                from: current.state_code().to_string(),
                to: target.state_code().to_string(),
                category: CASH_CLOSING_CATEGORY.to_string(),
            }
            .into());
        }

        insert_history(
            &mut tx,
            CASH_CLOSING_ENTITY_TYPE,
            closing_id,
            Some(from.id),
            to.id,
            &actor.id,
            reason,
        )
        .await?;

        tx.commit().await?;

        debug!(
            closing_id,
            new_counted_cents,
            new_difference,
            target = target.state_code(),
            "Closing corrected"
        );

        closing.counted_cents = new_counted_cents;
        closing.difference_cents = new_difference;
        closing.status = target;
        Ok(closing)
    }

    /// Consolidates several pending closings in one sweep.
    ///
    /// Deliberately NOT one global transaction: each closing is approved on
    /// its own, so one bad item (already reviewed, unknown id) reports its
    /// error while the rest consolidate normally.
    pub async fn consolidate_batch(
        &self,
        closing_ids: &[String],
        actor: &Actor,
    ) -> DbResult<Vec<ConsolidationOutcome>> {
        let mut outcomes = Vec::with_capacity(closing_ids.len());

        for closing_id in closing_ids {
            match self
                .review(closing_id, ReviewDecision::Approve, actor, None)
                .await
            {
                Ok(_) => outcomes.push(ConsolidationOutcome {
                    closing_id: closing_id.clone(),
                    consolidated: true,
                    error: None,
                }),
                Err(err) => {
                    warn!(closing_id = %closing_id, error = %err, "Batch item failed to consolidate");
                    outcomes.push(ConsolidationOutcome {
                        closing_id: closing_id.clone(),
                        consolidated: false,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        Ok(outcomes)
    }

    /// Gets a closing by ID.
    pub async fn get(&self, closing_id: &str) -> DbResult<CashClosing> {
        let closing: Option<CashClosing> = sqlx::query_as(
            r#"
            SELECT id, session_id, expected_cents, counted_cents, difference_cents,
                   status, rejection_reason, requires_reopening, closed_at, reviewed_at
            FROM cash_closings
            WHERE id = ?1
            "#,
        )
        .bind(closing_id)
        .fetch_optional(&self.pool)
        .await?;

        closing.ok_or_else(|| DbError::not_found("CashClosing", closing_id))
    }

    /// The closing of a session, if it has one.
    pub async fn for_session(&self, session_id: &str) -> DbResult<Option<CashClosing>> {
        let closing: Option<CashClosing> = sqlx::query_as(
            r#"
            SELECT id, session_id, expected_cents, counted_cents, difference_cents,
                   status, rejection_reason, requires_reopening, closed_at, reviewed_at
            FROM cash_closings
            WHERE session_id = ?1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(closing)
    }

    /// All closings awaiting review, oldest first.
    pub async fn pending(&self) -> DbResult<Vec<CashClosing>> {
        let closings: Vec<CashClosing> = sqlx::query_as(
            r#"
            SELECT id, session_id, expected_cents, counted_cents, difference_cents,
                   status, rejection_reason, requires_reopening, closed_at, reviewed_at
            FROM cash_closings
            WHERE status = 'pending'
            ORDER BY closed_at, rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(closings)
    }
}

/// The status actually on the row, read on the caller's connection so it
/// reflects the transaction's own view.
async fn status_in_tx(
    conn: &mut SqliteConnection,
    closing_id: &str,
) -> DbResult<ClosingStatus> {
    let status: ClosingStatus =
        sqlx::query_scalar("SELECT status FROM cash_closings WHERE id = ?1")
            .bind(closing_id)
            .fetch_one(conn)
            .await?;

    Ok(status)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use arqueo_core::MovementKind;

    fn admin() -> Actor {
        Actor::new("admin-1", ["cash.review"])
    }

    fn temp_db_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("arqueo-{}-{}.db", tag, Uuid::new_v4()))
    }

    fn remove_db_files(path: &std::path::Path) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    fn cashier() -> Actor {
        Actor::new("cashier-1", ["cash.close"])
    }

    /// Session with opening 100.00, inflow 50.00, outflow 20.00:
    /// expected balance 130.00.
    async fn session_at_130(db: &Database) -> String {
        let ledger = db.cash();
        let session = ledger.open("cashier-1", "reg-1", 10_000).await.unwrap();
        ledger
            .record_movement(&session.id, MovementKind::Inflow, 5_000, None)
            .await
            .unwrap();
        ledger
            .record_movement(&session.id, MovementKind::Outflow, 2_000, None)
            .await
            .unwrap();
        session.id
    }

    #[tokio::test]
    async fn test_close_snapshots_expected_and_difference() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = db.closings(ReconciliationPolicy::default());
        let session_id = session_at_130(&db).await;

        // Counted 125.00 against expected 130.00: short by 5.00.
        let closing = engine.close(&session_id, 12_500, &cashier()).await.unwrap();

        assert_eq!(closing.expected_cents, 13_000);
        assert_eq!(closing.counted_cents, 12_500);
        assert_eq!(closing.difference_cents, -500);
        assert_eq!(closing.status, ClosingStatus::Pending);
        assert!(closing.reviewed_at.is_none());

        // The closing freezes the session.
        let err = db
            .cash()
            .record_movement(&session_id, MovementKind::Inflow, 100, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::SessionClosed(_))));

        // Creation landed in the audit trail.
        let history = db
            .transitions()
            .history(CASH_CLOSING_ENTITY_TYPE, &closing.id)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_state_id, None);
    }

    #[tokio::test]
    async fn test_close_twice_is_a_duplicate() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = db.closings(ReconciliationPolicy::default());
        let session_id = session_at_130(&db).await;

        engine.close(&session_id, 13_000, &cashier()).await.unwrap();
        let err = engine
            .close(&session_id, 13_000, &cashier())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_approve_consolidates() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = db.closings(ReconciliationPolicy::default());
        let session_id = session_at_130(&db).await;

        let closing = engine.close(&session_id, 13_000, &cashier()).await.unwrap();
        let reviewed = engine
            .review(&closing.id, ReviewDecision::Approve, &admin(), None)
            .await
            .unwrap();

        assert_eq!(reviewed.status, ClosingStatus::Consolidated);
        assert!(reviewed.reviewed_at.is_some());
        assert!(!reviewed.requires_reopening);

        // Consolidated today keeps the cashier eligible.
        assert!(db
            .cash()
            .has_open_or_recently_consolidated_session("cashier-1")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_double_approve_is_invalid() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = db.closings(ReconciliationPolicy::default());
        let session_id = session_at_130(&db).await;

        let closing = engine.close(&session_id, 13_000, &cashier()).await.unwrap();
        engine
            .review(&closing.id, ReviewDecision::Approve, &admin(), None)
            .await
            .unwrap();

        let err = engine
            .review(&closing.id, ReviewDecision::Approve, &admin(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InvalidTransition { .. })
        ));

        // Only close + first approve are on record.
        let history = db
            .transitions()
            .history(CASH_CLOSING_ENTITY_TYPE, &closing.id)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_reject_requires_a_reason() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = db.closings(ReconciliationPolicy::default());
        let session_id = session_at_130(&db).await;

        let closing = engine.close(&session_id, 12_000, &cashier()).await.unwrap();

        let err = engine
            .review(&closing.id, ReviewDecision::Reject, &admin(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));

        let err = engine
            .review(&closing.id, ReviewDecision::Reject, &admin(), Some("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));

        let rejected = engine
            .review(
                &closing.id,
                ReviewDecision::Reject,
                &admin(),
                Some("shortage of 10.00 unexplained"),
            )
            .await
            .unwrap();
        assert_eq!(rejected.status, ClosingStatus::Rejected);
        assert_eq!(
            rejected.rejection_reason.as_deref(),
            Some("shortage of 10.00 unexplained")
        );
        // Default policy: a rejection sends the cashier back to open a
        // fresh session.
        assert!(rejected.requires_reopening);
    }

    #[tokio::test]
    async fn test_correct_recounts_against_frozen_expected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = db.closings(ReconciliationPolicy::default());
        let session_id = session_at_130(&db).await;

        let closing = engine.close(&session_id, 12_000, &cashier()).await.unwrap();
        engine
            .review(&closing.id, ReviewDecision::Reject, &admin(), Some("recount"))
            .await
            .unwrap();

        let corrected = engine
            .correct(&closing.id, 12_900, &admin(), Some("found bills under the tray"))
            .await
            .unwrap();

        assert_eq!(corrected.status, ClosingStatus::Corrected);
        assert_eq!(corrected.expected_cents, 13_000, "expected stays frozen");
        assert_eq!(corrected.counted_cents, 12_900);
        assert_eq!(corrected.difference_cents, -100);
        // The original rejection stays on record.
        assert!(corrected.rejection_reason.is_some());
    }

    #[tokio::test]
    async fn test_correct_from_pending_is_invalid() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = db.closings(ReconciliationPolicy::default());
        let session_id = session_at_130(&db).await;

        let closing = engine.close(&session_id, 13_000, &cashier()).await.unwrap();
        let err = engine
            .correct(&closing.id, 12_900, &admin(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_correction_can_reenter_review_when_configured() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let policy = ReconciliationPolicy {
            correction_reenters_review: true,
            ..ReconciliationPolicy::default()
        };
        let engine = db.closings(policy);
        let session_id = session_at_130(&db).await;

        // The deployment that wants this graph also configures the edge.
        let states = db.states();
        let rejected = states
            .resolve_state("REJECTED", CASH_CLOSING_CATEGORY)
            .await
            .unwrap();
        let pending = states
            .resolve_state("PENDING", CASH_CLOSING_CATEGORY)
            .await
            .unwrap();
        states
            .create_rule(rejected.id, pending.id, CASH_CLOSING_CATEGORY)
            .await
            .unwrap();

        let closing = engine.close(&session_id, 12_000, &cashier()).await.unwrap();
        engine
            .review(&closing.id, ReviewDecision::Reject, &admin(), Some("recount"))
            .await
            .unwrap();

        let corrected = engine.correct(&closing.id, 13_000, &admin(), None).await.unwrap();
        assert_eq!(corrected.status, ClosingStatus::Pending);

        // Back in the review queue.
        let queue = engine.pending().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, closing.id);
    }

    #[tokio::test]
    async fn test_racing_reviews_consolidate_exactly_once() {
        // File-backed database with the default multi-connection pool so
        // two reviewers can interleave instead of serializing at acquire.
        let path = temp_db_path("closing-race");
        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let engine = db.closings(ReconciliationPolicy::default());

        let session_id = session_at_130(&db).await;
        let closing = engine.close(&session_id, 13_000, &cashier()).await.unwrap();

        let mut handles = Vec::new();
        for n in 0..2 {
            let engine = engine.clone();
            let closing_id = closing.id.clone();
            handles.push(tokio::spawn(async move {
                let reviewer = Actor::new(format!("admin-{}", n), ["cash.review"]);
                engine
                    .review(&closing_id, ReviewDecision::Approve, &reviewer, None)
                    .await
            }));
        }

        let mut approvals = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                approvals += 1;
            }
        }
        assert_eq!(approvals, 1, "exactly one reviewer may land the approval");

        assert_eq!(
            engine.get(&closing.id).await.unwrap().status,
            ClosingStatus::Consolidated
        );

        // Close + the single approval; the losing review left no trace.
        let history = db
            .transitions()
            .history(CASH_CLOSING_ENTITY_TYPE, &closing.id)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);

        db.close().await;
        remove_db_files(&path);
    }

    #[test]
    fn test_review_types_serialize_for_reporting() {
        // The review screen consumes these as JSON.
        let outcome = ConsolidationOutcome {
            closing_id: "c-1".to_string(),
            consolidated: false,
            error: Some("invalid transition".to_string()),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["closing_id"], "c-1");
        assert_eq!(json["consolidated"], false);

        assert_eq!(
            serde_json::to_string(&ReviewDecision::Approve).unwrap(),
            "\"approve\""
        );
        assert_eq!(
            serde_json::from_str::<ReviewDecision>("\"reject\"").unwrap(),
            ReviewDecision::Reject
        );
    }

    #[tokio::test]
    async fn test_approval_without_an_active_rule_is_invalid() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = db.closings(ReconciliationPolicy::default());
        let session_id = session_at_130(&db).await;

        let closing = engine.close(&session_id, 13_000, &cashier()).await.unwrap();

        // Deactivate the seeded PENDING -> CONSOLIDATED edge.
        let states = db.states();
        let pending = states
            .resolve_state("PENDING", CASH_CLOSING_CATEGORY)
            .await
            .unwrap();
        let consolidated = states
            .resolve_state("CONSOLIDATED", CASH_CLOSING_CATEGORY)
            .await
            .unwrap();
        let rule = states
            .rule_between(pending.id, consolidated.id, CASH_CLOSING_CATEGORY)
            .await
            .unwrap()
            .unwrap();
        states.deactivate_rule(rule.id).await.unwrap();

        let err = engine
            .review(&closing.id, ReviewDecision::Approve, &admin(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InvalidTransition { .. })
        ));

        // The closing stays pending.
        assert_eq!(
            engine.get(&closing.id).await.unwrap().status,
            ClosingStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_batch_consolidation_isolates_failures() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = db.closings(ReconciliationPolicy::default());
        let ledger = db.cash();

        let mut ids = Vec::new();
        for n in 0..2 {
            let session = ledger
                .open(&format!("cashier-{}", n), "reg-1", 1_000)
                .await
                .unwrap();
            let closing = engine.close(&session.id, 1_000, &cashier()).await.unwrap();
            ids.push(closing.id);
        }

        // Third item is already consolidated: its approval must fail
        // without disturbing the others.
        let session = ledger.open("cashier-9", "reg-2", 1_000).await.unwrap();
        let closing = engine.close(&session.id, 1_000, &cashier()).await.unwrap();
        engine
            .review(&closing.id, ReviewDecision::Approve, &admin(), None)
            .await
            .unwrap();
        ids.push(closing.id);

        let outcomes = engine.consolidate_batch(&ids, &admin()).await.unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].consolidated);
        assert!(outcomes[1].consolidated);
        assert!(!outcomes[2].consolidated);
        assert!(outcomes[2].error.is_some());

        for id in &ids[..2] {
            assert_eq!(
                engine.get(id).await.unwrap().status,
                ClosingStatus::Consolidated
            );
        }
        assert!(engine.pending().await.unwrap().is_empty());
    }
}
