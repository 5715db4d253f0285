//! # Cash Session Ledger
//!
//! Records a cashier's open session and its movements, and derives the
//! running balance.
//!
//! ## Ledger Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Cash Session Ledger                                │
//! │                                                                         │
//! │  open(cashier, register, 100.00)                                       │
//! │       │         (one unclosed session per cashier is the CALLER's      │
//! │       │          rule - the ledger only creates rows, and exposes      │
//! │       ▼          open_session_for() so the caller can enforce it)      │
//! │  ┌────────────┐                                                        │
//! │  │ CashSession│◄── record_movement(inflow 50.00)                       │
//! │  │            │◄── record_movement(outflow 20.00)   append-only        │
//! │  └────────────┘                                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  current_balance() = 100 + 50 − 20 = 130.00                            │
//! │       always computed fresh over THIS session's movements:             │
//! │       no cached running total, no cross-session leakage                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use arqueo_core::{CashMovement, CashSession, CoreError, MovementKind, ValidationError};

use crate::error::{DbError, DbResult};

/// Repository for cash sessions and movements.
#[derive(Debug, Clone)]
pub struct CashLedger {
    pool: SqlitePool,
}

impl CashLedger {
    /// Creates a new CashLedger.
    pub fn new(pool: SqlitePool) -> Self {
        CashLedger { pool }
    }

    /// Opens a session for a cashier on a register.
    ///
    /// Does NOT check for an existing open session - that rule belongs to
    /// the calling business layer (see [`Self::open_session_for`]).
    pub async fn open(
        &self,
        cashier_id: &str,
        register_id: &str,
        opening_cents: i64,
    ) -> DbResult<CashSession> {
        if opening_cents < 0 {
            return Err(CoreError::from(ValidationError::MustBeNonNegative {
                field: "opening_cents".to_string(),
            })
            .into());
        }

        let session = CashSession {
            id: Uuid::new_v4().to_string(),
            cashier_id: cashier_id.to_string(),
            register_id: register_id.to_string(),
            opened_at: Utc::now(),
            opening_cents,
        };

        sqlx::query(
            r#"
            INSERT INTO cash_sessions (id, cashier_id, register_id, opened_at, opening_cents)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&session.id)
        .bind(&session.cashier_id)
        .bind(&session.register_id)
        .bind(session.opened_at)
        .bind(session.opening_cents)
        .execute(&self.pool)
        .await?;

        debug!(
            session_id = %session.id,
            cashier_id,
            register_id,
            opening_cents,
            "Cash session opened"
        );

        Ok(session)
    }

    /// Gets a session by ID.
    pub async fn get(&self, session_id: &str) -> DbResult<CashSession> {
        let session: Option<CashSession> = sqlx::query_as(
            r#"
            SELECT id, cashier_id, register_id, opened_at, opening_cents
            FROM cash_sessions
            WHERE id = ?1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        session.ok_or_else(|| DbError::not_found("CashSession", session_id))
    }

    /// The cashier's unclosed session, if one exists. The calling layer
    /// uses this to enforce the one-open-session rule before `open()`.
    pub async fn open_session_for(&self, cashier_id: &str) -> DbResult<Option<CashSession>> {
        let session: Option<CashSession> = sqlx::query_as(
            r#"
            SELECT s.id, s.cashier_id, s.register_id, s.opened_at, s.opening_cents
            FROM cash_sessions s
            LEFT JOIN cash_closings c ON c.session_id = s.id
            WHERE s.cashier_id = ?1 AND c.id IS NULL
            ORDER BY s.opened_at DESC
            LIMIT 1
            "#,
        )
        .bind(cashier_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Appends a movement to a session. Movements are never edited or
    /// removed afterwards.
    ///
    /// ## Errors
    /// - `ValidationError::MustBePositive` for a non-positive amount
    /// - `CoreError::SessionClosed` once the session has a closing
    pub async fn record_movement(
        &self,
        session_id: &str,
        kind: MovementKind,
        amount_cents: i64,
        document_ref: Option<&str>,
    ) -> DbResult<CashMovement> {
        if amount_cents <= 0 {
            return Err(CoreError::from(ValidationError::MustBePositive {
                field: "amount_cents".to_string(),
            })
            .into());
        }

        // Existence check doubles as the closed-session gate.
        self.get(session_id).await?;
        if self.is_closed(session_id).await? {
            return Err(CoreError::SessionClosed(session_id.to_string()).into());
        }

        let movement = CashMovement {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            kind,
            amount_cents,
            occurred_at: Utc::now(),
            document_ref: document_ref.map(str::to_string),
        };

        sqlx::query(
            r#"
            INSERT INTO cash_movements (id, session_id, kind, amount_cents, occurred_at, document_ref)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&movement.id)
        .bind(&movement.session_id)
        .bind(movement.kind)
        .bind(movement.amount_cents)
        .bind(movement.occurred_at)
        .bind(&movement.document_ref)
        .execute(&self.pool)
        .await?;

        debug!(
            session_id,
            ?kind,
            amount_cents,
            "Cash movement recorded"
        );

        Ok(movement)
    }

    /// All movements of a session, oldest first.
    pub async fn movements(&self, session_id: &str) -> DbResult<Vec<CashMovement>> {
        let movements: Vec<CashMovement> = sqlx::query_as(
            r#"
            SELECT id, session_id, kind, amount_cents, occurred_at, document_ref
            FROM cash_movements
            WHERE session_id = ?1
            ORDER BY occurred_at, rowid
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// The session's balance: opening plus signed movements.
    ///
    /// Always computed fresh as an aggregate over that session's movements
    /// only - a small CPU cost for guaranteed correctness. The closing
    /// engine snapshots this value as `expected_cents`.
    pub async fn current_balance(&self, session_id: &str) -> DbResult<i64> {
        let balance: Option<i64> = sqlx::query_scalar(
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
        .fetch_optional(&self.pool)
        .await?;

        balance.ok_or_else(|| DbError::not_found("CashSession", session_id))
    }

    /// Whether the cashier may keep acting on cash-gated flows without
    /// opening a brand-new session: true if they hold an unclosed session
    /// OR a CONSOLIDATED closing reviewed within `[yesterday, today]`.
    pub async fn has_open_or_recently_consolidated_session(
        &self,
        cashier_id: &str,
    ) -> DbResult<bool> {
        let today = Utc::now().date_naive();
        let yesterday = today - ChronoDuration::days(1);

        let eligible: i64 = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM cash_sessions s
                LEFT JOIN cash_closings c ON c.session_id = s.id
                WHERE s.cashier_id = ?1 AND c.id IS NULL
            )
            OR EXISTS (
                SELECT 1
                FROM cash_sessions s
                JOIN cash_closings c ON c.session_id = s.id
                WHERE s.cashier_id = ?1
                  AND c.status = 'consolidated'
                  AND c.reviewed_at IS NOT NULL
                  AND date(c.reviewed_at) BETWEEN ?2 AND ?3
            )
            "#,
        )
        .bind(cashier_id)
        .bind(yesterday)
        .bind(today)
        .fetch_one(&self.pool)
        .await?;

        Ok(eligible != 0)
    }

    /// Whether a closing exists for the session (the session is then
    /// read-only).
    pub async fn is_closed(&self, session_id: &str) -> DbResult<bool> {
        let closed: i64 =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM cash_closings WHERE session_id = ?1)")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(closed != 0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_balance_is_opening_plus_signed_movements() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ledger = db.cash();

        // opening=100.00, inflow 50.00, outflow 20.00 -> 130.00
        let session = ledger.open("cashier-1", "reg-1", 10_000).await.unwrap();
        ledger
            .record_movement(&session.id, MovementKind::Inflow, 5_000, Some("VEN 2026-08-23-0001"))
            .await
            .unwrap();
        ledger
            .record_movement(&session.id, MovementKind::Outflow, 2_000, None)
            .await
            .unwrap();

        assert_eq!(ledger.current_balance(&session.id).await.unwrap(), 13_000);
        assert_eq!(ledger.movements(&session.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_balance_isolation_across_sessions() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ledger = db.cash();

        let a = ledger.open("cashier-1", "reg-1", 10_000).await.unwrap();
        let b = ledger.open("cashier-2", "reg-2", 500).await.unwrap();

        ledger
            .record_movement(&b.id, MovementKind::Inflow, 99_999, None)
            .await
            .unwrap();

        // Session B's movements never affect session A's balance.
        assert_eq!(ledger.current_balance(&a.id).await.unwrap(), 10_000);
        assert_eq!(ledger.current_balance(&b.id).await.unwrap(), 100_499);
    }

    #[tokio::test]
    async fn test_rejects_bad_amounts() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ledger = db.cash();

        let err = ledger.open("cashier-1", "reg-1", -1).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));

        let session = ledger.open("cashier-1", "reg-1", 0).await.unwrap();
        let err = ledger
            .record_movement(&session.id, MovementKind::Inflow, 0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_closed_session_is_read_only() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ledger = db.cash();

        let session = ledger.open("cashier-1", "reg-1", 10_000).await.unwrap();

        // A closing exists: the ledger must refuse further movements.
        sqlx::query(
            r#"
            INSERT INTO cash_closings (id, session_id, expected_cents, counted_cents,
                                       difference_cents, status, requires_reopening, closed_at)
            VALUES (?1, ?2, 10000, 10000, 0, 'pending', 0, ?3)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&session.id)
        .bind(Utc::now())
        .execute(db.pool())
        .await
        .unwrap();

        let err = ledger
            .record_movement(&session.id, MovementKind::Inflow, 100, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::SessionClosed(_))));
    }

    #[tokio::test]
    async fn test_open_session_lookup() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ledger = db.cash();

        assert!(ledger.open_session_for("cashier-1").await.unwrap().is_none());

        let session = ledger.open("cashier-1", "reg-1", 10_000).await.unwrap();
        assert_eq!(
            ledger
                .open_session_for("cashier-1")
                .await
                .unwrap()
                .unwrap()
                .id,
            session.id
        );

        // Another cashier's session doesn't leak.
        assert!(ledger.open_session_for("cashier-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eligibility_with_open_session() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ledger = db.cash();

        assert!(!ledger
            .has_open_or_recently_consolidated_session("cashier-1")
            .await
            .unwrap());

        ledger.open("cashier-1", "reg-1", 10_000).await.unwrap();

        assert!(ledger
            .has_open_or_recently_consolidated_session("cashier-1")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_eligibility_with_recent_consolidation() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ledger = db.cash();

        let session = ledger.open("cashier-1", "reg-1", 10_000).await.unwrap();

        // Consolidated today: the cashier stays eligible without a fresh
        // session.
        sqlx::query(
            r#"
            INSERT INTO cash_closings (id, session_id, expected_cents, counted_cents,
                                       difference_cents, status, requires_reopening,
                                       closed_at, reviewed_at)
            VALUES (?1, ?2, 10000, 10000, 0, 'consolidated', 0, ?3, ?3)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&session.id)
        .bind(Utc::now())
        .execute(db.pool())
        .await
        .unwrap();

        assert!(ledger
            .has_open_or_recently_consolidated_session("cashier-1")
            .await
            .unwrap());
    }
}
