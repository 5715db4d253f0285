//! # State Registry
//!
//! Holds the configured state vocabulary and the valid-transition table;
//! provides cached lookups for the transition and closing engines.
//!
//! ## Caching
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    State Lookup Caching                                 │
//! │                                                                         │
//! │  resolve_state("SENT", "quote")                                        │
//! │       │                                                                 │
//! │       ├── cache hit (by (code, category))? ──► return                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SELECT ... WHERE code AND category AND active                          │
//! │       │                                                                 │
//! │       ├── found ──► prime BOTH caches (by key and by id) ──► return    │
//! │       └── none  ──► UnknownState (never cached)                        │
//! │                                                                         │
//! │  Configuration writes invalidate the exact keys they touched.          │
//! │  There is deliberately no "invalidate everything matching a pattern"   │
//! │  operation on the cache.                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! State definitions are immutable once referenced by history: retiring
//! one flips `active`, the row itself stays.

use sqlx::{SqliteConnection, SqlitePool};
use std::time::Duration;
use tracing::debug;

use arqueo_core::{CoreError, StateDefinition, StateTransitionRule};

use crate::cache::TtlCache;
use crate::error::{DbError, DbResult};

/// How long a cached lookup stays valid without an explicit invalidation.
const STATE_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on cached entries per key space.
const STATE_CACHE_CAPACITY: usize = 1024;

/// Registry of state definitions and transition rules.
///
/// Clones share the caches: a configuration write through any handle is
/// visible to every other handle immediately.
#[derive(Debug, Clone)]
pub struct StateRegistry {
    pool: SqlitePool,
    by_key: TtlCache<(String, String), StateDefinition>,
    by_id: TtlCache<i64, StateDefinition>,
}

impl StateRegistry {
    /// Creates a new StateRegistry with empty caches.
    pub fn new(pool: SqlitePool) -> Self {
        StateRegistry {
            pool,
            by_key: TtlCache::new(STATE_CACHE_TTL, STATE_CACHE_CAPACITY),
            by_id: TtlCache::new(STATE_CACHE_TTL, STATE_CACHE_CAPACITY),
        }
    }

    // -------------------------------------------------------------------------
    // Lookups (cached)
    // -------------------------------------------------------------------------

    /// Resolves an active state by `(code, category)`.
    ///
    /// ## Errors
    /// `CoreError::UnknownState` (via `DbError::Domain`) when the pair does
    /// not resolve. Misses are never cached.
    pub async fn resolve_state(&self, code: &str, category: &str) -> DbResult<StateDefinition> {
        let key = (code.to_string(), category.to_string());

        if let Some(state) = self.by_key.get(&key) {
            return Ok(state);
        }

        let state: Option<StateDefinition> = sqlx::query_as(
            r#"
            SELECT id, code, category, sort_order, active
            FROM state_definitions
            WHERE code = ?1 AND category = ?2 AND active = 1
            "#,
        )
        .bind(code)
        .bind(category)
        .fetch_optional(&self.pool)
        .await?;

        match state {
            Some(state) => {
                self.by_key.insert(key, state.clone());
                self.by_id.insert(state.id, state.clone());
                Ok(state)
            }
            None => Err(CoreError::UnknownState {
                code: code.to_string(),
                category: category.to_string(),
            }
            .into()),
        }
    }

    /// Looks a state up by raw id. Inactive states resolve too: history
    /// rows keep referencing retired states forever.
    pub async fn state_by_id(&self, id: i64) -> DbResult<StateDefinition> {
        if let Some(state) = self.by_id.get(&id) {
            return Ok(state);
        }

        let state: Option<StateDefinition> = sqlx::query_as(
            r#"
            SELECT id, code, category, sort_order, active
            FROM state_definitions
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match state {
            Some(state) => {
                self.by_id.insert(id, state.clone());
                Ok(state)
            }
            None => Err(DbError::not_found("StateDefinition", id.to_string())),
        }
    }

    /// Validates a transition between resolved state ids.
    ///
    /// True when the ids are equal; otherwise an active rule row
    /// `(from, to, category)` must exist.
    pub async fn is_valid_transition(&self, from: i64, to: i64, category: &str) -> DbResult<bool> {
        if from == to {
            return Ok(true);
        }

        let mut conn = self.pool.acquire().await?;
        rule_exists(&mut conn, from, to, category).await
    }

    // -------------------------------------------------------------------------
    // Configuration writes (each invalidates exactly the keys it touched)
    // -------------------------------------------------------------------------

    /// Registers a new state in a category.
    pub async fn create_definition(
        &self,
        code: &str,
        category: &str,
        sort_order: i64,
    ) -> DbResult<StateDefinition> {
        let result = sqlx::query(
            r#"
            INSERT INTO state_definitions (code, category, sort_order, active)
            VALUES (?1, ?2, ?3, 1)
            "#,
        )
        .bind(code)
        .bind(category)
        .bind(sort_order)
        .execute(&self.pool)
        .await?;

        let state = StateDefinition {
            id: result.last_insert_rowid(),
            code: code.to_string(),
            category: category.to_string(),
            sort_order,
            active: true,
        };

        debug!(code, category, id = state.id, "Registered state definition");

        self.by_key
            .insert((code.to_string(), category.to_string()), state.clone());
        self.by_id.insert(state.id, state.clone());

        Ok(state)
    }

    /// Retires a state: it no longer resolves, but history referencing it
    /// stays intact.
    pub async fn deactivate_definition(&self, id: i64) -> DbResult<()> {
        // Fetch first so we know which (code, category) key to invalidate.
        let state = self.state_by_id(id).await?;

        let result = sqlx::query("UPDATE state_definitions SET active = 0 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("StateDefinition", id.to_string()));
        }

        self.by_key.invalidate(&(state.code, state.category));
        self.by_id.invalidate(&id);

        Ok(())
    }

    /// Adds a permitted edge to a category's state graph.
    pub async fn create_rule(
        &self,
        origin_state_id: i64,
        dest_state_id: i64,
        category: &str,
    ) -> DbResult<StateTransitionRule> {
        let result = sqlx::query(
            r#"
            INSERT INTO state_transition_rules (origin_state_id, dest_state_id, category, active)
            VALUES (?1, ?2, ?3, 1)
            "#,
        )
        .bind(origin_state_id)
        .bind(dest_state_id)
        .bind(category)
        .execute(&self.pool)
        .await?;

        debug!(
            origin_state_id,
            dest_state_id, category, "Registered transition rule"
        );

        Ok(StateTransitionRule {
            id: result.last_insert_rowid(),
            origin_state_id,
            dest_state_id,
            category: category.to_string(),
            active: true,
        })
    }

    /// Finds the active rule between two states, if configured.
    pub async fn rule_between(
        &self,
        origin_state_id: i64,
        dest_state_id: i64,
        category: &str,
    ) -> DbResult<Option<StateTransitionRule>> {
        let rule: Option<StateTransitionRule> = sqlx::query_as(
            r#"
            SELECT id, origin_state_id, dest_state_id, category, active
            FROM state_transition_rules
            WHERE origin_state_id = ?1 AND dest_state_id = ?2 AND category = ?3 AND active = 1
            "#,
        )
        .bind(origin_state_id)
        .bind(dest_state_id)
        .bind(category)
        .fetch_optional(&self.pool)
        .await?;

        Ok(rule)
    }

    /// Deactivates a rule, removing that edge from the graph.
    pub async fn deactivate_rule(&self, rule_id: i64) -> DbResult<()> {
        let result = sqlx::query("UPDATE state_transition_rules SET active = 0 WHERE id = ?1")
            .bind(rule_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("StateTransitionRule", rule_id.to_string()));
        }

        Ok(())
    }
}

/// Active-rule existence check against an explicit connection, so the
/// engines can validate inside their own transactions.
pub(crate) async fn rule_exists(
    conn: &mut SqliteConnection,
    from: i64,
    to: i64,
    category: &str,
) -> DbResult<bool> {
    let found: i64 = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1
            FROM state_transition_rules
            WHERE origin_state_id = ?1 AND dest_state_id = ?2 AND category = ?3 AND active = 1
        )
        "#,
    )
    .bind(from)
    .bind(to)
    .bind(category)
    .fetch_one(&mut *conn)
    .await?;

    Ok(found != 0)
}

// =============================================================================
// Unit Tests
// =============================================================================
