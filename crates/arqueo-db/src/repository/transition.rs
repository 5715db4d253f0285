//! # Transition Engine
//!
//! Validates and executes a state change for any workflow entity,
//! appending an immutable history record in the same unit of work.
//!
//! ## One transition() call
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  transition("quote", id, "SENT", "quote", actor, reason)               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  dispatch table: "quote" → (table: quotes, column: state_id)           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  resolve "SENT" in category ──► UnknownState? fail, nothing written    │
//! │       │                                                                 │
//! │       ▼  BEGIN                                                          │
//! │  read current state                                                    │
//! │       ├── NULL ──► bootstrap: allowed unconditionally                  │
//! │       ├── == target ──► allowed (re-assertion)                         │
//! │       └── else ──► active rule (from, to, category) must exist         │
//! │                        └── missing ──► InvalidTransitionError,         │
//! │                                        entity untouched                │
//! │       ▼                                                                 │
//! │  UPDATE entity state column                                            │
//! │  INSERT state_history row (actor, reason)                              │
//! │  COMMIT          ← both rows or neither                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Entity Dispatch
//! Which column holds an entity's current state is data, not a type-check
//! chain: adding a workflow entity means adding one `StateBinding` row
//! here and its table in a migration.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use arqueo_core::state::requires_rule;
use arqueo_core::{Actor, CoreError, StateDefinition, StateHistoryEntry};

use crate::error::{DbError, DbResult};
use crate::repository::state::{rule_exists, StateRegistry};

// =============================================================================
// Entity Dispatch Table
// =============================================================================

/// Where a workflow entity keeps its current state.
#[derive(Debug, Clone, Copy)]
struct StateBinding {
    /// Entity type tag, as recorded on history rows.
    entity_type: &'static str,
    /// Table holding the entity.
    table: &'static str,
    /// Primary key column.
    id_column: &'static str,
    /// Column holding the current state id.
    state_column: &'static str,
}

/// All workflow entities the engine can drive. The closing workflow is
/// NOT listed: it manages its own status column and only shares the
/// validation and history discipline.
const BINDINGS: &[StateBinding] = &[
    StateBinding {
        entity_type: "quote",
        table: "quotes",
        id_column: "id",
        state_column: "state_id",
    },
    StateBinding {
        entity_type: "logistics_order",
        table: "logistics_orders",
        id_column: "id",
        state_column: "state_id",
    },
];

fn binding_for(entity_type: &str) -> DbResult<&'static StateBinding> {
    BINDINGS
        .iter()
        .find(|b| b.entity_type == entity_type)
        .ok_or_else(|| DbError::UnknownEntityType(entity_type.to_string()))
}

// =============================================================================
// Transition Engine
// =============================================================================

/// Executes validated, audited state changes.
#[derive(Debug, Clone)]
pub struct TransitionEngine {
    pool: SqlitePool,
    states: StateRegistry,
}

impl TransitionEngine {
    /// Creates a new TransitionEngine.
    pub fn new(pool: SqlitePool, states: StateRegistry) -> Self {
        TransitionEngine { pool, states }
    }

    /// Moves an entity to the state `(to_code, category)`.
    ///
    /// ## Guarantees
    /// - State update and history row commit together or not at all
    /// - On any failure the entity is untouched
    ///
    /// ## Errors
    /// - `CoreError::UnknownState` when `(to_code, category)` doesn't resolve
    /// - `CoreError::InvalidTransition` when no active rule permits the change
    /// - `DbError::UnknownEntityType` / `DbError::NotFound` for bad refs
    pub async fn transition(
        &self,
        entity_type: &str,
        entity_id: &str,
        to_code: &str,
        category: &str,
        actor: &Actor,
        reason: Option<&str>,
    ) -> DbResult<StateHistoryEntry> {
        let binding = binding_for(entity_type)?;
        let to = self.states.resolve_state(to_code, category).await?;

        let mut tx = self.pool.begin().await?;

        // Current state through the entity's binding.
        let select = format!(
            "SELECT {state} FROM {table} WHERE {id} = ?1",
            state = binding.state_column,
            table = binding.table,
            id = binding.id_column,
        );
        let current: Option<Option<i64>> = sqlx::query_scalar(&select)
            .bind(entity_id)
            .fetch_optional(&mut *tx)
            .await?;

        let from = current.ok_or_else(|| DbError::not_found(entity_type, entity_id))?;

        // Bootstrap (NULL) and same-state are unconditionally legal;
        // everything else needs an active rule row.
        if let Some(from_id) = from.filter(|_| requires_rule(from, to.id)) {
            if !rule_exists(&mut tx, from_id, to.id, category).await? {
                let from_code: String =
                    sqlx::query_scalar("SELECT code FROM state_definitions WHERE id = ?1")
                        .bind(from_id)
                        .fetch_optional(&mut *tx)
                        .await?
                        .unwrap_or_else(|| from_id.to_string());

                return Err(CoreError::InvalidTransition {
                    from: from_code,
                    to: to.code.clone(),
                    category: category.to_string(),
                }
                .into());
            }
        }

        let update = format!(
            "UPDATE {table} SET {state} = ?1 WHERE {id} = ?2",
            state = binding.state_column,
            table = binding.table,
            id = binding.id_column,
        );
        sqlx::query(&update)
            .bind(to.id)
            .bind(entity_id)
            .execute(&mut *tx)
            .await?;

        let entry = insert_history(
            &mut tx,
            entity_type,
            entity_id,
            from,
            to.id,
            &actor.id,
            reason,
        )
        .await?;

        tx.commit().await?;

        debug!(
            entity_type,
            entity_id,
            to_code,
            category,
            actor = %actor.id,
            "State transition committed"
        );

        Ok(entry)
    }

    /// The entity's current state definition, if assigned yet.
    pub async fn current_state(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> DbResult<Option<StateDefinition>> {
        let binding = binding_for(entity_type)?;

        let select = format!(
            "SELECT {state} FROM {table} WHERE {id} = ?1",
            state = binding.state_column,
            table = binding.table,
            id = binding.id_column,
        );
        let current: Option<Option<i64>> = sqlx::query_scalar(&select)
            .bind(entity_id)
            .fetch_optional(&self.pool)
            .await?;

        match current.ok_or_else(|| DbError::not_found(entity_type, entity_id))? {
            Some(state_id) => Ok(Some(self.states.state_by_id(state_id).await?)),
            None => Ok(None),
        }
    }

    /// Full audit trail for an entity, oldest first.
    pub async fn history(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> DbResult<Vec<StateHistoryEntry>> {
        let entries: Vec<StateHistoryEntry> = sqlx::query_as(
            r#"
            SELECT id, entity_type, entity_id, from_state_id, to_state_id,
                   actor_id, reason, created_at
            FROM state_history
            WHERE entity_type = ?1 AND entity_id = ?2
            ORDER BY created_at, rowid
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

/// Appends one history row on the caller's connection, so it joins the
/// caller's transaction. The closing engine shares this.
pub(crate) async fn insert_history(
    conn: &mut SqliteConnection,
    entity_type: &str,
    entity_id: &str,
    from_state_id: Option<i64>,
    to_state_id: i64,
    actor_id: &str,
    reason: Option<&str>,
) -> DbResult<StateHistoryEntry> {
    let entry = StateHistoryEntry {
        id: Uuid::new_v4().to_string(),
        entity_type: entity_type.to_string(),
        entity_id: entity_id.to_string(),
        from_state_id,
        to_state_id,
        actor_id: actor_id.to_string(),
        reason: reason.map(str::to_string),
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO state_history (id, entity_type, entity_id, from_state_id,
                                   to_state_id, actor_id, reason, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.entity_type)
    .bind(&entry.entity_id)
    .bind(entry.from_state_id)
    .bind(entry.to_state_id)
    .bind(&entry.actor_id)
    .bind(&entry.reason)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(entry)
}

// =============================================================================
// Unit Tests
// =============================================================================
