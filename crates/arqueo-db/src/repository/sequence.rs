//! # Sequence Allocator
//!
//! Issues unique, monotonically increasing document codes scoped by
//! `(prefix, date_scope)`.
//!
//! ## Allocation Under Contention
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    One allocate() call                                  │
//! │                                                                         │
//! │  attempt 0..5:                                                          │
//! │    BEGIN IMMEDIATE            ← takes the write lock up front          │
//! │    SELECT last code for (prefix, date_scope)                           │
//! │    next = trailing digits + 1 (or 1 on empty partition)                │
//! │    INSERT issued row          ← read + reservation are ONE unit        │
//! │    COMMIT                                                               │
//! │       │                                                                 │
//! │       ├── SQLITE_BUSY? ──► ROLLBACK, sleep 100ms·2^attempt, retry      │
//! │       ├── other error? ──► ROLLBACK, propagate immediately             │
//! │       └── ok ──► return code                                            │
//! │                                                                         │
//! │  attempts exhausted ──► DbError::RetriesExhausted (nothing persisted)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Within one partition, calls are totally ordered by the write lock: no
//! two callers ever observe the same "last suffix". Across partitions
//! there is no ordering guarantee, and none is needed.

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use arqueo_core::sequence::{format_code, next_suffix};

use crate::error::{DbError, DbResult};

/// Retry budget for lock contention. After this, allocation fails fatally.
const MAX_ATTEMPTS: u32 = 5;

/// Base backoff delay; doubles per attempt (100, 200, 400, ...).
const BACKOFF_BASE_MS: u64 = 100;

/// Repository issuing document codes.
#[derive(Debug, Clone)]
pub struct SequenceAllocator {
    pool: SqlitePool,
}

impl SequenceAllocator {
    /// Creates a new SequenceAllocator.
    pub fn new(pool: SqlitePool) -> Self {
        SequenceAllocator { pool }
    }

    /// Allocates the next code for a `(prefix, date_scope)` partition.
    ///
    /// ## Guarantees
    /// - Returned codes are pairwise distinct within the partition
    /// - Suffixes strictly increase; a suffix is never reissued
    /// - On failure nothing is persisted and no code is returned
    ///
    /// ## Errors
    /// - `DbError::RetriesExhausted` when the partition stays locked
    ///   through the whole retry budget (fatal, non-retryable)
    /// - `DbError::Domain` for an invalid prefix
    /// - any other store error, propagated immediately
    pub async fn allocate(&self, prefix: &str, date_scope: NaiveDate) -> DbResult<String> {
        for attempt in 0..MAX_ATTEMPTS {
            let mut conn = self.pool.acquire().await?;

            match Self::allocate_once(&mut conn, prefix, date_scope).await {
                Ok(code) => {
                    debug!(prefix, %date_scope, code = %code, "Allocated document code");
                    return Ok(code);
                }
                Err(err) if err.is_contention() && attempt + 1 < MAX_ATTEMPTS => {
                    let delay = Duration::from_millis(BACKOFF_BASE_MS << attempt);
                    warn!(
                        prefix,
                        %date_scope,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Sequence partition contended, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_contention() => {
                    warn!(prefix, %date_scope, "Sequence allocation retries exhausted");
                    return Err(DbError::RetriesExhausted {
                        attempts: MAX_ATTEMPTS,
                    });
                }
                Err(err) => return Err(err),
            }
        }

        Err(DbError::RetriesExhausted {
            attempts: MAX_ATTEMPTS,
        })
    }

    /// One allocation attempt: a single immediate transaction covering the
    /// read of the current maximum and the insert of the issued row.
    async fn allocate_once(
        conn: &mut SqliteConnection,
        prefix: &str,
        date_scope: NaiveDate,
    ) -> DbResult<String> {
        // BEGIN IMMEDIATE acquires the write lock before the read, so
        // concurrent allocators serialize here instead of racing at commit.
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(DbError::from)?;

        let result = Self::allocate_in_tx(conn, prefix, date_scope).await;

        match result {
            Ok(code) => {
                if let Err(err) = sqlx::query("COMMIT").execute(&mut *conn).await {
                    // The pooled connection must not go back with a
                    // transaction still open.
                    let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                    return Err(DbError::from(err));
                }
                Ok(code)
            }
            Err(err) => {
                // Best-effort rollback; the original error is what matters.
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(err)
            }
        }
    }

    async fn allocate_in_tx(
        conn: &mut SqliteConnection,
        prefix: &str,
        date_scope: NaiveDate,
    ) -> DbResult<String> {
        let last_code: Option<String> = sqlx::query_scalar(
            r#"
            SELECT code
            FROM document_codes
            WHERE prefix = ?1 AND date_scope = ?2
            ORDER BY suffix DESC
            LIMIT 1
            "#,
        )
        .bind(prefix)
        .bind(date_scope)
        .fetch_optional(&mut *conn)
        .await?;

        let suffix = next_suffix(last_code.as_deref());
        let code = format_code(prefix, date_scope, suffix)?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO document_codes (id, prefix, date_scope, suffix, code, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&id)
        .bind(prefix)
        .bind(date_scope)
        .bind(suffix as i64)
        .bind(&code)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(code)
    }

    /// Last code issued for a partition, if any. Read-only diagnostic.
    pub async fn last_code(&self, prefix: &str, date_scope: NaiveDate) -> DbResult<Option<String>> {
        let code: Option<String> = sqlx::query_scalar(
            r#"
            SELECT code
            FROM document_codes
            WHERE prefix = ?1 AND date_scope = ?2
            ORDER BY suffix DESC
            LIMIT 1
            "#,
        )
        .bind(prefix)
        .bind(date_scope)
        .fetch_optional(&self.pool)
        .await?;

        Ok(code)
    }

    /// Number of codes issued for a partition.
    pub async fn issued_count(&self, prefix: &str, date_scope: NaiveDate) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM document_codes WHERE prefix = ?1 AND date_scope = ?2",
        )
        .bind(prefix)
        .bind(date_scope)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use arqueo_core::sequence::parse_suffix;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn temp_db_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("arqueo-{}-{}.db", tag, Uuid::new_v4()))
    }

    fn remove_db_files(path: &std::path::Path) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    #[tokio::test]
    async fn test_first_allocation_starts_at_one() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let code = db.sequences().allocate("VEN", day("2026-08-23")).await.unwrap();
        assert_eq!(code, "VEN 2026-08-23-0001");
    }

    #[tokio::test]
    async fn test_suffixes_strictly_increase() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let allocator = db.sequences();
        let scope = day("2026-08-23");

        let mut previous = 0;
        for _ in 0..25 {
            let code = allocator.allocate("VEN", scope).await.unwrap();
            let suffix = parse_suffix(&code).unwrap();
            assert_eq!(suffix, previous + 1, "gap or duplicate at {}", code);
            previous = suffix;
        }
    }

    #[tokio::test]
    async fn test_padding_boundary_at_one_thousand() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let allocator = db.sequences();
        let scope = day("2026-08-23");

        // Seed the partition as if 0998 codes were already issued, then
        // cross the boundary through the allocator itself.
        for suffix in [997_i64, 998] {
            sqlx::query(
                "INSERT INTO document_codes (id, prefix, date_scope, suffix, code, created_at)
                 VALUES (?1, 'VEN', ?2, ?3, ?4, ?5)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(scope)
            .bind(suffix)
            .bind(format!("VEN 2026-08-23-0{}", suffix))
            .bind(Utc::now())
            .execute(db.pool())
            .await
            .unwrap();
        }

        let code = allocator.allocate("VEN", scope).await.unwrap();
        assert_eq!(code, "VEN 2026-08-23-0999");

        let code = allocator.allocate("VEN", scope).await.unwrap();
        assert_eq!(code, "VEN 2026-08-23-1000", "suffix 1000 must be unpadded");

        let code = allocator.allocate("VEN", scope).await.unwrap();
        assert_eq!(code, "VEN 2026-08-23-1001");
    }

    #[tokio::test]
    async fn test_partitions_are_independent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let allocator = db.sequences();

        let a = allocator.allocate("VEN", day("2026-08-23")).await.unwrap();
        let b = allocator.allocate("FAC", day("2026-08-23")).await.unwrap();
        let c = allocator.allocate("VEN", day("2026-08-24")).await.unwrap();

        // Each partition numbers from 1 on its own.
        assert_eq!(a, "VEN 2026-08-23-0001");
        assert_eq!(b, "FAC 2026-08-23-0001");
        assert_eq!(c, "VEN 2026-08-24-0001");
    }

    #[tokio::test]
    async fn test_concurrent_allocations_are_distinct_and_gapless() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let scope = day("2026-08-23");

        let mut handles = Vec::new();
        for _ in 0..5 {
            let allocator = db.sequences();
            handles.push(tokio::spawn(async move {
                allocator.allocate("VEN", scope).await
            }));
        }

        let mut suffixes = Vec::new();
        for handle in handles {
            let code = handle.await.unwrap().unwrap();
            suffixes.push(parse_suffix(&code).unwrap());
        }

        suffixes.sort_unstable();
        assert_eq!(suffixes, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_invalid_prefix_is_rejected_without_writes() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let allocator = db.sequences();
        let scope = day("2026-08-23");

        let err = allocator.allocate("", scope).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(_)));

        assert_eq!(allocator.issued_count("", scope).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_last_code_reflects_latest_issue() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let allocator = db.sequences();
        let scope = day("2026-08-23");

        assert_eq!(allocator.last_code("VEN", scope).await.unwrap(), None);

        allocator.allocate("VEN", scope).await.unwrap();
        allocator.allocate("VEN", scope).await.unwrap();

        assert_eq!(
            allocator.last_code("VEN", scope).await.unwrap().as_deref(),
            Some("VEN 2026-08-23-0002")
        );
    }

    #[tokio::test]
    async fn test_allocation_waits_out_a_transient_lock() {
        // File-backed database: the in-memory pool is single-connection and
        // would serialize at acquire, never reaching the retry loop.
        let path = temp_db_path("seq-wait");
        let db = Database::new(DbConfig::new(&path).busy_timeout(Duration::from_millis(10)))
            .await
            .unwrap();
        let scope = day("2026-08-23");

        // Hold the write lock on one pooled connection.
        let mut holder = db.pool().acquire().await.unwrap();
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *holder)
            .await
            .unwrap();

        let allocator = db.sequences();
        let pending = tokio::spawn(async move { allocator.allocate("VEN", scope).await });

        // Release the lock while the allocator is still inside its backoff
        // budget (first two sleeps alone are 300ms).
        tokio::time::sleep(Duration::from_millis(250)).await;
        sqlx::query("ROLLBACK").execute(&mut *holder).await.unwrap();
        drop(holder);

        let code = pending.await.unwrap().unwrap();
        assert_eq!(code, "VEN 2026-08-23-0001");

        db.close().await;
        remove_db_files(&path);
    }

    #[tokio::test]
    async fn test_retries_exhaust_when_lock_never_releases() {
        let path = temp_db_path("seq-exhaust");
        let db = Database::new(DbConfig::new(&path).busy_timeout(Duration::from_millis(10)))
            .await
            .unwrap();
        let scope = day("2026-08-23");

        let mut holder = db.pool().acquire().await.unwrap();
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *holder)
            .await
            .unwrap();

        let allocator = db.sequences();
        let err = allocator.allocate("VEN", scope).await.unwrap_err();
        assert!(
            matches!(err, DbError::RetriesExhausted { attempts: 5 }),
            "expected exhausted retries, got {:?}",
            err
        );

        sqlx::query("ROLLBACK").execute(&mut *holder).await.unwrap();
        drop(holder);

        // Nothing persisted by the failed attempts, and the pool comes back
        // clean: the next allocation starts the partition at 0001.
        assert_eq!(allocator.issued_count("VEN", scope).await.unwrap(), 0);
        assert_eq!(
            allocator.allocate("VEN", scope).await.unwrap(),
            "VEN 2026-08-23-0001"
        );

        db.close().await;
        remove_db_files(&path);
    }
}
