//! # arqueo-db: Persistence & Transactional Engines
//!
//! This crate provides database access for the transactional integrity
//! layer, and hosts the engines that serialize concurrent mutation of
//! scarce, audited resources. It uses SQLite for local storage with sqlx
//! for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Arqueo Data Flow                                │
//! │                                                                         │
//! │  Business flow (create invoice, close drawer, review closings)         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     arqueo-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │  ┌──────────────┐ ┌──────────────┐ ┌──────────────────────┐   │   │
//! │  │  │  Sequence    │ │  Transition  │ │  Cash Ledger +       │   │   │
//! │  │  │  Allocator   │ │  Engine      │ │  Closing Engine      │   │   │
//! │  │  │ (lock+retry) │ │ (tx+history) │ │ (reconcile+review)   │   │   │
//! │  │  └──────────────┘ └──────┬───────┘ └──────────────────────┘   │   │
//! │  │                         │                                      │   │
//! │  │                  ┌──────▼───────┐                              │   │
//! │  │                  │StateRegistry │  cached (24h TTL, per-key    │   │
//! │  │                  │              │  invalidation)               │   │
//! │  │                  └──────────────┘                              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL) - row-level write serialization, atomic multi-row commits│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types (incl. contention taxonomy)
//! - [`cache`] - Bounded-TTL cache with per-key invalidation
//! - [`repository`] - Allocator, registry, engines, ledger
//!
//! ## Usage
//!
//! ```rust,ignore
//! use arqueo_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/arqueo.db")).await?;
//!
//! // Number a document
//! let code = db.sequences().allocate("VEN", today).await?;
//!
//! // Move a quote through its workflow
//! db.transitions()
//!     .transition("quote", &quote_id, "SENT", "quote", &actor, None)
//!     .await?;
//!
//! // Close a drawer and review it
//! let closing = db.closings(policy).close(&session_id, counted, &actor).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::cash::CashLedger;
pub use repository::closing::{ClosingEngine, ConsolidationOutcome, ReviewDecision};
pub use repository::sequence::SequenceAllocator;
pub use repository::state::StateRegistry;
pub use repository::transition::TransitionEngine;
