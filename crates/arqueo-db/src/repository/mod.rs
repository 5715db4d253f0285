//! # Repository Module
//!
//! Database repository and engine implementations.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Business flow                                                          │
//! │       │                                                                 │
//! │       │  db.sequences().allocate("VEN", today)                          │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  SequenceAllocator                                                     │
//! │  ├── allocate(&self, prefix, date_scope)                                │
//! │  └── last_code(&self, prefix, date_scope)                               │
//! │       │                                                                 │
//! │       │  SQL (one immediate transaction per attempt)                    │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Benefits:                                                              │
//! │  • SQL is isolated in one place per concern                            │
//! │  • Transaction boundaries are visible at one level                     │
//! │  • Mutation discipline: only the owning repository writes its tables   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories & Engines
//!
//! - [`sequence::SequenceAllocator`] - serialized document numbering
//! - [`state::StateRegistry`] - state vocabulary + rules, cached lookups
//! - [`transition::TransitionEngine`] - validated state changes + history
//! - [`cash::CashLedger`] - sessions, movements, balances
//! - [`closing::ClosingEngine`] - reconciliation, review, consolidation

pub mod cash;
pub mod closing;
pub mod sequence;
pub mod state;
pub mod transition;
