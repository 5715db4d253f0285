//! # arqueo-core: Pure Business Logic for the Transactional Integrity Layer
//!
//! This crate is the **heart** of the back-office platform's integrity
//! layer. It contains the rules that must hold regardless of storage
//! technology, as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Arqueo Architecture                                │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            Business Flows (document creation, POS screens)     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                arqueo-db (engines + persistence)                │   │
//! │  │    SequenceAllocator · TransitionEngine · ClosingEngine         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ arqueo-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐ ┌───────────┐ ┌───────────┐ ┌───────────┐     │   │
//! │  │   │ sequence  │ │   state   │ │   cash    │ │   roles   │     │   │
//! │  │   │ suffixes  │ │ legality  │ │ reconcile │ │ caps/actor│     │   │
//! │  │   └───────────┘ └───────────┘ └───────────┘ └───────────┘     │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`sequence`] - Document code suffix parsing and the padding policy
//! - [`state`] - State registry types and the transition legality rule
//! - [`cash`] - Session, movement and closing types; reconciliation math
//! - [`roles`] - Case-insensitive capability sets and the acting principal
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in cents (i64) to avoid float errors
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use arqueo_core::sequence::{format_suffix, next_suffix};
//!
//! // Suffixes below 1000 are zero-padded to width 4; 1000 and up are not.
//! assert_eq!(format_suffix(999), "0999");
//! assert_eq!(format_suffix(1000), "1000");
//!
//! // The next suffix is parsed from the trailing digits of the last code.
//! assert_eq!(next_suffix(Some("VEN 2026-08-23-0042")), 43);
//! assert_eq!(next_suffix(None), 1);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cash;
pub mod error;
pub mod money;
pub mod roles;
pub mod sequence;
pub mod state;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use arqueo_core::Money` instead of
// `use arqueo_core::money::Money`

pub use cash::{
    CashClosing, CashMovement, CashSession, ClosingStatus, MovementKind, ReconciliationPolicy,
};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use roles::{Actor, CapabilitySet};
pub use state::{StateDefinition, StateHistoryEntry, StateTransitionRule};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// The workflow category used by the cash-closing review workflow.
///
/// ## Why a constant?
/// The closing engine validates its status changes against the same
/// transition-rule table as every other workflow; this is the category its
/// vocabulary (PENDING, CONSOLIDATED, REJECTED, CORRECTED) is registered
/// under.
pub const CASH_CLOSING_CATEGORY: &str = "cash_closing";

/// Entity type tag under which closing status changes are audited.
pub const CASH_CLOSING_ENTITY_TYPE: &str = "cash_closing";
