//! # Acting Principals & Capabilities
//!
//! The identity/role service is an external collaborator: it authenticates
//! users and answers "may this actor perform X". This module only defines
//! the shape that answer travels in, and normalizes capability names so
//! comparisons are independent of the caller's storage casing.
//!
//! ## Normalization
//! Capability names are canonicalized ONCE on construction (trimmed,
//! lower-cased) and compared as a set. Never special-case string casing
//! inline at call sites.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// =============================================================================
// Capability Set
// =============================================================================

/// A set of capability names with case-insensitive membership.
///
/// ## Example
/// ```rust
/// use arqueo_core::roles::CapabilitySet;
///
/// let caps = CapabilitySet::from_names(["Cash.Consolidate", "QUOTES.EDIT"]);
/// assert!(caps.allows("cash.consolidate"));
/// assert!(caps.allows("Quotes.Edit"));
/// assert!(!caps.allows("quotes.delete"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    names: HashSet<String>,
}

impl CapabilitySet {
    /// Empty capability set.
    pub fn new() -> Self {
        CapabilitySet::default()
    }

    /// Builds a set from capability names, normalizing each one.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        CapabilitySet {
            names: names.into_iter().map(|n| canonical(n.as_ref())).collect(),
        }
    }

    /// Adds a capability (normalized).
    pub fn grant(&mut self, name: &str) {
        self.names.insert(canonical(name));
    }

    /// Case-insensitive membership check.
    pub fn allows(&self, name: &str) -> bool {
        self.names.contains(&canonical(name))
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Canonical token form: trimmed, lower-cased.
fn canonical(name: &str) -> String {
    name.trim().to_lowercase()
}

// =============================================================================
// Actor
// =============================================================================

/// The acting principal attached to every audited operation.
///
/// The id is opaque to this layer - it is recorded verbatim on history
/// entries; the identity service owns its meaning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub capabilities: CapabilitySet,
}

impl Actor {
    /// Creates an actor with the given capabilities.
    pub fn new<I, S>(id: impl Into<String>, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Actor {
            id: id.into(),
            capabilities: CapabilitySet::from_names(capabilities),
        }
    }

    /// Shorthand capability check.
    pub fn can(&self, capability: &str) -> bool {
        self.capabilities.allows(capability)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
