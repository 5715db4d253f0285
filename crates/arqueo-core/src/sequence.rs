//! # Sequence Code Rules
//!
//! Pure rules for document code numbering: suffix extraction, the next-value
//! rule, and the exact padding policy. The allocator in `arqueo-db` owns
//! locking and persistence; everything it computes comes from here.
//!
//! ## Code Anatomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    "VEN 2026-08-23-0042"                                │
//! │                     ───┬── ────┬───── ─┬──                              │
//! │                        │       │       └── suffix (trailing digit run)  │
//! │                        │       └── date scope                           │
//! │                        └── prefix (document family)                     │
//! │                                                                         │
//! │  (prefix, date scope) = the sequence partition. Within one partition   │
//! │  suffixes strictly increase and are never reissued.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Padding Policy
//! Suffixes below 1000 are zero-padded to width 4 (`0001`…`0999`); from 1000
//! on they render unpadded (`1000`, `1001`, …). The 999/1000 boundary is an
//! exact compatibility requirement with existing printed documents.

use chrono::NaiveDate;

use crate::error::{CoreResult, ValidationError};

// =============================================================================
// Constants
// =============================================================================

/// Width suffixes are zero-padded to while below [`PAD_LIMIT`].
pub const PAD_WIDTH: usize = 4;

/// First suffix rendered without padding.
pub const PAD_LIMIT: u32 = 1000;

// =============================================================================
// Suffix Rules
// =============================================================================

/// Extracts the trailing run of ASCII digits of a code.
///
/// Returns `None` when the code does not end in a digit or the run
/// overflows `u32` (malformed data; the caller restarts at 1).
///
/// ## Example
/// ```rust
/// use arqueo_core::sequence::parse_suffix;
///
/// assert_eq!(parse_suffix("VEN 2026-08-23-0999"), Some(999));
/// assert_eq!(parse_suffix("VEN 2026-08-23-1000"), Some(1000));
/// assert_eq!(parse_suffix("legacy-code-"), None);
/// ```
pub fn parse_suffix(code: &str) -> Option<u32> {
    let digits: String = code
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    if digits.is_empty() {
        return None;
    }

    digits.parse().ok()
}

/// Computes the next suffix for a partition given the last issued code.
///
/// `None` (empty partition) or an unparseable last code both start at 1.
pub fn next_suffix(last_code: Option<&str>) -> u32 {
    match last_code.and_then(parse_suffix) {
        Some(last) => last + 1,
        None => 1,
    }
}

/// Renders a suffix under the padding policy.
///
/// Exact boundary: `999` → `"0999"`, `1000` → `"1000"`.
pub fn format_suffix(suffix: u32) -> String {
    if suffix < PAD_LIMIT {
        format!("{:0width$}", suffix, width = PAD_WIDTH)
    } else {
        suffix.to_string()
    }
}

/// Builds the full document code for a partition and suffix.
///
/// ## Errors
/// `ValidationError::InvalidFormat` when the prefix is empty or ends in a
/// digit (a digit-terminated prefix would corrupt suffix extraction on the
/// next allocation).
pub fn format_code(prefix: &str, date_scope: NaiveDate, suffix: u32) -> CoreResult<String> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Err(ValidationError::Required {
            field: "prefix".to_string(),
        }
        .into());
    }
    if prefix.ends_with(|c: char| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "prefix".to_string(),
            reason: "must not end in a digit".to_string(),
        }
        .into());
    }

    Ok(format!(
        "{} {}-{}",
        prefix,
        date_scope.format("%Y-%m-%d"),
        format_suffix(suffix)
    ))
}

// =============================================================================
// Unit Tests
// =============================================================================
