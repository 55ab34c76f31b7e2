//! Box identity.
//!
//! Box identifiers are ULIDs: 26-character strings encoding a 48-bit
//! millisecond timestamp followed by randomness, so ids sort by creation
//! time and short prefixes stay cheap to resolve. Ids are allocated by a
//! monotonic generator and never reused, even after the box is removed.

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Unique identifier of a box.
///
/// Immutable once assigned. Lexicographic order matches creation order.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoxId(String);

/// Allocator producing collision-free, strictly increasing box ids.
pub(crate) struct IdGenerator {
    inner: Mutex<ulid::Generator>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl BoxId {
    /// Length of a full box id (ULID format).
    pub const FULL_LENGTH: usize = 26;

    /// Length of the short display form.
    pub const SHORT_LENGTH: usize = 8;

    /// Parse a box id from an existing string.
    ///
    /// Returns `None` if the string is not a valid 26-character ULID.
    pub fn parse(s: &str) -> Option<Self> {
        if Self::is_valid(s) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    /// Check whether a string is a well-formed box id.
    pub fn is_valid(s: &str) -> bool {
        s.len() == Self::FULL_LENGTH && Ulid::from_string(s).is_ok()
    }

    /// The full id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The short display form (first 8 characters).
    pub fn short(&self) -> &str {
        &self.0[..Self::SHORT_LENGTH]
    }

    /// Check whether this id starts with the given prefix.
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.0.starts_with(prefix)
    }

    fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid.to_string())
    }
}

impl IdGenerator {
    /// Create a new generator.
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(ulid::Generator::new()),
        }
    }

    /// Allocate the next box id.
    ///
    /// Ids allocated by one generator are strictly increasing; if the
    /// monotonic counter overflows within a single millisecond the
    /// allocator falls back to a fresh random ULID.
    pub(crate) fn allocate(&self) -> BoxId {
        let mut generator = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match generator.generate() {
            Ok(ulid) => BoxId::from_ulid(ulid),
            Err(_) => BoxId::from_ulid(Ulid::new()),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for BoxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for BoxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoxId({})", self.short())
    }
}

impl AsRef<str> for BoxId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_produces_valid_ids() {
        let generator = IdGenerator::new();
        let id = generator.allocate();
        assert_eq!(id.as_str().len(), BoxId::FULL_LENGTH);
        assert_eq!(id.short().len(), BoxId::SHORT_LENGTH);
        assert!(BoxId::is_valid(id.as_str()));
    }

    #[test]
    fn test_allocate_is_monotonic() {
        let generator = IdGenerator::new();
        let ids: Vec<BoxId> = (0..64).map(|_| generator.allocate()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);

        let unique: std::collections::HashSet<&BoxId> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn test_prefix_matching() {
        let generator = IdGenerator::new();
        let id = generator.allocate();
        assert!(id.matches_prefix(id.short()));
        assert!(id.matches_prefix(id.as_str()));
        assert!(!id.matches_prefix(""));
        assert!(!id.matches_prefix("~~~~"));
    }

    #[test]
    fn test_parse_rejects_malformed_ids() {
        assert!(BoxId::parse("not-a-ulid").is_none());
        assert!(BoxId::parse("").is_none());

        let generator = IdGenerator::new();
        let id = generator.allocate();
        assert_eq!(BoxId::parse(id.as_str()), Some(id));
    }
}
