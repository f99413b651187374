//! Tags: indexed key/value labels attached to events.
//!
//! A tag is an ordered pair of non-empty strings. Tag equality and every
//! index lookup are case-insensitive on both components, so tags are
//! normalized to lowercase at construction. This keeps in-memory query
//! matching and the on-disk tag index (whose filenames are lowercased for
//! case-sensitive filesystems) in agreement.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A case-insensitive `(key, value)` pair attached to an event.
///
/// Both components are lowercased when the tag is constructed, so two tags
/// that differ only in case compare equal and hit the same index file.
///
/// # Examples
///
/// ```
/// use sequent_core::Tag;
///
/// let a = Tag::new("Email", "A@X.example");
/// let b = Tag::new("email", "a@x.example");
/// assert_eq!(a, b);
/// assert_eq!(a.key(), "email");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    key: String,
    value: String,
}

impl Tag {
    /// Create a tag, normalizing both components to lowercase.
    ///
    /// Emptiness is not checked here; the append pipeline rejects events
    /// carrying tags with an empty key or value before anything is written.
    #[must_use]
    pub fn new(key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        Self {
            key: key.as_ref().to_lowercase(),
            value: value.as_ref().to_lowercase(),
        }
    }

    /// The normalized (lowercase) key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The normalized (lowercase) value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether both components are non-empty.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.key.is_empty() && !self.value.is_empty()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_to_lowercase() {
        let tag = Tag::new("CourseId", "C-101");
        assert_eq!(tag.key(), "courseid");
        assert_eq!(tag.value(), "c-101");
    }

    #[test]
    fn equality_is_case_insensitive_via_normalization() {
        assert_eq!(Tag::new("X", "Y"), Tag::new("x", "y"));
    }

    #[test]
    fn validity_requires_both_components() {
        assert!(Tag::new("k", "v").is_valid());
        assert!(!Tag::new("", "v").is_valid());
        assert!(!Tag::new("k", "").is_valid());
    }

    #[test]
    fn displays_as_key_value() {
        assert_eq!(Tag::new("email", "a@x").to_string(), "email=a@x");
    }
}
