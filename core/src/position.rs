//! Global sequence positions.
//!
//! Every committed event occupies exactly one position in the store's single
//! global sequence. Positions are 1-indexed, strictly monotonic, and gap-free:
//! if position `p` exists, every position in `1..p` exists too.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in the global event sequence.
///
/// `Position` is a newtype wrapper around `u64` that provides:
/// - Type safety (can't accidentally use a plain integer)
/// - Clear intent in function signatures
/// - Serialization as a bare integer in persisted files
///
/// Position `0` never holds an event; it is the "before the first event"
/// marker used by ledgers, checkpoints, and `after_position` bounds.
///
/// # Examples
///
/// ```
/// use sequent_core::Position;
///
/// let first = Position::new(1);
/// assert_eq!(first.next(), Position::new(2));
/// assert!(Position::ZERO < first);
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Position(u64);

impl Position {
    /// The position before the first event.
    pub const ZERO: Self = Self(0);

    /// Create a position from a raw sequence number.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw sequence number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The position immediately after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Whether any event can exist at this position (positions are 1-indexed).
    #[must_use]
    pub const fn is_assigned(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Position {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Position> for u64 {
    fn from(position: Position) -> Self {
        position.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_not_assigned() {
        assert!(!Position::ZERO.is_assigned());
        assert!(Position::new(1).is_assigned());
    }

    #[test]
    fn next_increments() {
        assert_eq!(Position::new(41).next(), Position::new(42));
        assert_eq!(Position::ZERO.next(), Position::new(1));
    }

    #[test]
    fn ordering_follows_sequence_numbers() {
        let mut positions = vec![Position::new(3), Position::new(1), Position::new(2)];
        positions.sort();
        assert_eq!(
            positions,
            vec![Position::new(1), Position::new(2), Position::new(3)]
        );
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: test fails if serialization fails
    fn serializes_as_bare_integer() {
        let json = serde_json::to_string(&Position::new(7)).expect("serialize");
        assert_eq!(json, "7");
        let back: Position = serde_json::from_str("7").expect("deserialize");
        assert_eq!(back, Position::new(7));
    }
}
