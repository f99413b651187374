//! Error types shared by every store-facing operation.

use crate::position::Position;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by store operations.
///
/// `AppendConditionFailed` is the expected outcome of the optimistic
/// concurrency protocol, not a fault: callers (and the decision helper)
/// match on it to retry, and the store never logs it at error level. Every
/// other variant is either an input-validation failure (raised before any
/// observable state change) or an environmental failure.
#[derive(Error, Debug)]
pub enum StoreError {
    /// `append` was called with no events.
    #[error("Append batch must contain at least one event")]
    EmptyBatch,

    /// An event failed validation (blank type, malformed tag).
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// A query failed validation.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The append condition matched a newer event; the append wrote nothing.
    #[error(
        "Append condition failed: an event matching the condition exists after position \
         {expected_after} (highest assigned position: {actual_highest})"
    )]
    AppendConditionFailed {
        /// The `after_position` boundary the caller expected to still hold.
        expected_after: Position,
        /// The highest assigned position at the time of the check.
        actual_highest: Position,
    },

    /// The cross-process lock could not be acquired in time.
    #[error("Timed out acquiring the store lock after {waited:?} (timeout: {timeout:?})")]
    LockTimeout {
        /// How long this caller waited.
        waited: Duration,
        /// The configured timeout.
        timeout: Duration,
    },

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// An I/O operation failed.
    #[error("I/O error while {context}: {source}")]
    Io {
        /// What the store was doing.
        context: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A value could not be encoded or decoded.
    #[error("Serialization error while {context}: {source}")]
    Serialization {
        /// What the store was doing.
        context: String,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// A persisted file is unreadable beyond the tolerated transient-retry
    /// window. The store does not attempt automatic repair.
    #[error("Corrupt store state: {0}")]
    Corrupt(String),

    /// The store configuration failed validation at construction.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A projection with this name is already registered.
    #[error("A projection named '{0}' is already registered")]
    DuplicateProjection(String),

    /// No projection with this name is registered.
    #[error("No projection named '{0}' is registered")]
    UnknownProjection(String),
}

impl StoreError {
    /// Attach context to an I/O error.
    #[must_use]
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Attach context to a serialization error.
    #[must_use]
    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }

    /// Whether this is the optimistic-concurrency conflict outcome.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::AppendConditionFailed { .. })
    }
}

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, StoreError>;
