//! Event types for the append and read sides of the store.
//!
//! Events represent immutable facts. A caller submits [`NewEvent`]s; the
//! append pipeline assigns each one a [`Position`](crate::Position) and
//! persists it; reads return [`SequencedEvent`]s — deep-owned values that the
//! caller can hold without touching the store again.
//!
//! # Payloads
//!
//! Payloads are opaque to the store and carried as `serde_json::Value`. The
//! store never interprets them; it indexes only the event type and the tags.
//! Persisted files are human-readable JSON with the `event_type` field as
//! the outer discriminator.
//!
//! # Example
//!
//! ```
//! use sequent_core::{NewEvent, Tag};
//! use serde_json::json;
//!
//! let event = NewEvent::new("StudentRegistered", json!({ "name": "Ada" }))
//!     .with_tag(Tag::new("email", "ada@example.org"));
//!
//! assert_eq!(event.event_type, "StudentRegistered");
//! assert_eq!(event.tags.len(), 1);
//! ```

use crate::position::Position;
use crate::tag::Tag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Contextual metadata attached to every event.
///
/// The timestamp is stamped by the store at append time when the caller left
/// it empty; every other field is caller-supplied and passed through
/// verbatim. All fields survive the round trip to disk.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// When the event was recorded (UTC). Populated by the append pipeline
    /// if the caller did not provide one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Links every event of one logical flow together.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// The event (or command) that directly caused this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,

    /// The store-level operation this event was appended under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,

    /// The acting user, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl EventMetadata {
    /// Metadata with a freshly generated correlation id and nothing else.
    #[must_use]
    pub fn with_new_correlation() -> Self {
        Self {
            correlation_id: Some(Uuid::new_v4().to_string()),
            ..Self::default()
        }
    }

    /// Metadata continuing the flow of `parent`: same correlation id, with
    /// the parent's position recorded as the causation id.
    #[must_use]
    pub fn caused_by(parent: &SequencedEvent) -> Self {
        Self {
            correlation_id: parent.metadata.correlation_id.clone(),
            causation_id: Some(parent.position.to_string()),
            ..Self::default()
        }
    }
}

/// A not-yet-persisted event submitted to `append`.
///
/// Identical in shape to a stored event minus the position. The append
/// pipeline never mutates the caller's value; the persisted copy is derived
/// from it (with the timestamp stamped when absent).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Discriminator used for routing and the type index. Must be non-blank.
    pub event_type: String,

    /// Opaque payload; stored verbatim.
    pub payload: serde_json::Value,

    /// Tags to index this event under. Order is preserved on disk.
    #[serde(default)]
    pub tags: Vec<Tag>,

    /// Contextual metadata.
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl NewEvent {
    /// Create an event with the given type and payload, no tags, and empty
    /// metadata.
    #[must_use]
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            tags: Vec::new(),
            metadata: EventMetadata::default(),
        }
    }

    /// Add a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    /// Add several tags.
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Replace the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether this event carries the given tag (case-insensitive by
    /// construction of [`Tag`]).
    #[must_use]
    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tags.contains(tag)
    }
}

/// A committed event: a [`NewEvent`] plus its assigned position.
///
/// This is the persisted file format (pretty-printed JSON, one file per
/// position) and the value returned by reads. Returned instances are fully
/// owned; mutating them has no effect on the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedEvent {
    /// The event's position in the global sequence (≥ 1).
    pub position: Position,

    /// Discriminator; mirrors the type index entry for this position.
    pub event_type: String,

    /// Opaque payload, exactly as submitted.
    pub payload: serde_json::Value,

    /// Tags, in submission order.
    #[serde(default)]
    pub tags: Vec<Tag>,

    /// Metadata with the timestamp populated.
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl SequencedEvent {
    /// Whether this event carries the given tag.
    #[must_use]
    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tags.contains(tag)
    }

    /// View of this event minus its position, e.g. for re-submission.
    #[must_use]
    pub fn to_new_event(&self) -> NewEvent {
        NewEvent {
            event_type: self.event_type.clone(),
            payload: self.payload.clone(),
            tags: self.tags.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

impl fmt::Display for SequencedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.event_type, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sequenced(position: u64) -> SequencedEvent {
        SequencedEvent {
            position: Position::new(position),
            event_type: "CourseDefined".to_string(),
            payload: json!({ "capacity": 10 }),
            tags: vec![Tag::new("course", "c-1")],
            metadata: EventMetadata {
                timestamp: Some(Utc::now()),
                correlation_id: Some("corr-1".to_string()),
                ..EventMetadata::default()
            },
        }
    }

    #[test]
    fn builder_accumulates_tags() {
        let event = NewEvent::new("A", json!({}))
            .with_tag(Tag::new("x", "1"))
            .with_tags([Tag::new("y", "2"), Tag::new("z", "3")]);
        assert_eq!(event.tags.len(), 3);
    }

    #[test]
    fn has_tag_is_case_insensitive() {
        let event = NewEvent::new("A", json!({})).with_tag(Tag::new("Email", "A@X"));
        assert!(event.has_tag(&Tag::new("email", "a@x")));
    }

    #[test]
    fn fresh_correlation_ids_are_distinct() {
        let a = EventMetadata::with_new_correlation();
        let b = EventMetadata::with_new_correlation();
        assert!(a.correlation_id.is_some());
        assert_ne!(a.correlation_id, b.correlation_id);
    }

    #[test]
    fn to_new_event_strips_only_the_position() {
        let stored = sequenced(5);
        let resubmit = stored.to_new_event();
        assert_eq!(resubmit.event_type, stored.event_type);
        assert_eq!(resubmit.payload, stored.payload);
        assert_eq!(resubmit.tags, stored.tags);
        assert_eq!(resubmit.metadata, stored.metadata);
    }

    #[test]
    fn caused_by_links_correlation_and_causation() {
        let parent = sequenced(7);
        let metadata = EventMetadata::caused_by(&parent);
        assert_eq!(metadata.correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(metadata.causation_id.as_deref(), Some("7"));
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: test fails if serialization fails
    fn sequenced_event_round_trips_through_json() {
        let event = sequenced(3);
        let json = serde_json::to_string_pretty(&event).expect("serialize");
        let back: SequencedEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(event, back);
    }

    #[test]
    fn display_shows_type_and_position() {
        assert_eq!(sequenced(12).to_string(), "CourseDefined@12");
    }
}
