//! Terse event constructors for tests.

use sequent_core::{NewEvent, Tag};
use serde_json::json;

/// An event of `event_type` with an empty payload and no tags.
#[must_use]
pub fn event(event_type: &str) -> NewEvent {
    NewEvent::new(event_type, json!({}))
}

/// An event of `event_type` carrying the given `(key, value)` tags.
#[must_use]
pub fn tagged_event(event_type: &str, tags: &[(&str, &str)]) -> NewEvent {
    event(event_type).with_tags(tags.iter().map(|(k, v)| Tag::new(*k, *v)))
}

/// `n` identical events of `event_type`, payloads numbered for telling
/// them apart in assertions.
#[must_use]
pub fn batch(event_type: &str, n: usize) -> Vec<NewEvent> {
    (0..n)
        .map(|i| NewEvent::new(event_type, json!({ "n": i })))
        .collect()
}
