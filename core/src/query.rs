//! Predicate model over the event sequence.
//!
//! A [`Query`] is a disjunction of [`QueryItem`]s:
//!
//! - OR across items;
//! - within one item, OR across `event_types` and AND across `tags`;
//! - an item with neither types nor tags matches every event.
//!
//! The same semantics exist twice, deliberately: the store's query engine
//! evaluates them against the on-disk type and tag indices, while
//! [`Query::matches`] evaluates them against an in-memory event. The decision
//! helper relies on both views agreeing when it folds one multi-projection
//! read into per-projection states.
//!
//! [`AppendCondition`] turns a query into the store's sole concurrency
//! primitive: "fail the append if any event matching this query exists after
//! position N".

use crate::event::SequencedEvent;
use crate::position::Position;
use crate::tag::Tag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One conjunctive arm of a [`Query`].
///
/// # Examples
///
/// ```
/// use sequent_core::{QueryItem, Tag};
///
/// let item = QueryItem::new()
///     .with_event_type("CourseDefined")
///     .with_tag(Tag::new("course", "c-1"));
/// assert!(!item.is_catch_all());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryItem {
    /// Accepted event types (OR). Empty means "any type".
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub event_types: BTreeSet<String>,

    /// Required tags (AND). Empty means "no tag requirement".
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<Tag>,
}

impl QueryItem {
    /// An item with no constraints (matches every event).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept events of `event_type` (added to the OR set).
    #[must_use]
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types.insert(event_type.into());
        self
    }

    /// Require `tag` (added to the AND set).
    #[must_use]
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.insert(tag);
        self
    }

    /// Whether this item matches every event.
    #[must_use]
    pub fn is_catch_all(&self) -> bool {
        self.event_types.is_empty() && self.tags.is_empty()
    }

    /// Evaluate this item against an in-memory event.
    #[must_use]
    pub fn matches(&self, event: &SequencedEvent) -> bool {
        let type_ok =
            self.event_types.is_empty() || self.event_types.contains(&event.event_type);
        let tags_ok = self.tags.iter().all(|tag| event.has_tag(tag));
        type_ok && tags_ok
    }
}

/// A disjunction of [`QueryItem`]s over the global event sequence.
///
/// # Examples
///
/// ```
/// use sequent_core::{Query, Tag};
///
/// // All events of one type:
/// let by_type = Query::for_event_type("Invoice");
///
/// // All events carrying a tag:
/// let by_tag = Query::for_tag(Tag::new("email", "a@x"));
///
/// // Everything:
/// let all = Query::all();
/// assert!(all.is_catch_all());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// The disjunction; at least one item.
    pub items: Vec<QueryItem>,
}

impl Query {
    /// The query matching every event.
    #[must_use]
    pub fn all() -> Self {
        Self {
            items: vec![QueryItem::new()],
        }
    }

    /// A single-item query.
    #[must_use]
    pub fn from_item(item: QueryItem) -> Self {
        Self { items: vec![item] }
    }

    /// A query over several items (OR).
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = QueryItem>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }

    /// Shorthand: all events of one type.
    #[must_use]
    pub fn for_event_type(event_type: impl Into<String>) -> Self {
        Self::from_item(QueryItem::new().with_event_type(event_type))
    }

    /// Shorthand: all events of any of the given types.
    #[must_use]
    pub fn for_event_types(event_types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut item = QueryItem::new();
        for event_type in event_types {
            item.event_types.insert(event_type.into());
        }
        Self::from_item(item)
    }

    /// Shorthand: all events carrying the tag.
    #[must_use]
    pub fn for_tag(tag: Tag) -> Self {
        Self::from_item(QueryItem::new().with_tag(tag))
    }

    /// Whether this query matches every event (some item is a catch-all).
    #[must_use]
    pub fn is_catch_all(&self) -> bool {
        self.items.iter().any(QueryItem::is_catch_all)
    }

    /// Whether the query has no items at all (matches nothing).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Evaluate against an in-memory event; mirrors the on-disk OR/AND
    /// semantics of the query engine exactly.
    #[must_use]
    pub fn matches(&self, event: &SequencedEvent) -> bool {
        self.items.iter().any(|item| item.matches(event))
    }

    /// The union of this query with another (OR of all items).
    ///
    /// Used by the multi-projection decision model to issue one read for
    /// several projections.
    #[must_use]
    pub fn union(mut self, other: Self) -> Self {
        self.items.extend(other.items);
        self
    }
}

/// The store's only concurrency primitive.
///
/// An append guarded by an `AppendCondition` commits only if **no** stored
/// event with position strictly greater than `after_position` matches
/// `fail_if_events_match`. A `None` bound means "since the beginning".
///
/// # Examples
///
/// ```
/// use sequent_core::{AppendCondition, Position, Query, Tag};
///
/// // "No other registration with this email, ever":
/// let unique = AppendCondition::no_events_matching(
///     Query::for_tag(Tag::new("email", "a@x")),
/// );
/// assert_eq!(unique.after_position, None);
///
/// // "No newer invoice than the one I read at position 2":
/// let fenced = unique.after(Position::new(2));
/// assert_eq!(fenced.after_position, Some(Position::new(2)));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendCondition {
    /// The predicate that must not match any newer event.
    pub fail_if_events_match: Query,

    /// Exclusive lower bound; `None` checks the whole sequence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_position: Option<Position>,
}

impl AppendCondition {
    /// Condition failing on any match over the entire sequence.
    #[must_use]
    pub const fn no_events_matching(query: Query) -> Self {
        Self {
            fail_if_events_match: query,
            after_position: None,
        }
    }

    /// Restrict the check to events after `position`.
    #[must_use]
    pub const fn after(mut self, position: Position) -> Self {
        self.after_position = Some(position);
        self
    }

    /// The effective exclusive lower bound (0 when unset).
    #[must_use]
    pub fn effective_after(&self) -> Position {
        self.after_position.unwrap_or(Position::ZERO)
    }
}

/// Options shaping a read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Return events in descending position order.
    pub descending: bool,
}

impl ReadOptions {
    /// Ascending order (the default).
    #[must_use]
    pub const fn new() -> Self {
        Self { descending: false }
    }

    /// Descending order.
    #[must_use]
    pub const fn descending() -> Self {
        Self { descending: true }
    }
}
