//! Projection definitions: what to fold, from which events, into which
//! keys.
//!
//! A definition is registered with the
//! [`ProjectionManager`](crate::manager::ProjectionManager) and drives both
//! incremental updates and full rebuilds. There is no runtime type
//! discovery: whatever should be active is registered explicitly at
//! startup.
//!
//! States are carried as `serde_json::Value`; [`ProjectionDefinition::typed`]
//! wraps strongly-typed fold functions so domain code never touches raw
//! JSON.

use sequent_core::{Query, Result, SequencedEvent, StoreError, Tag};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Chooses the projection key for an event; `None` skips the event.
pub type KeySelector = Arc<dyn Fn(&SequencedEvent) -> Option<String> + Send + Sync>;

/// Folds one event into a state. `None` in means "no prior state for this
/// key"; `None` out deletes the key. The slice holds the events resolved
/// from the definition's related-events query (empty when unset).
pub type ApplyFn =
    Arc<dyn Fn(Option<Value>, &SequencedEvent, &[SequencedEvent]) -> Result<Option<Value>> + Send + Sync>;

/// Builds the additional read issued before each apply.
pub type RelatedQueryFn = Arc<dyn Fn(&SequencedEvent) -> Query + Send + Sync>;

/// Derives the tags a persisted state is indexed under.
pub type TagExtractor = Arc<dyn Fn(&Value) -> Vec<Tag> + Send + Sync>;

/// A named fold over a typed sub-stream of the event sequence.
#[derive(Clone)]
pub struct ProjectionDefinition {
    name: String,
    event_types: Arc<HashSet<String>>,
    key_selector: KeySelector,
    apply: ApplyFn,
    related_events: Option<RelatedQueryFn>,
    tag_extractor: Option<TagExtractor>,
}

impl ProjectionDefinition {
    /// Define a projection folding raw JSON states.
    ///
    /// Prefer [`ProjectionDefinition::typed`] in domain code.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        event_types: impl IntoIterator<Item = impl Into<String>>,
        key_selector: KeySelector,
        apply: ApplyFn,
    ) -> Self {
        Self {
            name: name.into(),
            event_types: Arc::new(event_types.into_iter().map(Into::into).collect()),
            key_selector,
            apply,
            related_events: None,
            tag_extractor: None,
        }
    }

    /// Define a projection with strongly-typed states; serialization to and
    /// from the persisted JSON is supplied here, once, by `serde`.
    #[must_use]
    pub fn typed<S, K, A>(
        name: impl Into<String>,
        event_types: impl IntoIterator<Item = impl Into<String>>,
        key_selector: K,
        apply: A,
    ) -> Self
    where
        S: Serialize + DeserializeOwned + Send + 'static,
        K: Fn(&SequencedEvent) -> Option<String> + Send + Sync + 'static,
        A: Fn(Option<S>, &SequencedEvent) -> Option<S> + Send + Sync + 'static,
    {
        let name = name.into();
        let apply_name = name.clone();
        Self::new(
            name,
            event_types,
            Arc::new(key_selector),
            Arc::new(move |prior: Option<Value>, event, _related| {
                let prior: Option<S> = prior
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(|e| {
                        StoreError::serialization(
                            format!("decoding state of projection '{apply_name}'"),
                            e,
                        )
                    })?;
                match apply(prior, event) {
                    None => Ok(None),
                    Some(next) => serde_json::to_value(next).map(Some).map_err(|e| {
                        StoreError::serialization(
                            format!("encoding state of projection '{apply_name}'"),
                            e,
                        )
                    }),
                }
            }),
        )
    }

    /// Request an additional read before each apply; the resolved events
    /// are passed to the apply function.
    #[must_use]
    pub fn with_related_events(mut self, related: RelatedQueryFn) -> Self {
        self.related_events = Some(related);
        self
    }

    /// Index persisted states under the tags this extractor derives.
    #[must_use]
    pub fn with_tag_extractor(mut self, extractor: TagExtractor) -> Self {
        self.tag_extractor = Some(extractor);
        self
    }

    /// The unique projection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The event types this projection folds.
    #[must_use]
    pub fn event_types(&self) -> &HashSet<String> {
        &self.event_types
    }

    /// Whether `event` is of a type this projection folds.
    #[must_use]
    pub fn accepts(&self, event: &SequencedEvent) -> bool {
        self.event_types.contains(&event.event_type)
    }

    /// The query loading every event this projection folds.
    #[must_use]
    pub fn source_query(&self) -> Query {
        Query::for_event_types(self.event_types.iter().cloned())
    }

    pub(crate) fn key_for(&self, event: &SequencedEvent) -> Option<String> {
        (self.key_selector)(event)
    }

    pub(crate) fn apply(
        &self,
        prior: Option<Value>,
        event: &SequencedEvent,
        related: &[SequencedEvent],
    ) -> Result<Option<Value>> {
        (self.apply)(prior, event, related)
    }

    pub(crate) fn related_query(&self, event: &SequencedEvent) -> Option<Query> {
        self.related_events.as_ref().map(|f| f(event))
    }

    pub(crate) fn tag_extractor(&self) -> Option<&TagExtractor> {
        self.tag_extractor.as_ref()
    }
}

impl std::fmt::Debug for ProjectionDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectionDefinition")
            .field("name", &self.name)
            .field("event_types", &self.event_types)
            .field("related_events", &self.related_events.is_some())
            .field("tag_extractor", &self.tag_extractor.is_some())
            .finish_non_exhaustive()
    }
}
