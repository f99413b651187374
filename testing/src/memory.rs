//! In-memory event store for fast, deterministic tests.
//!
//! Implements the full [`EventStore`] contract — gap-free positions,
//! append conditions, query semantics, ordering — over a `Vec` behind an
//! async `RwLock`. The in-memory matcher and the file store's index
//! evaluation implement the same predicate semantics, so decision-loop
//! tests written against this store transfer to the durable one.

use sequent_core::clock::{Clock, SystemClock};
use sequent_core::{
    AppendCondition, Cancellation, EventStore, NewEvent, Position, Query, ReadOptions, Result,
    SequencedEvent, StoreError, StoreFuture,
};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A `Vec`-backed [`EventStore`].
pub struct InMemoryEventStore {
    events: RwLock<Vec<SequencedEvent>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryEventStore {
    /// An empty store stamping timestamps from the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// An empty store with an injected clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            clock,
        }
    }

    /// Every stored event, ascending.
    pub async fn dump(&self) -> Vec<SequencedEvent> {
        self.events.read().await.clone()
    }

    async fn append_inner(
        &self,
        events: Vec<NewEvent>,
        condition: Option<AppendCondition>,
        cancel: Cancellation,
    ) -> Result<()> {
        cancel.check()?;
        validate_batch(&events)?;

        let mut stored = self.events.write().await;
        let head = Position::new(stored.len() as u64);

        if let Some(condition) = &condition {
            let after = condition.effective_after();
            let conflicting = stored
                .iter()
                .any(|event| event.position > after && condition.fail_if_events_match.matches(event));
            if conflicting {
                return Err(StoreError::AppendConditionFailed {
                    expected_after: after,
                    actual_highest: head,
                });
            }
        }

        let now = self.clock.now();
        for (i, event) in events.into_iter().enumerate() {
            let mut metadata = event.metadata;
            metadata.timestamp.get_or_insert(now);
            stored.push(SequencedEvent {
                position: Position::new(head.get() + i as u64 + 1),
                event_type: event.event_type,
                payload: event.payload,
                tags: event.tags,
                metadata,
            });
        }
        Ok(())
    }

    async fn read_inner(
        &self,
        query: Query,
        options: ReadOptions,
        from: Option<Position>,
        cancel: Cancellation,
    ) -> Result<Vec<SequencedEvent>> {
        cancel.check()?;
        let from = from.unwrap_or(Position::ZERO);
        let stored = self.events.read().await;
        let mut matching: Vec<SequencedEvent> = stored
            .iter()
            .filter(|event| event.position > from && query.matches(event))
            .cloned()
            .collect();
        if options.descending {
            matching.reverse();
        }
        Ok(matching)
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_batch(events: &[NewEvent]) -> Result<()> {
    if events.is_empty() {
        return Err(StoreError::EmptyBatch);
    }
    for (i, event) in events.iter().enumerate() {
        if event.event_type.trim().is_empty() {
            return Err(StoreError::InvalidEvent(format!(
                "event #{i} has a blank event type"
            )));
        }
        if let Some(tag) = event.tags.iter().find(|tag| !tag.is_valid()) {
            return Err(StoreError::InvalidEvent(format!(
                "event #{i} carries tag '{tag}' with an empty key or value"
            )));
        }
    }
    Ok(())
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<NewEvent>,
        condition: Option<AppendCondition>,
        cancel: Cancellation,
    ) -> StoreFuture<'_, ()> {
        Box::pin(self.append_inner(events, condition, cancel))
    }

    fn read(
        &self,
        query: Query,
        options: ReadOptions,
        from: Option<Position>,
        cancel: Cancellation,
    ) -> StoreFuture<'_, Vec<SequencedEvent>> {
        Box::pin(self.read_inner(query, options, from, cancel))
    }

    fn read_last(
        &self,
        query: Query,
        cancel: Cancellation,
    ) -> StoreFuture<'_, Option<SequencedEvent>> {
        Box::pin(async move {
            let matching = self
                .read_inner(query, ReadOptions::new(), None, cancel)
                .await?;
            Ok(matching.into_iter().next_back())
        })
    }

    fn head(&self, cancel: Cancellation) -> StoreFuture<'_, Position> {
        Box::pin(async move {
            cancel.check()?;
            Ok(Position::new(self.events.read().await.len() as u64))
        })
    }
}

impl std::fmt::Debug for InMemoryEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventStore").finish_non_exhaustive()
    }
}
