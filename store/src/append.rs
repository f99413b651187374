//! The append pipeline.
//!
//! Ordering within one append, all under the write lock:
//!
//! 1. validate the batch (nothing observable has happened yet);
//! 2. read the ledger `L`;
//! 3. evaluate the condition against positions `> after`; fail before any
//!    write;
//! 4. stamp derived copies with positions `L+1..=L+N` and timestamps;
//! 5. write payload files;
//! 6. merge the type and tag indices (one merge per key per batch);
//! 7. advance the ledger to `L+N`.
//!
//! The ledger advance is the commit point: a crash before it leaves only
//! unreachable payload/index artifacts at positions above the ledger, which
//! readers never visit and the next successful append overwrites.

use crate::query::{self, QueryEngine};
use crate::store::StoreInner;
use sequent_core::{
    AppendCondition, Cancellation, NewEvent, Position, Result, SequencedEvent, StoreError,
};
use std::collections::BTreeMap;
use tracing::Instrument;

pub(crate) async fn append(
    store: &StoreInner,
    events: Vec<NewEvent>,
    condition: Option<AppendCondition>,
    cancel: &Cancellation,
) -> Result<()> {
    let span = tracing::info_span!(
        "append",
        store = %store.config.store_name,
        events = events.len(),
        conflict = tracing::field::Empty,
    );

    let result = append_locked(store, events, condition, cancel)
        .instrument(span.clone())
        .await;

    match &result {
        Ok(()) => {}
        Err(error) if error.is_conflict() => {
            // Expected outcome of the DCB protocol; not an error state.
            span.record("conflict", true);
            tracing::debug!(parent: &span, "append condition failed");
        }
        Err(error) => {
            tracing::error!(parent: &span, error = %error, "append failed");
        }
    }
    result
}

async fn append_locked(
    store: &StoreInner,
    events: Vec<NewEvent>,
    condition: Option<AppendCondition>,
    cancel: &Cancellation,
) -> Result<()> {
    validate_batch(&events)?;
    cancel.check()?;

    let _guard = store.lock.acquire(cancel).await?;
    let head = store.ledger.read().await?;
    cancel.check()?;

    if let Some(condition) = &condition {
        check_condition(store, condition, head).await?;
        cancel.check()?;
    }

    let sequenced = sequence_batch(store, events, head);

    crate::fsio::ensure_dir(&store.paths.events_dir()).await?;
    for event in &sequenced {
        store.payloads.write(event).await?;
        cancel.check()?;
    }

    write_indices(store, &sequenced).await?;

    let new_head = Position::new(head.get() + sequenced.len() as u64);
    store.ledger.advance_to(new_head).await?;
    tracing::debug!(head = %new_head, "append committed");
    Ok(())
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

async fn check_condition(
    store: &StoreInner,
    condition: &AppendCondition,
    head: Position,
) -> Result<()> {
    query::validate_query(&condition.fail_if_events_match)?;
    let after = condition.effective_after();
    let engine = QueryEngine::new(&store.type_index, &store.tag_index);
    let matches = engine
        .evaluate(&condition.fail_if_events_match, after, head)
        .await?;
    if matches.is_empty() {
        Ok(())
    } else {
        Err(StoreError::AppendConditionFailed {
            expected_after: after,
            actual_highest: head,
        })
    }
}

/// Derive the persisted copies: consecutive positions in submission order,
/// timestamps stamped where the caller left them empty.
fn sequence_batch(
    store: &StoreInner,
    events: Vec<NewEvent>,
    head: Position,
) -> Vec<SequencedEvent> {
    let now = store.clock.now();
    events
        .into_iter()
        .enumerate()
        .map(|(i, event)| {
            let mut metadata = event.metadata;
            metadata.timestamp.get_or_insert(now);
            SequencedEvent {
                position: Position::new(head.get() + i as u64 + 1),
                event_type: event.event_type,
                payload: event.payload,
                tags: event.tags,
                metadata,
            }
        })
        .collect()
}

/// One index merge per touched key, however many events the batch holds.
async fn write_indices(store: &StoreInner, sequenced: &[SequencedEvent]) -> Result<()> {
    let mut by_type: BTreeMap<&str, Vec<u64>> = BTreeMap::new();
    let mut by_tag: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    for event in sequenced {
        by_type
            .entry(event.event_type.as_str())
            .or_default()
            .push(event.position.get());
        for tag in &event.tags {
            by_tag
                .entry(query::tag_index_key(tag))
                .or_default()
                .push(event.position.get());
        }
    }

    for (event_type, positions) in by_type {
        store.type_index.insert(event_type, &positions).await?;
    }
    for (tag_key, positions) in by_tag {
        store.tag_index.insert(&tag_key, &positions).await?;
    }
    Ok(())
}
