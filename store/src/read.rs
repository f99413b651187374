//! The read pipeline.
//!
//! Reads never lock: they compile the query to a position stream bounded by
//! the ledger (§ the commit point), then load payload files with bounded
//! concurrency. A concurrent append is invisible until its ledger advance,
//! at which point all of its payloads and index entries are already on
//! disk, so a read sees either none of the batch or all of it.

use crate::query::QueryEngine;
use crate::store::StoreInner;
use futures::stream::{self, StreamExt, TryStreamExt};
use sequent_core::{
    Cancellation, Position, Query, ReadOptions, Result, SequencedEvent, StoreError,
};
use tracing::Instrument;

/// Concurrent payload loads per read.
const LOAD_CONCURRENCY: usize = 16;

pub(crate) async fn read(
    store: &StoreInner,
    query: &Query,
    options: ReadOptions,
    from: Option<Position>,
    cancel: &Cancellation,
) -> Result<Vec<SequencedEvent>> {
    let span = tracing::info_span!(
        "read",
        store = %store.config.store_name,
        events = tracing::field::Empty,
    );

    let result = read_inner(store, query, options, from, cancel)
        .instrument(span.clone())
        .await;
    match &result {
        Ok(events) => {
            span.record("events", events.len());
        }
        Err(error) => {
            tracing::error!(parent: &span, error = %error, "read failed");
        }
    }
    result
}

async fn read_inner(
    store: &StoreInner,
    query: &Query,
    options: ReadOptions,
    from: Option<Position>,
    cancel: &Cancellation,
) -> Result<Vec<SequencedEvent>> {
    cancel.check()?;
    let head = store.ledger.read().await?;
    let engine = QueryEngine::new(&store.type_index, &store.tag_index);
    let positions = engine
        .evaluate(query, from.unwrap_or(Position::ZERO), head)
        .await?;
    cancel.check()?;

    let mut events = load_positions(store, positions).await?;
    cancel.check()?;

    if options.descending {
        events.reverse();
    }
    Ok(events)
}

pub(crate) async fn read_last(
    store: &StoreInner,
    query: &Query,
    cancel: &Cancellation,
) -> Result<Option<SequencedEvent>> {
    cancel.check()?;
    let head = store.ledger.read().await?;
    let engine = QueryEngine::new(&store.type_index, &store.tag_index);
    let positions = engine.evaluate(query, Position::ZERO, head).await?;

    match positions.last() {
        None => Ok(None),
        Some(&position) => Ok(Some(load_one(store, position).await?)),
    }
}

/// Load payloads for `positions`, concurrently but order-preserving.
async fn load_positions(
    store: &StoreInner,
    positions: Vec<Position>,
) -> Result<Vec<SequencedEvent>> {
    stream::iter(positions)
        .map(|position| load_one(store, position))
        .buffered(LOAD_CONCURRENCY)
        .try_collect()
        .await
}

async fn load_one(store: &StoreInner, position: Position) -> Result<SequencedEvent> {
    store.payloads.read(position).await?.ok_or_else(|| {
        // The index and ledger both claim this position exists.
        StoreError::Corrupt(format!(
            "indexed position {position} has no payload file"
        ))
    })
}
