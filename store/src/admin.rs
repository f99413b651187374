//! Maintenance operations: whole-store deletion, additive tag migration,
//! and operator statistics.

use crate::fsio;
use crate::query::tag_index_key;
use crate::store::StoreInner;
use sequent_core::{Cancellation, Position, Result, StoreError, Tag};

/// Result of an [`add_tags`] migration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddTagsOutcome {
    /// Total tags written across all modified events.
    pub tags_added: u64,
    /// Events of the target type that were examined.
    pub events_processed: u64,
}

/// Operator-facing counts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreStats {
    /// The ledger value; equals the number of stored events.
    pub highest_position: Position,
    /// Distinct event types with an index file.
    pub event_types: usize,
    /// Distinct (tag key, tag value) pairs with an index file.
    pub tag_entries: usize,
}

pub(crate) async fn stats(store: &StoreInner) -> Result<StoreStats> {
    Ok(StoreStats {
        highest_position: store.ledger.read().await?,
        event_types: store.type_index.keys().await?.len(),
        tag_entries: store.tag_index.keys().await?.len(),
    })
}

/// Remove every artifact of the store. Holding the write lock keeps a
/// concurrent append from interleaving with the teardown; the lock file
/// itself survives (it is an empty sentinel).
pub(crate) async fn delete_store(store: &StoreInner, cancel: &Cancellation) -> Result<()> {
    let _guard = store.lock.acquire(cancel).await?;

    fsio::remove_dir_all_if_exists(&store.paths.events_dir()).await?;
    fsio::remove_dir_all_if_exists(&store.paths.type_index_dir()).await?;
    fsio::remove_dir_all_if_exists(&store.paths.tag_index_dir()).await?;
    fsio::remove_dir_all_if_exists(&store.paths.projections_dir()).await?;
    fsio::remove_file_if_exists(&store.paths.ledger()).await?;

    tracing::info!(store = %store.config.store_name, "store deleted");
    Ok(())
}

/// Additive-only migration: every stored event of `event_type` gains each
/// of `tags_to_add` whose key it does not already carry. Existing tags are
/// never modified or removed.
///
/// The write lock is taken per event, so concurrent appends interleave with
/// a long migration instead of stalling behind it.
pub(crate) async fn add_tags(
    store: &StoreInner,
    event_type: &str,
    tags_to_add: Vec<Tag>,
    cancel: &Cancellation,
) -> Result<AddTagsOutcome> {
    if event_type.trim().is_empty() {
        return Err(StoreError::InvalidEvent(
            "event type must be non-blank".to_string(),
        ));
    }
    if let Some(tag) = tags_to_add.iter().find(|tag| !tag.is_valid()) {
        return Err(StoreError::InvalidEvent(format!(
            "tag '{tag}' has an empty key or value"
        )));
    }

    let positions = store.type_index.read(event_type).await?;
    let mut outcome = AddTagsOutcome::default();

    for raw_position in positions {
        cancel.check()?;
        let position = Position::new(raw_position);
        let _guard = store.lock.acquire(cancel).await?;

        let Some(mut event) = store.payloads.read(position).await? else {
            return Err(StoreError::Corrupt(format!(
                "indexed position {position} has no payload file"
            )));
        };
        outcome.events_processed += 1;

        let missing: Vec<Tag> = tags_to_add
            .iter()
            .filter(|tag| !event.tags.iter().any(|existing| existing.key() == tag.key()))
            .cloned()
            .collect();
        if missing.is_empty() {
            continue;
        }

        event.tags.extend(missing.iter().cloned());
        store.payloads.write(&event).await?;
        for tag in &missing {
            store
                .tag_index
                .insert(&tag_index_key(tag), &[position.get()])
                .await?;
            outcome.tags_added += 1;
        }
    }

    tracing::info!(
        store = %store.config.store_name,
        event_type,
        tags_added = outcome.tags_added,
        events_processed = outcome.events_processed,
        "tag migration complete"
    );
    Ok(outcome)
}
