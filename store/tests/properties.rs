//! Property-based tests over the append/read pipelines.
//!
//! Each case drives a fresh store on a temp directory inside a dedicated
//! runtime: proptest owns the outer loop, tokio the inner one.

#![allow(clippy::expect_used, clippy::panic)] // Test code uses expect/panic for clear failure messages

use proptest::prelude::*;
use sequent_core::{Cancellation, NewEvent, Position, Query, ReadOptions, Tag};
use sequent_store::{FileEventStore, StoreConfig};
use serde_json::json;
use tempfile::TempDir;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

async fn open_store(dir: &TempDir) -> FileEventStore {
    let config = StoreConfig::builder(dir.path(), "prop-store")
        // Skip fsync: these cases build hundreds of stores.
        .flush_events_immediately(false)
        .build()
        .expect("valid config");
    FileEventStore::open(config).await.expect("open store")
}

/// A small universe keeps collisions (same type, same tag) likely.
fn arb_event() -> impl Strategy<Value = (u8, u8, u8)> {
    (0u8..4, 0u8..3, 0u8..3)
}

fn build_event((type_id, tag_key, tag_value): (u8, u8, u8)) -> NewEvent {
    NewEvent::new(format!("Type{type_id}"), json!({ "t": type_id }))
        .with_tag(Tag::new(format!("k{tag_key}"), format!("v{tag_value}")))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// After appending batches of any sizes, the ledger equals the total
    /// event count and positions run 1..=total in submission order.
    #[test]
    fn ledger_equals_total_and_positions_are_contiguous(
        batches in proptest::collection::vec(
            proptest::collection::vec(arb_event(), 1..5),
            1..6,
        ),
    ) {
        runtime().block_on(async {
            let dir = TempDir::new().expect("tempdir");
            let store = open_store(&dir).await;

            let mut expected_types = Vec::new();
            for batch in &batches {
                let events: Vec<NewEvent> = batch.iter().copied().map(build_event).collect();
                expected_types.extend(events.iter().map(|e| e.event_type.clone()));
                store
                    .append(events, None, Cancellation::none())
                    .await
                    .expect("append");
            }

            let total = batches.iter().map(Vec::len).sum::<usize>() as u64;
            prop_assert_eq!(store.head().await.expect("head"), Position::new(total));

            let events = store
                .read(Query::all(), ReadOptions::new(), None, Cancellation::none())
                .await
                .expect("read");
            let positions: Vec<u64> = events.iter().map(|e| e.position.get()).collect();
            prop_assert_eq!(positions, (1..=total).collect::<Vec<u64>>());

            // Submission order is preserved across the whole sequence.
            let stored_types: Vec<String> =
                events.iter().map(|e| e.event_type.clone()).collect();
            prop_assert_eq!(stored_types, expected_types);
            Ok(())
        })?;
    }

    /// Every stored event is reachable through its type index and through
    /// each of its tags.
    #[test]
    fn every_event_is_reachable_via_its_indices(
        raw_events in proptest::collection::vec(arb_event(), 1..12),
    ) {
        runtime().block_on(async {
            let dir = TempDir::new().expect("tempdir");
            let store = open_store(&dir).await;

            let events: Vec<NewEvent> = raw_events.iter().copied().map(build_event).collect();
            store
                .append(events, None, Cancellation::none())
                .await
                .expect("append");

            let all = store
                .read(Query::all(), ReadOptions::new(), None, Cancellation::none())
                .await
                .expect("read");

            for stored in &all {
                let by_type = store
                    .read(
                        Query::for_event_type(stored.event_type.clone()),
                        ReadOptions::new(),
                        None,
                        Cancellation::none(),
                    )
                    .await
                    .expect("read by type");
                prop_assert!(by_type.iter().any(|e| e.position == stored.position));

                for tag in &stored.tags {
                    let by_tag = store
                        .read(
                            Query::for_tag(tag.clone()),
                            ReadOptions::new(),
                            None,
                            Cancellation::none(),
                        )
                        .await
                        .expect("read by tag");
                    prop_assert!(by_tag.iter().any(|e| e.position == stored.position));
                }
            }
            Ok(())
        })?;
    }

    /// Descending reads return the ascending result reversed, for any mix
    /// of events and any single-tag query.
    #[test]
    fn descending_is_reverse_of_ascending(
        raw_events in proptest::collection::vec(arb_event(), 1..12),
        tag_key in 0u8..3,
        tag_value in 0u8..3,
    ) {
        runtime().block_on(async {
            let dir = TempDir::new().expect("tempdir");
            let store = open_store(&dir).await;

            let events: Vec<NewEvent> = raw_events.iter().copied().map(build_event).collect();
            store
                .append(events, None, Cancellation::none())
                .await
                .expect("append");

            let query = Query::for_tag(Tag::new(format!("k{tag_key}"), format!("v{tag_value}")));
            let ascending = store
                .read(query.clone(), ReadOptions::new(), None, Cancellation::none())
                .await
                .expect("read");
            let descending = store
                .read(query, ReadOptions::descending(), None, Cancellation::none())
                .await
                .expect("read");

            let mut reversed = ascending;
            reversed.reverse();
            prop_assert_eq!(descending, reversed);
            Ok(())
        })?;
    }
}
