//! Tests for the decision helper against the in-memory store.

#![allow(clippy::expect_used, clippy::panic)] // Test code uses expect/panic for clear failure messages

use sequent_core::{
    Cancellation, CancellationSource, EventStore, NewEvent, Position, Query, StoreError, Tag,
};
use sequent_runtime::retry::RetryPolicy;
use sequent_runtime::{
    DecisionExecutor, DecisionProjection, build_decision_model, build_decision_model_2,
    build_decision_model_3,
};
use sequent_testing::memory::InMemoryEventStore;
use serde_json::json;
use std::sync::Arc;

/// Counts course enrollments against a fixed capacity.
struct CourseSeats {
    course: String,
    capacity: u64,
}

#[derive(Debug, PartialEq, Eq)]
struct SeatsState {
    enrolled: u64,
}

impl DecisionProjection for CourseSeats {
    type State = SeatsState;

    fn initial_state(&self) -> SeatsState {
        SeatsState { enrolled: 0 }
    }

    fn query(&self) -> Query {
        Query::for_tag(Tag::new("course", &self.course))
    }

    fn apply(&self, state: SeatsState, event: &sequent_core::SequencedEvent) -> SeatsState {
        match event.event_type.as_str() {
            "Enrolled" => SeatsState {
                enrolled: state.enrolled + 1,
            },
            "Dropped" => SeatsState {
                enrolled: state.enrolled.saturating_sub(1),
            },
            _ => state,
        }
    }
}

/// Tracks how many courses a student is taking.
struct StudentLoad {
    student: String,
}

impl DecisionProjection for StudentLoad {
    type State = u64;

    fn initial_state(&self) -> u64 {
        0
    }

    fn query(&self) -> Query {
        Query::for_tag(Tag::new("student", &self.student))
    }

    fn apply(&self, state: u64, event: &sequent_core::SequencedEvent) -> u64 {
        match event.event_type.as_str() {
            "Enrolled" => state + 1,
            "Dropped" => state.saturating_sub(1),
            _ => state,
        }
    }
}

fn enrolled(course: &str, student: &str) -> NewEvent {
    NewEvent::new("Enrolled", json!({}))
        .with_tag(Tag::new("course", course))
        .with_tag(Tag::new("student", student))
}

async fn seed(store: &InMemoryEventStore, events: Vec<NewEvent>) {
    store
        .append(events, None, Cancellation::none())
        .await
        .expect("seed");
}

#[tokio::test]
async fn model_folds_matching_events_and_fences_at_last_read() {
    let store = InMemoryEventStore::new();
    seed(
        &store,
        vec![
            enrolled("c-1", "s-1"),
            enrolled("c-1", "s-3"),
            enrolled("c-2", "s-2"),
        ],
    )
    .await;

    let seats = CourseSeats {
        course: "c-1".to_string(),
        capacity: 10,
    };
    let model = build_decision_model(&store, &seats, &Cancellation::none())
        .await
        .expect("model");

    assert_eq!(model.state, SeatsState { enrolled: 2 });
    assert!(model.state.enrolled < seats.capacity);
    // Fenced at the last *matching* position read (2), not the head (3).
    assert_eq!(model.append_condition.after_position, Some(Position::new(2)));
    assert_eq!(model.append_condition.fail_if_events_match, seats.query());
}

#[tokio::test]
async fn empty_history_fences_at_zero() {
    let store = InMemoryEventStore::new();
    let seats = CourseSeats {
        course: "c-1".to_string(),
        capacity: 10,
    };
    let model = build_decision_model(&store, &seats, &Cancellation::none())
        .await
        .expect("model");
    assert_eq!(model.state, SeatsState { enrolled: 0 });
    assert_eq!(model.append_condition.after_position, Some(Position::ZERO));
}

#[tokio::test]
async fn two_projection_model_folds_each_over_its_own_subset() {
    let store = InMemoryEventStore::new();
    seed(
        &store,
        vec![
            enrolled("c-1", "s-1"),
            enrolled("c-1", "s-2"),
            enrolled("c-2", "s-1"),
        ],
    )
    .await;

    let seats = CourseSeats {
        course: "c-1".to_string(),
        capacity: 2,
    };
    let load = StudentLoad {
        student: "s-1".to_string(),
    };
    let model = build_decision_model_2(&store, &seats, &load, &Cancellation::none())
        .await
        .expect("model");

    let (seats_state, load_state) = model.state;
    assert_eq!(seats_state, SeatsState { enrolled: 2 });
    assert_eq!(load_state, 2);

    // One union query, one boundary.
    assert_eq!(model.append_condition.after_position, Some(Position::new(3)));
    assert_eq!(model.append_condition.fail_if_events_match.items.len(), 2);
}

#[tokio::test]
async fn three_projection_model_shares_one_read() {
    let store = InMemoryEventStore::new();
    seed(&store, vec![enrolled("c-1", "s-1"), enrolled("c-2", "s-2")]).await;

    let seats = CourseSeats {
        course: "c-1".to_string(),
        capacity: 1,
    };
    let other = CourseSeats {
        course: "c-2".to_string(),
        capacity: 1,
    };
    let load = StudentLoad {
        student: "s-1".to_string(),
    };
    let model = build_decision_model_3(&store, &seats, &other, &load, &Cancellation::none())
        .await
        .expect("model");

    let (first, second, third) = model.state;
    assert_eq!(first, SeatsState { enrolled: 1 });
    assert_eq!(second, SeatsState { enrolled: 1 });
    assert_eq!(third, 1);
    assert_eq!(model.append_condition.fail_if_events_match.items.len(), 3);
}

#[tokio::test]
async fn executor_replays_conflicts_until_success() {
    let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    store
        .append(
            vec![
                NewEvent::new("Invoice", json!({ "number": 1 })),
                NewEvent::new("Invoice", json!({ "number": 2 })),
            ],
            None,
            Cancellation::none(),
        )
        .await
        .expect("seed");

    let executor = DecisionExecutor::new(Arc::clone(&store));

    // Two contenders race to allocate the next invoice number.
    let allocate = |executor: DecisionExecutor| async move {
        executor
            .execute(
                |store, cancel| async move {
                    let last = store
                        .read_last(Query::for_event_type("Invoice"), cancel.clone())
                        .await?
                        .map_or((Position::ZERO, 0), |event| {
                            (event.position, event.payload["number"].as_u64().unwrap_or(0))
                        });
                    let next = last.1 + 1;
                    let condition = sequent_core::AppendCondition::no_events_matching(
                        Query::for_event_type("Invoice"),
                    )
                    .after(last.0);
                    store
                        .append(
                            vec![NewEvent::new("Invoice", json!({ "number": next }))],
                            Some(condition),
                            cancel,
                        )
                        .await?;
                    Ok(next)
                },
                &Cancellation::none(),
            )
            .await
    };

    let (a, b) = tokio::join!(allocate(executor.clone()), allocate(executor.clone()));
    let mut numbers = vec![a.expect("first"), b.expect("second")];
    numbers.sort_unstable();
    assert_eq!(numbers, vec![3, 4]);
}

#[tokio::test]
async fn executor_passes_non_conflict_errors_through() {
    let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    let executor = DecisionExecutor::new(store);

    let attempts = std::sync::atomic::AtomicUsize::new(0);
    let result: Result<(), _> = executor
        .execute(
            |_store, _cancel| {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { Err(StoreError::InvalidQuery("broken".to_string())) }
            },
            &Cancellation::none(),
        )
        .await;

    assert!(matches!(result, Err(StoreError::InvalidQuery(_))));
    assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn executor_surfaces_conflict_after_exhaustion() {
    let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    let executor = DecisionExecutor::new(store).with_policy(
        RetryPolicy::builder()
            .max_retries(2)
            .initial_delay(std::time::Duration::from_millis(1))
            .build(),
    );

    let attempts = std::sync::atomic::AtomicUsize::new(0);
    let result: Result<(), _> = executor
        .execute(
            |_store, _cancel| {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async {
                    Err(StoreError::AppendConditionFailed {
                        expected_after: Position::ZERO,
                        actual_highest: Position::new(1),
                    })
                }
            },
            &Cancellation::none(),
        )
        .await;

    assert!(matches!(
        result,
        Err(StoreError::AppendConditionFailed { .. })
    ));
    assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
}

#[tokio::test]
async fn cancelled_executor_stops_before_running_the_operation() {
    let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    let executor = DecisionExecutor::new(store);

    let source = CancellationSource::new();
    source.cancel();
    let result: Result<(), _> = executor
        .execute(
            |_store, _cancel| async { panic!("operation must not run after cancellation") },
            &source.token(),
        )
        .await;
    assert!(matches!(result, Err(StoreError::Cancelled)));
}
