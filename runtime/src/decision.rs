//! The DCB decision helper: read → fold → conditionally append, with
//! automatic replay on conflict.
//!
//! A [`DecisionProjection`] is a transient fold: a query selecting the
//! relevant history and a pure function folding it into a decision state.
//! [`build_decision_model`] turns one (or two, or three) of them into the
//! state plus the [`AppendCondition`] that makes the subsequent append
//! invariant-preserving: "fail if anything matching my query appeared
//! after the last position I read".
//!
//! [`DecisionExecutor::execute`] wraps the whole pattern: it runs the
//! caller's operation and replays it with exponential backoff whenever the
//! append loses the race — conflicts are a distinguished `Result` variant
//! here, not an exception to catch.
//!
//! # Example
//!
//! ```ignore
//! let executor = DecisionExecutor::new(store);
//! executor
//!     .execute(
//!         |store, cancel| async move {
//!             let model = build_decision_model(store.as_ref(), &seats, &cancel).await?;
//!             if model.state.enrolled >= model.state.capacity {
//!                 return Ok(Enrollment::Rejected);
//!             }
//!             store
//!                 .append(vec![enrolled_event()], Some(model.append_condition), cancel)
//!                 .await?;
//!             Ok(Enrollment::Accepted)
//!         },
//!         &Cancellation::none(),
//!     )
//!     .await?;
//! ```

use crate::retry::{RetryPolicy, retry_with_predicate};
use sequent_core::{
    AppendCondition, Cancellation, EventStore, Position, Query, ReadOptions, Result,
    SequencedEvent,
};
use std::sync::Arc;

/// A transient fold used to make one decision.
pub trait DecisionProjection: Send + Sync {
    /// The folded decision state.
    type State: Send;

    /// The state before any event.
    fn initial_state(&self) -> Self::State;

    /// The events this decision depends on.
    fn query(&self) -> Query;

    /// Fold one event into the state.
    fn apply(&self, state: Self::State, event: &SequencedEvent) -> Self::State;
}

/// A folded state plus the condition that keeps it consistent.
#[derive(Clone, Debug)]
pub struct DecisionModel<S> {
    /// The decision state after folding every matching event.
    pub state: S,
    /// Fails the append if anything relevant happened since the read.
    pub append_condition: AppendCondition,
}

/// Fold a single projection into a decision model.
///
/// # Errors
///
/// Propagates read failures and cancellation.
pub async fn build_decision_model<P>(
    store: &dyn EventStore,
    projection: &P,
    cancel: &Cancellation,
) -> Result<DecisionModel<P::State>>
where
    P: DecisionProjection,
{
    let query = projection.query();
    let events = store
        .read(query.clone(), ReadOptions::new(), None, cancel.clone())
        .await?;

    let last_read = events.last().map_or(Position::ZERO, |event| event.position);
    let mut state = projection.initial_state();
    for event in &events {
        state = projection.apply(state, event);
    }

    Ok(DecisionModel {
        state,
        append_condition: AppendCondition::no_events_matching(query).after(last_read),
    })
}

/// Fold two projections from one read over the union of their queries.
///
/// Each projection folds only the events its own query matches (the
/// in-memory matcher mirrors the on-disk semantics), and the combined
/// condition covers both histories with a single boundary.
///
/// # Errors
///
/// Propagates read failures and cancellation.
pub async fn build_decision_model_2<P1, P2>(
    store: &dyn EventStore,
    first: &P1,
    second: &P2,
    cancel: &Cancellation,
) -> Result<DecisionModel<(P1::State, P2::State)>>
where
    P1: DecisionProjection,
    P2: DecisionProjection,
{
    let union = first.query().union(second.query());
    let events = store
        .read(union.clone(), ReadOptions::new(), None, cancel.clone())
        .await?;

    let last_read = events.last().map_or(Position::ZERO, |event| event.position);
    let first_query = first.query();
    let second_query = second.query();
    let mut first_state = first.initial_state();
    let mut second_state = second.initial_state();
    for event in &events {
        if first_query.matches(event) {
            first_state = first.apply(first_state, event);
        }
        if second_query.matches(event) {
            second_state = second.apply(second_state, event);
        }
    }

    Ok(DecisionModel {
        state: (first_state, second_state),
        append_condition: AppendCondition::no_events_matching(union).after(last_read),
    })
}

/// Fold three projections from one read over the union of their queries.
///
/// # Errors
///
/// Propagates read failures and cancellation.
pub async fn build_decision_model_3<P1, P2, P3>(
    store: &dyn EventStore,
    first: &P1,
    second: &P2,
    third: &P3,
    cancel: &Cancellation,
) -> Result<DecisionModel<(P1::State, P2::State, P3::State)>>
where
    P1: DecisionProjection,
    P2: DecisionProjection,
    P3: DecisionProjection,
{
    let union = first.query().union(second.query()).union(third.query());
    let events = store
        .read(union.clone(), ReadOptions::new(), None, cancel.clone())
        .await?;

    let last_read = events.last().map_or(Position::ZERO, |event| event.position);
    let first_query = first.query();
    let second_query = second.query();
    let third_query = third.query();
    let mut first_state = first.initial_state();
    let mut second_state = second.initial_state();
    let mut third_state = third.initial_state();
    for event in &events {
        if first_query.matches(event) {
            first_state = first.apply(first_state, event);
        }
        if second_query.matches(event) {
            second_state = second.apply(second_state, event);
        }
        if third_query.matches(event) {
            third_state = third.apply(third_state, event);
        }
    }

    Ok(DecisionModel {
        state: (first_state, second_state, third_state),
        append_condition: AppendCondition::no_events_matching(union).after(last_read),
    })
}

/// Runs decisions against a store, replaying conflicts.
#[derive(Clone)]
pub struct DecisionExecutor {
    store: Arc<dyn EventStore>,
    policy: RetryPolicy,
}

impl DecisionExecutor {
    /// Create an executor with the default conflict-retry policy.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            policy: RetryPolicy::default(),
        }
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The store decisions run against.
    #[must_use]
    pub fn store(&self) -> Arc<dyn EventStore> {
        Arc::clone(&self.store)
    }

    /// Run `operation`, replaying it on `append_condition_failed` with
    /// exponential backoff until it succeeds or the retry budget is spent.
    /// Every other error passes through untouched, as does cancellation.
    ///
    /// # Errors
    ///
    /// Surfaces the last conflict after exhaustion, or the operation's own
    /// error.
    pub async fn execute<T, F, Fut>(&self, operation: F, cancel: &Cancellation) -> Result<T>
    where
        F: Fn(Arc<dyn EventStore>, Cancellation) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        retry_with_predicate(
            self.policy.clone(),
            || {
                let store = Arc::clone(&self.store);
                let token = cancel.clone();
                let operation = &operation;
                async move {
                    token.check()?;
                    operation(store, token.clone()).await
                }
            },
            sequent_core::StoreError::is_conflict,
        )
        .await
    }
}

impl std::fmt::Debug for DecisionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionExecutor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
