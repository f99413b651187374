//! # Sequent Runtime
//!
//! The runtime side of the DCB pattern: transient decision folds and the
//! conflict-retry loop that makes optimistic concurrency usable without
//! coarse locks.
//!
//! ## Core Components
//!
//! - **[`decision::DecisionProjection`]**: a query plus a pure fold
//!   yielding a decision state
//! - **[`decision::build_decision_model`]** (and the two- and
//!   three-projection variants): read once, fold, and return the state
//!   with its guarding [`sequent_core::AppendCondition`]
//! - **[`decision::DecisionExecutor`]**: runs a decision closure and
//!   replays it on conflict with exponential backoff
//! - **[`retry::RetryPolicy`]**: the backoff configuration shared by the
//!   executor
//!
//! Conflicts are ordinary `Result` variants here — the retry loop is an
//! explicit loop over values, not exception control flow.

pub mod decision;
pub mod retry;

pub use decision::{
    DecisionExecutor, DecisionModel, DecisionProjection, build_decision_model,
    build_decision_model_2, build_decision_model_3,
};
pub use retry::{RetryPolicy, RetryPolicyBuilder, retry_with_predicate};
