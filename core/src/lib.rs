//! # Sequent Core
//!
//! Core types and traits for the Sequent event store.
//!
//! Sequent is an embedded, single-node, file-backed event store built around
//! Dynamic Consistency Boundaries (DCB): every event lives in one globally
//! ordered sequence, queries are predicates over event types and tags, and
//! the only concurrency primitive is the conditional append — "fail if any
//! event matching predicate P has appeared after position N".
//!
//! This crate holds what every other workspace member shares:
//!
//! - **Domain types**: [`NewEvent`], [`SequencedEvent`], [`Tag`],
//!   [`Position`], [`EventMetadata`]
//! - **The predicate model**: [`Query`], [`QueryItem`],
//!   [`AppendCondition`], with an in-memory [`Query::matches`] evaluator
//!   that mirrors the on-disk index semantics
//! - **The store abstraction**: the dyn-compatible [`EventStore`] trait
//! - **Capabilities**: [`clock::Clock`] and [`cancel::Cancellation`]
//! - **Errors**: [`StoreError`] and the workspace-wide [`Result`] alias
//!
//! ## Example
//!
//! ```
//! use sequent_core::{AppendCondition, NewEvent, Query, Tag};
//! use serde_json::json;
//!
//! // The write side prepares events...
//! let event = NewEvent::new("StudentRegistered", json!({ "name": "Ada" }))
//!     .with_tag(Tag::new("email", "ada@example.org"));
//!
//! // ...and guards them with the DCB condition:
//! let condition =
//!     AppendCondition::no_events_matching(Query::for_tag(Tag::new("email", "ada@example.org")));
//!
//! assert!(condition.after_position.is_none());
//! assert_eq!(event.event_type, "StudentRegistered");
//! ```

// Re-export commonly used time types
pub use chrono::{DateTime, Utc};

pub mod cancel;
pub mod clock;
pub mod error;
pub mod event;
pub mod position;
pub mod query;
pub mod store;
pub mod tag;

pub use cancel::{Cancellation, CancellationSource};
pub use error::{Result, StoreError};
pub use event::{EventMetadata, NewEvent, SequencedEvent};
pub use position::Position;
pub use query::{AppendCondition, Query, QueryItem, ReadOptions};
pub use store::{EventStore, StoreFuture};
pub use tag::Tag;
