//! # Sequent Store
//!
//! The file-backed event store: a durable implementation of the
//! [`sequent_core::EventStore`] contract over a plain directory tree.
//!
//! ## Layout
//!
//! Everything lives under `<root>/<store-name>/`: one pretty-printed JSON
//! file per event, a sorted-array index file per event type and per tag, a
//! single-integer ledger as the commit point, and a lock file for
//! cross-process exclusion. See [`paths::StorePaths`].
//!
//! ## Consistency
//!
//! - Every persisted file is written via temp file + atomic rename
//!   ([`fsio`]).
//! - Appends serialize behind an in-process mutex and an exclusive OS file
//!   lock ([`lock::StoreLock`]), assign gap-free positions, and commit by
//!   advancing the ledger last ([`append`]).
//! - Reads are lock-free and bounded by the ledger, so they observe either
//!   all of a concurrent batch or none of it ([`read`]).
//! - The conditional append — fail if any event matching a query exists
//!   after a position — is the store's only concurrency primitive.
//!
//! ## Example
//!
//! ```ignore
//! use sequent_core::{AppendCondition, Cancellation, NewEvent, Query, Tag};
//! use sequent_store::{FileEventStore, StoreConfig};
//! use serde_json::json;
//!
//! let config = StoreConfig::builder("/var/lib/sequent", "registrations").build()?;
//! let store = FileEventStore::open(config).await?;
//!
//! let email = Tag::new("email", "ada@example.org");
//! store
//!     .append(
//!         vec![NewEvent::new("StudentRegistered", json!({})).with_tag(email.clone())],
//!         Some(AppendCondition::no_events_matching(Query::for_tag(email))),
//!         Cancellation::none(),
//!     )
//!     .await?;
//! ```

pub mod admin;
mod append;
pub mod config;
pub mod fsio;
pub mod index;
pub mod ledger;
pub mod lock;
pub mod paths;
pub mod payload;
pub mod query;
mod read;
mod store;

pub use admin::{AddTagsOutcome, StoreStats};
pub use config::{ProjectionSettings, StoreConfig, StoreConfigBuilder};
pub use store::FileEventStore;
