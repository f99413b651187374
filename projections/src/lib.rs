//! # Sequent Projections
//!
//! Materialized views over the Sequent event store: rebuildable key→state
//! maps folded from typed sub-streams of the global sequence.
//!
//! ## Pieces
//!
//! - [`definition::ProjectionDefinition`] — what to fold: event types, key
//!   selector, apply function, optional related-events query and tag
//!   extractor
//! - [`store::ProjectionStore`] — per-projection persisted states with a
//!   metadata index and a tag sub-index
//! - [`checkpoint::CheckpointStore`] — per-projection progress through the
//!   event sequence
//! - [`manager::ProjectionManager`] — registry, incremental updates, and
//!   O(unique-keys) rebuilds
//! - [`daemon::ProjectionDaemon`] — the polling loop advancing every
//!   projection from the minimum checkpoint
//!
//! ## Example
//!
//! ```ignore
//! use sequent_projections::{ProjectionDaemon, ProjectionDefinition, ProjectionManager};
//! use std::sync::Arc;
//!
//! let manager = Arc::new(ProjectionManager::new(store, &config, clock));
//! manager.register(ProjectionDefinition::typed::<CourseCount, _, _>(
//!     "course-counts",
//!     ["StudentEnrolled", "StudentDropped"],
//!     |event| event.payload["course"].as_str().map(str::to_string),
//!     |prior, event| apply_course_event(prior, event),
//! ))?;
//!
//! let daemon = ProjectionDaemon::new(Arc::clone(&manager));
//! let handle = daemon.start();
//! // ... later
//! handle.stop().await;
//! ```

pub mod checkpoint;
pub mod daemon;
pub mod definition;
pub mod manager;
pub mod store;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use daemon::{DaemonHandle, ProjectionDaemon};
pub use definition::{ApplyFn, KeySelector, ProjectionDefinition, RelatedQueryFn, TagExtractor};
pub use manager::{ProjectionManager, RebuildDetail, RebuildResult};
pub use store::{ProjectionStore, StateMetadata, StoredState};
