//! Per-projection checkpoints.
//!
//! A checkpoint records the highest event position a projection has folded.
//! One JSON file per projection under `projections/_checkpoints/`, written
//! atomically; values never decrease except through an explicit rebuild.
//!
//! In a 1-indexed, gap-free sequence the number of processed events equals
//! the last processed position, so `total_events_processed` is always
//! written equal to `last_processed_position`.

use chrono::{DateTime, Utc};
use sequent_core::{Position, Result, StoreError};
use sequent_store::fsio;
use sequent_store::index::sanitize_key_component;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A projection's progress through the event sequence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The projection this checkpoint belongs to.
    pub projection_name: String,
    /// Highest position already folded.
    pub last_processed_position: Position,
    /// When this checkpoint was written.
    pub last_updated: DateTime<Utc>,
    /// Equal to `last_processed_position` by construction.
    pub total_events_processed: u64,
}

impl Checkpoint {
    /// A checkpoint at `position` stamped `at`.
    #[must_use]
    pub fn at(projection_name: impl Into<String>, position: Position, at: DateTime<Utc>) -> Self {
        Self {
            projection_name: projection_name.into(),
            last_processed_position: position,
            last_updated: at,
            total_events_processed: position.get(),
        }
    }
}

/// The checkpoint directory.
#[derive(Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
    flush: bool,
}

impl CheckpointStore {
    /// Create a store over `dir` (usually `projections/_checkpoints/`).
    #[must_use]
    pub const fn new(dir: PathBuf, flush: bool) -> Self {
        Self { dir, flush }
    }

    fn file_for(&self, projection_name: &str) -> PathBuf {
        self.dir
            .join(format!("{}.checkpoint", sanitize_key_component(projection_name)))
    }

    /// Load a projection's checkpoint; `None` if it was never written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] for an unreadable file,
    /// [`StoreError::Io`] otherwise.
    pub async fn load(&self, projection_name: &str) -> Result<Option<Checkpoint>> {
        let path = self.file_for(projection_name);
        let Some(bytes) = fsio::read_optional(&path).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            StoreError::Corrupt(format!(
                "checkpoint {} does not decode: {e}",
                path.display()
            ))
        })
    }

    /// The effective position of a projection: its checkpoint, or 0.
    ///
    /// # Errors
    ///
    /// Same as [`CheckpointStore::load`].
    pub async fn position_of(&self, projection_name: &str) -> Result<Position> {
        Ok(self
            .load(projection_name)
            .await?
            .map_or(Position::ZERO, |c| c.last_processed_position))
    }

    /// Persist `checkpoint` atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] or [`StoreError::Serialization`].
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        fsio::ensure_dir(&self.dir).await?;
        let bytes = serde_json::to_vec_pretty(checkpoint).map_err(|e| {
            StoreError::serialization(
                format!("encoding checkpoint of '{}'", checkpoint.projection_name),
                e,
            )
        })?;
        fsio::write_atomic(&self.file_for(&checkpoint.projection_name), bytes, self.flush).await
    }

    /// Remove a projection's checkpoint (used by full rebuilds). Missing
    /// files are fine.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on failure.
    pub async fn delete(&self, projection_name: &str) -> Result<()> {
        fsio::remove_file_if_exists(&self.file_for(projection_name)).await
    }

    /// The checkpoint directory path.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
