//! Per-position event payload files.
//!
//! Each committed event is one pretty-printed JSON file at
//! `events/<zero-padded position>.json`. Files at positions above the
//! ledger may exist after a crash mid-append; they are unreachable (reads
//! go through the indices and the ledger bound) and the next successful
//! append at that position overwrites them.

use crate::fsio;
use sequent_core::{Position, Result, SequencedEvent, StoreError};
use std::path::PathBuf;

use crate::paths::StorePaths;

/// Reads and writes the `events/` directory.
#[derive(Debug)]
pub struct PayloadStore {
    paths: StorePaths,
    flush: bool,
    write_protect: bool,
}

impl PayloadStore {
    /// Create a payload store over `paths`.
    #[must_use]
    pub const fn new(paths: StorePaths, flush: bool, write_protect: bool) -> Self {
        Self {
            paths,
            flush,
            write_protect,
        }
    }

    fn file_for(&self, position: Position) -> PathBuf {
        self.paths.event_file(position.get())
    }

    /// Persist `event` at its position, overwriting any orphan left by a
    /// crashed append. Durable before return when flushing is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the event cannot be encoded
    /// or [`StoreError::Io`] on filesystem failure.
    pub async fn write(&self, event: &SequencedEvent) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(event).map_err(|e| {
            StoreError::serialization(format!("encoding event at {}", event.position), e)
        })?;
        let path = self.file_for(event.position);
        fsio::write_atomic(&path, bytes, self.flush).await?;
        if self.write_protect {
            fsio::set_readonly(&path).await?;
        }
        Ok(())
    }

    /// Load the event at `position`, or `None` when no payload file exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if the file exists but does not
    /// decode as an event, or [`StoreError::Io`] on filesystem failure.
    pub async fn read(&self, position: Position) -> Result<Option<SequencedEvent>> {
        let path = self.file_for(position);
        let Some(bytes) = fsio::read_optional(&path).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            StoreError::Corrupt(format!(
                "event file {} does not decode: {e}",
                path.display()
            ))
        })
    }

    /// Remove the payload file at `position`, clearing write protection.
    /// Missing files are fine.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on filesystem failure.
    pub async fn delete(&self, position: Position) -> Result<()> {
        fsio::remove_file_if_exists(&self.file_for(position)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sequent_core::{EventMetadata, Tag};
    use serde_json::json;
    use std::path::Path;

    fn event_at(position: u64) -> SequencedEvent {
        SequencedEvent {
            position: Position::new(position),
            event_type: "CourseDefined".to_string(),
            payload: json!({ "capacity": 12 }),
            tags: vec![Tag::new("course", "c-1")],
            metadata: EventMetadata::default(),
        }
    }

    fn store_in(dir: &Path, write_protect: bool) -> PayloadStore {
        let paths = StorePaths::new(dir, "s");
        std::fs::create_dir_all(paths.events_dir()).ok();
        PayloadStore::new(paths, true, write_protect)
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test fails on filesystem errors
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path(), false);

        let event = event_at(1);
        store.write(&event).await.expect("write");
        let loaded = store.read(Position::new(1)).await.expect("read");
        assert_eq!(loaded, Some(event));
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test fails on filesystem errors
    async fn missing_position_reads_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path(), false);
        assert_eq!(store.read(Position::new(9)).await.expect("read"), None);
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test fails on filesystem errors
    async fn write_protected_files_can_be_overwritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path(), true);

        store.write(&event_at(1)).await.expect("write");
        let mut updated = event_at(1);
        updated.payload = json!({ "capacity": 20 });
        store.write(&updated).await.expect("overwrite");

        let loaded = store.read(Position::new(1)).await.expect("read");
        assert_eq!(loaded, Some(updated));
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test fails on filesystem errors
    async fn corrupt_payload_surfaces_as_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path(), false);

        let paths = StorePaths::new(dir.path(), "s");
        std::fs::write(paths.event_file(1), b"{ torn").expect("seed");
        assert!(matches!(
            store.read(Position::new(1)).await,
            Err(StoreError::Corrupt(_))
        ));
    }
}
