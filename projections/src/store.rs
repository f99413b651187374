//! Per-projection persisted state.
//!
//! Each projection owns a directory `projections/<name>/` holding one JSON
//! state file per key, a metadata index (`metadata/index.json`) and a tag
//! sub-index (`indices/<key>_<value>.json`, same file shape as the event
//! tag index but carrying projection keys).
//!
//! Writes serialize behind a per-projection mutex; reads are lock-free
//! (atomic renames make the files safe to read concurrently, and the index
//! layer retries transient parse races). The tag sub-index is
//! consistent-after-write under that mutex, not globally atomic with event
//! appends.

use crate::definition::TagExtractor;
use chrono::{DateTime, Utc};
use sequent_core::clock::Clock;
use sequent_core::{Result, StoreError, Tag};
use sequent_store::fsio;
use sequent_store::index::{SortedIndex, sanitize_key_component};
use sequent_store::query::tag_index_key;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

/// Bookkeeping kept per persisted state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMetadata {
    /// When the key was first saved.
    pub created_at: DateTime<Utc>,
    /// When the key was last saved.
    pub last_updated_at: DateTime<Utc>,
    /// Monotonic per-key save counter, starting at 1.
    pub version: u64,
    /// Serialized size of the state value.
    pub size_bytes: u64,
}

/// The persisted file shape: the state plus its metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredState {
    /// The projection state.
    pub data: Value,
    /// Bookkeeping.
    pub metadata: StateMetadata,
}

/// File-backed key → state store for one projection.
pub struct ProjectionStore {
    name: String,
    dir: PathBuf,
    flush: bool,
    write_protect: bool,
    clock: Arc<dyn Clock>,
    tag_extractor: Option<TagExtractor>,
    tag_index: SortedIndex<String>,
    gate: tokio::sync::Mutex<()>,
}

impl ProjectionStore {
    /// Create the store for projection `name` rooted at `dir`
    /// (`projections/<name>/`).
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        dir: PathBuf,
        flush: bool,
        write_protect: bool,
        clock: Arc<dyn Clock>,
        tag_extractor: Option<TagExtractor>,
    ) -> Self {
        let tag_index = SortedIndex::new(dir.join("indices"), flush);
        Self {
            name: name.into(),
            dir,
            flush,
            write_protect,
            clock,
            tag_extractor,
            tag_index,
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// The projection this store belongs to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn state_file(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key_component(key)))
    }

    fn metadata_index_file(&self) -> PathBuf {
        self.dir.join("metadata").join("index.json")
    }

    fn extract_tags(&self, data: &Value) -> Vec<Tag> {
        self.tag_extractor.as_ref().map_or_else(Vec::new, |f| f(data))
    }

    /// The state for `key`, or `None`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] for an undecodable file,
    /// [`StoreError::Io`] otherwise.
    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.get_stored(key).await?.map(|stored| stored.data))
    }

    /// The state plus its metadata for `key`, or `None`.
    ///
    /// # Errors
    ///
    /// Same as [`ProjectionStore::get`].
    pub async fn get_stored(&self, key: &str) -> Result<Option<StoredState>> {
        let path = self.state_file(key);
        let Some(bytes) = fsio::read_optional(&path).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            StoreError::Corrupt(format!(
                "projection state {} does not decode: {e}",
                path.display()
            ))
        })
    }

    /// Every `(key, state)` pair, ordered by key.
    ///
    /// # Errors
    ///
    /// Same as [`ProjectionStore::get`].
    pub async fn get_all(&self) -> Result<Vec<(String, Value)>> {
        let index = self.read_metadata_index().await?;
        let mut entries = Vec::with_capacity(index.len());
        for key in index.keys() {
            // A state deleted between the index read and this load just
            // drops out of the result.
            if let Some(state) = self.get(key).await? {
                entries.push((key.clone(), state));
            }
        }
        Ok(entries)
    }

    /// Every `(key, state)` whose state satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// Same as [`ProjectionStore::get`].
    pub async fn query_by_predicate(
        &self,
        predicate: impl Fn(&Value) -> bool + Send,
    ) -> Result<Vec<(String, Value)>> {
        let mut entries = self.get_all().await?;
        entries.retain(|(_, state)| predicate(state));
        Ok(entries)
    }

    /// Every `(key, state)` indexed under `tag`.
    ///
    /// # Errors
    ///
    /// Same as [`ProjectionStore::get`].
    pub async fn query_by_tag(&self, tag: &Tag) -> Result<Vec<(String, Value)>> {
        let keys = self.tag_index.read(&tag_index_key(tag)).await?;
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(state) = self.get(&key).await? {
                entries.push((key, state));
            }
        }
        Ok(entries)
    }

    /// Every `(key, state)` indexed under all of `tags`.
    ///
    /// # Errors
    ///
    /// Same as [`ProjectionStore::get`].
    pub async fn query_by_tags(&self, tags: &[Tag]) -> Result<Vec<(String, Value)>> {
        let Some((first, rest)) = tags.split_first() else {
            return self.get_all().await;
        };
        let mut keys: BTreeSet<String> =
            self.tag_index.read(&tag_index_key(first)).await?.into_iter().collect();
        for tag in rest {
            let next: BTreeSet<String> =
                self.tag_index.read(&tag_index_key(tag)).await?.into_iter().collect();
            keys.retain(|key| next.contains(key));
            if keys.is_empty() {
                return Ok(Vec::new());
            }
        }
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(state) = self.get(&key).await? {
                entries.push((key, state));
            }
        }
        Ok(entries)
    }

    /// Upsert `key` to `data`.
    ///
    /// One serialization pass; the state file lands atomically, metadata
    /// advances (`version + 1`, sizes, timestamps), and the tag sub-index
    /// is diffed against the tags re-derived from the previous on-disk
    /// state — the in-memory cache is empty after a restart, so disk is
    /// the source of old tags.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] / [`StoreError::Serialization`] /
    /// [`StoreError::Corrupt`] on failure.
    pub async fn save(&self, key: &str, data: Value) -> Result<()> {
        let _gate = self.gate.lock().await;

        let previous = self.get_stored(key).await?;
        let now = self.clock.now();
        let size_bytes = serde_json::to_vec(&data)
            .map_err(|e| {
                StoreError::serialization(format!("encoding state '{key}' of '{}'", self.name), e)
            })?
            .len() as u64;

        let metadata = match &previous {
            Some(stored) => StateMetadata {
                created_at: stored.metadata.created_at,
                last_updated_at: now,
                version: stored.metadata.version + 1,
                size_bytes,
            },
            None => StateMetadata {
                created_at: now,
                last_updated_at: now,
                version: 1,
                size_bytes,
            },
        };

        let old_tags: BTreeSet<Tag> = previous
            .as_ref()
            .map(|stored| self.extract_tags(&stored.data))
            .unwrap_or_default()
            .into_iter()
            .collect();
        let new_tags: BTreeSet<Tag> = self.extract_tags(&data).into_iter().collect();

        let stored = StoredState { data, metadata };
        let bytes = serde_json::to_vec_pretty(&stored).map_err(|e| {
            StoreError::serialization(format!("encoding state '{key}' of '{}'", self.name), e)
        })?;
        let path = self.state_file(key);
        fsio::ensure_dir(&self.dir).await?;
        fsio::write_atomic(&path, bytes, self.flush).await?;
        if self.write_protect {
            fsio::set_readonly(&path).await?;
        }

        let mut index = self.read_metadata_index().await?;
        index.insert(key.to_string(), stored.metadata.clone());
        self.write_metadata_index(&index).await?;

        let key_entry = [key.to_string()];
        for tag in old_tags.difference(&new_tags) {
            self.tag_index.remove(&tag_index_key(tag), &key_entry).await?;
        }
        for tag in new_tags.difference(&old_tags) {
            self.tag_index.insert(&tag_index_key(tag), &key_entry).await?;
        }
        Ok(())
    }

    /// Remove `key`: its state file, metadata entry, and tag index
    /// entries. Absent keys are fine.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] / [`StoreError::Serialization`] on
    /// failure.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let _gate = self.gate.lock().await;

        let previous = self.get_stored(key).await?;
        fsio::remove_file_if_exists(&self.state_file(key)).await?;

        let mut index = self.read_metadata_index().await?;
        if index.remove(key).is_some() {
            self.write_metadata_index(&index).await?;
        }

        if let Some(stored) = previous {
            let key_entry = [key.to_string()];
            for tag in self.extract_tags(&stored.data) {
                self.tag_index.remove(&tag_index_key(&tag), &key_entry).await?;
            }
        }
        Ok(())
    }

    /// Replace the entire projection contents in one pass: each unique key
    /// is persisted exactly once, then the metadata index and each tag
    /// file are written once. Used by rebuilds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] / [`StoreError::Serialization`] on
    /// failure.
    pub async fn commit_rebuild(&self, entries: BTreeMap<String, Value>) -> Result<()> {
        let _gate = self.gate.lock().await;

        // Start from nothing: states, metadata, and tag sub-index.
        fsio::remove_dir_all_if_exists(&self.dir).await?;
        fsio::ensure_dir(&self.dir).await?;

        let now = self.clock.now();
        let mut metadata_index = BTreeMap::new();
        let mut tags_to_keys: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (key, data) in entries {
            let size_bytes = serde_json::to_vec(&data)
                .map_err(|e| {
                    StoreError::serialization(
                        format!("encoding state '{key}' of '{}'", self.name),
                        e,
                    )
                })?
                .len() as u64;
            for tag in self.extract_tags(&data) {
                tags_to_keys
                    .entry(tag_index_key(&tag))
                    .or_default()
                    .push(key.clone());
            }
            let metadata = StateMetadata {
                created_at: now,
                last_updated_at: now,
                version: 1,
                size_bytes,
            };
            let stored = StoredState { data, metadata };
            let bytes = serde_json::to_vec_pretty(&stored).map_err(|e| {
                StoreError::serialization(format!("encoding state '{key}' of '{}'", self.name), e)
            })?;
            let path = self.state_file(&key);
            fsio::write_atomic(&path, bytes, self.flush).await?;
            if self.write_protect {
                fsio::set_readonly(&path).await?;
            }
            metadata_index.insert(key, stored.metadata);
        }

        self.write_metadata_index(&metadata_index).await?;
        for (tag_key, keys) in tags_to_keys {
            self.tag_index.insert(&tag_key, &keys).await?;
        }
        Ok(())
    }

    /// Drop the tag sub-index (rebuilds clear it before repopulating).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on failure.
    pub async fn delete_all_indices(&self) -> Result<()> {
        self.tag_index.clear().await
    }

    /// Remove every artifact of this projection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on failure.
    pub async fn clear(&self) -> Result<()> {
        let _gate = self.gate.lock().await;
        fsio::remove_dir_all_if_exists(&self.dir).await
    }

    /// The metadata of every key, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] / [`StoreError::Io`] on failure.
    pub async fn metadata_index(&self) -> Result<BTreeMap<String, StateMetadata>> {
        self.read_metadata_index().await
    }

    async fn read_metadata_index(&self) -> Result<BTreeMap<String, StateMetadata>> {
        let path = self.metadata_index_file();
        let Some(bytes) = fsio::read_optional(&path).await? else {
            return Ok(BTreeMap::new());
        };
        serde_json::from_slice(&bytes).map_err(|e| {
            StoreError::Corrupt(format!(
                "projection metadata index {} does not decode: {e}",
                path.display()
            ))
        })
    }

    async fn write_metadata_index(
        &self,
        index: &BTreeMap<String, StateMetadata>,
    ) -> Result<()> {
        let path = self.metadata_index_file();
        if let Some(parent) = path.parent() {
            fsio::ensure_dir(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(index).map_err(|e| {
            StoreError::serialization(
                format!("encoding metadata index of '{}'", self.name),
                e,
            )
        })?;
        fsio::write_atomic(&path, bytes, self.flush).await
    }
}

impl std::fmt::Debug for ProjectionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectionStore")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sequent_core::clock::SystemClock;
    use serde_json::json;

    fn extractor() -> TagExtractor {
        Arc::new(|state: &Value| {
            state["campus"]
                .as_str()
                .map(|campus| Tag::new("campus", campus))
                .into_iter()
                .collect()
        })
    }

    fn store_in(dir: &tempfile::TempDir) -> ProjectionStore {
        ProjectionStore::new(
            "by-course",
            dir.path().join("by-course"),
            true,
            false,
            Arc::new(SystemClock),
            Some(extractor()),
        )
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test fails on filesystem errors
    async fn save_get_delete_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        assert!(store.get("c-1").await.expect("get").is_none());

        store
            .save("c-1", json!({ "count": 1, "campus": "east" }))
            .await
            .expect("save");
        assert_eq!(
            store.get("c-1").await.expect("get"),
            Some(json!({ "count": 1, "campus": "east" }))
        );

        store.delete("c-1").await.expect("delete");
        assert!(store.get("c-1").await.expect("get").is_none());
        assert!(store.metadata_index().await.expect("index").is_empty());
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test fails on filesystem errors
    async fn metadata_tracks_versions_and_sizes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        store.save("c-1", json!({ "count": 1 })).await.expect("save");
        let first = store
            .get_stored("c-1")
            .await
            .expect("get")
            .expect("stored")
            .metadata;
        assert_eq!(first.version, 1);

        store
            .save("c-1", json!({ "count": 2, "extra": "x" }))
            .await
            .expect("save");
        let second = store
            .get_stored("c-1")
            .await
            .expect("get")
            .expect("stored")
            .metadata;
        assert_eq!(second.version, 2);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.last_updated_at >= first.last_updated_at);
        assert!(second.size_bytes > first.size_bytes);

        let index = store.metadata_index().await.expect("index");
        assert_eq!(index.get("c-1"), Some(&second));
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test fails on filesystem errors
    async fn tag_sub_index_follows_state_changes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        store
            .save("c-1", json!({ "campus": "east" }))
            .await
            .expect("save");
        store
            .save("c-2", json!({ "campus": "east" }))
            .await
            .expect("save");

        let east = store
            .query_by_tag(&Tag::new("campus", "east"))
            .await
            .expect("query");
        assert_eq!(
            east.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            vec!["c-1", "c-2"]
        );

        // Moving a state to another tag updates both sides of the diff.
        store
            .save("c-1", json!({ "campus": "west" }))
            .await
            .expect("save");
        let east = store
            .query_by_tag(&Tag::new("campus", "east"))
            .await
            .expect("query");
        assert_eq!(east.len(), 1);
        let west = store
            .query_by_tag(&Tag::new("campus", "west"))
            .await
            .expect("query");
        assert_eq!(west[0].0, "c-1");

        // Deleting removes the remaining entries.
        store.delete("c-2").await.expect("delete");
        assert!(store
            .query_by_tag(&Tag::new("campus", "east"))
            .await
            .expect("query")
            .is_empty());
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test fails on filesystem errors
    async fn query_by_tags_intersects() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ProjectionStore::new(
            "multi",
            dir.path().join("multi"),
            true,
            false,
            Arc::new(SystemClock),
            Some(Arc::new(|state: &Value| {
                let mut tags = Vec::new();
                if let Some(campus) = state["campus"].as_str() {
                    tags.push(Tag::new("campus", campus));
                }
                if let Some(term) = state["term"].as_str() {
                    tags.push(Tag::new("term", term));
                }
                tags
            })),
        );

        store
            .save("a", json!({ "campus": "east", "term": "fall" }))
            .await
            .expect("save");
        store
            .save("b", json!({ "campus": "east", "term": "spring" }))
            .await
            .expect("save");

        let both = store
            .query_by_tags(&[Tag::new("campus", "east"), Tag::new("term", "fall")])
            .await
            .expect("query");
        assert_eq!(both.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(), vec!["a"]);
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test fails on filesystem errors
    async fn commit_rebuild_replaces_everything_in_one_pass() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        store
            .save("stale", json!({ "campus": "north" }))
            .await
            .expect("save");

        let mut entries = BTreeMap::new();
        entries.insert("c-1".to_string(), json!({ "campus": "east" }));
        entries.insert("c-2".to_string(), json!({ "campus": "west" }));
        store.commit_rebuild(entries).await.expect("rebuild");

        assert!(store.get("stale").await.expect("get").is_none());
        assert_eq!(store.get_all().await.expect("all").len(), 2);
        assert!(store
            .query_by_tag(&Tag::new("campus", "north"))
            .await
            .expect("query")
            .is_empty());
        assert_eq!(
            store
                .query_by_tag(&Tag::new("campus", "east"))
                .await
                .expect("query")
                .len(),
            1
        );

        let index = store.metadata_index().await.expect("index");
        assert_eq!(index.len(), 2);
        assert!(index.values().all(|m| m.version == 1));
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test fails on filesystem errors
    async fn delete_all_indices_drops_only_the_tag_sub_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        store
            .save("c-1", json!({ "campus": "east" }))
            .await
            .expect("save");
        store.delete_all_indices().await.expect("clear indices");

        // States survive; tag lookups come back empty until re-indexed.
        assert!(store.get("c-1").await.expect("get").is_some());
        assert!(store
            .query_by_tag(&Tag::new("campus", "east"))
            .await
            .expect("query")
            .is_empty());
    }

    #[tokio::test]
    #[allow(clippy::expect_used)] // Panics: test fails on filesystem errors
    async fn predicate_queries_filter_loaded_states() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        store.save("c-1", json!({ "count": 5 })).await.expect("save");
        store.save("c-2", json!({ "count": 9 })).await.expect("save");

        let heavy = store
            .query_by_predicate(|state| state["count"].as_u64().unwrap_or(0) > 6)
            .await
            .expect("query");
        assert_eq!(heavy.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(), vec!["c-2"]);
    }
}
