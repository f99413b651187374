//! Sorted index files mapping a key to an ordered, deduplicated array.
//!
//! Both secondary indices of the event store use this shape — the type
//! index (event type → positions) and the tag index ((key, value) →
//! positions) — as does the per-projection tag sub-index (tag → projection
//! keys). Each key is one JSON file `{ "positions": [...] }` holding a
//! strictly ascending array.
//!
//! Writers merge under a per-key in-process mutex and land via atomic
//! rename. Readers take no lock: a reader racing a rename can observe a
//! transiently unreadable file on some platforms, so parse failures are
//! retried a few times with a short pause and then treated as "no data for
//! this key" — the next writer repairs the file by rewriting it in full.

use crate::fsio;
use sequent_core::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Parse-retry attempts before a torn read degrades to "empty".
const READ_RETRIES: usize = 3;
/// Pause between parse retries.
const READ_RETRY_DELAY: Duration = Duration::from_millis(1);

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile<T> {
    positions: Vec<T>,
}

/// Replace characters that are unsafe in filenames with `_`.
///
/// Applied to every index key component, so lookups behave identically on
/// case-sensitive and case-insensitive filesystems (tag components are
/// already lowercased by [`sequent_core::Tag`]).
#[must_use]
pub fn sanitize_key_component(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// A directory of sorted index files with per-key write locking.
///
/// `T` is the element type: `u64` positions for the event indices, `String`
/// projection keys for the projection tag sub-index.
#[derive(Debug)]
pub struct SortedIndex<T> {
    dir: PathBuf,
    flush: bool,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> SortedIndex<T>
where
    T: Ord + Clone + Serialize + DeserializeOwned + Send + 'static,
{
    /// Create an index over `dir`.
    #[must_use]
    pub fn new(dir: PathBuf, flush: bool) -> Self {
        Self {
            dir,
            flush,
            locks: Mutex::new(HashMap::new()),
            _marker: std::marker::PhantomData,
        }
    }

    /// The directory this index lives in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key_component(key)))
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            // A poisoned map only means another writer panicked while
            // inserting; the map itself is still usable.
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(sanitize_key_component(key))
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Read the entries for `key`; absent or persistently unreadable files
    /// read as empty.
    ///
    /// # Errors
    ///
    /// Returns [`sequent_core::StoreError::Io`] only for hard I/O failures
    /// (not for missing files or transient parse races).
    pub async fn read(&self, key: &str) -> Result<Vec<T>> {
        let path = self.file_for(key);
        for attempt in 0..READ_RETRIES {
            let Some(bytes) = fsio::read_optional(&path).await? else {
                return Ok(Vec::new());
            };
            match serde_json::from_slice::<IndexFile<T>>(&bytes) {
                Ok(file) => return Ok(file.positions),
                Err(e) if attempt + 1 < READ_RETRIES => {
                    tracing::trace!(
                        path = %path.display(),
                        attempt,
                        error = %e,
                        "index parse race, retrying"
                    );
                    tokio::time::sleep(READ_RETRY_DELAY).await;
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "index unreadable after retries, treating as empty"
                    );
                    return Ok(Vec::new());
                }
            }
        }
        Ok(Vec::new())
    }

    /// Merge `entries` (sorted or not) into the index for `key`.
    ///
    /// Holds the per-key mutex across the read-merge-write so concurrent
    /// in-process writers cannot lose updates; the write itself is an
    /// atomic rename.
    ///
    /// # Errors
    ///
    /// Returns [`sequent_core::StoreError::Io`] or
    /// [`sequent_core::StoreError::Serialization`] on failure.
    pub async fn insert(&self, key: &str, entries: &[T]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        let mut current = self.read(key).await?;
        let before = current.len();
        for entry in entries {
            match current.binary_search(entry) {
                Ok(_) => {}
                Err(at) => current.insert(at, entry.clone()),
            }
        }
        if current.len() == before {
            return Ok(());
        }
        self.write_file(key, &current).await
    }

    /// Remove `entries` from the index for `key`; the file is deleted when
    /// it becomes empty.
    ///
    /// # Errors
    ///
    /// Returns [`sequent_core::StoreError::Io`] or
    /// [`sequent_core::StoreError::Serialization`] on failure.
    pub async fn remove(&self, key: &str, entries: &[T]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        let mut current = self.read(key).await?;
        let before = current.len();
        current.retain(|existing| !entries.contains(existing));
        if current.len() == before {
            return Ok(());
        }
        if current.is_empty() {
            return fsio::remove_file_if_exists(&self.file_for(key)).await;
        }
        self.write_file(key, &current).await
    }

    async fn write_file(&self, key: &str, entries: &[T]) -> Result<()> {
        fsio::ensure_dir(&self.dir).await?;
        let file = IndexFile {
            positions: entries.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&file).map_err(|e| {
            sequent_core::StoreError::serialization(format!("encoding index for '{key}'"), e)
        })?;
        fsio::write_atomic(&self.file_for(key), bytes, self.flush).await
    }

    /// The sanitized key names with an index file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`sequent_core::StoreError::Io`] on directory-read failure.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => {
                return Err(sequent_core::StoreError::io(
                    format!("listing {}", self.dir.display()),
                    e,
                ));
            }
        };
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            sequent_core::StoreError::io(format!("listing {}", self.dir.display()), e)
        })? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(stem) = name.strip_suffix(".json") {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Delete every index file in this directory.
    ///
    /// # Errors
    ///
    /// Returns [`sequent_core::StoreError::Io`] on failure.
    pub async fn clear(&self) -> Result<()> {
        fsio::remove_dir_all_if_exists(&self.dir).await
    }
}
