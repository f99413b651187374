//! The file-backed event store facade.

use crate::admin::{self, AddTagsOutcome, StoreStats};
use crate::config::StoreConfig;
use crate::index::SortedIndex;
use crate::ledger::Ledger;
use crate::lock::StoreLock;
use crate::paths::StorePaths;
use crate::payload::PayloadStore;
use crate::{append, read};
use sequent_core::clock::{Clock, SystemClock};
use sequent_core::{
    AppendCondition, Cancellation, EventStore, NewEvent, Position, Query, ReadOptions, Result,
    SequencedEvent, StoreFuture, Tag,
};
use std::sync::Arc;

/// An embedded, file-backed event store with DCB conditional appends.
///
/// One instance owns one store directory (`<root>/<store-name>/`). Cloning
/// is cheap (the state is behind an `Arc`) and all clones share the same
/// write serialization.
///
/// # Examples
///
/// ```ignore
/// use sequent_store::{FileEventStore, StoreConfig};
/// use sequent_core::{Cancellation, NewEvent, Query, ReadOptions, Tag};
/// use serde_json::json;
///
/// let config = StoreConfig::builder("/var/lib/sequent", "courses").build()?;
/// let store = FileEventStore::open(config).await?;
///
/// store
///     .append(
///         vec![NewEvent::new("CourseDefined", json!({ "capacity": 10 }))
///             .with_tag(Tag::new("course", "c-1"))],
///         None,
///         Cancellation::none(),
///     )
///     .await?;
///
/// let events = store
///     .read(Query::all(), ReadOptions::new(), None, Cancellation::none())
///     .await?;
/// assert_eq!(events.len(), 1);
/// ```
#[derive(Clone)]
pub struct FileEventStore {
    pub(crate) inner: Arc<StoreInner>,
}

/// Shared state behind the facade.
pub(crate) struct StoreInner {
    pub(crate) config: StoreConfig,
    pub(crate) paths: StorePaths,
    pub(crate) ledger: Ledger,
    pub(crate) payloads: PayloadStore,
    pub(crate) type_index: SortedIndex<u64>,
    pub(crate) tag_index: SortedIndex<u64>,
    pub(crate) lock: StoreLock,
    pub(crate) clock: Arc<dyn Clock>,
}

impl FileEventStore {
    /// Open (or create) the store described by `config`, stamping
    /// timestamps from the system clock.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the store directory cannot be created.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock)).await
    }

    /// Open the store with an injected clock (tests use a fixed clock so
    /// timestamps are deterministic).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the store directory cannot be created.
    pub async fn open_with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let paths = StorePaths::new(&config.root_path, &config.store_name);
        crate::fsio::ensure_dir(paths.store_dir()).await?;

        let flush = config.flush_events_immediately;
        let inner = StoreInner {
            ledger: Ledger::new(paths.ledger(), flush),
            payloads: PayloadStore::new(
                paths.clone(),
                flush,
                config.write_protect_event_files,
            ),
            type_index: SortedIndex::new(paths.type_index_dir(), flush),
            tag_index: SortedIndex::new(paths.tag_index_dir(), flush),
            lock: StoreLock::new(paths.lock_file(), config.cross_process_lock_timeout),
            paths,
            clock,
            config,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// The store's configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// The store's resolved filesystem layout.
    #[must_use]
    pub fn paths(&self) -> &StorePaths {
        &self.inner.paths
    }

    /// Append a batch of events, optionally guarded by a DCB condition.
    ///
    /// See [`EventStore::append`] for the full contract.
    ///
    /// # Errors
    ///
    /// `EmptyBatch`, `InvalidEvent`, `AppendConditionFailed`,
    /// `LockTimeout`, `Cancelled`, `Io`, `Serialization`.
    pub async fn append(
        &self,
        events: Vec<NewEvent>,
        condition: Option<AppendCondition>,
        cancel: Cancellation,
    ) -> Result<()> {
        append::append(&self.inner, events, condition, &cancel).await
    }

    /// Read all events matching `query` after `from`, ordered per
    /// `options`.
    ///
    /// # Errors
    ///
    /// `InvalidQuery`, `Cancelled`, `Io`, `Serialization`, `Corrupt`.
    pub async fn read(
        &self,
        query: Query,
        options: ReadOptions,
        from: Option<Position>,
        cancel: Cancellation,
    ) -> Result<Vec<SequencedEvent>> {
        read::read(&self.inner, &query, options, from, &cancel).await
    }

    /// The highest-position event matching `query`, if any.
    ///
    /// # Errors
    ///
    /// Same as [`FileEventStore::read`].
    pub async fn read_last(
        &self,
        query: Query,
        cancel: Cancellation,
    ) -> Result<Option<SequencedEvent>> {
        read::read_last(&self.inner, &query, &cancel).await
    }

    /// The current highest assigned position (0 on an empty store).
    ///
    /// # Errors
    ///
    /// `Corrupt` if the ledger is unreadable, `Io` otherwise.
    pub async fn head(&self) -> Result<Position> {
        self.inner.ledger.read().await
    }

    /// Counts useful for operators and tests.
    ///
    /// # Errors
    ///
    /// `Io` on directory-listing failures.
    pub async fn stats(&self) -> Result<StoreStats> {
        admin::stats(&self.inner).await
    }

    /// Delete every artifact of this store: events, indices, projections,
    /// checkpoints, and the ledger. Idempotent; the next append recreates
    /// the directory structure.
    ///
    /// # Errors
    ///
    /// `LockTimeout`, `Cancelled`, `Io`.
    pub async fn delete_store(&self, cancel: Cancellation) -> Result<()> {
        admin::delete_store(&self.inner, &cancel).await
    }

    /// Additive tag migration: give every stored event of `event_type` the
    /// tags (by key) it does not already carry.
    ///
    /// # Errors
    ///
    /// `InvalidEvent` for malformed tags, plus the append-path errors.
    pub async fn add_tags(
        &self,
        event_type: &str,
        tags: Vec<Tag>,
        cancel: Cancellation,
    ) -> Result<AddTagsOutcome> {
        admin::add_tags(&self.inner, event_type, tags, &cancel).await
    }
}

impl EventStore for FileEventStore {
    fn append(
        &self,
        events: Vec<NewEvent>,
        condition: Option<AppendCondition>,
        cancel: Cancellation,
    ) -> StoreFuture<'_, ()> {
        Box::pin(self.append(events, condition, cancel))
    }

    fn read(
        &self,
        query: Query,
        options: ReadOptions,
        from: Option<Position>,
        cancel: Cancellation,
    ) -> StoreFuture<'_, Vec<SequencedEvent>> {
        Box::pin(self.read(query, options, from, cancel))
    }

    fn read_last(
        &self,
        query: Query,
        cancel: Cancellation,
    ) -> StoreFuture<'_, Option<SequencedEvent>> {
        Box::pin(self.read_last(query, cancel))
    }

    fn head(&self, _cancel: Cancellation) -> StoreFuture<'_, Position> {
        Box::pin(self.head())
    }
}

impl std::fmt::Debug for FileEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileEventStore")
            .field("store", &self.inner.config.store_name)
            .field("root", &self.inner.config.root_path)
            .finish_non_exhaustive()
    }
}
