//! A file store on a self-cleaning temp directory.

use crate::mocks::FixedClock;
use sequent_core::{Result, StoreError};
use sequent_store::{FileEventStore, StoreConfig, StoreConfigBuilder};
use std::sync::Arc;
use tempfile::TempDir;

/// A [`FileEventStore`] rooted in a `tempfile::TempDir`; the directory is
/// removed when the harness drops.
#[derive(Debug)]
pub struct TempStore {
    // Held for its Drop; the store only borrows the path.
    _dir: TempDir,
    store: FileEventStore,
    config: StoreConfig,
}

impl TempStore {
    /// A store named `test-store` with default configuration (fsync off —
    /// durability is not what unit tests exercise).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the temp directory or store cannot
    /// be created.
    pub async fn new() -> Result<Self> {
        Self::with_config(|builder| builder).await
    }

    /// A store with the builder customized by `configure`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] / [`StoreError::InvalidConfig`] when
    /// setup fails.
    pub async fn with_config(
        configure: impl FnOnce(StoreConfigBuilder) -> StoreConfigBuilder,
    ) -> Result<Self> {
        let dir = TempDir::new()
            .map_err(|e| StoreError::io("creating temp store directory", e))?;
        let config = configure(
            StoreConfig::builder(dir.path(), "test-store").flush_events_immediately(false),
        )
        .build()?;
        let store = FileEventStore::open_with_clock(
            config.clone(),
            Arc::new(FixedClock::epoch()),
        )
        .await?;
        Ok(Self {
            _dir: dir,
            store,
            config,
        })
    }

    /// The store under test.
    #[must_use]
    pub const fn store(&self) -> &FileEventStore {
        &self.store
    }

    /// The configuration the store was opened with.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }
}
