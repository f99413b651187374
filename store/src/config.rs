//! Store configuration.
//!
//! A [`StoreConfig`] names the store's location (`root_path` +
//! `store_name`) and tunes durability, write protection, locking, and the
//! projection daemon. Built via the builder, validated once at
//! construction.

use sequent_core::{Result, StoreError};
use std::path::PathBuf;
use std::time::Duration;

/// Bounds for `max_concurrent_rebuilds`.
const REBUILD_CONCURRENCY_RANGE: std::ops::RangeInclusive<usize> = 1..=64;

/// Settings for the projection subsystem.
#[derive(Clone, Debug)]
pub struct ProjectionSettings {
    /// Pause between daemon ticks.
    pub polling_interval: Duration,
    /// Events per `update` chunk during a tick.
    pub batch_size: usize,
    /// Rebuild projections with a zero checkpoint at startup.
    pub enable_auto_rebuild: bool,
    /// Parallelism for `rebuild_all`, clamped to `[1, 64]`.
    pub max_concurrent_rebuilds: usize,
}

impl Default for ProjectionSettings {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_secs(5),
            batch_size: 1_000,
            enable_auto_rebuild: false,
            max_concurrent_rebuilds: 4,
        }
    }
}

/// Configuration for one store instance.
///
/// # Examples
///
/// ```
/// use sequent_store::StoreConfig;
///
/// let config = StoreConfig::builder("/var/lib/sequent", "orders")
///     .flush_events_immediately(true)
///     .build()
///     .unwrap();
/// assert_eq!(config.store_name, "orders");
/// ```
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Directory containing one or more stores.
    pub root_path: PathBuf,
    /// Subdirectory under `root_path` holding this instance's data.
    pub store_name: String,
    /// Fsync payloads and the ledger on every append. Disable only for
    /// bulk ingest and tests.
    pub flush_events_immediately: bool,
    /// Mark committed payload files read-only at the OS level.
    pub write_protect_event_files: bool,
    /// Mark projection state files read-only at the OS level.
    pub write_protect_projection_files: bool,
    /// How long an append waits for the cross-process lock.
    pub cross_process_lock_timeout: Duration,
    /// Projection subsystem settings.
    pub projection: ProjectionSettings,
}

impl StoreConfig {
    /// Start building a configuration for the store `store_name` under
    /// `root_path`.
    #[must_use]
    pub fn builder(root_path: impl Into<PathBuf>, store_name: impl Into<String>) -> StoreConfigBuilder {
        StoreConfigBuilder {
            root_path: root_path.into(),
            store_name: store_name.into(),
            flush_events_immediately: true,
            write_protect_event_files: false,
            write_protect_projection_files: false,
            cross_process_lock_timeout: Duration::from_secs(5),
            projection: ProjectionSettings::default(),
        }
    }
}

/// Builder for [`StoreConfig`].
#[derive(Clone, Debug)]
pub struct StoreConfigBuilder {
    root_path: PathBuf,
    store_name: String,
    flush_events_immediately: bool,
    write_protect_event_files: bool,
    write_protect_projection_files: bool,
    cross_process_lock_timeout: Duration,
    projection: ProjectionSettings,
}

impl StoreConfigBuilder {
    /// Fsync payloads and the ledger on every append (default `true`).
    #[must_use]
    pub const fn flush_events_immediately(mut self, flush: bool) -> Self {
        self.flush_events_immediately = flush;
        self
    }

    /// Write-protect committed payload files (default `false`).
    #[must_use]
    pub const fn write_protect_event_files(mut self, protect: bool) -> Self {
        self.write_protect_event_files = protect;
        self
    }

    /// Write-protect projection state files (default `false`).
    #[must_use]
    pub const fn write_protect_projection_files(mut self, protect: bool) -> Self {
        self.write_protect_projection_files = protect;
        self
    }

    /// Cross-process lock timeout (default 5 s).
    #[must_use]
    pub const fn cross_process_lock_timeout(mut self, timeout: Duration) -> Self {
        self.cross_process_lock_timeout = timeout;
        self
    }

    /// Pause between projection daemon ticks (default 5 s).
    #[must_use]
    pub const fn polling_interval(mut self, interval: Duration) -> Self {
        self.projection.polling_interval = interval;
        self
    }

    /// Events per projection update chunk (default 1000).
    #[must_use]
    pub const fn batch_size(mut self, batch_size: usize) -> Self {
        self.projection.batch_size = batch_size;
        self
    }

    /// Rebuild never-bootstrapped projections at startup (default `false`).
    #[must_use]
    pub const fn enable_auto_rebuild(mut self, enable: bool) -> Self {
        self.projection.enable_auto_rebuild = enable;
        self
    }

    /// Parallelism for `rebuild_all` (default 4; clamped to `[1, 64]`).
    #[must_use]
    pub const fn max_concurrent_rebuilds(mut self, concurrency: usize) -> Self {
        self.projection.max_concurrent_rebuilds = concurrency;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] when the store name is not a
    /// plain identifier or a numeric setting is out of range.
    pub fn build(mut self) -> Result<StoreConfig> {
        if self.store_name.is_empty()
            || !self
                .store_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(StoreError::InvalidConfig(format!(
                "store name {:?} must be a non-empty identifier of [A-Za-z0-9_-]",
                self.store_name
            )));
        }
        if self.projection.batch_size == 0 {
            return Err(StoreError::InvalidConfig(
                "projection batch size must be at least 1".to_string(),
            ));
        }
        self.projection.max_concurrent_rebuilds = self
            .projection
            .max_concurrent_rebuilds
            .clamp(*REBUILD_CONCURRENCY_RANGE.start(), *REBUILD_CONCURRENCY_RANGE.end());
        Ok(StoreConfig {
            root_path: self.root_path,
            store_name: self.store_name,
            flush_events_immediately: self.flush_events_immediately,
            write_protect_event_files: self.write_protect_event_files,
            write_protect_projection_files: self.write_protect_projection_files,
            cross_process_lock_timeout: self.cross_process_lock_timeout,
            projection: self.projection,
        })
    }
}
