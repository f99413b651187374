//! The projection manager: registry, incremental updates, rebuilds.
//!
//! The manager owns one [`ProjectionStore`] per registered definition and
//! drives two code paths:
//!
//! - **Incremental**: [`ProjectionManager::update`] folds a batch of freshly
//!   read events into every projection whose type set matches, then
//!   advances checkpoints. One projection failing never blocks the others.
//! - **Rebuild**: [`ProjectionManager::rebuild`] re-reads the projection's
//!   entire typed sub-stream, folds it in memory keyed by projection key
//!   (O(unique keys) persistence), and commits through the bulk path.
//!
//! Registration is explicit: the composition root registers every
//! definition that should be active. Nothing is discovered at runtime.

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::definition::ProjectionDefinition;
use crate::store::ProjectionStore;
use futures::StreamExt;
use sequent_core::clock::Clock;
use sequent_core::{
    Cancellation, EventStore, Position, ReadOptions, Result, SequencedEvent, StoreError,
};
use sequent_store::StoreConfig;
use sequent_store::config::ProjectionSettings;
use sequent_store::index::sanitize_key_component;
use sequent_store::paths::StorePaths;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::Instrument;

/// Outcome of rebuilding one projection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RebuildDetail {
    /// The projection that was rebuilt.
    pub projection_name: String,
    /// Events folded during the rebuild.
    pub events_processed: u64,
    /// The checkpoint set at the end.
    pub checkpoint: Position,
}

/// Outcome of [`ProjectionManager::rebuild_all`].
#[derive(Clone, Debug)]
pub struct RebuildResult {
    /// Per-projection outcomes, in completion order.
    pub details: Vec<RebuildDetail>,
    /// Wall-clock time for the whole pass.
    pub duration: Duration,
}

struct Registered {
    definition: ProjectionDefinition,
    store: Arc<ProjectionStore>,
    /// Serializes incremental updates against rebuilds per projection.
    gate: tokio::sync::Mutex<()>,
}

/// Registry and driver for every active projection.
pub struct ProjectionManager {
    event_store: Arc<dyn EventStore>,
    checkpoints: CheckpointStore,
    registry: RwLock<BTreeMap<String, Arc<Registered>>>,
    settings: ProjectionSettings,
    store_name: String,
    projections_dir: std::path::PathBuf,
    flush: bool,
    write_protect: bool,
    clock: Arc<dyn Clock>,
}

impl ProjectionManager {
    /// Create a manager over `event_store`, persisting under the
    /// `projections/` directory of the store described by `config`.
    #[must_use]
    pub fn new(
        event_store: Arc<dyn EventStore>,
        config: &StoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let paths = StorePaths::new(&config.root_path, &config.store_name);
        Self {
            event_store,
            checkpoints: CheckpointStore::new(
                paths.checkpoints_dir(),
                config.flush_events_immediately,
            ),
            registry: RwLock::new(BTreeMap::new()),
            settings: config.projection.clone(),
            store_name: config.store_name.clone(),
            projections_dir: paths.projections_dir(),
            flush: config.flush_events_immediately,
            write_protect: config.write_protect_projection_files,
            clock,
        }
    }

    /// Register a projection definition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateProjection`] when the name is taken.
    pub fn register(&self, definition: ProjectionDefinition) -> Result<()> {
        let name = definition.name().to_string();
        let mut registry = self.registry_mut();
        if registry.contains_key(&name) {
            return Err(StoreError::DuplicateProjection(name));
        }

        let store = Arc::new(ProjectionStore::new(
            name.clone(),
            self.projections_dir.join(sanitize_key_component(&name)),
            self.flush,
            self.write_protect,
            Arc::clone(&self.clock),
            definition.tag_extractor().cloned(),
        ));
        registry.insert(
            name.clone(),
            Arc::new(Registered {
                definition,
                store,
                gate: tokio::sync::Mutex::new(()),
            }),
        );
        tracing::info!(store = %self.store_name, projection = %name, "projection registered");
        Ok(())
    }

    /// The registered projection names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.registry_read().keys().cloned().collect()
    }

    /// The state store of a registered projection, for queries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownProjection`] for unregistered names.
    pub fn store_of(&self, projection_name: &str) -> Result<Arc<ProjectionStore>> {
        self.registered(projection_name)
            .map(|registered| Arc::clone(&registered.store))
    }

    /// A projection's current checkpoint, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownProjection`] for unregistered names;
    /// propagates checkpoint-store failures.
    pub async fn checkpoint(&self, projection_name: &str) -> Result<Option<Checkpoint>> {
        let registered = self.registered(projection_name)?;
        self.checkpoints.load(registered.definition.name()).await
    }

    /// The minimum checkpoint position across every registered projection;
    /// 0 when none are registered.
    ///
    /// # Errors
    ///
    /// Propagates checkpoint-store failures.
    pub async fn min_checkpoint(&self) -> Result<Position> {
        let names = self.names();
        let mut min = Position::ZERO;
        for (i, name) in names.iter().enumerate() {
            let position = self.checkpoints.position_of(name).await?;
            if i == 0 || position < min {
                min = position;
            }
        }
        Ok(min)
    }

    /// Fold `batch` (ascending positions) into every registered
    /// projection and advance their checkpoints to the batch maximum.
    ///
    /// A projection whose apply fails keeps its previous checkpoint; the
    /// failure is logged and the remaining projections proceed (their
    /// checkpoints advance independently).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cancelled`] when the token fires between
    /// projections; per-projection apply failures are contained.
    pub async fn update(&self, batch: &[SequencedEvent], cancel: &Cancellation) -> Result<()> {
        let Some(batch_max) = batch.iter().map(|e| e.position).max() else {
            return Ok(());
        };

        let registered: Vec<Arc<Registered>> = self.registry_read().values().cloned().collect();
        for projection in registered {
            cancel.check()?;
            let name = projection.definition.name().to_string();
            if let Err(error) = self.update_one(&projection, batch, batch_max, cancel).await {
                if matches!(error, StoreError::Cancelled) {
                    return Err(error);
                }
                tracing::error!(
                    store = %self.store_name,
                    projection = %name,
                    error = %error,
                    "projection update failed; checkpoint not advanced"
                );
            }
        }
        Ok(())
    }

    async fn update_one(
        &self,
        projection: &Registered,
        batch: &[SequencedEvent],
        batch_max: Position,
        cancel: &Cancellation,
    ) -> Result<()> {
        let _gate = projection.gate.lock().await;
        let name = projection.definition.name();

        let current = self.checkpoints.position_of(name).await?;
        if batch_max <= current {
            // Already folded (e.g. a rebuild ran past this batch).
            return Ok(());
        }

        for event in batch {
            cancel.check()?;
            if event.position <= current || !projection.definition.accepts(event) {
                continue;
            }
            self.apply_event(projection, event).await?;
        }

        self.checkpoints
            .save(&Checkpoint::at(name, batch_max, self.clock.now()))
            .await
    }

    async fn apply_event(&self, projection: &Registered, event: &SequencedEvent) -> Result<()> {
        let Some(key) = projection.definition.key_for(event) else {
            return Ok(());
        };
        let related = match projection.definition.related_query(event) {
            None => Vec::new(),
            Some(query) => {
                self.event_store
                    .read(query, ReadOptions::new(), None, Cancellation::none())
                    .await?
            }
        };
        let prior = projection.store.get(&key).await?;
        match projection.definition.apply(prior, event, &related)? {
            Some(next) => projection.store.save(&key, next).await,
            None => projection.store.delete(&key).await,
        }
    }

    /// Rebuild one projection from the full event sequence.
    ///
    /// The fold runs in memory keyed by projection key, so each unique key
    /// is persisted exactly once however many events touched it; the
    /// checkpoint is reset to the highest folded position under the same
    /// per-projection lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownProjection`] for unregistered names,
    /// [`StoreError::Cancelled`] when interrupted, and any storage error.
    pub async fn rebuild(
        &self,
        projection_name: &str,
        cancel: &Cancellation,
    ) -> Result<RebuildDetail> {
        let projection = self.registered(projection_name)?;
        let span = tracing::info_span!(
            "rebuild",
            store = %self.store_name,
            projection = %projection_name,
            events = tracing::field::Empty,
        );

        let result = self
            .rebuild_inner(&projection, cancel)
            .instrument(span.clone())
            .await;
        match &result {
            Ok(detail) => {
                span.record("events", detail.events_processed);
                tracing::info!(
                    parent: &span,
                    checkpoint = %detail.checkpoint,
                    "projection rebuilt"
                );
            }
            Err(error) => {
                tracing::error!(parent: &span, error = %error, "rebuild failed");
            }
        }
        result
    }

    async fn rebuild_inner(
        &self,
        projection: &Registered,
        cancel: &Cancellation,
    ) -> Result<RebuildDetail> {
        let _gate = projection.gate.lock().await;
        let name = projection.definition.name();

        let events = self
            .event_store
            .read(
                projection.definition.source_query(),
                ReadOptions::new(),
                None,
                cancel.clone(),
            )
            .await?;

        let mut states: BTreeMap<String, Value> = BTreeMap::new();
        let mut max_position = Position::ZERO;
        for event in &events {
            cancel.check()?;
            max_position = max_position.max(event.position);
            let Some(key) = projection.definition.key_for(event) else {
                continue;
            };
            let related = match projection.definition.related_query(event) {
                None => Vec::new(),
                Some(query) => {
                    self.event_store
                        .read(query, ReadOptions::new(), None, cancel.clone())
                        .await?
                }
            };
            let prior = states.remove(&key);
            if let Some(next) = projection.definition.apply(prior, event, &related)? {
                states.insert(key, next);
            }
        }

        projection.store.commit_rebuild(states).await?;
        self.checkpoints
            .save(&Checkpoint::at(name, max_position, self.clock.now()))
            .await?;

        Ok(RebuildDetail {
            projection_name: name.to_string(),
            events_processed: events.len() as u64,
            checkpoint: max_position,
        })
    }

    /// Rebuild every registered projection (`force`), or only those whose
    /// checkpoint is still 0 (never bootstrapped), with bounded
    /// parallelism.
    ///
    /// # Errors
    ///
    /// Propagates the first rebuild failure after draining in-flight
    /// rebuilds; `Cancelled` when interrupted.
    pub async fn rebuild_all(&self, force: bool, cancel: &Cancellation) -> Result<RebuildResult> {
        let started = std::time::Instant::now();

        let mut targets = Vec::new();
        for name in self.names() {
            if force || self.checkpoints.position_of(&name).await? == Position::ZERO {
                targets.push(name);
            }
        }

        let concurrency = self.settings.max_concurrent_rebuilds;
        let outcomes: Vec<Result<RebuildDetail>> = futures::stream::iter(
            targets
                .into_iter()
                .map(|name| async move { self.rebuild(&name, cancel).await }),
        )
        .buffer_unordered(concurrency)
        .collect()
        .await;

        let mut details = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            details.push(outcome?);
        }
        Ok(RebuildResult {
            details,
            duration: started.elapsed(),
        })
    }

    /// The settings this manager runs with.
    #[must_use]
    pub const fn settings(&self) -> &ProjectionSettings {
        &self.settings
    }

    /// The event store this manager reads from.
    #[must_use]
    pub fn event_store(&self) -> Arc<dyn EventStore> {
        Arc::clone(&self.event_store)
    }

    fn registered(&self, projection_name: &str) -> Result<Arc<Registered>> {
        self.registry_read()
            .get(projection_name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownProjection(projection_name.to_string()))
    }

    fn registry_read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Arc<Registered>>> {
        match self.registry.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn registry_mut(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Arc<Registered>>> {
        match self.registry.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for ProjectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectionManager")
            .field("store", &self.store_name)
            .field("projections", &self.names())
            .finish_non_exhaustive()
    }
}
