//! The event store abstraction.
//!
//! # Design
//!
//! The `EventStore` trait is deliberately minimal: append with an optional
//! condition, read by query, and read the last match. Everything else —
//! projections, decisions, maintenance — is built on top of these three
//! operations.
//!
//! # Implementations
//!
//! - `FileEventStore` (in `sequent-store`): the durable, file-backed store
//! - `InMemoryEventStore` (in `sequent-testing`): fast, deterministic testing
//!
//! # Dyn Compatibility
//!
//! The trait uses explicit `Pin<Box<dyn Future>>` returns instead of
//! `async fn` to enable trait-object usage (`Arc<dyn EventStore>`). The
//! decision helper and the projection daemon hold the store behind exactly
//! that type.

use crate::cancel::Cancellation;
use crate::error::Result;
use crate::event::{NewEvent, SequencedEvent};
use crate::position::Position;
use crate::query::{AppendCondition, Query, ReadOptions};
use std::future::Future;
use std::pin::Pin;

/// Boxed future alias used by the dyn-compatible trait methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Append, query, and conditional-append over a single globally-ordered
/// event sequence.
///
/// # Consistency Contract
///
/// - Appends are linearizable; each batch occupies a gap-free run of
///   positions in submission order.
/// - A supplied [`AppendCondition`] is evaluated atomically with the append:
///   if any stored event after the condition's boundary matches its query,
///   the append fails with `AppendConditionFailed` and writes nothing
///   observable.
/// - Reads see either the state before or after any concurrent append,
///   never an intermediate.
pub trait EventStore: Send + Sync {
    /// Append a batch of events, optionally guarded by a condition.
    ///
    /// Events receive consecutive positions in submission order. The
    /// caller's events are not mutated; the store persists derived copies
    /// with timestamps stamped where missing.
    ///
    /// # Errors
    ///
    /// - `EmptyBatch` / `InvalidEvent`: input validation, nothing written
    /// - `AppendConditionFailed`: the condition matched a newer event
    /// - `LockTimeout`: cross-process contention outlasted the configured
    ///   timeout
    /// - `Cancelled`: the token fired at a suspension point
    /// - `Io` / `Serialization`: environmental failure
    fn append(
        &self,
        events: Vec<NewEvent>,
        condition: Option<AppendCondition>,
        cancel: Cancellation,
    ) -> StoreFuture<'_, ()>;

    /// Read all events matching `query`, at positions strictly greater than
    /// `from` (when given), ordered per `options`.
    ///
    /// Missing indices are treated as empty; a query over never-seen types
    /// or tags yields an empty vector, not an error.
    ///
    /// # Errors
    ///
    /// - `InvalidQuery`: the query failed validation
    /// - `Cancelled`: the token fired at a suspension point
    /// - `Io` / `Serialization` / `Corrupt`: environmental failure
    fn read(
        &self,
        query: Query,
        options: ReadOptions,
        from: Option<Position>,
        cancel: Cancellation,
    ) -> StoreFuture<'_, Vec<SequencedEvent>>;

    /// The highest-position event matching `query`, if any.
    ///
    /// # Errors
    ///
    /// Same as [`EventStore::read`].
    fn read_last(&self, query: Query, cancel: Cancellation)
    -> StoreFuture<'_, Option<SequencedEvent>>;

    /// The current highest assigned position (0 on an empty store).
    ///
    /// # Errors
    ///
    /// - `Corrupt`: the ledger exists but cannot be parsed
    /// - `Io`: environmental failure
    fn head(&self, cancel: Cancellation) -> StoreFuture<'_, Position>;
}
