//! The ledger: the store's commit point.
//!
//! A single file holding the highest assigned position as decimal text. The
//! append pipeline advances it only after every payload and index write of a
//! batch has landed, which makes the ledger the one place readers need to
//! trust: positions above it do not exist yet, whatever the `events/`
//! directory contains.

use crate::fsio;
use sequent_core::{Position, Result, StoreError};
use std::path::PathBuf;

/// Durable `highest assigned position` counter.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    flush: bool,
}

impl Ledger {
    /// Create a handle over the ledger file at `path`.
    ///
    /// `flush` controls whether advances are fsync'd before returning.
    #[must_use]
    pub const fn new(path: PathBuf, flush: bool) -> Self {
        Self { path, flush }
    }

    /// The current highest assigned position; 0 if the ledger was never
    /// written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if the file exists but does not
    /// parse as a position. The store never repairs this silently.
    pub async fn read(&self) -> Result<Position> {
        let Some(bytes) = fsio::read_optional(&self.path).await? else {
            return Ok(Position::ZERO);
        };
        let text = String::from_utf8_lossy(&bytes);
        text.trim()
            .parse::<u64>()
            .map(Position::new)
            .map_err(|_| {
                StoreError::Corrupt(format!(
                    "ledger {} holds non-numeric contents {:?}",
                    self.path.display(),
                    text.chars().take(32).collect::<String>(),
                ))
            })
    }

    /// Advance the ledger to `new_highest`.
    ///
    /// The write is atomic (temp file + rename) and, when flushing is
    /// enabled, durable before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if `new_highest` does not exceed the
    /// current value (the ledger never moves backwards), or
    /// [`StoreError::Io`] on filesystem failure.
    pub async fn advance_to(&self, new_highest: Position) -> Result<()> {
        let current = self.read().await?;
        if new_highest <= current {
            return Err(StoreError::Corrupt(format!(
                "refusing to move ledger backwards: {current} -> {new_highest}"
            )));
        }
        fsio::write_atomic(
            &self.path,
            new_highest.get().to_string().into_bytes(),
            self.flush,
        )
        .await
    }
}
