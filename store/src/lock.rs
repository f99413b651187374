//! Write exclusion: process mutex + cross-process file lock.
//!
//! Appends (and the tag migration) serialize through two gates, in order:
//!
//! 1. an in-process `tokio::sync::Mutex`, which is FIFO-fair and
//!    short-circuits intra-process contention without touching the
//!    filesystem;
//! 2. an exclusive OS lock on `.store.lock` in the store root, which
//!    protects the store when several processes share the directory (e.g.
//!    over a network mount).
//!
//! Contention on the file lock is retried with exponential backoff from
//! 10 ms up to a 500 ms cap until the configured timeout elapses.

use fs2::FileExt;
use sequent_core::{Cancellation, Result, StoreError};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Initial pause after a contended lock attempt.
const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
/// Backoff ceiling.
const MAX_BACKOFF: Duration = Duration::from_millis(500);

/// The store's write lock.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    timeout: Duration,
    process_gate: tokio::sync::Mutex<()>,
}

/// Holds both gates; releases them (file lock first) on drop.
#[derive(Debug)]
pub struct WriteGuard<'a> {
    file: Option<std::fs::File>,
    _process: tokio::sync::MutexGuard<'a, ()>,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            // Errors on unlock are unrecoverable and moot: closing the
            // descriptor releases the lock regardless.
            let _ = fs2::FileExt::unlock(&file);
        }
    }
}

impl StoreLock {
    /// Create a lock over `path` with the given acquisition timeout.
    #[must_use]
    pub fn new(path: PathBuf, timeout: Duration) -> Self {
        Self {
            path,
            timeout,
            process_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Acquire both gates, waiting up to the configured timeout for the
    /// file lock.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Cancelled`] as soon as the token fires, including
    ///   mid-backoff
    /// - [`StoreError::LockTimeout`] when the file lock stays contended
    /// - [`StoreError::Io`] if the lock file cannot be opened
    pub async fn acquire(&self, cancel: &Cancellation) -> Result<WriteGuard<'_>> {
        cancel.check()?;

        let process = tokio::select! {
            guard = self.process_gate.lock() => guard,
            () = cancel.cancelled() => return Err(StoreError::Cancelled),
        };

        let started = Instant::now();
        let mut backoff = INITIAL_BACKOFF;
        loop {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&self.path)
                .map_err(|e| {
                    StoreError::io(format!("opening lock file {}", self.path.display()), e)
                })?;

            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(WriteGuard {
                        file: Some(file),
                        _process: process,
                    });
                }
                Err(e) if is_contention(&e) => {
                    let waited = started.elapsed();
                    if waited >= self.timeout {
                        return Err(StoreError::LockTimeout {
                            waited,
                            timeout: self.timeout,
                        });
                    }
                    tokio::select! {
                        () = tokio::time::sleep(backoff) => {}
                        () = cancel.cancelled() => return Err(StoreError::Cancelled),
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(e) => {
                    return Err(StoreError::io(
                        format!("locking {}", self.path.display()),
                        e,
                    ));
                }
            }
        }
    }
}

fn is_contention(error: &std::io::Error) -> bool {
    error.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
