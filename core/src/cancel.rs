//! Cooperative cancellation.
//!
//! Every async store operation takes a [`Cancellation`] and checks it at its
//! suspension points. The token is a thin wrapper over a
//! `tokio::sync::watch` channel: cancelling is a single `send`, observing is
//! lock-free, and clones share the same signal.
//!
//! # Example
//!
//! ```
//! use sequent_core::cancel::CancellationSource;
//!
//! let source = CancellationSource::new();
//! let token = source.token();
//! assert!(!token.is_cancelled());
//!
//! source.cancel();
//! assert!(token.is_cancelled());
//! ```

use crate::error::{Result, StoreError};
use tokio::sync::watch;

/// The cancelling side; usually owned by the caller driving an operation.
#[derive(Debug)]
pub struct CancellationSource {
    tx: watch::Sender<bool>,
}

impl CancellationSource {
    /// Create a new source in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// A token observing this source.
    #[must_use]
    pub fn token(&self) -> Cancellation {
        Cancellation {
            rx: Some(self.tx.subscribe()),
        }
    }

    /// Trigger cancellation. Idempotent.
    pub fn cancel(&self) {
        // Ignore send errors: no receivers just means nothing is listening.
        let _ = self.tx.send(true);
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

/// The observing side, passed into every async operation.
///
/// [`Cancellation::none`] yields a token that can never fire, for callers
/// that do not need cancellation.
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    rx: Option<watch::Receiver<bool>>,
}

impl Cancellation {
    /// A token that never cancels.
    #[must_use]
    pub const fn none() -> Self {
        Self { rx: None }
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Error out if cancellation has been requested.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cancelled`] once the source has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(StoreError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve when cancellation is requested; pends forever on a
    /// [`Cancellation::none`] token. Intended for `tokio::select!` arms.
    pub async fn cancelled(&self) {
        match self.rx.clone() {
            Some(mut rx) => {
                if *rx.borrow() {
                    return;
                }
                // The source owns the sender; a closed channel means it was
                // dropped without cancelling, so we pend forever alongside
                // the None arm.
                while rx.changed().await.is_ok() {
                    if *rx.borrow() {
                        return;
                    }
                }
                std::future::pending::<()>().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
