//! Cooperative cancellation for background jobs

use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// A cancellation token for long-running jobs
///
/// Clones share state: cancelling one cancels all of them.
///
/// # Examples
///
/// ```rust
/// use upload_guard::jobs::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let token = CancellationToken::new();
///     let worker = token.clone();
///
///     let handle = tokio::spawn(async move {
///         worker.cancelled().await;
///     });
///
///     token.cancel();
///     handle.await.unwrap();
///     assert!(token.is_cancelled());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<CancellationState>,
}

#[derive(Debug)]
struct CancellationState {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    /// Create a new cancellation token
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            state: Arc::new(CancellationState { tx, rx }),
        }
    }

    /// Check if cancellation has been requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.state.rx.borrow()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        let _ = self.state.tx.send(true);
        debug!("Cancellation requested");
    }

    /// Wait for cancellation; returns immediately if already cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.state.rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
