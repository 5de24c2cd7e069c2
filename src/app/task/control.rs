//! Cooperative control signals for a running task
//!
//! A task's control inbox is a [`CancellationToken`] plus a [`PauseGate`]. Commands
//! from the manager only flip these signals; the worker and the fetcher observe
//! them at checkpoints.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::errors::{FetchError, FetchResult};

/// Open/closed gate that a worker waits on while its task is paused
///
/// Clones share the same gate.
#[derive(Debug, Clone)]
pub struct PauseGate {
    paused: Arc<watch::Sender<bool>>,
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseGate {
    /// Create an open gate
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused: Arc::new(paused),
        }
    }

    /// Close the gate; returns false if it was already closed
    pub fn close(&self) -> bool {
        !self.paused.send_replace(true)
    }

    /// Open the gate; returns false if it was already open
    pub fn open(&self) -> bool {
        self.paused.send_replace(false)
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Receiver that observes every open/close
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.paused.subscribe()
    }

    /// Wait until the gate is open or `cancel` fires
    ///
    /// Returns immediately when the gate is already open. Cancellation takes
    /// precedence over an open gate.
    pub async fn checkpoint(&self, cancel: &CancellationToken) -> FetchResult<()> {
        let mut rx = self.paused.subscribe();
        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            if !*rx.borrow_and_update() {
                return Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                changed = rx.changed() => {
                    // Sender lives as long as the gate, so this only fails during teardown
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Control inbox owned by each task
#[derive(Debug, Clone, Default)]
pub struct TaskControl {
    pub cancel: CancellationToken,
    pub pause: PauseGate,
}

impl TaskControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait at the pause checkpoint of this task
    pub async fn checkpoint(&self) -> FetchResult<()> {
        self.pause.checkpoint(&self.cancel).await
    }

    /// Token scoped to a single strategy attempt
    ///
    /// Cancelling the task cancels every attempt token, cancelling an attempt
    /// token leaves the task untouched.
    pub fn attempt_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }
}
