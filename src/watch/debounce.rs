// src/watch/debounce.rs

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, trace};

/// The single action that has not started running yet.
///
/// It is either still inside its delay or waiting for the run lock.
struct Pending {
    cancel: oneshot::Sender<()>,
    _handle: JoinHandle<()>,
}

/// Coalesces bursts of triggers into one delayed action.
///
/// - Each [`debounce`](Self::debounce) call replaces the pending action and
///   restarts the delay; only the last action of a burst runs.
/// - Actions never overlap. At most one action waits behind a running one,
///   and a newer call replaces it instead of queueing behind it.
/// - Once an action holds the run lock it is no longer cancellable and runs
///   to completion.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<Pending>>,
    run_lock: Arc<tokio::sync::Mutex<()>>,
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .field("pending", &self.has_pending())
            .finish()
    }
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
            run_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `action` to run after the delay, cancelling any pending one.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn debounce<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let delay = self.delay;
        let run_lock = Arc::clone(&self.run_lock);

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = sleep(delay) => {}
                _ = &mut cancel_rx => {
                    trace!("debounced action superseded or cancelled");
                    return;
                }
            }

            // Still replaceable while another action holds the lock.
            let _guard = tokio::select! {
                guard = run_lock.lock() => guard,
                _ = &mut cancel_rx => {
                    trace!("queued action superseded or cancelled");
                    return;
                }
            };

            // Closing the receiver marks this action as running. A cancel
            // that raced with the lock still wins.
            cancel_rx.close();
            if cancel_rx.try_recv().is_ok() {
                trace!("action cancelled as it acquired the run lock");
                return;
            }
            action().await;
        });

        let previous = self.slot().replace(Pending {
            cancel: cancel_tx,
            _handle: handle,
        });

        if let Some(previous) = previous {
            if !previous.cancel.is_closed() {
                debug!(delay = ?self.delay, "replacing action that has not started; rescheduling");
                let _ = previous.cancel.send(());
            }
        }
    }

    /// Cancel the pending action without running it.
    ///
    /// Returns true if an action was actually pending, either inside its
    /// delay or waiting behind a running one. A running action is not
    /// affected.
    pub fn cancel(&self) -> bool {
        match self.slot().take() {
            Some(pending) if !pending.cancel.is_closed() => {
                let _ = pending.cancel.send(());
                true
            }
            _ => false,
        }
    }

    /// Whether an action is scheduled but has not started running.
    pub fn has_pending(&self) -> bool {
        self.slot()
            .as_ref()
            .is_some_and(|pending| !pending.cancel.is_closed())
    }

    /// Wait until no action is running.
    pub async fn wait_idle(&self) {
        let _guard = self.run_lock.lock().await;
    }

    fn slot(&self) -> MutexGuard<'_, Option<Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
