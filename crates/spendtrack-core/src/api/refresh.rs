//! Single-flight coordination for access-token refresh.
//!
//! Every request that needs a refresh joins the coordinator. The first one
//! (while idle) becomes the leader and is responsible for starting the
//! refresh; everyone else is queued behind it. When the refresh settles, all
//! queued requests, the leader included, are woken in arrival order.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

enum RefreshState {
    Idle,
    Refreshing {
        waiters: VecDeque<oneshot::Sender<()>>,
    },
}

/// How a request joined the coordinator.
pub(crate) enum Role {
    /// No refresh was in flight; the caller must start one.
    Leader(Wake),
    /// A refresh is already in flight; just wait.
    Waiter(Wake),
}

/// Resolves once the in-flight refresh has settled, success or failure.
pub(crate) struct Wake(oneshot::Receiver<()>);

impl Wake {
    pub(crate) async fn settled(self) {
        // A dropped sender also means the refresh is over.
        let _ = self.0.await;
    }
}

pub(crate) struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(RefreshState::Idle),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the current refresh, or open a new one if idle.
    pub(crate) fn join(&self) -> Role {
        let (tx, rx) = oneshot::channel();
        let mut state = self.lock();
        match &mut *state {
            RefreshState::Idle => {
                *state = RefreshState::Refreshing {
                    waiters: VecDeque::from([tx]),
                };
                Role::Leader(Wake(rx))
            }
            RefreshState::Refreshing { waiters } => {
                waiters.push_back(tx);
                Role::Waiter(Wake(rx))
            }
        }
    }

    /// Return to idle and wake every queued request in FIFO order.
    /// Returns how many requests were released.
    pub(crate) fn settle(&self) -> usize {
        let previous = std::mem::replace(&mut *self.lock(), RefreshState::Idle);
        let RefreshState::Refreshing { waiters } = previous else {
            return 0;
        };

        let released = waiters.len();
        for waiter in waiters {
            // Receiver gone means that request was cancelled.
            let _ = waiter.send(());
        }
        released
    }

    pub(crate) fn is_refreshing(&self) -> bool {
        matches!(*self.lock(), RefreshState::Refreshing { .. })
    }

    /// Requests currently queued on the in-flight refresh, leader included.
    pub(crate) fn queued(&self) -> usize {
        match &*self.lock() {
            RefreshState::Idle => 0,
            RefreshState::Refreshing { waiters } => waiters.len(),
        }
    }
}

/// Settles the coordinator when dropped, so waiters are released even if
/// the refresh task unwinds.
pub(crate) struct SettleOnDrop<'a>(pub(crate) &'a RefreshCoordinator);

impl Drop for SettleOnDrop<'_> {
    fn drop(&mut self) {
        let released = self.0.settle();
        debug!(released, "Token refresh settled");
    }
}
