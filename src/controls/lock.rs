//! Advisory per-host insertion locks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::dom::NodeId;

/// Lock state of a host node; absence from the table means unlocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// An insertion attempt is in flight.
    Pending,
    /// A control was inserted.
    Present,
}

/// Side table of host lock states keyed by node identity.
#[derive(Debug, Default)]
pub struct HostLocks {
    states: Mutex<HashMap<NodeId, LockState>>,
}

impl HostLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self, host: NodeId) -> Option<LockState> {
        self.states.lock().get(&host).copied()
    }

    /// Take the pending lock on an unlocked host.
    ///
    /// Returns `None` if the host is pending or present. The check and the
    /// write happen under one lock acquisition.
    pub fn try_acquire(self: &Arc<Self>, host: NodeId) -> Option<PendingLock> {
        let mut states = self.states.lock();
        if states.contains_key(&host) {
            return None;
        }
        states.insert(host, LockState::Pending);
        Some(PendingLock {
            locks: Arc::clone(self),
            host,
            committed: false,
        })
    }

    /// Forget a host, whatever its state.
    pub fn release(&self, host: NodeId) {
        self.states.lock().remove(&host);
    }

    /// Drop every host `keep` rejects. Returns how many were dropped.
    pub fn retain(&self, mut keep: impl FnMut(NodeId) -> bool) -> usize {
        let mut states = self.states.lock();
        let before = states.len();
        states.retain(|host, _| keep(*host));
        before - states.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.lock().is_empty()
    }
}

/// A held pending lock.
///
/// Dropping it without [`PendingLock::commit`] clears the entry so the host
/// can be retried by a later scan.
#[derive(Debug)]
pub struct PendingLock {
    locks: Arc<HostLocks>,
    host: NodeId,
    committed: bool,
}

impl PendingLock {
    #[must_use]
    pub fn host(&self) -> NodeId {
        self.host
    }

    /// Flip the host to [`LockState::Present`].
    pub fn commit(mut self) {
        self.locks.states.lock().insert(self.host, LockState::Present);
        self.committed = true;
    }
}

impl Drop for PendingLock {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut states = self.locks.states.lock();
        if states.get(&self.host) == Some(&LockState::Pending) {
            states.remove(&self.host);
        }
    }
}
