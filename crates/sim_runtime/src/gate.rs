//! Commit gate — serialises commits against live data handles.
//!
//! A data handle freezes the database by holding the gate open; `commit`
//! waits until every handle is released. Conversely, acquiring a handle
//! while a commit is mid-flight blocks until the commit finishes.

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct GateState {
    /// Number of live data handles blocking commit.
    blockers: usize,
    /// Whether a commit is currently executing.
    committing: bool,
}

/// Synchronisation between data handles and the commit barrier.
#[derive(Debug, Default)]
pub(crate) struct CommitGate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl CommitGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a commit blocker. Waits out any commit in flight.
    pub(crate) fn block(&self) {
        let mut state = self.state.lock();
        while state.committing {
            self.cond.wait(&mut state);
        }
        state.blockers += 1;
    }

    /// Release a commit blocker.
    pub(crate) fn unblock(&self) {
        let mut state = self.state.lock();
        state.blockers = state.blockers.saturating_sub(1);
        if state.blockers == 0 {
            self.cond.notify_all();
        }
    }

    /// Enter the commit phase. Waits until no blockers remain.
    pub(crate) fn begin_commit(&self) {
        let mut state = self.state.lock();
        while state.blockers > 0 {
            self.cond.wait(&mut state);
        }
        state.committing = true;
    }

    /// Leave the commit phase and wake pending handle acquisitions.
    pub(crate) fn end_commit(&self) {
        let mut state = self.state.lock();
        state.committing = false;
        self.cond.notify_all();
    }
}
