//! Transaction admission and shutdown accounting.
//!
//! Every transaction holds a [`TxTicket`] for as long as it is open. The
//! [`TxTracker`] counts tickets, keeps write transactions exclusive and lets
//! [`close`](TxTracker::close) wait for the count to drain.

use crate::model::{KvError, KvResult};
use parking_lot::{Condvar, Mutex};
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How often a blocked writer re-checks its cancellation token.
const ADMISSION_POLL: Duration = Duration::from_millis(5);

/// Transaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Read-only.
    Ro,
    /// Read-write.
    Rw,
}

impl TxMode {
    /// Returns `true` for read-write transactions.
    pub const fn is_rw(self) -> bool {
        matches!(self, TxMode::Rw)
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    closing: bool,
    open: usize,
    writer: bool,
}

#[derive(Debug, Default)]
pub(crate) struct TxTracker {
    state: Mutex<TrackerState>,
    changed: Condvar,
    next_id: AtomicU64,
}

impl TxTracker {
    /// Admit a transaction.
    ///
    /// Cancellation is checked before anything else. A writer waits for the
    /// previous writer to finish, polling `cancel` while it waits.
    pub(crate) fn admit(
        self: &Arc<Self>,
        mode: TxMode,
        cancel: &CancellationToken,
    ) -> KvResult<TxTicket> {
        if cancel.is_cancelled() {
            return Err(KvError::Cancelled);
        }

        let mut state = self.state.lock();
        loop {
            if state.closing {
                return Err(KvError::Closed);
            }
            if !mode.is_rw() || !state.writer {
                break;
            }
            if cancel.is_cancelled() {
                return Err(KvError::Cancelled);
            }
            self.changed.wait_for(&mut state, ADMISSION_POLL);
        }

        state.open += 1;
        if mode.is_rw() {
            state.writer = true;
        }
        drop(state);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(TxTicket { tracker: Arc::clone(self), mode, id, released: false })
    }

    fn release(&self, mode: TxMode) {
        let mut state = self.state.lock();
        state.open -= 1;
        if mode.is_rw() {
            state.writer = false;
        }
        drop(state);
        self.changed.notify_all();
    }

    /// Refuse new transactions, then block until every open transaction has
    /// ended. Returns `true` for the call that started the shutdown.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.state.lock();
        let first = !state.closing;
        state.closing = true;
        self.changed.notify_all();

        while state.open > 0 {
            debug!(target: "strata::kv", open = state.open, "waiting for open transactions");
            self.changed.wait(&mut state);
        }
        first
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.state.lock().closing
    }

    pub(crate) fn open_count(&self) -> usize {
        self.state.lock().open
    }
}

/// Proof of admission. Releases its slot exactly once, on
/// [`release`](TxTicket::release) or drop.
#[derive(Debug)]
pub(crate) struct TxTicket {
    tracker: Arc<TxTracker>,
    mode: TxMode,
    id: u64,
    released: bool,
}

impl TxTicket {
    pub(crate) const fn id(&self) -> u64 {
        self.id
    }

    pub(crate) const fn mode(&self) -> TxMode {
        self.mode
    }

    pub(crate) fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.tracker.release(self.mode);
        }
    }
}

impl Drop for TxTicket {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Instant};

    #[test]
    fn ids_increase() {
        let tracker = Arc::new(TxTracker::default());
        let token = CancellationToken::new();
        let a = tracker.admit(TxMode::Ro, &token).unwrap();
        let b = tracker.admit(TxMode::Ro, &token).unwrap();
        assert!(b.id() > a.id());
        assert_eq!(tracker.open_count(), 2);
        drop((a, b));
        assert_eq!(tracker.open_count(), 0);
    }

    #[test]
    fn cancelled_before_admission() {
        let tracker = Arc::new(TxTracker::default());
        let token = CancellationToken::new();
        token.cancel();
        assert!(tracker.admit(TxMode::Ro, &token).unwrap_err().is_cancelled());
        assert_eq!(tracker.open_count(), 0);
    }

    #[test]
    fn blocked_writer_observes_cancellation() {
        let tracker = Arc::new(TxTracker::default());
        let first = tracker.admit(TxMode::Rw, &CancellationToken::new()).unwrap();

        let token = CancellationToken::new();
        let waiter = {
            let tracker = Arc::clone(&tracker);
            let token = token.clone();
            thread::spawn(move || tracker.admit(TxMode::Rw, &token).map(|_| ()))
        };
        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        token.cancel();
        assert!(waiter.join().unwrap().unwrap_err().is_cancelled());
        assert!(start.elapsed() < Duration::from_secs(1));
        drop(first);
    }

    #[test]
    fn writer_waits_for_writer() {
        let tracker = Arc::new(TxTracker::default());
        let mut first = tracker.admit(TxMode::Rw, &CancellationToken::new()).unwrap();

        let waiter = {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || tracker.admit(TxMode::Rw, &CancellationToken::new()).map(|t| t.id()))
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        first.release();
        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn close_waits_and_rejects() {
        let tracker = Arc::new(TxTracker::default());
        let ticket = tracker.admit(TxMode::Ro, &CancellationToken::new()).unwrap();

        let closer = {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || tracker.close())
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!closer.is_finished());
        assert!(tracker.is_closing());
        assert!(tracker.admit(TxMode::Ro, &CancellationToken::new()).unwrap_err().is_closed());

        drop(ticket);
        assert!(closer.join().unwrap());
        assert!(!tracker.close());
    }
}
