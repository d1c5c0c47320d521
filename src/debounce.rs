//! Cancellable delayed action for final-release strikes
//!
//! When a release debounce is configured the strike for the last released
//! key is held back for a short delay. Pressing any movement key again
//! before the delay runs out cancels it.

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::trace;

struct Pending {
    id: u64,
    cancel: Sender<()>,
}

/// Holds at most one scheduled action
pub struct ReleaseDebouncer {
    slot: Arc<Mutex<Option<Pending>>>,
    next_id: AtomicU64,
}

impl ReleaseDebouncer {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
        }
    }

    /// Run `action` after `delay` unless cancelled first. Replaces (and
    /// cancels) any action still pending.
    pub fn schedule<F>(&self, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = bounded::<()>(1);

        if let Some(previous) = self.slot.lock().replace(Pending { id, cancel: cancel_tx }) {
            let _ = previous.cancel.send(());
            trace!(id = previous.id, "debounce replaced");
        }

        let slot = Arc::clone(&self.slot);
        thread::spawn(move || {
            if !matches!(cancel_rx.recv_timeout(delay), Err(RecvTimeoutError::Timeout)) {
                return;
            }
            // Only the action still owning the slot may fire.
            let fire = {
                let mut slot = slot.lock();
                if slot.as_ref().is_some_and(|p| p.id == id) {
                    *slot = None;
                    true
                } else {
                    false
                }
            };
            if fire {
                trace!(id, "debounce fired");
                action();
            }
        });
    }

    /// Cancel the pending action. Returns true if one was pending; it will
    /// not run.
    pub fn cancel(&self) -> bool {
        match self.slot.lock().take() {
            Some(pending) => {
                let _ = pending.cancel.send(());
                trace!(id = pending.id, "debounce cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl Default for ReleaseDebouncer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ReleaseDebouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let make = move || -> Box<dyn FnOnce() + Send> {
            let c = Arc::clone(&c);
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
        };
        (count, make)
    }

    #[test]
    fn fires_after_delay() {
        let (count, action) = counter();
        let debouncer = ReleaseDebouncer::new();
        debouncer.schedule(Duration::from_millis(20), action());
        assert!(debouncer.is_pending());

        thread::sleep(Duration::from_millis(150));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn cancelled_action_never_runs() {
        let (count, action) = counter();
        let debouncer = ReleaseDebouncer::new();
        debouncer.schedule(Duration::from_millis(50), action());
        assert!(debouncer.cancel());
        assert!(!debouncer.cancel());

        thread::sleep(Duration::from_millis(150));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reschedule_replaces_pending_action() {
        let (count, action) = counter();
        let debouncer = ReleaseDebouncer::new();
        debouncer.schedule(Duration::from_millis(40), action());
        debouncer.schedule(Duration::from_millis(40), action());

        thread::sleep(Duration::from_millis(200));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_cancels() {
        let (count, action) = counter();
        {
            let debouncer = ReleaseDebouncer::new();
            debouncer.schedule(Duration::from_millis(30), action());
        }
        thread::sleep(Duration::from_millis(120));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
