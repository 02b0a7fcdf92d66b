//! Cross-instance teardown handoff.
//!
//! Controller instances are single-session: the app tears one down and
//! creates the next. The new instance must not touch the GPU before the
//! previous one has released it, so the dying instance arms a handoff in
//! a shared slot and signals it once its GL resources are gone.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub struct TeardownHandoff {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl TeardownHandoff {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    /// Mark teardown complete and wake waiters.
    pub fn signal(&self) {
        let (flag, cond) = &*self.inner;
        *flag.lock().unwrap() = true;
        cond.notify_all();
    }

    /// Wait for teardown, bounded. Returns `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cond) = &*self.inner;
        let done = flag.lock().unwrap();
        let (done, _) = cond
            .wait_timeout_while(done, timeout, |done| !*done)
            .unwrap();
        *done
    }
}

impl Default for TeardownHandoff {
    fn default() -> Self {
        Self::new()
    }
}

/// The shared slot both instances see. The dying instance arms it, the
/// next instance takes it and waits.
#[derive(Clone, Default)]
pub struct HandoffSlot {
    slot: Arc<Mutex<Option<TeardownHandoff>>>,
}

impl HandoffSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fresh handoff and return it for later signalling.
    pub fn arm(&self) -> TeardownHandoff {
        let handoff = TeardownHandoff::new();
        *self.slot.lock().unwrap() = Some(handoff.clone());
        handoff
    }

    /// Claim the pending handoff, if any.
    pub fn take(&self) -> Option<TeardownHandoff> {
        self.slot.lock().unwrap().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_after_signal_returns_immediately() {
        let handoff = TeardownHandoff::new();
        handoff.signal();
        assert!(handoff.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn wait_times_out_without_signal() {
        let handoff = TeardownHandoff::new();
        assert!(!handoff.wait_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn signal_from_another_thread_releases_the_waiter() {
        let handoff = TeardownHandoff::new();
        let other = handoff.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            other.signal();
        });
        assert!(handoff.wait_timeout(Duration::from_secs(2)));
        t.join().unwrap();
    }

    #[test]
    fn slot_hands_the_armed_handoff_to_the_next_taker() {
        let slot = HandoffSlot::new();
        assert!(slot.take().is_none());

        let armed = slot.arm();
        armed.signal();
        let taken = slot.take().expect("armed handoff available");
        assert!(taken.wait_timeout(Duration::from_millis(1)));
        assert!(slot.take().is_none(), "take clears the slot");
    }
}
