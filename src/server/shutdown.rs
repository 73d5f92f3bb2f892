use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct State {
    fired: bool,
    in_flight: usize,
}

/// One-shot signal asking the background server to stop.
///
/// Fired by the `/shutdown` route from a connection coroutine, or directly by the
/// manager. The server thread parks on it, tears the listener down once fired, then
/// drains the requests still being handled.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<(Mutex<State>, Condvar)>,
}

/// Marks one request as in flight until dropped.
#[must_use = "the request counts as in flight only while the guard lives"]
pub struct InFlightGuard {
    signal: ShutdownSignal,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut state = self.signal.state();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            self.signal.inner.1.notify_all();
        }
    }
}

impl ShutdownSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fire the signal. Returns `true` for the call that actually fired it.
    pub fn trigger(&self) -> bool {
        let mut state = self.state();
        if state.fired {
            return false;
        }
        state.fired = true;
        self.inner.1.notify_all();
        true
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.state().fired
    }

    /// Block until fired.
    pub fn wait(&self) {
        let mut state = self.state();
        while !state.fired {
            state = self
                .inner
                .1
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until fired or `timeout` elapses; returns whether it fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (state, _) = self
            .inner
            .1
            .wait_timeout_while(self.state(), timeout, |s| !s.fired)
            .unwrap_or_else(PoisonError::into_inner);
        state.fired
    }

    /// Count a request as in flight until the guard drops.
    pub fn enter(&self) -> InFlightGuard {
        self.state().in_flight += 1;
        InFlightGuard {
            signal: self.clone(),
        }
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.state().in_flight
    }

    /// Block until no request is in flight or `timeout` elapses; returns whether drained.
    pub fn wait_drained(&self, timeout: Duration) -> bool {
        let (state, _) = self
            .inner
            .1
            .wait_timeout_while(self.state(), timeout, |s| s.in_flight > 0)
            .unwrap_or_else(PoisonError::into_inner);
        state.in_flight == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_trigger_once() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_triggered());
        assert!(signal.trigger());
        assert!(!signal.trigger());
        assert!(signal.is_triggered());
    }

    #[test]
    fn test_wait_wakes_on_trigger_from_other_thread() {
        let signal = ShutdownSignal::new();
        let remote = signal.clone();
        let waiter = thread::spawn(move || remote.wait());
        thread::sleep(Duration::from_millis(20));
        signal.trigger();
        waiter.join().unwrap();
    }

    #[test]
    fn test_wait_timeout_expires() {
        let signal = ShutdownSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
        signal.trigger();
        assert!(signal.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_drain_waits_for_in_flight_requests() {
        let signal = ShutdownSignal::new();
        assert!(signal.wait_drained(Duration::ZERO));

        let first = signal.enter();
        let second = signal.enter();
        assert_eq!(signal.in_flight(), 2);
        assert!(!signal.wait_drained(Duration::from_millis(10)));

        drop(first);
        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            drop(second);
        });
        assert!(signal.wait_drained(Duration::from_secs(2)));
        assert_eq!(signal.in_flight(), 0);
        releaser.join().unwrap();
    }
}
