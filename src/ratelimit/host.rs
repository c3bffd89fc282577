use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::key::HostKey;

/// Mutable per-host scheduling state.
///
/// Mutated only under the host's own mutex; different hosts never block
/// each other.
#[derive(Debug, Default)]
struct HostState {
    /// Earliest point in time the next request may be dispatched.
    /// Monotonically non-decreasing.
    next_allowed_at: Option<Instant>,
    /// Number of requests currently in flight to this host
    in_flight: u32,
    /// High-water mark of `in_flight` over the host's lifetime
    max_in_flight: u32,
    /// Consecutive failed dispatches since the last success
    consecutive_failures: u32,
    /// Total number of dispatched requests
    total_dispatched: u64,
}

/// A snapshot of per-host statistics
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct HostStats {
    /// Number of requests currently in flight
    pub in_flight: u32,
    /// Highest number of simultaneously in-flight requests observed
    pub max_in_flight: u32,
    /// Consecutive failed dispatches since the last success
    pub consecutive_failures: u32,
    /// Total number of dispatched requests
    pub total_dispatched: u64,
}

/// Represents a single host with its own request spacing, concurrency
/// control, and failure tracking.
///
/// Each host maintains:
/// - The minimum-interval spacing state (`next_allowed_at`)
/// - A semaphore bounding concurrent requests to this host
/// - Statistics for diagnostics and tests
#[derive(Debug)]
pub struct Host {
    /// The host authority this instance manages
    pub key: HostKey,

    /// Minimum interval between dispatches to this host
    interval: Duration,

    state: Mutex<HostState>,

    /// Controls maximum concurrent requests to this host
    semaphore: Arc<Semaphore>,
}

impl Host {
    /// Create a new `Host` with the given spacing interval and
    /// concurrency cap
    #[must_use]
    pub fn new(key: HostKey, interval: Duration, max_concurrent: usize) -> Self {
        Self {
            key,
            interval,
            state: Mutex::new(HostState::default()),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// The duration a caller must wait before the next dispatch to this
    /// host: `max(0, next_allowed_at - now)`. Never fails; a zero wait
    /// means the caller may dispatch immediately.
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned
    #[must_use]
    pub fn admit(&self) -> Duration {
        let state = self.state.lock().unwrap();
        Self::wait_duration(&state, Instant::now())
    }

    /// Record an actual dispatch, pushing `next_allowed_at` forward by
    /// the host interval. `next_allowed_at` never moves backwards.
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned
    pub fn record_dispatch(&self) {
        let mut state = self.state.lock().unwrap();
        Self::mark_dispatched(&mut state, Instant::now(), self.interval);
    }

    /// Atomic admit-and-record: if the host allows a dispatch right now,
    /// record it and return `Ok`; otherwise return the remaining wait.
    ///
    /// This is the form the scheduler uses, so that two workers racing on
    /// the same host cannot both observe a zero wait.
    ///
    /// # Errors
    ///
    /// Returns the remaining wait duration when the host is not yet ready.
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned
    pub fn try_dispatch(&self) -> Result<(), Duration> {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let wait = Self::wait_duration(&state, now);
        if wait.is_zero() {
            Self::mark_dispatched(&mut state, now, self.interval);
            Ok(())
        } else {
            Err(wait)
        }
    }

    fn wait_duration(state: &HostState, now: Instant) -> Duration {
        state
            .next_allowed_at
            .map_or(Duration::ZERO, |next| next.saturating_duration_since(now))
    }

    fn mark_dispatched(state: &mut HostState, now: Instant, interval: Duration) {
        let earliest = now + interval;
        state.next_allowed_at = Some(match state.next_allowed_at {
            Some(next) => next.max(earliest),
            None => earliest,
        });
        state.total_dispatched += 1;
    }

    /// Acquire an in-flight slot for this host, waiting until one frees
    /// up. The returned guard releases the slot on drop.
    ///
    /// # Panics
    ///
    /// Panics if the semaphore is closed, which never happens as we never
    /// close it
    pub async fn acquire(self: &Arc<Self>) -> InFlightGuard {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("Semaphore was closed unexpectedly");
        {
            let mut state = self.state.lock().unwrap();
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }
        InFlightGuard {
            host: Arc::clone(self),
            _permit: permit,
        }
    }

    /// Reset the consecutive-failure counter after a successful fetch
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned
    pub fn record_success(&self) {
        self.state.lock().unwrap().consecutive_failures = 0;
    }

    /// Record a failed dispatch
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned
    pub fn record_failure(&self) {
        self.state.lock().unwrap().consecutive_failures += 1;
    }

    /// Snapshot the host's statistics
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned
    #[must_use]
    pub fn stats(&self) -> HostStats {
        let state = self.state.lock().unwrap();
        HostStats {
            in_flight: state.in_flight,
            max_in_flight: state.max_in_flight,
            consecutive_failures: state.consecutive_failures,
            total_dispatched: state.total_dispatched,
        }
    }

    /// Number of currently available in-flight slots
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// RAII guard for one in-flight request slot on a host.
///
/// Dropping the guard releases the semaphore permit and decrements the
/// host's in-flight gauge, so a timed-out fetch frees its slot as soon as
/// the scheduler abandons it.
#[derive(Debug)]
pub struct InFlightGuard {
    host: Arc<Host>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut state) = self.host.state.lock() {
            state.in_flight = state.in_flight.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;

    fn host(interval_ms: u64, max_concurrent: usize) -> Arc<Host> {
        let url = Url::parse("https://example.com/").unwrap();
        Arc::new(Host::new(
            HostKey::try_from(&url).unwrap(),
            Duration::from_millis(interval_ms),
            max_concurrent,
        ))
    }

    #[test]
    fn test_first_admit_is_zero() {
        let host = host(100, 2);
        assert_eq!(host.admit(), Duration::ZERO);
    }

    #[test]
    fn test_admit_after_dispatch_requires_wait() {
        let host = host(100, 2);
        host.record_dispatch();
        let wait = host.admit();
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_millis(100));
    }

    #[test]
    fn test_try_dispatch_is_exclusive() {
        let host = host(100, 2);
        assert!(host.try_dispatch().is_ok());
        // second dispatch within the interval must be refused with a wait
        let wait = host.try_dispatch().unwrap_err();
        assert!(wait > Duration::ZERO);
    }

    #[test]
    fn test_next_allowed_at_is_monotonic() {
        let host = host(50, 2);
        host.record_dispatch();
        let first_wait = host.admit();
        // a second record_dispatch never moves next_allowed_at backwards
        host.record_dispatch();
        assert!(host.admit() >= first_wait);
    }

    #[tokio::test]
    async fn test_in_flight_gauge_and_cap() {
        let host = host(0, 2);
        let first = host.acquire().await;
        let second = host.acquire().await;
        assert_eq!(host.stats().in_flight, 2);
        assert_eq!(host.available_permits(), 0);

        drop(first);
        assert_eq!(host.stats().in_flight, 1);
        assert_eq!(host.available_permits(), 1);

        drop(second);
        assert_eq!(host.stats().in_flight, 0);
        assert_eq!(host.stats().max_in_flight, 2);
    }

    #[test]
    fn test_failure_tracking() {
        let host = host(0, 1);
        host.record_failure();
        host.record_failure();
        assert_eq!(host.stats().consecutive_failures, 2);
        host.record_success();
        assert_eq!(host.stats().consecutive_failures, 0);
    }
}
