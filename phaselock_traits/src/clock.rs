use std::thread;
use std::time::{Duration, Instant};

/// Time source for stage settle delays, status polling and loop pacing.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Block for `d`; test clocks only record it.
    fn sleep(&self, d: Duration);

    /// Whole milliseconds since `epoch`; 0 if `epoch` lies in the future.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let waited = self.now().saturating_duration_since(epoch);
        u64::try_from(waited.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Wall-clock time via `Instant` and `thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            thread::sleep(d);
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_clock {
    use super::{Clock, Duration, Instant};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct Timeline {
        offset: Duration,
        sleeps: Vec<Duration>,
    }

    /// Simulated clock: `sleep` advances time instantly and is logged.
    ///
    /// Clones share one timeline, so a test can hand a clone to the loop and
    /// inspect the settle delays it took afterwards.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        timeline: Arc<Mutex<Timeline>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                timeline: Arc::new(Mutex::new(Timeline::default())),
            }
        }

        /// Move time forward without logging a sleep.
        pub fn advance(&self, d: Duration) {
            if let Ok(mut t) = self.timeline.lock() {
                t.offset = t.offset.saturating_add(d);
            }
        }

        /// Simulated time since creation.
        pub fn elapsed(&self) -> Duration {
            self.timeline
                .lock()
                .map(|t| t.offset)
                .unwrap_or(Duration::ZERO)
        }

        /// Every non-zero sleep requested so far, in order.
        pub fn sleeps(&self) -> Vec<Duration> {
            self.timeline
                .lock()
                .map(|t| t.sleeps.clone())
                .unwrap_or_default()
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.origin + self.elapsed()
        }

        fn sleep(&self, d: Duration) {
            if d.is_zero() {
                return;
            }
            if let Ok(mut t) = self.timeline.lock() {
                t.offset = t.offset.saturating_add(d);
                t.sleeps.push(d);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_clock::TestClock;
    use super::*;

    #[test]
    fn settle_sleeps_are_simulated_and_logged() {
        let clock = TestClock::new();
        let epoch = clock.now();
        let wall = Instant::now();
        clock.sleep(Duration::from_secs(2));
        clock.sleep(Duration::ZERO);
        clock.advance(Duration::from_millis(50));
        assert_eq!(clock.ms_since(epoch), 2050);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2)]);
        assert!(wall.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn clones_share_the_timeline() {
        let clock = TestClock::new();
        let handle = clock.clone();
        handle.sleep(Duration::from_millis(100));
        assert_eq!(clock.elapsed(), Duration::from_millis(100));
    }

    #[test]
    fn future_epoch_saturates_to_zero() {
        let clock = MonotonicClock::new();
        let future = clock.now() + Duration::from_secs(60);
        assert_eq!(clock.ms_since(future), 0);
    }
}
