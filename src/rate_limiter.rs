//! Rolling-window send rate limiter

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Length of the trailing window the cap applies to.
pub const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Caps outbound commands at `max_per_second` within any trailing one-second window.
///
/// A pure gate: rejected sends are never queued or retried. Timestamps older
/// than the window are pruned on every check, so memory stays bounded by
/// `max_per_second` no matter how often it is called.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_per_second: usize,
    sent: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(max_per_second: u32) -> Self {
        let max_per_second = max_per_second as usize;
        Self { max_per_second, sent: VecDeque::with_capacity(max_per_second) }
    }

    /// Record a send and return `true` if the cap allows it now.
    ///
    /// On `false` nothing is recorded.
    pub fn okay_to_send(&mut self) -> bool {
        self.okay_to_send_at(Instant::now())
    }

    fn okay_to_send_at(&mut self, now: Instant) -> bool {
        self.prune(now);
        if self.sent.len() >= self.max_per_second {
            return false;
        }
        self.sent.push_back(now);
        true
    }

    /// Sends counted against the current window
    pub fn in_window(&mut self) -> usize {
        self.prune(Instant::now());
        self.sent.len()
    }

    pub fn max_per_second(&self) -> usize {
        self.max_per_second
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.sent.front() {
            if now.duration_since(oldest) >= RATE_WINDOW {
                self.sent.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn caps_sends_inside_window() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(3);

        assert!(limiter.okay_to_send_at(start));
        assert!(limiter.okay_to_send_at(start + Duration::from_millis(100)));
        assert!(limiter.okay_to_send_at(start + Duration::from_millis(200)));
        assert!(!limiter.okay_to_send_at(start + Duration::from_millis(300)));
    }

    #[test]
    fn window_slides() {
        let start = Instant::now();
        let mut limiter = RateLimiter::new(2);

        assert!(limiter.okay_to_send_at(start));
        assert!(limiter.okay_to_send_at(start + Duration::from_millis(500)));
        assert!(!limiter.okay_to_send_at(start + Duration::from_millis(999)));
        // first send has aged out
        assert!(limiter.okay_to_send_at(start + Duration::from_millis(1000)));
        assert!(!limiter.okay_to_send_at(start + Duration::from_millis(1400)));
    }

    #[tokio::test(start_paused = true)]
    async fn uses_the_runtime_clock() {
        let mut limiter = RateLimiter::new(1);
        assert!(limiter.okay_to_send());
        assert!(!limiter.okay_to_send());
        tokio::time::advance(RATE_WINDOW).await;
        assert_eq!(limiter.in_window(), 0);
        assert!(limiter.okay_to_send());
    }

    proptest! {
        #[test]
        fn n_plus_one_burst_admits_exactly_n(max in 1u32..50, spread_ms in 0u64..900) {
            let start = Instant::now();
            let mut limiter = RateLimiter::new(max);
            let attempts = max as u64 + 1;
            let admitted = (0..attempts)
                .filter(|i| limiter.okay_to_send_at(start + Duration::from_millis(spread_ms * i / attempts)))
                .count();
            prop_assert_eq!(admitted, max as usize);
        }

        #[test]
        fn memory_stays_bounded(max in 1u32..20, steps in prop::collection::vec(0u64..300, 1..200)) {
            let mut now = Instant::now();
            let mut limiter = RateLimiter::new(max);
            for step in steps {
                now += Duration::from_millis(step);
                limiter.okay_to_send_at(now);
                prop_assert!(limiter.sent.len() <= max as usize);
            }
        }
    }
}
