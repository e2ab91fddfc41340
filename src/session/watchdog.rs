//! Resettable deadlines owned by the session task

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Instant, Sleep, sleep};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatchdogKind {
    /// Write acknowledgment overdue
    PendingWrite,
    /// No inbound frame for too long
    Liveness,
    /// Scan never reached a connection
    Scan,
}

/// A single-shot deadline that can be re-armed or disarmed at any time.
///
/// The sleep lives inside the session task and is polled from its select
/// loop, so disarming takes effect immediately: there is no detached timer
/// callback left to fire against a torn-down session.
#[derive(Debug)]
pub(crate) struct Watchdog {
    kind: WatchdogKind,
    timeout: Option<Duration>,
    armed_at: Option<Instant>,
    sleep: Pin<Box<Sleep>>,
}

impl Watchdog {
    /// `None` disables the watchdog; arming it is then a no-op.
    pub(crate) fn new(kind: WatchdogKind, timeout: Option<Duration>) -> Self {
        Self { kind, timeout, armed_at: None, sleep: Box::pin(sleep(Duration::ZERO)) }
    }

    /// Start or restart the countdown from now.
    pub(crate) fn arm(&mut self) {
        if let Some(timeout) = self.timeout {
            let now = Instant::now();
            self.sleep.as_mut().reset(now + timeout);
            self.armed_at = Some(now);
        }
    }

    pub(crate) fn disarm(&mut self) {
        self.armed_at = None;
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.armed_at.is_some()
    }

    /// Resolve once the armed deadline passes, yielding how long it ran.
    ///
    /// Pends forever while disarmed. The watchdog disarms itself on expiry.
    pub(crate) async fn expired(&mut self) -> Duration {
        let Some(armed_at) = self.armed_at else {
            return pending().await;
        };
        self.sleep.as_mut().await;
        self.armed_at = None;
        let ran = armed_at.elapsed();
        trace!(kind = ?self.kind, ?ran, "Watchdog expired");
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test(start_paused = true)]
    async fn fires_after_timeout() {
        let mut dog = Watchdog::new(WatchdogKind::PendingWrite, Some(Duration::from_secs(5)));
        dog.arm();
        let ran = dog.expired().await;
        assert_eq!(ran, Duration::from_secs(5));
        assert!(!dog.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_pushes_the_deadline_out() {
        let mut dog = Watchdog::new(WatchdogKind::Liveness, Some(Duration::from_millis(4500)));
        dog.arm();
        tokio::time::advance(Duration::from_millis(4000)).await;
        dog.arm();
        assert!(timeout(Duration::from_millis(4000), dog.expired()).await.is_err());
        assert!(timeout(Duration::from_millis(1000), dog.expired()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_or_disabled_never_fires() {
        let mut dog = Watchdog::new(WatchdogKind::Scan, Some(Duration::from_millis(10)));
        dog.arm();
        dog.disarm();
        assert!(timeout(Duration::from_secs(60), dog.expired()).await.is_err());

        let mut disabled = Watchdog::new(WatchdogKind::Liveness, None);
        disabled.arm();
        assert!(!disabled.is_armed());
        assert!(timeout(Duration::from_secs(60), disabled.expired()).await.is_err());
    }
}
