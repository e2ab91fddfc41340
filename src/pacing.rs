//! Completion pacing for facade commands
//!
//! Peripherals give no completion signal, so a command block is considered
//! finished after a fixed delay chosen per command. The delay starts when the
//! command is issued, not when the returned future is first polled.

use pin_project_lite::pin_project;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Sleep, sleep};

/// Per-character pacing unit for text-length delays
const CHAR_DELAY_MS: u64 = 120;

pin_project! {
    /// A send paired with its completion delay.
    ///
    /// Resolves with the send's output once both the send has resolved and
    /// the delay has elapsed.
    #[must_use = "futures do nothing unless polled"]
    pub struct Paced<F: Future> {
        #[pin]
        send: F,
        #[pin]
        delay: Sleep,
        outcome: Option<F::Output>,
        delay_done: bool,
    }
}

/// Pair `send` with a delay that starts now.
pub fn paced<F: Future>(send: F, delay: Duration) -> Paced<F> {
    Paced { send, delay: sleep(delay), outcome: None, delay_done: false }
}

impl<F: Future> Future for Paced<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        if this.outcome.is_none() {
            if let Poll::Ready(outcome) = this.send.poll(cx) {
                *this.outcome = Some(outcome);
            }
        }
        if !*this.delay_done && this.delay.poll(cx).is_ready() {
            *this.delay_done = true;
        }

        match this.outcome.take() {
            Some(outcome) if *this.delay_done => Poll::Ready(outcome),
            outcome => {
                *this.outcome = outcome;
                Poll::Pending
            }
        }
    }
}

/// Delay for commands whose duration scales with the printed length of a value.
///
/// `120 * (6 * len + 6)` milliseconds, where `len` is the length of the
/// value's decimal text.
pub fn text_delay(value: impl Display) -> Duration {
    chars_delay(value.to_string().chars().count())
}

/// Delay for scrolling `len` characters of text.
pub fn chars_delay(len: usize) -> Duration {
    Duration::from_millis(CHAR_DELAY_MS * (6 * len as u64 + 6))
}
