//! Generation counters for suppressing stale delayed actions

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic generation counter shared between an owner and its delayed callbacks.
///
/// Scheduling an action takes a [`Ticket`] by advancing the counter. When the
/// delayed callback runs it acts only if its ticket is still current; any
/// newer schedule, or an explicit [`Generation::invalidate`], makes older
/// tickets stale. Watchdogs and motor coast timers both use this.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    current: Arc<AtomicU64>,
}

/// Identity of one scheduled action within a [`Generation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Generation {
    /// Create a counter with no outstanding tickets
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation; all previously issued tickets become stale.
    pub fn advance(&self) -> Ticket {
        Ticket(self.current.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Make every issued ticket stale without scheduling anything.
    pub fn invalidate(&self) {
        self.current.fetch_add(1, Ordering::AcqRel);
    }

    /// Whether `ticket` belongs to the latest generation.
    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.current.load(Ordering::Acquire) == ticket.0
    }

    /// Ticket of the latest generation.
    pub fn current(&self) -> Ticket {
        Ticket(self.current.load(Ordering::Acquire))
    }
}

impl Ticket {
    /// Raw generation number, for logging
    pub fn value(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_ticket_supersedes_older() {
        let generation = Generation::new();
        let first = generation.advance();
        assert!(generation.is_current(first));

        let second = generation.advance();
        assert!(!generation.is_current(first));
        assert!(generation.is_current(second));
        assert!(second > first);
    }

    #[test]
    fn invalidate_stales_every_ticket() {
        let generation = Generation::new();
        let ticket = generation.advance();
        generation.invalidate();
        assert!(!generation.is_current(ticket));
    }

    #[test]
    fn clones_observe_the_same_counter() {
        let generation = Generation::new();
        let shared = generation.clone();
        let ticket = generation.advance();
        assert!(shared.is_current(ticket));
        shared.invalidate();
        assert!(!generation.is_current(ticket));
    }
}
