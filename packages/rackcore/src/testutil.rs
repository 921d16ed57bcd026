//! Shared test fixtures.

use core::cell::Cell;

use crate::platform::Clock;

/// Deterministic clock for host tests. `sleep_ms` advances time instead of
/// waiting, so budget loops run instantly while keeping their arithmetic.
pub(crate) struct FakeClock {
    now: Cell<u64>,
    epoch: Option<u64>,
}

impl FakeClock {
    pub(crate) fn new() -> Self {
        Self {
            now: Cell::new(0),
            epoch: None,
        }
    }

    pub(crate) fn with_epoch(epoch_seconds: u64) -> Self {
        Self {
            now: Cell::new(0),
            epoch: Some(epoch_seconds),
        }
    }

    pub(crate) fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    async fn sleep_ms(&self, ms: u64) {
        self.advance(ms);
    }

    fn epoch_seconds(&self) -> Option<u64> {
        self.epoch
    }
}
