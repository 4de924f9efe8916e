//! Decorrelated-jitter delay sequence for the transport retry loop.
//!
//! Each delay is a uniform random value up to three times the previous one,
//! clamped to `[base, cap]`. Unlike a pure exponential schedule this keeps
//! concurrent clients from retrying in lockstep.

use std::time::Duration;

/// Backoff state. Delays are unitless here; the retry loop interprets them
/// as milliseconds.
#[derive(Clone, Debug)]
pub struct JitterBackoff {
    base: u64,
    cap: u64,
    current: u64,
}

impl JitterBackoff {
    /// Creates backoff state with the given bounds. The first computed delay
    /// derives from a seed of 1.
    pub fn new(base: u64, cap: u64) -> Self {
        Self {
            base,
            cap,
            current: 1,
        }
    }

    /// Computes the next delay from the supplied random bits and stores it
    /// as the new current delay.
    ///
    /// Randomness is injected so the sequence is testable; production
    /// callers pass [`entropy_u64`].
    pub fn next_delay(&mut self, rng: u64) -> u64 {
        let span = self.current.saturating_mul(3).max(1);
        self.current = (rng % span).clamp(self.base, self.cap);
        self.current
    }

    /// Next delay as a [`Duration`] in milliseconds.
    pub fn next_delay_ms(&mut self, rng: u64) -> Duration {
        Duration::from_millis(self.next_delay(rng))
    }
}

/// Random bits from the operating system. Falls back to zero bits when the
/// OS source is unavailable, which degrades the next delay to `base`.
pub fn entropy_u64() -> u64 {
    let mut bytes = [0u8; 8];
    if getrandom::getrandom(&mut bytes).is_err() {
        return 0;
    }
    u64::from_le_bytes(bytes)
}
