//! Wall-clock abstraction.
//!
//! Token expiry and `iat` checks read the current time through [`Clock`] so
//! that callers can pin time in tests instead of depending on the host clock.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of the current Unix timestamp (seconds).
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time as Unix epoch seconds.
    fn now_unix(&self) -> i64;
}

/// Clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Clock that returns a settable fixed instant.
#[derive(Debug)]
pub struct FixedClock(AtomicI64);

impl FixedClock {
    /// Create a clock frozen at `now` (Unix epoch seconds).
    #[must_use]
    pub fn new(now: i64) -> Self {
        Self(AtomicI64::new(now))
    }

    /// Move the clock to `now`.
    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }

    /// Advance the clock by `secs` seconds.
    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_unix(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_close_to_chrono() {
        let now = chrono::Utc::now().timestamp();
        let clock_now = SystemClock.now_unix();
        assert!((clock_now - now).abs() <= 1);
    }

    #[test]
    fn test_fixed_clock_set_and_advance() {
        let clock = FixedClock::new(1_000);
        assert_eq!(clock.now_unix(), 1_000);

        clock.advance(60);
        assert_eq!(clock.now_unix(), 1_060);

        clock.set(42);
        assert_eq!(clock.now_unix(), 42);
    }
}
