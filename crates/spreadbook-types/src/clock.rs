//! Wall-clock abstraction so lease expiry, bid timestamps and settlement
//! windows can be driven deterministically in tests.

use chrono::{DateTime, Utc};

/// Source of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Each call to [`Clock::now`]
/// optionally ticks forward so consecutive bids get distinct timestamps.
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug)]
pub struct ManualClock {
    now_ms: std::sync::atomic::AtomicI64,
    tick_ms: i64,
}

#[cfg(any(test, feature = "test-helpers"))]
impl ManualClock {
    /// A frozen clock at `start`.
    pub fn at(start: DateTime<Utc>) -> Self {
        Self::ticking(start, 0)
    }

    /// A clock that advances `tick_ms` after every read.
    pub fn ticking(start: DateTime<Utc>, tick_ms: i64) -> Self {
        Self {
            now_ms: std::sync::atomic::AtomicI64::new(start.timestamp_millis()),
            tick_ms,
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.now_ms
            .fetch_add(by.num_milliseconds(), std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        self.now_ms
            .store(to.timestamp_millis(), std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let ms = self
            .now_ms
            .fetch_add(self.tick_ms, std::sync::atomic::Ordering::SeqCst);
        DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
    }
}
