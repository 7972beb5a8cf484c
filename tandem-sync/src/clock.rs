//! Wall-clock source for timestamps and drift extrapolation
//!
//! Sync events carry epoch milliseconds, so the core needs a wall clock. It
//! also runs timers on the tokio clock. [`WallClock`] ties the two together:
//! it samples the system clock once and advances with `tokio::time::Instant`
//! afterwards, which keeps timestamps consistent with timer deadlines (and
//! with paused time in tests).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

/// Source of epoch-millisecond timestamps
pub trait Clock: Send + Sync {
    /// Current time in epoch milliseconds
    fn now_ms(&self) -> i64;
}

/// System wall clock advanced by the tokio monotonic clock
#[derive(Debug, Clone)]
pub struct WallClock {
    anchor_ms: i64,
    anchor: Instant,
}

impl WallClock {
    /// Anchor to the current system time
    ///
    /// Must be called inside a tokio runtime when the runtime's clock is paused,
    /// so the anchor instant belongs to that clock.
    pub fn new() -> Self {
        Self {
            anchor_ms: tandem_common::time::now_ms(),
            anchor: Instant::now(),
        }
    }

    /// Anchor to an explicit epoch time
    pub fn starting_at(anchor_ms: i64) -> Self {
        Self {
            anchor_ms,
            anchor: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for WallClock {
    fn now_ms(&self) -> i64 {
        self.anchor_ms + self.anchor.elapsed().as_millis() as i64
    }
}

/// Manually driven clock
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: Arc::new(AtomicI64::new(now_ms)),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
