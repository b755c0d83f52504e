//! Monotonic time source
//!
//! Event ordering and replay windows are defined over monotonic
//! nanoseconds, never wall time. Tests drive a [`ManualClock`] so that
//! timestamp-sensitive paths (transaction TTL, countermeasure expiry,
//! sliding-window rate checks) are deterministic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Nanoseconds since an arbitrary monotonic epoch.
pub type Nanos = u64;

/// Source of monotonic time.
pub trait Clock: Send + Sync {
    /// Current monotonic time in nanoseconds.
    fn now_ns(&self) -> Nanos;
}

/// Wall-clock backed monotonic source. The epoch is process start.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> Nanos {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Hand-driven clock for tests.
///
/// Shared via `Arc`; advancing is visible to every holder.
#[derive(Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ns: Nanos) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicU64::new(start_ns),
        })
    }

    /// Advance the clock by `delta_ns`.
    pub fn advance(&self, delta_ns: Nanos) {
        self.now.fetch_add(delta_ns, Ordering::SeqCst);
    }

    /// Advance the clock by whole milliseconds.
    pub fn advance_ms(&self, delta_ms: u64) {
        self.advance(delta_ms * 1_000_000);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> Nanos {
        self.now.load(Ordering::SeqCst)
    }
}
