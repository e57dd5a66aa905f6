//! Time sources.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Wall-clock values below this (2020-01-01T00:00:00Z) mean the clock was never set.
pub const MIN_VALID_UNIX_MS: u64 = 1_577_836_800_000;

/// Source of monotonic and wall-clock time.
pub trait Clock {
    /// Monotonic milliseconds since an arbitrary origin.
    fn now_ms(&self) -> u64;

    /// Milliseconds since the Unix epoch, or 0 if unknown.
    fn unix_ms(&self) -> u64;
}

/// Process clock backed by [`Instant`] and [`chrono::Utc`].
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose monotonic origin is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn unix_ms(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Manually advanced clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
    unix_offset: Arc<AtomicU64>,
}

impl ManualClock {
    /// Clock at monotonic time 0 with the given wall-clock origin.
    #[must_use]
    pub fn new(unix_origin_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(0)),
            unix_offset: Arc::new(AtomicU64::new(unix_origin_ms)),
        }
    }

    /// Move time forward.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Replace the wall-clock origin (0 simulates an unset clock).
    pub fn set_unix_origin(&self, unix_origin_ms: u64) {
        self.unix_offset.store(unix_origin_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn unix_ms(&self) -> u64 {
        let origin = self.unix_offset.load(Ordering::SeqCst);
        if origin == 0 {
            return 0;
        }
        origin + self.now_ms()
    }
}
