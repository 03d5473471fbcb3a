// ============================================
// File: crates/tunhub-common/src/time.rs
// ============================================
//! # Time Utilities
//!
//! ## Creation Reason
//! Sessions are touched from their reader and writer tasks concurrently;
//! `AtomicInstant` lets both record activity without a lock.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Stored as nanoseconds since a process-wide reference instant
//! - Relaxed ordering only: values are informational, never used for
//!   synchronization
//!
//! ## Last Modified
//! v0.1.0 - Initial time utilities

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

// ============================================
// AtomicInstant
// ============================================

/// Thread-safe wrapper around [`Instant`].
///
/// # Example
/// ```
/// use tunhub_common::time::AtomicInstant;
/// use std::time::{Duration, Instant};
///
/// let last_activity = AtomicInstant::from_instant(Instant::now());
/// last_activity.touch();
/// assert!(last_activity.elapsed() < Duration::from_secs(60));
/// ```
#[derive(Debug)]
pub struct AtomicInstant {
    nanos: AtomicU64,
}

impl AtomicInstant {
    fn reference() -> Instant {
        static REFERENCE: OnceLock<Instant> = OnceLock::new();
        *REFERENCE.get_or_init(Instant::now)
    }

    fn to_nanos(instant: Instant) -> u64 {
        instant
            .checked_duration_since(Self::reference())
            .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }

    /// Creates a new `AtomicInstant` from an `Instant`.
    #[must_use]
    pub fn from_instant(instant: Instant) -> Self {
        Self {
            nanos: AtomicU64::new(Self::to_nanos(instant)),
        }
    }

    /// Loads the stored instant.
    #[must_use]
    pub fn load(&self) -> Instant {
        Self::reference() + Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }

    fn store(&self, instant: Instant) {
        self.nanos.store(Self::to_nanos(instant), Ordering::Relaxed);
    }

    /// Updates to the current time and returns the previous value.
    pub fn touch(&self) -> Instant {
        let old = self.load();
        self.store(Instant::now());
        old
    }

    /// Returns the elapsed time since the stored instant.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.load().elapsed()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_load() {
        let atomic = AtomicInstant::from_instant(Instant::now());
        let later = Instant::now() + Duration::from_millis(50);

        atomic.store(later);
        let loaded = atomic.load();

        // Nanosecond truncation only
        let diff = if loaded > later { loaded - later } else { later - loaded };
        assert!(diff < Duration::from_micros(1));
    }

    #[test]
    fn test_touch_returns_previous() {
        let start = Instant::now();
        let atomic = AtomicInstant::from_instant(start);

        std::thread::sleep(Duration::from_millis(5));
        let previous = atomic.touch();

        assert!(previous <= start + Duration::from_micros(1));
        assert!(atomic.load() > previous);
    }

    #[test]
    fn test_elapsed_tracks_stored_instant() {
        let atomic = AtomicInstant::from_instant(Instant::now());
        std::thread::sleep(Duration::from_millis(20));
        let before = atomic.elapsed();
        assert!(before >= Duration::from_millis(20));

        atomic.touch();
        assert!(atomic.elapsed() < before);
    }
}
