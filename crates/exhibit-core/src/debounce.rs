//! Scan debouncing.
//!
//! Proximity-tap hardware reports a burst of events for one physical tap
//! (field on, data read, field off, sometimes repeated while the phone
//! wobbles in range). Events closer together than the refractory window
//! collapse into a single visit.

use std::time::Instant;

use tracing::{debug, info};

use crate::store::TagStore;

/// Default refractory window in milliseconds.
pub const REFRACTORY_WINDOW_MS: u64 = 1000;

/// What a single scan event did to the visit counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The event started a new visit.
    Counted {
        /// Visit total after this event.
        visits: u32,
    },
    /// The event fell inside the refractory window and was dropped.
    Debounced {
        /// Milliseconds since the last counted scan.
        since_last_ms: u64,
    },
}

/// Counts one visit per physical tap.
#[derive(Debug, Clone, Copy)]
pub struct ScanDebouncer {
    window_ms: u64,
}

impl ScanDebouncer {
    /// Creates a debouncer with the given refractory window.
    #[must_use]
    pub const fn new(window_ms: u64) -> Self {
        Self { window_ms }
    }

    /// The refractory window in milliseconds.
    #[must_use]
    pub const fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Handles a raw scan event that arrived at `now_ms`.
    ///
    /// A dropped event changes neither the counter nor the timestamp, so a
    /// steady stream of events spaced under the window counts once. A
    /// timestamp earlier than the last counted scan is treated as inside the
    /// window.
    pub fn on_scan_event(&self, store: &mut TagStore, now_ms: u64) -> ScanOutcome {
        if let Some(last_ms) = store.last_scan_ms() {
            let since_last_ms = now_ms.saturating_sub(last_ms);
            if since_last_ms < self.window_ms {
                debug!(since_last_ms, "Scan debounced");
                return ScanOutcome::Debounced { since_last_ms };
            }
        }

        let visits = store.record_visit();
        store.set_last_scan_ms(now_ms);
        info!(visits, "Tag scanned");
        ScanOutcome::Counted { visits }
    }
}

impl Default for ScanDebouncer {
    fn default() -> Self {
        Self::new(REFRACTORY_WINDOW_MS)
    }
}

/// Millisecond clock starting at boot.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Starts a clock at zero.
    #[must_use]
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Milliseconds elapsed since [`MonotonicClock::start`].
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DeviceName;

    fn store() -> TagStore {
        TagStore::new(DeviceName::new("MuseumGuide").unwrap())
    }

    #[test]
    fn test_first_scan_always_counts() {
        let mut store = store();
        let outcome = ScanDebouncer::default().on_scan_event(&mut store, 0);
        assert_eq!(outcome, ScanOutcome::Counted { visits: 1 });
        assert_eq!(store.last_scan_ms(), Some(0));
    }

    #[test]
    fn test_scans_inside_window_count_once() {
        let mut store = store();
        let debouncer = ScanDebouncer::default();
        debouncer.on_scan_event(&mut store, 100);
        let outcome = debouncer.on_scan_event(&mut store, 1099);
        assert_eq!(outcome, ScanOutcome::Debounced { since_last_ms: 999 });
        assert_eq!(store.visits(), 1);
        assert_eq!(store.last_scan_ms(), Some(100));
    }

    #[test]
    fn test_scans_at_window_boundary_count_twice() {
        let mut store = store();
        let debouncer = ScanDebouncer::default();
        debouncer.on_scan_event(&mut store, 100);
        let outcome = debouncer.on_scan_event(&mut store, 1100);
        assert_eq!(outcome, ScanOutcome::Counted { visits: 2 });
    }

    #[test]
    fn test_dropped_event_does_not_extend_window() {
        let mut store = store();
        let debouncer = ScanDebouncer::default();
        debouncer.on_scan_event(&mut store, 0);
        debouncer.on_scan_event(&mut store, 600);
        // 1000 ms after the counted scan, not after the dropped one.
        let outcome = debouncer.on_scan_event(&mut store, 1000);
        assert_eq!(outcome, ScanOutcome::Counted { visits: 2 });
    }

    #[test]
    fn test_clock_regression_is_debounced() {
        let mut store = store();
        let debouncer = ScanDebouncer::default();
        debouncer.on_scan_event(&mut store, 5000);
        let outcome = debouncer.on_scan_event(&mut store, 10);
        assert_eq!(outcome, ScanOutcome::Debounced { since_last_ms: 0 });
        assert_eq!(store.visits(), 1);
    }

    #[test]
    fn test_custom_window() {
        let mut store = store();
        let debouncer = ScanDebouncer::new(50);
        debouncer.on_scan_event(&mut store, 0);
        debouncer.on_scan_event(&mut store, 50);
        assert_eq!(store.visits(), 2);
        assert_eq!(debouncer.window_ms(), 50);
    }

    #[test]
    fn test_clock_is_monotonic() {
        let clock = MonotonicClock::start();
        let first = clock.now_ms();
        assert!(clock.now_ms() >= first);
    }
}
