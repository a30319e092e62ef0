//! Continuous position tracking.
//!
//! A long-lived session fed by a position stream. Each incoming fix must
//! pass two filters before it triggers a downstream search: a
//! significant-movement test against the last accepted fix, and a
//! 10-second rate-limit gate. The first accepted fix in a session emits a
//! one-time "acquired" notification; later ones are silent. Stopping the
//! session resets both filters so resuming behaves like a fresh start.

use crate::geo::{self, significant_move, Coordinates};
use crate::limiter::RateLimiter;
use crate::notify::ProgressSink;
use std::sync::Arc;

/// Minimum interval between accepted fixes, ms.
pub const TRACKING_MIN_INTERVAL_MS: i64 = 10_000;

pub struct LocationTracker {
    limiter: RateLimiter,
    last_accepted: Option<Coordinates>,
    active: bool,
    acquired_notified: bool,
    sink: Arc<dyn ProgressSink>,
}

impl LocationTracker {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            limiter: RateLimiter::new(TRACKING_MIN_INTERVAL_MS),
            last_accepted: None,
            active: false,
            acquired_notified: false,
            sink,
        }
    }

    /// Build with a custom rate limiter (for tests driving time by hand).
    pub fn with_limiter(sink: Arc<dyn ProgressSink>, limiter: RateLimiter) -> Self {
        Self {
            limiter,
            last_accepted: None,
            active: false,
            acquired_notified: false,
            sink,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn start(&mut self) {
        self.active = true;
    }

    /// Stop the session and reset the filter state; the underlying watch
    /// subscription is released by the caller that owns it.
    pub fn stop(&mut self) {
        self.active = false;
        self.last_accepted = None;
        self.acquired_notified = false;
        self.limiter.reset();
    }

    /// Offer one incoming position. Returns the coordinate when it passed
    /// both filters and should trigger a downstream search.
    pub fn offer(&mut self, lat: f64, lon: f64) -> Option<Coordinates> {
        if !self.active {
            return None;
        }
        if geo::validate(lat, lon).is_err() {
            return None;
        }
        let next = Coordinates { lat, lon };

        if !significant_move(self.last_accepted, next) {
            return None;
        }
        if !self.limiter.can_execute() {
            return None;
        }

        self.limiter.mark_executed();
        self.last_accepted = Some(next);

        if !self.acquired_notified {
            self.acquired_notified = true;
            self.sink.notify("Location acquired — tracking nearby places");
        }
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemorySink;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn tracker_with_clock() -> (LocationTracker, Arc<AtomicI64>, Arc<MemorySink>) {
        let t = Arc::new(AtomicI64::new(0));
        let t2 = Arc::clone(&t);
        let limiter = RateLimiter::with_clock(
            TRACKING_MIN_INTERVAL_MS,
            Box::new(move || t2.load(Ordering::SeqCst)),
        );
        let sink = MemorySink::new();
        let tracker = LocationTracker::with_limiter(sink.clone(), limiter);
        (tracker, t, sink)
    }

    #[test]
    fn test_inactive_session_accepts_nothing() {
        let (mut tracker, _t, _sink) = tracker_with_clock();
        assert!(tracker.offer(59.3293, 18.0686).is_none());
    }

    #[test]
    fn test_first_fix_accepted_and_notified_once() {
        let (mut tracker, t, sink) = tracker_with_clock();
        tracker.start();

        assert!(tracker.offer(59.3293, 18.0686).is_some());
        assert_eq!(sink.messages().len(), 1);

        // A later accepted fix is silent.
        t.store(20_000, Ordering::SeqCst);
        assert!(tracker.offer(59.3393, 18.0686).is_some());
        assert_eq!(sink.messages().len(), 1);
    }

    #[test]
    fn test_insignificant_movement_filtered() {
        let (mut tracker, t, _sink) = tracker_with_clock();
        tracker.start();

        assert!(tracker.offer(59.3293, 18.0686).is_some());
        t.store(20_000, Ordering::SeqCst);
        // ~11 m north: below the movement threshold even with time elapsed.
        assert!(tracker.offer(59.3294, 18.0686).is_none());
    }

    #[test]
    fn test_rate_limit_filters_fast_updates() {
        let (mut tracker, t, _sink) = tracker_with_clock();
        tracker.start();

        assert!(tracker.offer(59.3293, 18.0686).is_some());
        // Large move, but only 5 s later.
        t.store(5_000, Ordering::SeqCst);
        assert!(tracker.offer(59.3493, 18.0686).is_none());
        // Same move once the interval has passed.
        t.store(10_000, Ordering::SeqCst);
        assert!(tracker.offer(59.3493, 18.0686).is_some());
    }

    #[test]
    fn test_invalid_position_ignored() {
        let (mut tracker, _t, _sink) = tracker_with_clock();
        tracker.start();
        assert!(tracker.offer(f64::NAN, 18.0).is_none());
        assert!(tracker.offer(95.0, 18.0).is_none());
    }

    #[test]
    fn test_stop_resets_filters_for_fresh_session() {
        let (mut tracker, _t, sink) = tracker_with_clock();
        tracker.start();
        assert!(tracker.offer(59.3293, 18.0686).is_some());

        tracker.stop();
        tracker.start();

        // Same position, no time elapsed: accepted again because both the
        // movement baseline and the limiter were reset, and the acquired
        // notification fires again for the new session.
        assert!(tracker.offer(59.3293, 18.0686).is_some());
        assert_eq!(sink.messages().len(), 2);
    }
}
