//! Geolocation acquisition subsystem.
//!
//! One-shot detection walks a GPS-then-IP fallback chain driven by a
//! pure state machine; continuous tracking filters a position stream
//! through movement and rate-limit gates. The two modes are mutually
//! exclusive per controller.

pub mod acquirer;
pub mod ip;
pub mod machine;
pub mod tracker;
pub mod types;

pub use acquirer::GeoAcquirer;
pub use ip::{ip_lookup, IpLocation};
pub use machine::step;
pub use tracker::LocationTracker;
pub use types::{
    DetectionEvent, DetectionState, FixRequest, GpsFailure, NoGps, Phase, PositionOrigin,
    PositionSource,
};

use crate::notify::ProgressSink;
use crate::proxy::ResilienceProxy;
use std::sync::Arc;

/// Owns both acquisition modes and enforces their mutual exclusion: a
/// tracking session blocks one-shot detection with a warning, and
/// detection runs to completion under the exclusive borrow, so tracking
/// can never start mid-detection.
pub struct GeoController<S: PositionSource> {
    acquirer: GeoAcquirer<S>,
    tracker: LocationTracker,
    sink: Arc<dyn ProgressSink>,
}

impl<S: PositionSource> GeoController<S> {
    pub fn new(source: S, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            acquirer: GeoAcquirer::new(source),
            tracker: LocationTracker::new(sink.clone()),
            sink,
        }
    }

    /// One-shot detection. Rejected while a tracking session is active.
    pub fn detect_once(&mut self, proxy: &ResilienceProxy) -> Option<DetectionState> {
        if self.tracker.is_active() {
            self.sink
                .notify("Stop location tracking before requesting a one-time detection");
            return None;
        }
        Some(self.acquirer.acquire(proxy).clone())
    }

    /// Begin a tracking session.
    pub fn start_tracking(&mut self) -> bool {
        if self.tracker.is_active() {
            self.sink.notify("Location tracking is already active");
            return false;
        }
        self.tracker.start();
        true
    }

    pub fn stop_tracking(&mut self) {
        self.tracker.stop();
    }

    pub fn tracker(&mut self) -> &mut LocationTracker {
        &mut self.tracker
    }

    pub fn acquirer(&mut self) -> &mut GeoAcquirer<S> {
        &mut self.acquirer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemorySink;
    use crate::proxy::{ResilienceProxy, Transport};
    use std::sync::Arc;

    struct DeadTransport;
    impl Transport for DeadTransport {
        fn get(&self, _url: &str, _auth: Option<&str>) -> Result<String, String> {
            Err("offline".into())
        }
        fn post(&self, _url: &str, _body: &str, _auth: Option<&str>) -> Result<String, String> {
            Err("offline".into())
        }
    }

    #[test]
    fn test_detection_rejected_while_tracking() {
        let sink = MemorySink::new();
        let proxy = ResilienceProxy::new(Box::new(DeadTransport));
        let mut controller = GeoController::new(NoGps, sink.clone());

        assert!(controller.start_tracking());
        assert!(controller.detect_once(&proxy).is_none());
        assert!(sink.messages().iter().any(|m| m.contains("Stop location tracking")));

        controller.stop_tracking();
        assert!(controller.detect_once(&proxy).is_some());
    }

    #[test]
    fn test_tracking_available_after_detection_returns() {
        let sink = MemorySink::new();
        let proxy = ResilienceProxy::new(Box::new(DeadTransport));
        let mut controller = GeoController::new(NoGps, sink.clone());

        assert!(controller.detect_once(&proxy).is_some());
        assert!(controller.start_tracking());
    }

    #[test]
    fn test_double_start_tracking_rejected() {
        let sink = MemorySink::new();
        let mut controller = GeoController::new(NoGps, sink.clone());

        assert!(controller.start_tracking());
        assert!(!controller.start_tracking());
        assert!(sink.messages().iter().any(|m| m.contains("already active")));
    }
}
