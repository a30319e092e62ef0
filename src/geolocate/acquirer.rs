//! Driver for one-shot location acquisition.
//!
//! Feeds real events — GPS fix attempts, the IP lookup — into the pure
//! state machine. The IP fallback sits behind a latch so racing
//! timeout/error callbacks can only ever trigger one lookup per attempt;
//! an explicit retry resets the latch along with the state.

use super::ip::ip_lookup;
use super::machine::{
    step, GPS_HIGH_TIMEOUT_MS, GPS_LOW_MAX_AGE_MS, GPS_LOW_TIMEOUT_MS,
};
use super::types::{
    DetectionEvent, DetectionState, FixRequest, GpsFailure, Phase, PositionSource,
};
use crate::proxy::ResilienceProxy;

pub struct GeoAcquirer<S: PositionSource> {
    source: S,
    secure_context: bool,
    state: DetectionState,
    ip_fallback_done: bool,
}

impl<S: PositionSource> GeoAcquirer<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            secure_context: true,
            state: DetectionState::idle(),
            ip_fallback_done: false,
        }
    }

    /// Override the secure-context guard (for testing the guard path).
    pub fn with_secure_context(mut self, secure_context: bool) -> Self {
        self.secure_context = secure_context;
        self
    }

    pub fn state(&self) -> &DetectionState {
        &self.state
    }

    /// Run one full acquisition attempt: high-accuracy GPS, then
    /// low-accuracy GPS, then IP. Returns the resulting (terminal) state.
    /// A no-op unless the machine is idle.
    pub fn acquire(&mut self, proxy: &ResilienceProxy) -> &DetectionState {
        if self.state.phase != Phase::Idle {
            return &self.state;
        }

        self.apply(DetectionEvent::Start {
            secure_context: self.secure_context,
            supported: self.source.supported(),
        });
        if self.state.phase.is_terminal() {
            return &self.state;
        }

        self.apply(DetectionEvent::PermissionGranted);

        // High accuracy: fresh fix only, 8 s budget.
        if self.state.phase == Phase::DetectingGpsHigh {
            let result = self.source.request_fix(FixRequest {
                high_accuracy: true,
                timeout_ms: GPS_HIGH_TIMEOUT_MS,
                max_age_ms: 0,
            });
            self.apply_fix_result(result);
        }

        // Low accuracy: stale cached fix acceptable, 6 s budget.
        if self.state.phase == Phase::DetectingGpsLow {
            let result = self.source.request_fix(FixRequest {
                high_accuracy: false,
                timeout_ms: GPS_LOW_TIMEOUT_MS,
                max_age_ms: GPS_LOW_MAX_AGE_MS,
            });
            self.apply_fix_result(result);
        }

        if self.state.phase == Phase::FallbackIp {
            self.trigger_ip_fallback(proxy);
        }

        &self.state
    }

    fn apply_fix_result(&mut self, result: Result<(f64, f64), GpsFailure>) {
        match result {
            Ok((lat, lon)) => {
                self.apply(DetectionEvent::GpsFix { lat, lon });
                self.apply(DetectionEvent::Validate);
            }
            Err(GpsFailure::PermissionDenied) => self.apply(DetectionEvent::GpsPermissionDenied),
            Err(GpsFailure::Timeout) => self.apply(DetectionEvent::GpsTimeout),
            Err(GpsFailure::Unavailable) => self.apply(DetectionEvent::GpsUnavailable),
        }
    }

    /// Run the IP fallback at most once per attempt. Safe to call from
    /// racing callbacks: the latch makes the second call a no-op.
    pub fn trigger_ip_fallback(&mut self, proxy: &ResilienceProxy) {
        if self.ip_fallback_done {
            return;
        }
        self.ip_fallback_done = true;

        match ip_lookup(proxy) {
            Ok(loc) => {
                self.apply(DetectionEvent::IpFix {
                    lat: loc.lat,
                    lon: loc.lon,
                    city: loc.city,
                    country: loc.country,
                });
                self.apply(DetectionEvent::Validate);
            }
            Err(message) => self.apply(DetectionEvent::IpFailed(message)),
        }
    }

    /// Explicit user retry: only valid from a terminal state. Resets the
    /// machine and the fallback latch so the next attempt starts fresh.
    pub fn retry(&mut self) -> bool {
        if !self.state.phase.is_terminal() {
            return false;
        }
        self.apply(DetectionEvent::Retry);
        self.ip_fallback_done = false;
        true
    }

    fn apply(&mut self, event: DetectionEvent) {
        self.state = step(self.state.clone(), event);
    }
}
