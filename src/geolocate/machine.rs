//! The acquisition state machine as a pure transition function.
//!
//! `step(state, event) -> state` carries no timers and touches no I/O, so
//! every transition is unit-testable. The driver in `acquirer.rs` feeds
//! it real events. Events that make no sense for the current phase leave
//! the state untouched, which is what makes late GPS/IP callbacks
//! harmless no-ops.

use super::types::{DetectionEvent, DetectionState, Phase, PositionOrigin};
use crate::geo::{self, Coordinates};

/// High-accuracy GPS budget, ms. Demands a fresh fix.
pub const GPS_HIGH_TIMEOUT_MS: u64 = 8_000;

/// Low-accuracy GPS budget, ms. A slightly stale cached fix is fine.
pub const GPS_LOW_TIMEOUT_MS: u64 = 6_000;

/// Oldest cached fix the low-accuracy attempt will accept, ms.
pub const GPS_LOW_MAX_AGE_MS: u64 = 60_000;

/// Advance the state machine by one event.
pub fn step(state: DetectionState, event: DetectionEvent) -> DetectionState {
    use DetectionEvent as E;
    use Phase as P;

    match (state.phase, event) {
        (P::Idle, E::Start { secure_context, supported }) => {
            if !secure_context {
                return DetectionState {
                    phase: P::NotSecureContext,
                    error: Some("Location requires a secure context (HTTPS)".into()),
                    can_retry: false,
                    ..DetectionState::idle()
                };
            }
            if !supported {
                return DetectionState {
                    phase: P::NotSupported,
                    error: Some("No geolocation capability available".into()),
                    can_retry: false,
                    ..DetectionState::idle()
                };
            }
            DetectionState {
                phase: P::RequestingPermission,
                ..DetectionState::idle()
            }
        }

        (P::RequestingPermission, E::PermissionGranted) => DetectionState {
            phase: P::DetectingGpsHigh,
            ..state
        },
        (P::RequestingPermission, E::GpsPermissionDenied) => denied(),

        // ── High-accuracy GPS ────────────────────────────────────
        (P::DetectingGpsHigh, E::GpsFix { lat, lon }) => staged_fix(state, lat, lon, PositionOrigin::Gps),
        (P::DetectingGpsHigh, E::GpsPermissionDenied) => denied(),
        (P::DetectingGpsHigh, E::GpsTimeout) | (P::DetectingGpsHigh, E::GpsUnavailable) => {
            DetectionState {
                phase: P::DetectingGpsLow,
                ..state
            }
        }

        // ── Low-accuracy GPS: any failure goes straight to IP ────
        (P::DetectingGpsLow, E::GpsFix { lat, lon }) => staged_fix(state, lat, lon, PositionOrigin::Gps),
        (P::DetectingGpsLow, E::GpsTimeout)
        | (P::DetectingGpsLow, E::GpsUnavailable)
        | (P::DetectingGpsLow, E::GpsPermissionDenied) => DetectionState {
            phase: P::FallbackIp,
            ..state
        },

        // ── Validation gate ──────────────────────────────────────
        (P::Validating, E::Validate) => match state.coords {
            Some(c) if geo::validate(c.lat, c.lon).is_ok() => DetectionState {
                phase: P::Success,
                can_retry: false,
                error: None,
                ..state
            },
            _ => match state.source {
                // Untrustworthy GPS stack: skip the low-accuracy retry
                // and go straight to IP.
                PositionOrigin::Gps => DetectionState {
                    phase: P::FallbackIp,
                    source: PositionOrigin::None,
                    coords: None,
                    ..state
                },
                _ => DetectionState {
                    phase: P::Failed,
                    source: PositionOrigin::None,
                    coords: None,
                    error: Some("IP lookup returned an invalid coordinate".into()),
                    can_retry: true,
                    ..state
                },
            },
        },

        // ── IP fallback ──────────────────────────────────────────
        (P::FallbackIp, E::IpFix { lat, lon, city, country }) => DetectionState {
            source: PositionOrigin::Ip,
            city,
            country,
            ..staged_fix(state, lat, lon, PositionOrigin::Ip)
        },
        (P::FallbackIp, E::IpFailed(message)) => DetectionState {
            phase: P::Failed,
            source: PositionOrigin::None,
            coords: None,
            error: Some(message),
            can_retry: true,
            ..state
        },

        // ── Explicit retry from any terminal state ───────────────
        (phase, E::Retry) if phase.is_terminal() => DetectionState::idle(),

        // Everything else (late callbacks, double events) is a no-op.
        _ => state,
    }
}

fn denied() -> DetectionState {
    DetectionState {
        phase: Phase::PermissionDenied,
        error: Some("Location permission denied".into()),
        can_retry: true,
        ..DetectionState::idle()
    }
}

fn staged_fix(state: DetectionState, lat: f64, lon: f64, source: PositionOrigin) -> DetectionState {
    DetectionState {
        phase: Phase::Validating,
        source,
        coords: Some(Coordinates { lat, lon }),
        ..state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DetectionEvent as E;

    fn start() -> DetectionState {
        step(
            DetectionState::idle(),
            E::Start { secure_context: true, supported: true },
        )
    }

    #[test]
    fn test_guards_insecure_and_unsupported() {
        let s = step(
            DetectionState::idle(),
            E::Start { secure_context: false, supported: true },
        );
        assert_eq!(s.phase, Phase::NotSecureContext);
        assert!(!s.can_retry);

        let s = step(
            DetectionState::idle(),
            E::Start { secure_context: true, supported: false },
        );
        assert_eq!(s.phase, Phase::NotSupported);
        assert!(!s.can_retry);
    }

    #[test]
    fn test_happy_path_high_accuracy() {
        let s = start();
        assert_eq!(s.phase, Phase::RequestingPermission);
        let s = step(s, E::PermissionGranted);
        assert_eq!(s.phase, Phase::DetectingGpsHigh);
        let s = step(s, E::GpsFix { lat: 59.3293, lon: 18.0686 });
        assert_eq!(s.phase, Phase::Validating);
        let s = step(s, E::Validate);
        assert_eq!(s.phase, Phase::Success);
        assert_eq!(s.source, PositionOrigin::Gps);
        assert!(s.coords.is_some());
    }

    #[test]
    fn test_timeout_escalates_to_low_accuracy() {
        let s = step(step(start(), E::PermissionGranted), E::GpsTimeout);
        assert_eq!(s.phase, Phase::DetectingGpsLow);
    }

    #[test]
    fn test_invalid_high_fix_skips_low_accuracy() {
        // A GPS stack reporting lat 91 is untrustworthy; go straight to IP.
        let s = step(step(start(), E::PermissionGranted), E::GpsFix { lat: 91.0, lon: 0.0 });
        let s = step(s, E::Validate);
        assert_eq!(s.phase, Phase::FallbackIp);
        assert!(s.coords.is_none());
    }

    #[test]
    fn test_permission_denied_terminal_with_retry() {
        let s = step(start(), E::GpsPermissionDenied);
        assert_eq!(s.phase, Phase::PermissionDenied);
        assert!(s.can_retry);
        // No automatic escalation from here.
        let s2 = step(s.clone(), E::GpsTimeout);
        assert_eq!(s2.phase, Phase::PermissionDenied);
        // Explicit retry resets the whole chain.
        let s3 = step(s, E::Retry);
        assert_eq!(s3.phase, Phase::Idle);
    }

    #[test]
    fn test_low_accuracy_failure_falls_to_ip() {
        let s = step(step(start(), E::PermissionGranted), E::GpsUnavailable);
        let s = step(s, E::GpsPermissionDenied); // surfacing late here
        assert_eq!(s.phase, Phase::FallbackIp);
    }

    #[test]
    fn test_ip_success_with_metadata() {
        let s = step(step(start(), E::PermissionGranted), E::GpsTimeout);
        let s = step(s, E::GpsTimeout);
        assert_eq!(s.phase, Phase::FallbackIp);
        let s = step(
            s,
            E::IpFix {
                lat: 0.0,
                lon: 0.0,
                city: Some("Accra".into()),
                country: Some("Ghana".into()),
            },
        );
        let s = step(s, E::Validate);
        // (0, 0) is a valid coordinate, distinct from "absent".
        assert_eq!(s.phase, Phase::Success);
        assert_eq!(s.source, PositionOrigin::Ip);
        assert_eq!(s.city.as_deref(), Some("Accra"));
    }

    #[test]
    fn test_ip_failure_terminal_retryable() {
        let s = step(step(start(), E::PermissionGranted), E::GpsTimeout);
        let s = step(s, E::GpsTimeout);
        let s = step(s, E::IpFailed("no route".into()));
        assert_eq!(s.phase, Phase::Failed);
        assert!(s.can_retry);
        assert_eq!(s.error.as_deref(), Some("no route"));
    }

    #[test]
    fn test_invalid_ip_coordinate_fails() {
        let s = step(step(start(), E::PermissionGranted), E::GpsTimeout);
        let s = step(s, E::GpsTimeout);
        let s = step(
            s,
            E::IpFix { lat: f64::NAN, lon: 0.0, city: None, country: None },
        );
        let s = step(s, E::Validate);
        assert_eq!(s.phase, Phase::Failed);
        assert!(s.can_retry);
    }

    #[test]
    fn test_late_callbacks_are_noops() {
        let s = start();
        let s = step(s, E::PermissionGranted);
        let s = step(s, E::GpsFix { lat: 10.0, lon: 10.0 });
        let s = step(s, E::Validate);
        assert_eq!(s.phase, Phase::Success);
        // A straggling timeout callback after success changes nothing.
        let s2 = step(s.clone(), E::GpsTimeout);
        assert_eq!(s2.phase, Phase::Success);
        assert_eq!(s2.coords, s.coords);
    }
}
