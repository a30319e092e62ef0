//! Core types for the geolocation-acquisition subsystem.

use crate::geo::Coordinates;
use serde::Serialize;
use std::fmt;

/// Where an acquisition currently stands. One detection attempt walks
/// these phases; terminal phases stay put until an explicit retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    RequestingPermission,
    DetectingGpsHigh,
    DetectingGpsLow,
    FallbackIp,
    Validating,
    Success,
    Failed,
    PermissionDenied,
    NotSecureContext,
    NotSupported,
}

impl Phase {
    /// Terminal phases end the attempt (successfully or not).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success
                | Self::Failed
                | Self::PermissionDenied
                | Self::NotSecureContext
                | Self::NotSupported
        )
    }
}

/// Which kind of source produced the coordinate, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PositionOrigin {
    Gps,
    Ip,
    None,
}

impl fmt::Display for PositionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gps => write!(f, "GPS"),
            Self::Ip => write!(f, "IP"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Full state of one detection attempt. Mutated only by the state
/// machine; reset on explicit retry.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionState {
    pub phase: Phase,
    pub source: PositionOrigin,
    pub coords: Option<Coordinates>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub error: Option<String>,
    pub can_retry: bool,
}

impl DetectionState {
    pub fn idle() -> Self {
        Self {
            phase: Phase::Idle,
            source: PositionOrigin::None,
            coords: None,
            city: None,
            country: None,
            error: None,
            can_retry: false,
        }
    }
}

/// Inputs to the state machine. Produced by the driver from user
/// gestures, GPS callbacks, and the IP lookup.
#[derive(Debug, Clone)]
pub enum DetectionEvent {
    /// Explicit user trigger, with the environment guards sampled.
    Start { secure_context: bool, supported: bool },
    PermissionGranted,
    GpsFix { lat: f64, lon: f64 },
    GpsTimeout,
    GpsUnavailable,
    GpsPermissionDenied,
    /// Run the coordinate validator over the staged fix.
    Validate,
    IpFix {
        lat: f64,
        lon: f64,
        city: Option<String>,
        country: Option<String>,
    },
    IpFailed(String),
    /// Explicit user retry from a terminal state.
    Retry,
}

/// Why a GPS fix request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpsFailure {
    PermissionDenied,
    Timeout,
    Unavailable,
}

/// Parameters for one GPS fix request.
#[derive(Debug, Clone, Copy)]
pub struct FixRequest {
    pub high_accuracy: bool,
    pub timeout_ms: u64,
    /// Oldest acceptable cached fix; 0 demands a fresh one.
    pub max_age_ms: u64,
}

/// The GPS capability seam. Headless deployments use [`NoGps`]; tests
/// use scripted sources.
pub trait PositionSource {
    /// Whether a geolocation capability exists at all.
    fn supported(&self) -> bool;

    /// Request a single fix. Blocks up to the request's timeout budget.
    fn request_fix(&mut self, request: FixRequest) -> Result<(f64, f64), GpsFailure>;
}

/// No GPS hardware (servers, CLI). Everything falls through to IP.
pub struct NoGps;

impl PositionSource for NoGps {
    fn supported(&self) -> bool {
        true
    }

    fn request_fix(&mut self, _request: FixRequest) -> Result<(f64, f64), GpsFailure> {
        Err(GpsFailure::Unavailable)
    }
}
