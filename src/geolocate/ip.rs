//! IP-based geolocation lookup.
//!
//! One GET through the resilience proxy; no retries at this layer —
//! bounded retry, when wanted, belongs to the retry orchestrator wrapping
//! the call. `lat`/`lon` of exactly 0 are valid coordinates and must be
//! distinguished from absent fields, hence the Options.

use crate::proxy::{is_sentinel, ResilienceProxy};
use serde::Deserialize;

pub const IP_LOOKUP_URL: &str = "http://ip-api.com/json/";

/// A coordinate obtained from the caller's IP, with optional metadata.
#[derive(Debug, Clone)]
pub struct IpLocation {
    pub lat: f64,
    pub lon: f64,
    pub city: Option<String>,
    pub country: Option<String>,
}

#[derive(Deserialize)]
struct IpApiPayload {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Look up the caller's coordinate by IP. Returns the failure reason as a
/// plain message; the caller decides what that means for its state.
pub fn ip_lookup(proxy: &ResilienceProxy) -> Result<IpLocation, String> {
    let body = proxy.proxy_get(IP_LOOKUP_URL);
    if is_sentinel(&body) {
        return Err(body);
    }
    parse_payload(&body)
}

fn parse_payload(body: &str) -> Result<IpLocation, String> {
    let payload: IpApiPayload =
        serde_json::from_str(body).map_err(|e| format!("invalid IP lookup response: {}", e))?;

    if payload.status.as_deref() != Some("success") {
        return Err(payload
            .message
            .unwrap_or_else(|| "IP lookup did not succeed".into()));
    }

    match (payload.lat, payload.lon) {
        (Some(lat), Some(lon)) => Ok(IpLocation {
            lat,
            lon,
            city: payload.city,
            country: payload.country,
        }),
        _ => Err("IP lookup response missing coordinates".into()),
    }
}
