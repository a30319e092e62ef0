//! Keyword/category place-index provider (Foursquare).
//!
//! A "strict" query (halal category + keyword) runs first; when it comes
//! back sparse, one additional "broad" query (keyword only, no category
//! filter) is unioned in by provider-native id. The broad query failing
//! is swallowed. No configured credential means an empty batch, not an
//! error.

use super::types::{Place, ProviderBatch, ProviderKind};
use crate::geo::{self, haversine_m, Coordinates};
use crate::proxy::{is_sentinel, ResilienceProxy};
use crate::retry::RetryOrchestrator;
use serde::Deserialize;
use std::collections::HashSet;

pub const SEARCH_URL: &str = "https://api.foursquare.com/v3/places/search";

/// Foursquare category id for halal restaurants.
const HALAL_CATEGORY: &str = "13191";
const STRICT_KEYWORD: &str = "halal";
const BROAD_KEYWORD: &str = "halal food";
const RESULT_LIMIT: u32 = 50;

/// Below this many strict results, the broad query also runs.
pub const SPARSE_RESULTS_THRESHOLD: usize = 5;

fn search_url(origin: Coordinates, radius_m: u32, keyword: &str, category: Option<&str>) -> String {
    let category_param = match category {
        Some(c) => format!("&categories={}", c),
        None => String::new(),
    };
    format!(
        "{}?ll={},{}&radius={}&limit={}&query={}{}",
        SEARCH_URL,
        origin.lat,
        origin.lon,
        radius_m,
        RESULT_LIMIT,
        urlencod(keyword),
        category_param,
    )
}

#[derive(Deserialize)]
struct FsqResponse {
    #[serde(default)]
    results: Vec<FsqVenue>,
}

#[derive(Deserialize)]
struct FsqVenue {
    fsq_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    categories: Vec<FsqCategory>,
    #[serde(default)]
    location: FsqLocation,
    #[serde(default)]
    geocodes: FsqGeocodes,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    tel: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    distance: Option<u32>,
}

#[derive(Deserialize)]
struct FsqCategory {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize, Default)]
struct FsqLocation {
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    locality: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Deserialize, Default)]
struct FsqGeocodes {
    #[serde(default)]
    main: Option<FsqPoint>,
}

#[derive(Deserialize)]
struct FsqPoint {
    latitude: f64,
    longitude: f64,
}

/// Parse a place-index payload into places, with distance from `origin`.
pub fn parse_batch(body: &str, origin: Coordinates) -> ProviderBatch {
    let response: FsqResponse = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(_) => return Vec::new(),
    };

    let mut places = Vec::new();
    for venue in response.results {
        let Some(point) = venue.geocodes.main else {
            continue;
        };
        if geo::validate(point.latitude, point.longitude).is_err() {
            continue;
        }
        let coords = Coordinates {
            lat: point.latitude,
            lon: point.longitude,
        };
        let category = venue
            .categories
            .first()
            .map(|c| c.name.clone())
            .unwrap_or_default();

        places.push(Place {
            id: format!("{}:{}", ProviderKind::Foursquare, venue.fsq_id),
            name: venue.name,
            category,
            address: venue.location.address.unwrap_or_default(),
            city: venue.location.locality.unwrap_or_default(),
            country: venue.location.country.unwrap_or_default(),
            lat: coords.lat,
            lon: coords.lon,
            rating: venue.rating,
            phone: venue.tel,
            website: venue.website,
            distance_m: Some(venue.distance.unwrap_or_else(|| haversine_m(origin, coords))),
        });
    }
    places
}

/// Query the place index around `origin`. Strict first; broad only when
/// strict is sparse, unioned by provider-native id. Every failure mode
/// degrades to whatever was already collected (possibly nothing).
pub fn fetch(
    proxy: &ResilienceProxy,
    retry: &RetryOrchestrator,
    origin: Coordinates,
    radius_m: u32,
) -> ProviderBatch {
    if !proxy.credential_set() {
        // Source not configured; never a pipeline error.
        return Vec::new();
    }

    let strict_url = search_url(origin, radius_m, STRICT_KEYWORD, Some(HALAL_CATEGORY));
    let strict = retry.execute("place-index", || {
        let body = proxy.proxy_get(&strict_url);
        if is_sentinel(&body) {
            Err(body)
        } else {
            Ok(body)
        }
    });

    let mut places = match strict {
        Ok(body) => parse_batch(&body, origin),
        Err(_) => return Vec::new(),
    };

    if places.len() < SPARSE_RESULTS_THRESHOLD {
        // One broad pass; its failure is swallowed, strict results stand.
        let broad_url = search_url(origin, radius_m, BROAD_KEYWORD, None);
        let body = proxy.proxy_get(&broad_url);
        if !is_sentinel(&body) {
            let seen: HashSet<String> = places.iter().map(|p| p.id.clone()).collect();
            for place in parse_batch(&body, origin) {
                if !seen.contains(&place.id) {
                    places.push(place);
                }
            }
        }
    }

    places
}

/// Minimal percent-encoding for query parameters (no extra dep).
fn urlencod(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            ' ' => "%20".to_string(),
            '&' => "%26".to_string(),
            '=' => "%3D".to_string(),
            '+' => "%2B".to_string(),
            ',' => "%2C".to_string(),
            _ if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' || c == '~' => {
                c.to_string()
            }
            _ => format!("%{:02X}", c as u32),
        })
        .collect()
}
