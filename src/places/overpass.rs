//! Tag-filter map data provider (OpenStreetMap Overpass).
//!
//! Builds a structured around-radius query over halal-relevance
//! predicates, posts it through the resilience proxy, and normalizes the
//! response into Place records. Point features carry direct lat/lon;
//! area features are reduced to their computed center. Entries without a
//! resolvable coordinate are dropped at parse time.

use super::types::{Place, ProviderBatch, ProviderKind};
use crate::geo::{self, haversine_m, Coordinates};
use crate::proxy::{is_sentinel, ResilienceProxy};
use crate::retry::RetryOrchestrator;
use serde::Deserialize;
use std::collections::HashMap;

pub const OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// One selector applied to both node and way features.
const HALAL_SELECTORS: &[&str] = &[
    r#"["diet:halal"~"yes|only"]"#,
    r#"["halal"~"yes|only"]"#,
    r#"["cuisine"~"halal",i]"#,
    r#"["amenity"~"restaurant|fast_food|cafe"]["diet:halal"]"#,
    r#"["shop"~"butcher|supermarket|convenience"]["diet:halal"]"#,
];

/// Overpass QL query selecting halal-relevant features within
/// `radius_m` of `origin`.
pub fn build_query(origin: Coordinates, radius_m: u32) -> String {
    let mut clauses = String::new();
    for selector in HALAL_SELECTORS {
        for feature in ["node", "way"] {
            clauses.push_str(&format!(
                "  {}{}(around:{},{},{});\n",
                feature, selector, radius_m, origin.lat, origin.lon
            ));
        }
    }
    format!("[out:json][timeout:25];\n(\n{});\nout center;", clauses)
}

#[derive(Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    id: i64,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

impl OverpassElement {
    fn resolved_coords(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => self.center.as_ref().map(|c| (c.lat, c.lon)),
        }
    }
}

/// Display category, in priority order: explicit cuisine tag, else a
/// category-specific label.
fn derive_category(tags: &HashMap<String, String>) -> String {
    if let Some(cuisine) = tags.get("cuisine") {
        let first = cuisine.split(';').next().unwrap_or(cuisine).trim();
        if !first.is_empty() && first.to_lowercase() != "halal" {
            let mut chars = first.replace('_', " ").chars().collect::<Vec<_>>();
            if let Some(c) = chars.first_mut() {
                *c = c.to_ascii_uppercase();
            }
            return chars.into_iter().collect();
        }
    }
    match tags.get("amenity").map(String::as_str) {
        Some("restaurant") | Some("fast_food") | Some("cafe") => return "Restaurant".into(),
        _ => {}
    }
    match tags.get("shop").map(String::as_str) {
        Some("butcher") => "Butcher".into(),
        Some("supermarket") => "Supermarket".into(),
        Some(_) => "Halal Shop".into(),
        None => "Halal place".into(),
    }
}

/// Parse an Overpass payload into places, with distance from `origin`.
pub fn parse_batch(body: &str, origin: Coordinates) -> ProviderBatch {
    let response: OverpassResponse = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(_) => return Vec::new(),
    };

    let mut places = Vec::new();
    for element in &response.elements {
        let Some((lat, lon)) = element.resolved_coords() else {
            continue;
        };
        if geo::validate(lat, lon).is_err() {
            continue;
        }
        let name = element
            .tags
            .get("name")
            .cloned()
            .unwrap_or_else(|| "Unnamed".into());
        let distance = haversine_m(origin, Coordinates { lat, lon });

        places.push(Place {
            id: format!("{}:{}/{}", ProviderKind::Overpass, element.kind, element.id),
            name,
            category: derive_category(&element.tags),
            address: format_address(&element.tags),
            city: element.tags.get("addr:city").cloned().unwrap_or_default(),
            country: element.tags.get("addr:country").cloned().unwrap_or_default(),
            lat,
            lon,
            rating: None,
            phone: element.tags.get("phone").cloned(),
            website: element.tags.get("website").cloned(),
            distance_m: Some(distance),
        });
    }
    places
}

fn format_address(tags: &HashMap<String, String>) -> String {
    let street = tags.get("addr:street").map(String::as_str).unwrap_or("");
    let number = tags.get("addr:housenumber").map(String::as_str).unwrap_or("");
    match (street.is_empty(), number.is_empty()) {
        (false, false) => format!("{} {}", street, number),
        (false, true) => street.to_string(),
        _ => String::new(),
    }
}

/// Query Overpass for halal places around `origin`. Any failure mode —
/// proxy exhaustion, retry exhaustion, unparseable payload — degrades to
/// an empty batch.
pub fn fetch(
    proxy: &ResilienceProxy,
    retry: &RetryOrchestrator,
    origin: Coordinates,
    radius_m: u32,
) -> ProviderBatch {
    let query = build_query(origin, radius_m);
    let result = retry.execute("overpass", || {
        let body = proxy.proxy_post(OVERPASS_URL, &query);
        if is_sentinel(&body) {
            Err(body)
        } else {
            Ok(body)
        }
    });
    match result {
        Ok(body) => parse_batch(&body, origin),
        Err(_) => Vec::new(),
    }
}
