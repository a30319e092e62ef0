//! Core types for the place-search subsystem.

use serde::{Deserialize, Serialize};

/// Which external data source produced a record. The lower-case display
/// form is the prefix of every provider-qualified place id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Tag-filter map data source (OpenStreetMap via Overpass).
    Overpass,
    /// Keyword/category place index (Foursquare).
    Foursquare,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Overpass => write!(f, "overpass"),
            Self::Foursquare => write!(f, "foursquare"),
        }
    }
}

/// A normalized point of interest. A Place lacking resolvable coordinates
/// is never constructed — coordinate-less provider entries are dropped at
/// parse time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    /// Provider-qualified id, unique per source (e.g. "overpass:node/42").
    pub id: String,
    pub name: String,
    pub category: String,
    pub address: String,
    pub city: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    /// Distance from the search origin, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<u32>,
}

impl Place {
    /// Backfill empty/absent fields of `self` from `other`. The earlier
    /// record always wins where it has a value.
    pub fn absorb(&mut self, other: &Place) {
        fn fill(target: &mut String, source: &str) {
            if target.is_empty() && !source.is_empty() {
                *target = source.to_string();
            }
        }
        fill(&mut self.category, &other.category);
        fill(&mut self.address, &other.address);
        fill(&mut self.city, &other.city);
        fill(&mut self.country, &other.country);
        if self.rating.is_none() {
            self.rating = other.rating;
        }
        if self.phone.is_none() {
            self.phone = other.phone.clone();
        }
        if self.website.is_none() {
            self.website = other.website.clone();
        }
        if self.distance_m.is_none() {
            self.distance_m = other.distance_m;
        }
    }
}

/// The ordered set of places one provider returned for one query.
/// Provider failure degrades to an empty batch, never an error.
pub type ProviderBatch = Vec<Place>;

#[cfg(test)]
pub(crate) fn test_place(id: &str, name: &str, lat: f64, lon: f64) -> Place {
    Place {
        id: id.to_string(),
        name: name.to_string(),
        category: String::new(),
        address: String::new(),
        city: String::new(),
        country: String::new(),
        lat,
        lon,
        rating: None,
        phone: None,
        website: None,
        distance_m: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_display_is_id_prefix() {
        assert_eq!(ProviderKind::Overpass.to_string(), "overpass");
        assert_eq!(ProviderKind::Foursquare.to_string(), "foursquare");
    }

    #[test]
    fn test_absorb_keeps_existing_fields() {
        let mut first = test_place("a", "Al Madina", 0.0, 0.0);
        first.category = "Restaurant".into();
        first.rating = Some(4.5);

        let mut second = test_place("b", "al-madina", 0.0, 0.0);
        second.category = "Turkish".into();
        second.phone = Some("+4670".into());
        second.rating = Some(3.0);

        first.absorb(&second);
        assert_eq!(first.category, "Restaurant");
        assert_eq!(first.rating, Some(4.5));
        assert_eq!(first.phone.as_deref(), Some("+4670"));
    }

    #[test]
    fn test_absorb_backfills_empty() {
        let mut first = test_place("a", "Kebab House", 0.0, 0.0);
        let mut second = test_place("b", "Kebab House", 0.0, 0.0);
        second.address = "Main St 1".into();
        second.website = Some("https://kebab.example".into());
        second.distance_m = Some(120);

        first.absorb(&second);
        assert_eq!(first.address, "Main St 1");
        assert_eq!(first.website.as_deref(), Some("https://kebab.example"));
        assert_eq!(first.distance_m, Some(120));
    }
}
