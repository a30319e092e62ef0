//! Halal Compass — resilient halal place search near a coordinate.
//!
//! Two upstream providers (an OpenStreetMap tag query and a commercial
//! place index) are fanned out behind a caching, retrying proxy; their
//! results are merged, deduplicated, and sorted by distance, widening
//! the search radius until enough places are found. Location comes from
//! a GPS-then-IP fallback chain. Everything network-facing degrades to
//! empty results instead of failing the whole search.

pub mod config;
pub mod geo;
pub mod geolocate;
pub mod limiter;
pub mod notify;
pub mod places;
pub mod proxy;
pub mod retry;
pub mod server;
