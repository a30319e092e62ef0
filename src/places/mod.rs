//! Place search subsystem: providers, merging, and radius expansion.
//!
//! Two independent, unreliable geodata providers feed one deduplicated
//! list. A provider failing, being unconfigured, or returning garbage is
//! never an error here — it degrades to an empty batch and the pipeline
//! carries on with whatever the other source returned.

pub mod foursquare;
pub mod merge;
pub mod overpass;
pub mod search;
pub mod types;

pub use merge::{merge_and_dedupe, sort_by_distance};
pub use search::{radius_tiers, search, ProviderPair, ProviderQueryEngine, MIN_RESULTS};
pub use types::{Place, ProviderBatch, ProviderKind};
