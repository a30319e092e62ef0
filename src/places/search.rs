//! Query orchestration: dual-provider fan-out and radius expansion.
//!
//! One radius tier issues both provider queries concurrently, waits for
//! both, and collects them in fixed Overpass-then-Foursquare order so the
//! downstream merge is deterministic. The controller widens the radius
//! until enough merged results exist or the tier list runs out.

use super::merge::merge_and_dedupe;
use super::types::{Place, ProviderBatch};
use super::{foursquare, overpass};
use crate::geo::Coordinates;
use crate::notify::ProgressSink;
use crate::proxy::ResilienceProxy;
use crate::retry::RetryOrchestrator;
use std::sync::Arc;

/// Stop expanding once this many merged results exist.
pub const MIN_RESULTS: usize = 5;

/// Fixed expansion tiers appended after the initial radius.
pub const EXPANSION_TIERS_M: [u32; 2] = [20_000, 30_000];

/// Largest radius ever queried.
pub const MAX_RADIUS_M: u32 = 30_000;

/// A source of one (tag-filter, keyword-index) batch pair per query.
/// Both batches are always present; provider failure is an empty batch.
pub trait ProviderPair: Sync {
    fn query(&self, origin: Coordinates, radius_m: u32) -> (ProviderBatch, ProviderBatch);
}

/// Production provider pair: Overpass + Foursquare through the proxy,
/// each wrapped in client-side retry.
pub struct ProviderQueryEngine<'a> {
    pub proxy: &'a ResilienceProxy,
    pub retry: &'a RetryOrchestrator,
}

impl ProviderPair for ProviderQueryEngine<'_> {
    fn query(&self, origin: Coordinates, radius_m: u32) -> (ProviderBatch, ProviderBatch) {
        std::thread::scope(|scope| {
            let tag_handle =
                scope.spawn(|| overpass::fetch(self.proxy, self.retry, origin, radius_m));
            let index_handle =
                scope.spawn(|| foursquare::fetch(self.proxy, self.retry, origin, radius_m));

            // Neither provider blocks the other; a panicked provider
            // thread degrades to an empty batch like any other failure.
            let tag_batch = tag_handle.join().unwrap_or_default();
            let index_batch = index_handle.join().unwrap_or_default();
            (tag_batch, index_batch)
        })
    }
}

/// The radius tier sequence for a given starting radius: the initial
/// radius (capped), then each fixed expansion tier it is below.
pub fn radius_tiers(initial_radius_m: u32) -> Vec<u32> {
    let initial = initial_radius_m.min(MAX_RADIUS_M);
    let mut tiers = vec![initial];
    for tier in EXPANSION_TIERS_M {
        if initial < tier {
            tiers.push(tier);
        }
    }
    tiers
}

/// Run the full expanding search. Each tier's batches are merged into the
/// accumulator; expansion steps past the first announce the new radius.
pub fn search<P: ProviderPair>(
    providers: &P,
    sink: &Arc<dyn ProgressSink>,
    origin: Coordinates,
    initial_radius_m: u32,
) -> Vec<Place> {
    let tiers = radius_tiers(initial_radius_m);
    let mut accumulated: Vec<Place> = Vec::new();

    for (index, radius_m) in tiers.iter().enumerate() {
        if index > 0 {
            sink.notify(&format!("Few results so far — widening search to {} m", radius_m));
        }
        let (tag_batch, index_batch) = providers.query(origin, *radius_m);
        accumulated = merge_and_dedupe(vec![accumulated, tag_batch, index_batch]);
        if accumulated.len() >= MIN_RESULTS {
            break;
        }
    }
    accumulated
}
