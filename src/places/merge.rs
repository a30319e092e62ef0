//! Duplicate detection and merging across provider batches.
//!
//! Two records are the same venue when their normalized names are similar
//! enough (≥ 0.75) AND they sit within 50 m of each other. Matching is a
//! single left-to-right pass with consumed markers — deliberately not a
//! transitive closure: A absorbing B does not pull in a C that only
//! matched B, unless C also matches the updated A.

use super::types::{Place, ProviderBatch};
use crate::geo::{haversine_m, Coordinates};
use std::collections::BTreeSet;

/// Minimum name similarity for two records to merge.
pub const NAME_SIMILARITY_THRESHOLD: f64 = 0.75;

/// Maximum distance between two records to merge, meters.
pub const DUPLICATE_DISTANCE_M: u32 = 50;

/// Lower-case, strip punctuation, collapse whitespace.
fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Name similarity over normalized names: 1.0 if equal, 0.8 if one
/// contains the other, otherwise the Jaccard index of the character sets.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_name(a);
    let b = normalize_name(b);
    if a == b {
        return 1.0;
    }
    if !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a)) {
        return 0.8;
    }
    let set_a: BTreeSet<char> = a.chars().collect();
    let set_b: BTreeSet<char> = b.chars().collect();
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

fn is_duplicate(a: &Place, b: &Place) -> bool {
    if name_similarity(&a.name, &b.name) < NAME_SIMILARITY_THRESHOLD {
        return false;
    }
    let d = haversine_m(
        Coordinates { lat: a.lat, lon: a.lon },
        Coordinates { lat: b.lat, lon: b.lon },
    );
    d <= DUPLICATE_DISTANCE_M
}

/// Flatten the batches (order preserved as the stability key) and merge
/// near-duplicates. The earlier record survives; its empty fields are
/// backfilled from each absorbed match.
pub fn merge_and_dedupe(batches: Vec<ProviderBatch>) -> Vec<Place> {
    let all: Vec<Place> = batches.into_iter().flatten().collect();
    let mut consumed = vec![false; all.len()];
    let mut out = Vec::with_capacity(all.len());

    for i in 0..all.len() {
        if consumed[i] {
            continue;
        }
        let mut current = all[i].clone();
        consumed[i] = true;

        // O(n²) pairwise scan; fine for the tens of places we see.
        for j in (i + 1)..all.len() {
            if consumed[j] {
                continue;
            }
            if is_duplicate(&current, &all[j]) {
                current.absorb(&all[j]);
                consumed[j] = true;
            }
        }
        out.push(current);
    }
    out
}

/// Sort ascending by distance; places without a distance go after all
/// places with one. Ties keep original input order (stable).
pub fn sort_by_distance(mut places: Vec<Place>) -> Vec<Place> {
    places.sort_by(|a, b| match (a.distance_m, b.distance_m) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    places
}
