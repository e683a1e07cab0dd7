//! Seed-vector construction for the HippoRAG-2 route (spec §4.8 step 4).
//! Grounded on
//! `original_source/src/worker/hybrid_v2/routes/route_7_hipporag2.py`'s
//! `execute` step 3, which the comments there document as containing two
//! deliberate bug-fix branches: entity seeds are normalized to sum to one
//! *after* structural/community weights are folded in, while passage seeds
//! are normalized to sum to one *before* being scaled by
//! `passage_node_weight` — reversing either order changes the PPR outcome.

use std::collections::HashMap;

/// Accumulate weight `1.0` for both endpoints of every surviving triple
/// (spec §4.8 step 3 "entity seeds from triple linking"). An entity that
/// appears in multiple triples accumulates proportionally more weight.
pub fn entity_seeds_from_triples<'a>(ids: impl Iterator<Item = (&'a str, &'a str)>) -> HashMap<String, f32> {
    let mut seeds = HashMap::new();
    for (subject_id, object_id) in ids {
        *seeds.entry(subject_id.to_string()).or_insert(0.0) += 1.0;
        *seeds.entry(object_id.to_string()).or_insert(0.0) += 1.0;
    }
    seeds
}

/// Fold in an additional weighted tier (structural or community seeds),
/// adding `weight` to every listed id (spec §4.8 step 4 tiers 2/3).
pub fn add_weighted_tier(seeds: &mut HashMap<String, f32>, ids: &[String], weight: f32) {
    for id in ids {
        *seeds.entry(id.clone()).or_insert(0.0) += weight;
    }
}

/// Normalize a seed map so its values sum to 1, in place. A no-op on an
/// empty or all-zero map.
pub fn normalize_to_sum_one(seeds: &mut HashMap<String, f32>) {
    let total: f32 = seeds.values().sum();
    if total > 0.0 {
        for v in seeds.values_mut() {
            *v /= total;
        }
    }
}

/// Passage seeds from DPR hits: normalize to sum 1, *then* scale by
/// `passage_node_weight` (the original's "Bug 2 fix: normalize before
/// scaling" comment — doing it in the other order changes PPR balance
/// between entity and passage seed mass).
pub fn passage_seeds_from_dpr(dpr_results: &[(String, f32)], passage_node_weight: f32) -> HashMap<String, f32> {
    let mut seeds: HashMap<String, f32> = dpr_results.iter().cloned().collect();
    let total: f32 = seeds.values().sum();
    if total > 0.0 {
        for v in seeds.values_mut() {
            *v = (*v / total) * passage_node_weight;
        }
    }
    seeds
}
