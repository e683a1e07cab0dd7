//! Deduplicator (spec §4.3): collapses duplicate entities produced by
//! per-chunk extraction into one canonical record per real-world entity, and
//! rewrites every mention/relation that pointed at a merged-away id.
//!
//! `Entity::new` already derives `id = hash(group_id, canonical_key(name))`
//! (universal invariant 3), so two extractions of "Fabrikam Construction
//! Inc." and "Fabrikam Construction Inc" collapse to the same id before this
//! module ever runs. What's left for `deduplicate` is exactly the case
//! `canonical_key` doesn't catch: different surface forms (aliases,
//! abbreviations, near-miss spellings) that only converge under embedding
//! similarity. Must be stable under repeated runs on the same input — same
//! entities in, same canonical ids and remap out, every time.

use crate::model::{Entity, Mention, Relationship};
use crate::providers::embedding::cosine_similarity;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct DedupResult {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relationship>,
    pub mentions: Vec<Mention>,
    /// `old_id -> canonical_id` for every id that got merged away. Callers
    /// that stage entity writes by id before this runs need this to patch
    /// up anything not passed through `deduplicate` itself (e.g. a
    /// `hub_entity` pointer built earlier in the same pass).
    pub remap: HashMap<String, String>,
}

/// Merge duplicate entities, then rewrite `relations`/`mentions` to point at
/// the surviving canonical ids. Never drops a mention — only rewrites its
/// entity endpoint — and collapses `(source, target, description)` triples
/// that become duplicates once their endpoints are merged.
pub fn deduplicate(
    entities: Vec<Entity>,
    relations: Vec<Relationship>,
    mentions: Vec<Mention>,
    similarity_threshold: f32,
) -> DedupResult {
    let (mut merged, id_remap) = merge_same_id(entities);
    let (mut clustered, cluster_remap) = merge_near_duplicates(&mut merged, similarity_threshold);

    let mut remap = id_remap;
    for (old, canonical) in cluster_remap {
        remap.insert(old, canonical);
    }

    let relations = remap_and_dedup_relations(relations, &remap);
    let mentions = remap_mentions(mentions, &remap);
    clustered.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

    DedupResult {
        entities: clustered,
        relations,
        mentions,
        remap,
    }
}

/// Group entities that `Entity::new` already assigned the same id (same
/// canonical key), unioning their fields. Returns the merged entities plus
/// an identity-free remap map (always empty — kept for signature symmetry
/// with `merge_near_duplicates`, since no id actually changes here).
fn merge_same_id(entities: Vec<Entity>) -> (Vec<Entity>, HashMap<String, String>) {
    let mut by_id: HashMap<String, Entity> = HashMap::new();
    for entity in entities {
        by_id
            .entry(entity.id.as_str().to_string())
            .and_modify(|existing| merge_into(existing, &entity))
            .or_insert(entity);
    }
    let mut merged: Vec<Entity> = by_id.into_values().collect();
    merged.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
    (merged, HashMap::new())
}

/// Union-find style pass over distinct-id entities: any pair whose
/// embeddings cosine-similarity meets `threshold` is merged into whichever
/// of the two has more contributing text units (ties broken by the
/// lexicographically smaller id, for determinism). Returns the surviving
/// entities plus `old_id -> canonical_id` for every id folded away.
fn merge_near_duplicates(entities: &mut Vec<Entity>, threshold: f32) -> (Vec<Entity>, HashMap<String, String>) {
    let n = entities.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], x: usize) -> usize {
        if parent[x] != x {
            parent[x] = find(parent, parent[x]);
        }
        parent[x]
    }

    for i in 0..n {
        for j in (i + 1)..n {
            let (Some(a), Some(b)) = (entities[i].embedding.as_deref(), entities[j].embedding.as_deref()) else {
                continue;
            };
            if cosine_similarity(a, b) >= threshold {
                let ri = find(&mut parent, i);
                let rj = find(&mut parent, j);
                if ri != rj {
                    let winner = pick_canonical(&entities[ri], &entities[rj]);
                    let (root, other) = if winner == entities[ri].id.as_str() { (ri, rj) } else { (rj, ri) };
                    parent[other] = root;
                }
            }
        }
    }

    let mut clusters: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        clusters.entry(root).or_default().push(i);
    }

    let mut remap = HashMap::new();
    let mut result = Vec::new();
    for members in clusters.values() {
        let root_idx = *members.iter().max_by(|&&a, &&b| compare_priority(&entities[a], &entities[b])).unwrap();
        let mut canonical = entities[root_idx].clone();
        for &idx in members {
            if idx == root_idx {
                continue;
            }
            merge_into(&mut canonical, &entities[idx]);
            remap.insert(entities[idx].id.as_str().to_string(), canonical.id.as_str().to_string());
        }
        result.push(canonical);
    }

    (result, remap)
}

fn pick_canonical(a: &Entity, b: &Entity) -> String {
    match compare_priority(a, b) {
        std::cmp::Ordering::Less => b.id.as_str().to_string(),
        _ => a.id.as_str().to_string(),
    }
}

/// More contributing text units wins; ties broken by the lexicographically
/// smaller id so the outcome never depends on input order.
fn compare_priority(a: &Entity, b: &Entity) -> std::cmp::Ordering {
    a.text_unit_ids
        .len()
        .cmp(&b.text_unit_ids.len())
        .then_with(|| b.id.as_str().cmp(a.id.as_str()))
}

/// Fold `other`'s fields into `target`: union aliases/text units/metadata,
/// keep the longer non-empty description, keep the first non-null
/// embedding.
fn merge_into(target: &mut Entity, other: &Entity) {
    for alias in &other.aliases {
        if !target.aliases.contains(alias) {
            target.aliases.push(alias.clone());
        }
    }
    if !target.aliases.contains(&other.name) && other.name != target.name {
        target.aliases.push(other.name.clone());
    }
    for unit in &other.text_unit_ids {
        if !target.text_unit_ids.contains(unit) {
            target.text_unit_ids.push(unit.clone());
        }
    }
    for (key, value) in &other.metadata {
        target.metadata.entry(key.clone()).or_insert_with(|| value.clone());
    }
    if other.description.len() > target.description.len() {
        target.description = other.description.clone();
    }
    if target.embedding.is_none() {
        target.embedding = other.embedding.clone();
    }
}

fn remap_mentions(mentions: Vec<Mention>, remap: &HashMap<String, String>) -> Vec<Mention> {
    mentions
        .into_iter()
        .map(|mut m| {
            if let Some(canonical) = remap.get(m.entity_id.as_str()) {
                m.entity_id = canonical.as_str().into();
            }
            m
        })
        .collect()
}

fn remap_and_dedup_relations(relations: Vec<Relationship>, remap: &HashMap<String, String>) -> Vec<Relationship> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    for mut relation in relations {
        if let Some(canonical) = remap.get(relation.source_id.as_str()) {
            relation.source_id = canonical.as_str().into();
        }
        if let Some(canonical) = remap.get(relation.target_id.as_str()) {
            relation.target_id = canonical.as_str().into();
        }
        if relation.source_id == relation.target_id {
            continue; // merge collapsed both endpoints into the same entity
        }
        let key = (
            relation.source_id.as_str().to_string(),
            relation.target_id.as_str().to_string(),
            relation.description.clone(),
        );
        if seen.insert(key) {
            result.push(relation);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ChunkId, GroupId};
    use crate::model::EntityLabel;

    fn group() -> GroupId {
        GroupId::new("g1")
    }

    #[test]
    fn same_canonical_key_merges_text_units() {
        let mut a = Entity::new(group(), "Fabrikam Inc.", EntityLabel::Organization)
            .with_text_unit(ChunkId::new("c1"));
        let b = Entity::new(group(), "Fabrikam Inc", EntityLabel::Organization)
            .with_text_unit(ChunkId::new("c2"));
        assert_eq!(a.id, b.id);
        a.embedding = Some(vec![1.0, 0.0]);
        let result = deduplicate(vec![a, b], vec![], vec![], 0.95);
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].text_unit_ids.len(), 2);
    }

    #[test]
    fn near_duplicate_embeddings_merge_across_different_names() {
        let a = Entity::new(group(), "Fabrikam Construction", EntityLabel::Organization).with_embedding(vec![1.0, 0.0, 0.0]);
        let b = Entity::new(group(), "Fabrikam Construction Company", EntityLabel::Organization).with_embedding(vec![0.999, 0.01, 0.0]);
        assert_ne!(a.id, b.id);
        let result = deduplicate(vec![a, b], vec![], vec![], 0.95);
        assert_eq!(result.entities.len(), 1);
    }

    #[test]
    fn dissimilar_entities_are_not_merged() {
        let a = Entity::new(group(), "Fabrikam", EntityLabel::Organization).with_embedding(vec![1.0, 0.0]);
        let b = Entity::new(group(), "Contoso", EntityLabel::Organization).with_embedding(vec![0.0, 1.0]);
        let result = deduplicate(vec![a, b], vec![], vec![], 0.95);
        assert_eq!(result.entities.len(), 2);
    }

    #[test]
    fn relations_are_rewritten_and_self_relations_dropped_after_merge() {
        let a = Entity::new(group(), "Fabrikam Construction", EntityLabel::Organization).with_embedding(vec![1.0, 0.0]);
        let b = Entity::new(group(), "Fabrikam Construction Co", EntityLabel::Organization).with_embedding(vec![0.999, 0.01]);
        let c = Entity::new(group(), "Contoso", EntityLabel::Organization).with_embedding(vec![0.0, 1.0]);
        let relation_to_self = Relationship::new(group(), a.id.clone(), b.id.clone(), "RELATED_TO");
        let relation_to_other = Relationship::new(group(), a.id.clone(), c.id.clone(), "PARTY_TO");
        let result = deduplicate(
            vec![a, b, c],
            vec![relation_to_self, relation_to_other],
            vec![],
            0.95,
        );
        assert_eq!(result.entities.len(), 2);
        assert_eq!(result.relations.len(), 1);
        assert_eq!(result.relations[0].relation_type, "PARTY_TO");
    }

    #[test]
    fn mentions_are_never_dropped_only_rewritten() {
        let a = Entity::new(group(), "Fabrikam Construction", EntityLabel::Organization).with_embedding(vec![1.0, 0.0]);
        let b = Entity::new(group(), "Fabrikam Construction Co", EntityLabel::Organization).with_embedding(vec![0.999, 0.01]);
        let mention = Mention::new(group(), ChunkId::new("c1"), b.id.clone());
        let result = deduplicate(vec![a, b], vec![], vec![mention], 0.95);
        assert_eq!(result.mentions.len(), 1);
        assert_eq!(result.mentions[0].entity_id, result.entities[0].id);
    }

    #[test]
    fn deduplication_is_stable_across_repeated_runs() {
        let a1 = Entity::new(group(), "Fabrikam Construction", EntityLabel::Organization).with_embedding(vec![1.0, 0.0]);
        let b1 = Entity::new(group(), "Fabrikam Construction Co", EntityLabel::Organization).with_embedding(vec![0.999, 0.01]);
        let a2 = a1.clone();
        let b2 = b1.clone();
        let r1 = deduplicate(vec![a1, b1], vec![], vec![], 0.95);
        let r2 = deduplicate(vec![a2, b2], vec![], vec![], 0.95);
        assert_eq!(r1.entities[0].id, r2.entities[0].id);
    }

    /// `compare_priority`'s tie-break (more text units, then smaller id) is
    /// only actually order-independent if nothing upstream relies on
    /// iteration order either. Shuffle the input vector under a handful of
    /// seeds and check the merged cluster count and winning id never move.
    #[test]
    fn clustering_is_invariant_to_input_order() {
        use rand::rngs::StdRng;
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        let fabrikam = || Entity::new(group(), "Fabrikam Construction", EntityLabel::Organization).with_embedding(vec![1.0, 0.0, 0.0]);
        let fabrikam_co = || {
            Entity::new(group(), "Fabrikam Construction Co", EntityLabel::Organization)
                .with_embedding(vec![0.999, 0.01, 0.0])
                .with_text_unit(ChunkId::new("c1"))
        };
        let fabrikam_corp = || {
            Entity::new(group(), "Fabrikam Construction Corp", EntityLabel::Organization)
                .with_embedding(vec![0.998, 0.0, 0.02])
                .with_text_unit(ChunkId::new("c2"))
                .with_text_unit(ChunkId::new("c3"))
        };
        let contoso = || Entity::new(group(), "Contoso", EntityLabel::Organization).with_embedding(vec![0.0, 1.0, 0.0]);

        let baseline = deduplicate(vec![fabrikam(), fabrikam_co(), fabrikam_corp(), contoso()], vec![], vec![], 0.95);
        assert_eq!(baseline.entities.len(), 2);

        for seed in [1u64, 2, 3, 4, 5] {
            let mut entities = vec![fabrikam(), fabrikam_co(), fabrikam_corp(), contoso()];
            let mut rng = StdRng::seed_from_u64(seed);
            entities.shuffle(&mut rng);
            let shuffled = deduplicate(entities, vec![], vec![], 0.95);
            assert_eq!(shuffled.entities.len(), baseline.entities.len());
            let mut baseline_ids: Vec<_> = baseline.entities.iter().map(|e| e.id.as_str().to_string()).collect();
            let mut shuffled_ids: Vec<_> = shuffled.entities.iter().map(|e| e.id.as_str().to_string()).collect();
            baseline_ids.sort();
            shuffled_ids.sort();
            assert_eq!(baseline_ids, shuffled_ids);
        }
    }
}
