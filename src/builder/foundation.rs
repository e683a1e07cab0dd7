//! Foundation and connectivity edges (spec §4.4 steps 6-9): entity
//! importance scoring, per-section hub entities, cross-document
//! `SHARES_ENTITY` edges, and semantic `SIMILAR_TO` entity edges.
//!
//! `APPEARS_IN_SECTION` and `APPEARS_IN_DOCUMENT` (also named in step 7) are
//! deliberately not materialized here: both are derivable at read time from
//! `mentions_for_group` joined against `chunk_section_edges` / each chunk's
//! `document_id`, and the `GraphStore` trait has no write method for them —
//! only `HAS_HUB_ENTITY` needs its own table, since it carries a nontrivial
//! top-3-per-section ranking that isn't a plain join.

use crate::config::RetrievalConfig;
use crate::ids::{EntityId, GroupId, SectionId};
use crate::model::{Entity, Relationship};
use crate::providers::embedding::cosine_similarity;
use crate::providers::graph_store::{EntityImportance, EntitySimilarityEdge, GraphStoreError, SharesEntityEdge};
use crate::providers::GraphStore;
use std::collections::{HashMap, HashSet};

/// Step 6: `degree` (relationship edge count) and `chunk_count`
/// (`text_unit_ids.len()`) per entity, combined into
/// `importance_score = 0.3*degree + 0.7*chunk_count`.
pub async fn compute_entity_importance(
    store: &dyn GraphStore,
    group_id: &GroupId,
    entities: &[Entity],
    relationships: &[Relationship],
) -> Result<usize, GraphStoreError> {
    let mut degree: HashMap<EntityId, usize> = HashMap::new();
    for relationship in relationships {
        *degree.entry(relationship.source_id.clone()).or_insert(0) += 1;
        *degree.entry(relationship.target_id.clone()).or_insert(0) += 1;
    }

    let mut count = 0;
    for entity in entities {
        let entity_degree = degree.get(&entity.id).copied().unwrap_or(0);
        let chunk_count = entity.text_unit_ids.len();
        let importance = EntityImportance {
            degree: entity_degree,
            chunk_count,
            importance_score: 0.3 * entity_degree as f32 + 0.7 * chunk_count as f32,
        };
        store.set_entity_importance(group_id, &entity.id, importance).await?;
        count += 1;
    }
    Ok(count)
}

/// Step 7 (the rankable part): the top 3 most-mentioned entities per
/// section, written as `HAS_HUB_ENTITY` edges with `rank` 1..=3.
pub async fn build_hub_entities(store: &dyn GraphStore, group_id: &GroupId) -> Result<usize, GraphStoreError> {
    let chunk_to_sections = section_membership(store, group_id).await?;
    let mentions = store.mentions_for_group(group_id).await?;

    let mut section_entity_counts: HashMap<SectionId, HashMap<EntityId, usize>> = HashMap::new();
    for mention in &mentions {
        let Some(sections) = chunk_to_sections.get(&mention.chunk_id) else {
            continue;
        };
        for section_id in sections {
            *section_entity_counts
                .entry(section_id.clone())
                .or_default()
                .entry(mention.entity_id.clone())
                .or_insert(0) += 1;
        }
    }

    let mut count = 0;
    let mut section_ids: Vec<&SectionId> = section_entity_counts.keys().collect();
    section_ids.sort();
    for section_id in section_ids {
        let counts = &section_entity_counts[section_id];
        let mut ranked: Vec<(&EntityId, usize)> = counts.iter().map(|(id, n)| (id, *n)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        for (rank, (entity_id, _)) in ranked.into_iter().take(3).enumerate() {
            store.upsert_hub_entity(group_id, section_id, entity_id, rank + 1).await?;
            count += 1;
        }
    }
    Ok(count)
}

/// Step 8: `SHARES_ENTITY` between two sections from *different* documents
/// that mention at least 2 of the same entities.
pub async fn build_shares_entity_edges(store: &dyn GraphStore, group_id: &GroupId) -> Result<usize, GraphStoreError> {
    let sections = store.all_sections(group_id).await?;
    let chunk_to_sections = section_membership(store, group_id).await?;
    let mentions = store.mentions_for_group(group_id).await?;

    let mut section_entities: HashMap<SectionId, HashSet<EntityId>> = HashMap::new();
    for mention in &mentions {
        if let Some(sections) = chunk_to_sections.get(&mention.chunk_id) {
            for section_id in sections {
                section_entities
                    .entry(section_id.clone())
                    .or_default()
                    .insert(mention.entity_id.clone());
            }
        }
    }

    let doc_by_section: HashMap<SectionId, crate::ids::DocumentId> =
        sections.iter().map(|s| (s.id.clone(), s.document_id.clone())).collect();

    let mut ids: Vec<SectionId> = section_entities.keys().cloned().collect();
    ids.sort();

    let mut count = 0;
    for i in 0..ids.len() {
        for j in (i + 1)..ids.len() {
            let (a, b) = (&ids[i], &ids[j]);
            let (Some(doc_a), Some(doc_b)) = (doc_by_section.get(a), doc_by_section.get(b)) else {
                continue;
            };
            if doc_a == doc_b {
                continue;
            }
            let shared: Vec<EntityId> = section_entities[a].intersection(&section_entities[b]).cloned().collect();
            if shared.len() < 2 {
                continue;
            }
            store
                .upsert_shares_entity(&SharesEntityEdge {
                    group_id: group_id.clone(),
                    section_a: a.clone(),
                    section_b: b.clone(),
                    shared_entities: shared,
                })
                .await?;
            count += 1;
        }
    }
    Ok(count)
}

/// Step 9: `SIMILAR_TO` between entity pairs whose embeddings cosine-score
/// at or above `synonym_threshold` — the same threshold the PPR engine
/// reads back at query time via `entity_similarity_edges` (DESIGN.md: no new
/// config field introduced for this). Skipped when the pair is already
/// connected by an explicit relationship, regardless of its label.
pub async fn build_similar_to_edges(
    store: &dyn GraphStore,
    group_id: &GroupId,
    entities: &[Entity],
    relationships: &[Relationship],
    config: &RetrievalConfig,
) -> Result<usize, GraphStoreError> {
    let mut related: HashSet<(String, String)> = HashSet::new();
    for relationship in relationships {
        related.insert(canonical_str_pair(relationship.source_id.as_str(), relationship.target_id.as_str()));
    }

    let mut count = 0;
    for i in 0..entities.len() {
        for j in (i + 1)..entities.len() {
            let (a, b) = (&entities[i], &entities[j]);
            let (Some(emb_a), Some(emb_b)) = (a.embedding.as_deref(), b.embedding.as_deref()) else {
                continue;
            };
            let similarity = cosine_similarity(emb_a, emb_b);
            if similarity < config.synonym_threshold {
                continue;
            }
            if related.contains(&canonical_str_pair(a.id.as_str(), b.id.as_str())) {
                continue;
            }
            let (source, target) = if a.id <= b.id { (a.id.clone(), b.id.clone()) } else { (b.id.clone(), a.id.clone()) };
            store
                .upsert_entity_similarity(&EntitySimilarityEdge {
                    group_id: group_id.clone(),
                    source,
                    target,
                    relationship: "SIMILAR_TO",
                    similarity,
                })
                .await?;
            count += 1;
        }
    }
    Ok(count)
}

/// `ChunkId -> [SectionId]` built from the store's persisted `IN_SECTION`
/// edges, shared by the hub-entity and shares-entity passes.
async fn section_membership(
    store: &dyn GraphStore,
    group_id: &GroupId,
) -> Result<HashMap<crate::ids::ChunkId, Vec<SectionId>>, GraphStoreError> {
    let edges = store.chunk_section_edges(group_id).await?;
    let mut map: HashMap<crate::ids::ChunkId, Vec<SectionId>> = HashMap::new();
    for (chunk_id, section_id) in edges {
        map.entry(chunk_id).or_default().push(section_id);
    }
    Ok(map)
}

fn canonical_str_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}
