//! Graph store capability (spec §2, §6): a labeled property graph with node
//! upsert, typed edges, parameterized queries, and a vector similarity
//! index over a node property. Grounded on `src/storage/traits.rs::GraphStore`,
//! generalized from the teacher's generic `Node`/`Edge`/`Context` shape to
//! this domain's typed entities, and made async since every method here is
//! an I/O boundary (spec §5).

use crate::ids::{ChunkId, CommunityId, EntityId, GroupId, SectionId, SentenceId};
use crate::model::{Community, Document, Entity, Mention, Relationship, Section, Sentence, TextChunk};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphStoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A `Section —[SUBSECTION_OF]→ Section` or `Document —[HAS_SECTION]→
/// Section` edge (spec §4.4 step 2). Stored separately from `Section`
/// itself since a section's parent is a relationship, not a field every
/// caller of `Section` needs to carry.
#[derive(Debug, Clone)]
pub struct SectionEdge {
    pub group_id: GroupId,
    pub child: SectionId,
    pub parent: Option<SectionId>, // None for a depth-0 section's HAS_SECTION edge target, recorded via `document_has_section` instead
}

/// `Section —[SHARES_ENTITY]→ Section` (spec §3, §4.4 step 8).
#[derive(Debug, Clone)]
pub struct SharesEntityEdge {
    pub group_id: GroupId,
    pub section_a: SectionId,
    pub section_b: SectionId,
    pub shared_entities: Vec<EntityId>,
}

/// `Entity —[SIMILAR_TO]→ Entity` (spec §3, §4.4 step 9) or
/// `Entity —[SEMANTICALLY_SIMILAR]→ Entity` (spec §3 edge table).
#[derive(Debug, Clone)]
pub struct EntitySimilarityEdge {
    pub group_id: GroupId,
    pub source: EntityId,
    pub target: EntityId,
    pub relationship: &'static str, // "SIMILAR_TO" or "SEMANTICALLY_SIMILAR"
    pub similarity: f32,
}

/// Derived per-entity stats (spec §4.4 step 6).
#[derive(Debug, Clone, Default)]
pub struct EntityImportance {
    pub degree: usize,
    pub chunk_count: usize,
    pub importance_score: f32,
}

/// Fields needed to re-fetch chunks after PPR ranking (spec §4.8 step 6).
#[derive(Debug, Clone)]
pub struct ChunkFetchResult {
    pub chunk: TextChunk,
    pub document_title: String,
    pub section_title: Option<String>,
    pub section_path: Vec<String>,
}

/// Graph store capability (spec §6). All operations are implicitly
/// `group_id`-scoped; implementations must enforce this at the query level,
/// not rely on callers to pre-filter (universal invariant 1).
#[async_trait]
pub trait GraphStore: Send + Sync {
    // --- writes (Graph Builder, §4.4) ---
    async fn upsert_document(&self, document: &Document) -> Result<(), GraphStoreError>;
    async fn upsert_chunk(&self, chunk: &TextChunk) -> Result<(), GraphStoreError>;
    async fn upsert_section(&self, section: &Section) -> Result<(), GraphStoreError>;
    async fn upsert_section_edge(&self, edge: &SectionEdge) -> Result<(), GraphStoreError>;
    async fn upsert_chunk_in_section(&self, group: &GroupId, chunk: &ChunkId, section: &SectionId) -> Result<(), GraphStoreError>;
    async fn upsert_entity(&self, entity: &Entity) -> Result<(), GraphStoreError>;
    async fn upsert_relationship(&self, relationship: &Relationship) -> Result<(), GraphStoreError>;
    async fn upsert_mention(&self, mention: &Mention) -> Result<(), GraphStoreError>;
    async fn upsert_sentence(&self, sentence: &Sentence) -> Result<(), GraphStoreError>;
    async fn upsert_sentence_next_edge(&self, group: &GroupId, from: &SentenceId, to: &SentenceId) -> Result<(), GraphStoreError>;
    async fn upsert_community(&self, community: &Community) -> Result<(), GraphStoreError>;
    async fn upsert_section_similarity(&self, group: &GroupId, a: &SectionId, b: &SectionId, similarity: f32) -> Result<(), GraphStoreError>;
    async fn upsert_shares_entity(&self, edge: &SharesEntityEdge) -> Result<(), GraphStoreError>;
    async fn upsert_entity_similarity(&self, edge: &EntitySimilarityEdge) -> Result<(), GraphStoreError>;
    async fn upsert_hub_entity(&self, group: &GroupId, section: &SectionId, entity: &EntityId, rank: usize) -> Result<(), GraphStoreError>;
    async fn set_entity_importance(&self, group: &GroupId, entity: &EntityId, importance: EntityImportance) -> Result<(), GraphStoreError>;
    async fn set_pagerank(&self, group: &GroupId, scores: &[(String, f32)]) -> Result<(), GraphStoreError>;

    /// Delete everything under a group (spec §3 "reindex=true first deletes
    /// all nodes/edges with that group_id").
    async fn delete_group(&self, group: &GroupId) -> Result<(), GraphStoreError>;

    // --- reads: bulk (Triple Store / PPR Engine loading, §4.6, §4.7) ---
    async fn count_documents(&self, group: &GroupId) -> Result<usize, GraphStoreError>;
    async fn all_entities(&self, group: &GroupId) -> Result<Vec<Entity>, GraphStoreError>;
    async fn all_chunks(&self, group: &GroupId) -> Result<Vec<TextChunk>, GraphStoreError>;
    async fn all_relationships(&self, group: &GroupId) -> Result<Vec<Relationship>, GraphStoreError>;
    async fn all_sections(&self, group: &GroupId) -> Result<Vec<Section>, GraphStoreError>;
    async fn mentions_for_group(&self, group: &GroupId) -> Result<Vec<Mention>, GraphStoreError>;
    /// Relationships with a non-empty description (spec §4.6 step 1, the
    /// triple-store's source data).
    async fn described_relationships(&self, group: &GroupId) -> Result<Vec<(Entity, Entity, Relationship)>, GraphStoreError>;
    /// Entity similarity edges at or above `synonym_threshold` (spec §4.7
    /// graph-construction rule for `SEMANTICALLY_SIMILAR`/`SIMILAR_TO`).
    async fn entity_similarity_edges(&self, group: &GroupId, threshold: f32) -> Result<Vec<EntitySimilarityEdge>, GraphStoreError>;
    /// `TextChunk —[IN_SECTION]→ Section` pairs (spec §4.7, feature-flagged).
    async fn chunk_section_edges(&self, group: &GroupId) -> Result<Vec<(ChunkId, SectionId)>, GraphStoreError>;
    /// `Section —[SEMANTICALLY_SIMILAR]→ Section` pairs above
    /// `section_sim_threshold` (spec §4.7, feature-flagged).
    async fn section_similarity_edges(&self, group: &GroupId, threshold: f32) -> Result<Vec<(SectionId, SectionId, f32)>, GraphStoreError>;

    // --- reads: query-time (Route Handler, §4.8) ---
    async fn vector_search_chunks(&self, group: &GroupId, query: &[f32], top_k: usize) -> Result<Vec<(ChunkId, f32)>, GraphStoreError>;
    async fn vector_search_sentences(&self, group: &GroupId, query: &[f32], top_k: usize, threshold: f32) -> Result<Vec<(SentenceId, f32)>, GraphStoreError>;
    async fn fetch_chunks(&self, group: &GroupId, ids: &[ChunkId]) -> Result<Vec<ChunkFetchResult>, GraphStoreError>;
    async fn fetch_sentences(&self, group: &GroupId, ids: &[SentenceId]) -> Result<Vec<Sentence>, GraphStoreError>;

    // --- reads: Phase 2 structural/community helpers (SPEC_FULL §4.9) ---
    async fn match_sections_by_embedding(&self, group: &GroupId, query: &[f32], top_k: usize) -> Result<Vec<(SectionId, f32)>, GraphStoreError>;
    async fn top_entities_in_sections(&self, group: &GroupId, sections: &[SectionId], top_k: usize) -> Result<Vec<EntityId>, GraphStoreError>;
    async fn match_communities_by_embedding(&self, group: &GroupId, query: &[f32], top_k: usize) -> Result<Vec<(CommunityId, f32)>, GraphStoreError>;
    async fn top_entities_by_degree(&self, group: &GroupId, entities: &[EntityId], top_k: usize) -> Result<Vec<EntityId>, GraphStoreError>;
}

#[allow(dead_code)]
pub(crate) fn _assert_object_safe(_: &dyn GraphStore) {}
