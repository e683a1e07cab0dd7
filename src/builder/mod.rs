//! Graph Builder (spec §4.4): turns chunker/extractor/dedup output into the
//! full entity+passage+section graph — node/edge upserts, section hierarchy,
//! cross-document similarity, entity importance, hub entities, hierarchical
//! community detection and summarization, and a final global PageRank pass.
//!
//! Assumes the caller already ran the chunker, extractor, and deduplicator
//! (`pipeline`); this module only performs derived-graph construction over
//! already-canonical entities/relationships/mentions.

mod communities;
mod foundation;
mod pagerank;
mod sections;

pub use sections::SectionStats;

use crate::config::RetrievalConfig;
use crate::ids::GroupId;
use crate::model::{Document, Entity, Mention, Relationship, TextChunk};
use crate::providers::embedding::EmbeddingError;
use crate::providers::graph_store::GraphStoreError;
use crate::providers::{EmbeddingProvider, GraphStore, LlmProvider};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Store(#[from] GraphStoreError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Counts from a single `build_graph` run, surfaced to callers for indexing
/// logs (spec §7 observability).
#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    pub documents: usize,
    pub chunks: usize,
    pub entities: usize,
    pub relationships: usize,
    pub mentions: usize,
    pub sections: usize,
    pub section_similarity_edges: usize,
    pub entities_scored: usize,
    pub hub_entities: usize,
    pub shares_entity_edges: usize,
    pub similar_to_edges: usize,
    pub communities: usize,
    pub pagerank_nodes: usize,
}

/// Run the full graph-builder pipeline (spec §4.4 steps 1-12) over one
/// group's already-deduplicated documents/chunks/entities/relationships/
/// mentions.
#[allow(clippy::too_many_arguments)]
pub async fn build_graph(
    store: &dyn GraphStore,
    embedder: &dyn EmbeddingProvider,
    llm: &dyn LlmProvider,
    group_id: &GroupId,
    documents: &[Document],
    chunks: &[TextChunk],
    entities: &[Entity],
    relationships: &[Relationship],
    mentions: &[Mention],
    config: &RetrievalConfig,
) -> Result<BuildStats, BuildError> {
    // Steps 1 + 5: document/chunk/entity/relationship/mention upserts.
    for document in documents {
        store.upsert_document(document).await?;
    }
    for chunk in chunks {
        store.upsert_chunk(chunk).await?;
    }
    for entity in entities {
        store.upsert_entity(entity).await?;
    }
    for relationship in relationships {
        store.upsert_relationship(relationship).await?;
    }
    for mention in mentions {
        store.upsert_mention(mention).await?;
    }

    // Steps 2-4: section hierarchy, section embeddings, cross-doc similarity.
    let section_stats = sections::build_section_graph(store, embedder, group_id, chunks, config).await?;

    // Steps 6-9: importance, hub entities, SHARES_ENTITY, SIMILAR_TO.
    let entities_scored = foundation::compute_entity_importance(store, group_id, entities, relationships).await?;
    let hub_entities = foundation::build_hub_entities(store, group_id).await?;
    let shares_entity_edges = foundation::build_shares_entity_edges(store, group_id).await?;
    let similar_to_edges = foundation::build_similar_to_edges(store, group_id, entities, relationships, config).await?;

    // Steps 10-11: hierarchical community detection + grounded summaries.
    let communities = communities::detect_and_summarize(store, embedder, llm, group_id, config).await?;

    // Step 12: global PageRank over the whole subgraph.
    let pagerank_nodes = pagerank::compute_pagerank(store, group_id, config).await?;

    Ok(BuildStats {
        documents: documents.len(),
        chunks: chunks.len(),
        entities: entities.len(),
        relationships: relationships.len(),
        mentions: mentions.len(),
        sections: section_stats.sections,
        section_similarity_edges: section_stats.section_similarity_edges,
        entities_scored,
        hub_entities,
        shares_entity_edges,
        similar_to_edges,
        communities,
        pagerank_nodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphstore::SqliteGraphStore;
    use crate::ids::{ChunkId, DocumentId};
    use crate::model::EntityLabel;
    use crate::providers::embedding::DeterministicEmbedder;
    use crate::providers::llm::ScriptedLlmProvider;

    fn group() -> GroupId {
        GroupId::new("g1")
    }

    #[tokio::test]
    async fn build_graph_upserts_everything_and_scores_entities() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let embedder = DeterministicEmbedder::new(16);
        let llm = ScriptedLlmProvider::new("Community entities: test");

        let doc = Document::new("d1", group(), "Agreement", "agreement.pdf");
        let mut chunk = TextChunk::new(
            "d1_chunk_0",
            group(),
            DocumentId::new("d1"),
            0,
            "Fabrikam and Contoso signed a warranty agreement.",
        );
        chunk.metadata.section_path = vec!["Terms".to_string(), "Warranty".to_string()];
        chunk.embedding = Some(vec![0.1; 16]);

        let mut fabrikam = Entity::new(group(), "Fabrikam", EntityLabel::Organization).with_text_unit(ChunkId::new("d1_chunk_0"));
        fabrikam.embedding = Some(vec![0.2; 16]);
        let mut contoso = Entity::new(group(), "Contoso", EntityLabel::Organization).with_text_unit(ChunkId::new("d1_chunk_0"));
        contoso.embedding = Some(vec![0.9; 16]);

        let relationship = Relationship::new(group(), fabrikam.id.clone(), contoso.id.clone(), "PARTY_TO");
        let mention_a = Mention::new(group(), ChunkId::new("d1_chunk_0"), fabrikam.id.clone());
        let mention_b = Mention::new(group(), ChunkId::new("d1_chunk_0"), contoso.id.clone());

        let config = RetrievalConfig::default();
        let stats = build_graph(
            &store,
            &embedder,
            &llm,
            &group(),
            &[doc],
            &[chunk],
            &[fabrikam, contoso],
            &[relationship],
            &[mention_a, mention_b],
            &config,
        )
        .await
        .unwrap();

        assert_eq!(stats.documents, 1);
        assert_eq!(stats.entities, 2);
        assert_eq!(stats.sections, 2);
        assert_eq!(stats.hub_entities, 2);
        assert!(stats.pagerank_nodes > 0);
    }

    #[tokio::test]
    async fn build_graph_on_empty_group_is_a_no_op() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let embedder = DeterministicEmbedder::new(16);
        let llm = ScriptedLlmProvider::new("Community entities: none");
        let config = RetrievalConfig::default();

        let stats = build_graph(&store, &embedder, &llm, &group(), &[], &[], &[], &[], &[], &config)
            .await
            .unwrap();

        assert_eq!(stats.entities, 0);
        assert_eq!(stats.communities, 0);
        assert_eq!(stats.pagerank_nodes, 0);
    }
}
