//! Indexing pipeline (spec §2, §4 ordering): wires the chunker, extractor,
//! deduplicator, graph builder, and sentence extractor into a single
//! indexing run for one `group_id`. Grounded on `src/mcp/mod.rs`'s top-level
//! tool-handler orchestration style — a flat sequence of stage calls over a
//! shared context, generalized here from a single-call tool surface to a
//! multi-stage indexing run.
//!
//! Step ordering follows spec §5: "step N+1 never observes partial state of
//! step N" — every stage collects its full output before the next stage
//! starts, so nothing here is pipelined stage-to-stage the way
//! [`crate::extraction`] pipelines chunk-to-chunk inside one stage.

use crate::builder::{self, BuildStats};
use crate::chunker::{self, ChunkError};
use crate::config::RetrievalConfig;
use crate::dedup;
use crate::extraction::{self, ChunkExtraction, ExtractionStats};
use crate::ids::{ChunkId, DocumentId, GroupId};
use crate::model::{Document, Entity, Mention, Relationship, Sentence, TextChunk};
use crate::providers::{DocumentExtractor, EmbeddingProvider, ExtractionUnit, GraphStore, LlmProvider};
use crate::providers::embedding::EmbeddingError;
use crate::providers::graph_store::GraphStoreError;
use crate::sentences;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Build(#[from] builder::BuildError),
    #[error(transparent)]
    Store(#[from] GraphStoreError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// One document to index: its id, a display title, and the source locator
/// handed to the [`DocumentExtractor`] (spec §2 "Document Extractor").
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub id: DocumentId,
    pub title: String,
    pub source: String,
}

impl DocumentInput {
    pub fn new(id: impl Into<DocumentId>, title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            source: source.into(),
        }
    }
}

/// Aggregate counts from one indexing run (spec §7 observability: counts
/// logged structured, keyed by `group_id`, plus the extraction repair/
/// failure rates compared against their warning thresholds).
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub documents_indexed: usize,
    pub documents_skipped: usize,
    pub chunks: usize,
    pub sentences: usize,
    pub extraction_repair_rate: f32,
    pub extraction_failure_rate: f32,
    pub build: BuildStats,
}

/// Runs a full indexing pass over `documents` for `group_id`. When `reindex`
/// is true, the group's existing graph is deleted first (spec §3
/// "reindex=true first deletes all nodes/edges with that group_id before
/// rebuilding").
///
/// A single bad document (extractor failure or no extractable content) is
/// skipped rather than failing the whole run (spec §7 "one bad chunk never
/// fails the whole run" extended here to the document granularity the
/// extractor operates at); everything after document extraction runs over
/// whatever documents survived.
#[tracing::instrument(skip(store, embedder, llm, extractor, documents), fields(group_id = %group_id, document_count = documents.len()))]
#[allow(clippy::too_many_arguments)]
pub async fn run(
    store: &dyn GraphStore,
    embedder: &dyn EmbeddingProvider,
    llm: &dyn LlmProvider,
    extractor: &dyn DocumentExtractor,
    group_id: &GroupId,
    documents: &[DocumentInput],
    reindex: bool,
    config: &RetrievalConfig,
) -> Result<IndexStats, IndexError> {
    if reindex {
        store.delete_group(group_id).await?;
    }

    let mut stats = IndexStats::default();
    let mut all_documents: Vec<Document> = Vec::new();
    let mut all_chunks: Vec<TextChunk> = Vec::new();
    let mut units_by_chunk: HashMap<ChunkId, Vec<ExtractionUnit>> = HashMap::new();

    // Step 1 (spec §4.1): extract + chunk every document before anything
    // downstream sees partial output from this step.
    for doc_input in documents {
        let units = match extractor.extract(&doc_input.id, &doc_input.source).await {
            Ok(units) => units,
            Err(err) => {
                warn!(group_id = %group_id, document_id = %doc_input.id, error = %err, "skipping document: extraction failed");
                stats.documents_skipped += 1;
                continue;
            }
        };
        let chunks = match chunker::chunk_document(group_id, &doc_input.id, &units, config.chunk_size, config.chunk_overlap) {
            Ok(chunks) => chunks,
            Err(ChunkError::EmptyDocument) => {
                warn!(group_id = %group_id, document_id = %doc_input.id, "skipping document: no extractable content");
                stats.documents_skipped += 1;
                continue;
            }
        };
        for chunk in &chunks {
            units_by_chunk.insert(chunk.id.clone(), units.clone());
        }
        all_documents.push(
            Document::new(doc_input.id.clone(), group_id.clone(), doc_input.title.clone(), doc_input.source.clone()),
        );
        all_chunks.extend(chunks);
    }

    if all_chunks.is_empty() {
        info!(group_id = %group_id, "indexing run produced no chunks, nothing to build");
        return Ok(stats);
    }
    stats.documents_indexed = all_documents.len();
    stats.chunks = all_chunks.len();

    // Embed every chunk in one batched call (spec §5 "embedding provider
    // called in large batches, never per-chunk").
    let chunk_texts: Vec<String> = all_chunks.iter().map(|c| c.text.clone()).collect();
    let chunk_embeddings = embedder.embed_documents(&chunk_texts).await?;
    for (chunk, embedding) in all_chunks.iter_mut().zip(chunk_embeddings.into_iter()) {
        chunk.embedding_v2 = Some(embedding);
    }

    // Step 2 (spec §4.2): entity/relation extraction, one full pass over
    // every chunk, bounded concurrency inside `extract_chunks` itself.
    let extraction_stats = ExtractionStats::default();
    let chunk_pairs: Vec<(ChunkId, String)> = all_chunks.iter().map(|c| (c.id.clone(), c.text.clone())).collect();
    let extractions = extraction::extract_chunks(llm, &chunk_pairs, config, &extraction_stats).await;

    stats.extraction_repair_rate = extraction_stats.repair_rate();
    stats.extraction_failure_rate = extraction_stats.failure_rate();
    if stats.extraction_repair_rate > config.repair_rate_warn_threshold {
        warn!(group_id = %group_id, rate = stats.extraction_repair_rate, "extraction JSON-repair rate exceeds warning threshold");
    }
    if stats.extraction_failure_rate > config.failure_rate_warn_threshold {
        warn!(group_id = %group_id, rate = stats.extraction_failure_rate, "extraction failure rate exceeds warning threshold");
    }

    let (mut entities, relations, mentions) = materialize_extractions(group_id, &all_chunks, &extractions);

    // Embed entity names before dedup: near-duplicate merging needs cosine
    // similarity over the embedding, not just the canonical key (spec §4.3
    // step 2).
    if !entities.is_empty() {
        let names: Vec<String> = entities.iter().map(|e| e.name.clone()).collect();
        let embeddings = embedder.embed_documents(&names).await?;
        for (entity, embedding) in entities.iter_mut().zip(embeddings.into_iter()) {
            entity.embedding = Some(embedding);
        }
    }

    // Step 3 (spec §4.3): dedup entities/relations/mentions together so the
    // graph builder only ever sees canonical ids.
    let dedup_result = dedup::deduplicate(entities, relations, mentions, config.similarity_threshold);

    // Step 4 (spec §4.4): persist + derive the full entity/passage/section
    // graph.
    let build_stats = builder::build_graph(
        store,
        embedder,
        llm,
        group_id,
        &all_documents,
        &all_chunks,
        &dedup_result.entities,
        &dedup_result.relations,
        &dedup_result.mentions,
        config,
    )
    .await?;
    stats.build = build_stats;

    // Step 5 (spec §4.5): sentence extraction + embedding, PART_OF/NEXT
    // edges. Sentence granularity is entirely additive to the entity graph
    // above, so it runs last.
    let chunk_sentences = sentences::extract_sentences_from_chunks(group_id, &all_chunks, &units_by_chunk);
    if !chunk_sentences.is_empty() {
        persist_sentences(store, embedder, group_id, &chunk_sentences).await?;
    }
    stats.sentences = chunk_sentences.len();

    info!(
        group_id = %group_id,
        documents = stats.documents_indexed,
        chunks = stats.chunks,
        entities = stats.build.entities,
        communities = stats.build.communities,
        sentences = stats.sentences,
        "indexing run complete"
    );
    Ok(stats)
}

async fn persist_sentences(
    store: &dyn GraphStore,
    embedder: &dyn EmbeddingProvider,
    group_id: &GroupId,
    chunk_sentences: &[Sentence],
) -> Result<(), IndexError> {
    let texts: Vec<String> = chunk_sentences.iter().map(|s| s.text.clone()).collect();
    let embeddings = embedder.embed_documents(&texts).await?;

    let mut embedded = Vec::with_capacity(chunk_sentences.len());
    for (sentence, embedding) in chunk_sentences.iter().zip(embeddings.into_iter()) {
        let mut sentence = sentence.clone();
        sentence.embedding_v2 = Some(embedding);
        store.upsert_sentence(&sentence).await?;
        embedded.push(sentence);
    }

    let (_part_of, next_edges) = sentences::sentence_edges(&embedded);
    for (from, to) in next_edges {
        store.upsert_sentence_next_edge(group_id, &from, &to).await?;
    }
    Ok(())
}

/// Folds per-chunk extraction output into group-wide entity/relation/mention
/// lists, keyed by entity name so relations (which reference entities by
/// name, not id) can be resolved before dedup assigns final ids.
fn materialize_extractions(
    group_id: &GroupId,
    chunks: &[TextChunk],
    extractions: &[ChunkExtraction],
) -> (Vec<Entity>, Vec<Relationship>, Vec<Mention>) {
    let mut entities_by_name: HashMap<String, Entity> = HashMap::new();
    let mut relations = Vec::new();
    let mut mentions = Vec::new();

    for (chunk, extraction) in chunks.iter().zip(extractions.iter()) {
        for extracted in &extraction.entities {
            let entity = entities_by_name
                .entry(extracted.name.clone())
                .or_insert_with(|| Entity::new(group_id.clone(), extracted.name.clone(), extracted.label));
            if entity.description.is_empty() && !extracted.description.is_empty() {
                entity.description = extracted.description.clone();
            }
            for alias in &extracted.aliases {
                if !entity.aliases.contains(alias) {
                    entity.aliases.push(alias.clone());
                }
            }
            if !entity.text_unit_ids.contains(&chunk.id) {
                entity.text_unit_ids.push(chunk.id.clone());
            }
        }

        for (name, chunk_id) in &extraction.mentions {
            if let Some(entity) = entities_by_name.get(name) {
                mentions.push(Mention::new(group_id.clone(), chunk_id.clone(), entity.id.clone()));
            }
        }

        for relation in &extraction.relations {
            let source = entities_by_name.get(&relation.src_name);
            let target = entities_by_name.get(&relation.tgt_name);
            let (Some(source), Some(target)) = (source, target) else {
                continue;
            };
            relations.push(
                Relationship::new(group_id.clone(), source.id.clone(), target.id.clone(), relation.label.as_str())
                    .with_description(relation.description.clone()),
            );
        }
    }

    let mut entities: Vec<Entity> = entities_by_name.into_values().collect();
    entities.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
    (entities, relations, mentions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphstore::SqliteGraphStore;
    use crate::providers::embedding::DeterministicEmbedder;
    use crate::providers::extractor::FixedExtractor;
    use crate::providers::llm::ScriptedLlmProvider;

    fn group() -> GroupId {
        GroupId::new("g1")
    }

    fn extractor_with(text: &str) -> FixedExtractor {
        FixedExtractor::new(vec![ExtractionUnit::new(text).with_section_path(vec!["Terms".to_string()])])
    }

    #[tokio::test]
    async fn empty_document_set_produces_empty_stats() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let embedder = DeterministicEmbedder::new(16);
        let llm = ScriptedLlmProvider::new(r#"{"entities": []}"#);
        let extractor = FixedExtractor::new(vec![]);
        let config = RetrievalConfig::default();

        let stats = run(&store, &embedder, &llm, &extractor, &group(), &[], false, &config)
            .await
            .unwrap();

        assert_eq!(stats.documents_indexed, 0);
        assert_eq!(stats.chunks, 0);
    }

    #[tokio::test]
    async fn a_bad_document_is_skipped_not_fatal() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let embedder = DeterministicEmbedder::new(16);
        let llm = ScriptedLlmProvider::new(r#"{"entities": []}"#);
        let extractor = FixedExtractor::new(vec![]);
        let config = RetrievalConfig::default();

        let documents = vec![DocumentInput::new("d1", "Agreement", "agreement.pdf")];
        let stats = run(&store, &embedder, &llm, &extractor, &group(), &documents, false, &config)
            .await
            .unwrap();

        assert_eq!(stats.documents_skipped, 1);
        assert_eq!(stats.documents_indexed, 0);
    }

    #[tokio::test]
    async fn full_run_indexes_documents_and_derives_graph() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let embedder = DeterministicEmbedder::new(16);
        let llm = ScriptedLlmProvider::new(r#"{"entities": []}"#).with_response(
            "Extract named entities",
            r#"{"entities": [
                {"name": "Fabrikam Construction Inc", "label": "ORGANIZATION"},
                {"name": "Contoso Lifts LLC", "label": "ORGANIZATION"},
                {"name": "Warranty Period", "label": "CONCEPT"}
            ], "relations": [
                {"source": "Fabrikam Construction Inc", "target": "Contoso Lifts LLC", "label": "PARTY_TO"}
            ]}"#,
        );
        let extractor = extractor_with(
            "Fabrikam Construction Inc and Contoso Lifts LLC signed a one-year warranty agreement. \
             Claims must be filed in writing within the warranty period.",
        );
        let config = RetrievalConfig {
            min_entities: 3,
            min_mentions: 3,
            ..RetrievalConfig::default()
        };

        let documents = vec![DocumentInput::new("d1", "Agreement", "agreement.pdf")];
        let stats = run(&store, &embedder, &llm, &extractor, &group(), &documents, false, &config)
            .await
            .unwrap();

        assert_eq!(stats.documents_indexed, 1);
        assert!(stats.chunks > 0);
        assert_eq!(stats.build.entities, 3);
        assert!(stats.sentences > 0);
    }

    #[tokio::test]
    async fn reindex_deletes_existing_group_first() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let embedder = DeterministicEmbedder::new(16);
        let llm = ScriptedLlmProvider::new(r#"{"entities": []}"#);
        let config = RetrievalConfig::default();

        let first_extractor = extractor_with("Fabrikam Construction Inc signed the first agreement.");
        let documents = vec![DocumentInput::new("d1", "Agreement v1", "v1.pdf")];
        run(&store, &embedder, &llm, &first_extractor, &group(), &documents, false, &config)
            .await
            .unwrap();

        let second_extractor = extractor_with("A completely different later filing.");
        let documents = vec![DocumentInput::new("d2", "Agreement v2", "v2.pdf")];
        let stats = run(&store, &embedder, &llm, &second_extractor, &group(), &documents, true, &config)
            .await
            .unwrap();

        assert_eq!(stats.documents_indexed, 1);
        use crate::providers::GraphStore as _;
        let count = store.count_documents(&group()).await.unwrap();
        assert_eq!(count, 1);
    }
}
