//! Shared fixtures for the crate's integration suites: an in-memory store,
//! deterministic embedder, scripted LLM, and a small extractor that hands
//! back canned per-document text instead of running real OCR/layout
//! analysis. Mirrors the crate's own `#[cfg(test)]` fixture style
//! (`DeterministicEmbedder`, `ScriptedLlmProvider`, `FixedExtractor`),
//! promoted to a shared module since integration tests run as separate
//! binaries with no access to those types' own test modules.

use async_trait::async_trait;
use hipporag2::config::RetrievalConfig;
use hipporag2::graphstore::SqliteGraphStore;
use hipporag2::ids::{DocumentId, GroupId};
use hipporag2::pipeline::{self, DocumentInput, IndexStats};
use hipporag2::providers::embedding::DeterministicEmbedder;
use hipporag2::providers::extractor::{ExtractError, ExtractionUnit};
use hipporag2::providers::llm::ScriptedLlmProvider;
use hipporag2::providers::synthesizer::EchoSynthesizer;
use hipporag2::providers::DocumentExtractor;
use hipporag2::route::HipporagRoute;
use std::collections::HashMap;
use std::sync::Arc;

pub const EMBEDDING_DIMENSIONS: usize = 16;

pub fn group() -> GroupId {
    GroupId::new("g-test")
}

/// Every scenario's extraction/community-summarization threshold is relaxed
/// to 1 so a single tiny document is enough to clear the Graph Builder's
/// gates; production defaults (spec §6) are exercised separately in
/// `config.rs`'s own defaults-match-spec test.
pub fn config() -> RetrievalConfig {
    RetrievalConfig {
        min_entities: 1,
        min_mentions: 1,
        ..RetrievalConfig::default()
    }
}

/// Hands back one fixed text body per document id, ignoring `source`.
/// Stands in for a real `DocumentExtractor` (OCR/layout analysis is out of
/// scope for this crate) the same way `FixedExtractor` does in unit tests,
/// but keyed by document id so a whole corpus can be set up in one call.
pub struct MapExtractor {
    texts: HashMap<String, String>,
}

impl MapExtractor {
    pub fn new(documents: &[(&str, &str)]) -> Self {
        Self {
            texts: documents.iter().map(|(id, text)| (id.to_string(), text.to_string())).collect(),
        }
    }
}

#[async_trait]
impl DocumentExtractor for MapExtractor {
    async fn extract(&self, document_id: &DocumentId, _source: &str) -> Result<Vec<ExtractionUnit>, ExtractError> {
        match self.texts.get(document_id.as_str()) {
            Some(text) if !text.trim().is_empty() => Ok(vec![ExtractionUnit::new(text.clone())]),
            _ => Err(ExtractError::EmptyDocument),
        }
    }
}

/// Indexes `documents` (id, title, text) into a fresh in-memory store,
/// using `extraction_llm` for every LLM call the indexing run makes
/// (entity/relation extraction and community summarization).
pub async fn index_fixture(
    documents: &[(&str, &str, &str)],
    extraction_llm: ScriptedLlmProvider,
) -> (SqliteGraphStore, IndexStats) {
    let store = SqliteGraphStore::open_in_memory().expect("in-memory store always opens");
    let embedder = DeterministicEmbedder::new(EMBEDDING_DIMENSIONS);
    let extractor = MapExtractor::new(&documents.iter().map(|(id, _, text)| (*id, *text)).collect::<Vec<_>>());
    let cfg = config();

    let inputs: Vec<DocumentInput> = documents
        .iter()
        .map(|(id, title, _)| DocumentInput::new(*id, *title, format!("{id}.txt")))
        .collect();

    let stats = pipeline::run(&store, &embedder, &extraction_llm, &extractor, &group(), &inputs, false, &cfg)
        .await
        .expect("fixture indexing always succeeds");

    (store, stats)
}

/// A query-time LLM that keeps every triple candidate and community match
/// (recognition-memory filter parses "1,2,3,..." as "keep all of these
/// indices"; any index beyond the real candidate count is silently
/// ignored, so one long fixed list covers any candidate set size used in
/// these tests).
pub fn keep_all_llm() -> ScriptedLlmProvider {
    ScriptedLlmProvider::new("1,2,3,4,5,6,7,8,9,10,11,12,13,14,15")
}

pub fn route_for(store: SqliteGraphStore) -> HipporagRoute {
    HipporagRoute::new(
        Arc::new(store),
        Arc::new(DeterministicEmbedder::new(EMBEDDING_DIMENSIONS)),
        Arc::new(keep_all_llm()),
        Arc::new(EchoSynthesizer),
        config(),
    )
}
