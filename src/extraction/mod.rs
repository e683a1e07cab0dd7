//! Entity/relation extractor (spec §4.2): turns a chunk's text into
//! `ChunkExtraction` candidates via a three-tier fallback cascade — primary
//! LLM few-shot prompt, then a prompt-only secondary LLM call, then a
//! heuristic NER pass — never bottoming out below an empty result.

mod heuristic;
mod repair;
mod schema;

pub use schema::{ChunkExtraction, ExtractedEntity, ExtractedRelation, ExtractionResult};

use crate::config::RetrievalConfig;
use crate::ids::ChunkId;
use crate::model::{EntityLabel, RelationLabel};
use crate::providers::LlmProvider;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Observability counters for the extraction pass (spec §7): repair and
/// failure rates are compared against `config.repair_rate_warn_threshold` /
/// `failure_rate_warn_threshold` by the caller after a full run.
#[derive(Debug, Default)]
pub struct ExtractionStats {
    pub attempted: AtomicUsize,
    pub repaired: AtomicUsize,
    pub failed: AtomicUsize,
    pub fell_back_to_secondary: AtomicUsize,
    pub fell_back_to_heuristic: AtomicUsize,
}

impl ExtractionStats {
    pub fn repair_rate(&self) -> f32 {
        let attempted = self.attempted.load(Ordering::Relaxed);
        if attempted == 0 {
            return 0.0;
        }
        self.repaired.load(Ordering::Relaxed) as f32 / attempted as f32
    }

    pub fn failure_rate(&self) -> f32 {
        let attempted = self.attempted.load(Ordering::Relaxed);
        if attempted == 0 {
            return 0.0;
        }
        self.failed.load(Ordering::Relaxed) as f32 / attempted as f32
    }
}

const EXTRACTION_TIMEOUT_SECS: u64 = 60;

/// Runs the fallback cascade over a batch of chunks with bounded concurrency
/// (spec §5 "extraction is the one CPU/IO-mixed stage that needs a
/// concurrency cap"), returning one `ChunkExtraction` per chunk in input
/// order.
pub async fn extract_chunks(
    llm: &dyn LlmProvider,
    chunks: &[(ChunkId, String)],
    config: &RetrievalConfig,
    stats: &ExtractionStats,
) -> Vec<ChunkExtraction> {
    let results: Vec<(usize, ChunkExtraction)> = stream::iter(chunks.iter().enumerate())
        .map(|(idx, (chunk_id, text))| async move {
            let extraction = extract_one(llm, chunk_id, text, config, stats).await;
            (idx, extraction)
        })
        .buffer_unordered(config.extraction_concurrency.max(1))
        .collect()
        .await;

    let mut ordered: Vec<Option<ChunkExtraction>> = (0..chunks.len()).map(|_| None).collect();
    for (idx, extraction) in results {
        ordered[idx] = Some(extraction);
    }
    ordered.into_iter().map(|o| o.unwrap_or_default()).collect()
}

async fn extract_one(
    llm: &dyn LlmProvider,
    chunk_id: &ChunkId,
    text: &str,
    config: &RetrievalConfig,
    stats: &ExtractionStats,
) -> ChunkExtraction {
    stats.attempted.fetch_add(1, Ordering::Relaxed);

    let primary = run_llm_attempt(llm, &primary_prompt(text), stats).await;
    if meets_threshold(&primary, config) {
        return attach_mentions(primary, chunk_id);
    }

    stats.fell_back_to_secondary.fetch_add(1, Ordering::Relaxed);
    let secondary = run_llm_attempt(llm, &secondary_prompt(text), stats).await;
    if meets_threshold(&secondary, config) {
        return attach_mentions(secondary, chunk_id);
    }

    stats.fell_back_to_heuristic.fetch_add(1, Ordering::Relaxed);
    let entities = heuristic::extract_capitalized_entities(text);
    if entities.is_empty() {
        // A genuinely empty chunk stays empty; this is the cascade's floor.
        return ChunkExtraction::default();
    }
    attach_mentions(
        ChunkExtraction {
            entities,
            relations: Vec::new(),
            mentions: Vec::new(),
        },
        chunk_id,
    )
}

/// Each extracted entity yields exactly one mention in its source chunk, so
/// the mention count can be read off `entities.len()` even before
/// `attach_mentions` has run.
fn meets_threshold(extraction: &ChunkExtraction, config: &RetrievalConfig) -> bool {
    extraction.entities.len() >= config.min_entities && extraction.entities.len() >= config.min_mentions
}

async fn run_llm_attempt(llm: &dyn LlmProvider, prompt: &str, stats: &ExtractionStats) -> ChunkExtraction {
    let completion = match tokio::time::timeout(
        Duration::from_secs(EXTRACTION_TIMEOUT_SECS),
        llm.complete(prompt, true),
    )
    .await
    {
        Ok(Ok(completion)) => completion,
        Ok(Err(_)) | Err(_) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            return ChunkExtraction::default();
        }
    };

    match parse_response(&completion.text) {
        ExtractionResult::Ok { extraction, repaired } => {
            if repaired {
                stats.repaired.fetch_add(1, Ordering::Relaxed);
            }
            extraction
        }
        ExtractionResult::PartialParse(_) => {
            // Validation pruned every entity/relation from an otherwise
            // parseable completion — a prune, not a successful repair.
            stats.failed.fetch_add(1, Ordering::Relaxed);
            ChunkExtraction::default()
        }
        ExtractionResult::Failed(_) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            ChunkExtraction::default()
        }
    }
}

/// Parse a completion's raw text into a `ChunkExtraction`, repairing
/// malformed JSON before giving up (spec §4.2 "Validation").
fn parse_response(raw: &str) -> ExtractionResult {
    let direct = serde_json::from_str::<serde_json::Value>(raw);
    let (value, was_repaired) = match direct {
        Ok(v) => (Some(v), false),
        Err(_) => (repair::repair_json(raw), true),
    };

    let Some(value) = value else {
        return ExtractionResult::Failed(raw.to_string());
    };

    let entities = value
        .get("entities")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|e| {
                    let name = e.get("name")?.as_str()?.to_string();
                    let label = e
                        .get("label")
                        .and_then(|v| v.as_str())
                        .map(EntityLabel::parse)
                        .unwrap_or(EntityLabel::Concept);
                    let description = e
                        .get("description")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    let aliases = e
                        .get("aliases")
                        .and_then(|v| v.as_array())
                        .map(|a| a.iter().filter_map(|x| x.as_str().map(String::from)).collect())
                        .unwrap_or_default();
                    Some(ExtractedEntity {
                        name,
                        label,
                        aliases,
                        description,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let relations = value
        .get("relations")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|r| {
                    let src_name = r.get("source")?.as_str()?.to_string();
                    let tgt_name = r.get("target")?.as_str()?.to_string();
                    let label = r
                        .get("label")
                        .and_then(|v| v.as_str())
                        .map(RelationLabel::parse)
                        .unwrap_or(RelationLabel::RelatedTo);
                    let description = r
                        .get("description")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    Some(ExtractedRelation {
                        src_name,
                        tgt_name,
                        label,
                        description,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let (entities, relations, pruned_entities, pruned_relations) = schema::validate(entities, relations);
    if entities.is_empty() && (pruned_entities > 0 || pruned_relations > 0) {
        return ExtractionResult::PartialParse(raw.to_string());
    }

    ExtractionResult::Ok {
        extraction: ChunkExtraction {
            entities,
            relations,
            mentions: Vec::new(),
        },
        repaired: was_repaired,
    }
}

fn attach_mentions(mut extraction: ChunkExtraction, chunk_id: &ChunkId) -> ChunkExtraction {
    extraction.mentions = extraction
        .entities
        .iter()
        .map(|e| (e.name.clone(), chunk_id.clone()))
        .collect();
    extraction
}

fn primary_prompt(text: &str) -> String {
    format!(
        "Extract named entities and relationships from the following passage. \
         Respond with JSON: {{\"entities\": [{{\"name\": ..., \"label\": ..., \"description\": ...}}], \
         \"relations\": [{{\"source\": ..., \"target\": ..., \"label\": ..., \"description\": ...}}]}}.\n\nPassage:\n{}",
        text
    )
}

fn secondary_prompt(text: &str) -> String {
    format!(
        "List the important named entities in the following passage as JSON: \
         {{\"entities\": [{{\"name\": ..., \"label\": ...}}]}}. No relations needed.\n\nPassage:\n{}",
        text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ChunkId;
    use crate::providers::ScriptedLlmProvider;

    fn chunk_id() -> ChunkId {
        ChunkId::new("c1")
    }

    #[tokio::test]
    async fn primary_success_skips_fallbacks() {
        let llm = ScriptedLlmProvider::new("NONE").with_response(
            "Extract named entities",
            r#"{"entities": [
                {"name": "Fabrikam", "label": "ORGANIZATION"},
                {"name": "Contoso", "label": "ORGANIZATION"},
                {"name": "Warranty", "label": "CONCEPT"}
            ], "relations": [
                {"source": "Fabrikam", "target": "Contoso", "label": "PARTY_TO"}
            ]}"#,
        );
        let config = RetrievalConfig {
            min_entities: 3,
            min_mentions: 3,
            ..RetrievalConfig::default()
        };
        let stats = ExtractionStats::default();
        let extraction = extract_one(&llm, &chunk_id(), "Fabrikam and Contoso text", &config, &stats).await;
        assert_eq!(extraction.entities.len(), 3);
        assert_eq!(extraction.mentions.len(), 3);
        assert_eq!(stats.fell_back_to_secondary.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn falls_back_to_heuristic_when_both_llm_tiers_are_thin() {
        let llm = ScriptedLlmProvider::new(r#"{"entities": []}"#);
        let config = RetrievalConfig {
            min_entities: 5,
            min_mentions: 5,
            ..RetrievalConfig::default()
        };
        let stats = ExtractionStats::default();
        let extraction = extract_one(
            &llm,
            &chunk_id(),
            "Fabrikam Construction Inc signed with Contoso Lifts LLC.",
            &config,
            &stats,
        )
        .await;
        assert!(!extraction.entities.is_empty());
        assert_eq!(stats.fell_back_to_heuristic.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn never_below_empty_result() {
        let llm = ScriptedLlmProvider::new("not json at all");
        let config = RetrievalConfig::default();
        let stats = ExtractionStats::default();
        let extraction = extract_one(&llm, &chunk_id(), "lowercase text with nothing to extract", &config, &stats).await;
        assert!(extraction.entities.is_empty());
        assert!(extraction.mentions.is_empty());
    }

    #[tokio::test]
    async fn extract_chunks_preserves_input_order() {
        let llm = ScriptedLlmProvider::new(r#"{"entities": []}"#);
        let config = RetrievalConfig::default();
        let stats = ExtractionStats::default();
        let chunks = vec![
            (ChunkId::new("a"), "Alpha Corp text".to_string()),
            (ChunkId::new("b"), "Beta Corp text".to_string()),
            (ChunkId::new("c"), "Gamma Corp text".to_string()),
        ];
        let results = extract_chunks(&llm, &chunks, &config, &stats).await;
        assert_eq!(results.len(), 3);
    }
}
