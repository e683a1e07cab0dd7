use crate::ids::{ChunkId, DocumentId, SectionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A chunk handed to the synthesizer (spec §4.8 step 7, §6 `pre_fetched_chunks`).
/// `entity_score` is always `1.0`: PPR chooses *which* chunks are fetched,
/// not their weight inside synthesis (spec §4.8 step 7 "equal synthesis
/// weight"; confirmed against `original_source/route_7_hipporag2.py`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceChunk {
    pub id: ChunkId,
    pub source: String,
    pub text: String,
    pub document_id: DocumentId,
    pub section_path: Vec<String>,
    pub chunk_index: usize,
    pub entity_score: f32,
}

impl EvidenceChunk {
    pub fn new(
        id: ChunkId,
        source: impl Into<String>,
        text: impl Into<String>,
        document_id: DocumentId,
        section_path: Vec<String>,
        chunk_index: usize,
    ) -> Self {
        Self {
            id,
            source: source.into(),
            text: text.into(),
            document_id,
            section_path,
            chunk_index,
            entity_score: 1.0,
        }
    }
}

/// One citation in a `RouteResult` (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub index: usize,
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub document_title: String,
    pub document_url: Option<String>,
    pub page_number: Option<u32>,
    pub section_path: Vec<String>,
    pub start_offset: Option<usize>,
    pub end_offset: Option<usize>,
    pub score: f32,
    pub text_preview: String,
}

/// Why a query returned a negative result instead of evidence (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionReason {
    NoSeedsResolved,
    NoCommunities,
    NoChunks,
    NoDocumentsIndexed,
}

/// The structured negative-result payload (spec §7): returned instead of an
/// error whenever a query resolves to "nothing found" rather than a fault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegativeResult {
    pub response: String,
    pub reason: DetectionReason,
}

impl NegativeResult {
    pub fn new(reason: DetectionReason) -> Self {
        Self {
            response: "The requested information was not found in the available documents.".to_string(),
            reason,
        }
    }
}

/// Bookkeeping surfaced alongside a successful route result (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RouteMetadata {
    pub architecture: String,
    pub damping: f32,
    pub triple_top_k: usize,
    pub surviving_triples: usize,
    pub entity_seeds_count: usize,
    pub passage_seeds_count: usize,
    pub passage_node_weight: f32,
    pub num_ppr_passages: usize,
    pub num_ppr_entities: usize,
    pub text_chunks_used: usize,
    pub sentence_evidence_count: usize,
    pub triple_seeds: Vec<String>,
    pub matched_communities: Option<Vec<String>>,
    pub structural_sections: Option<Vec<String>>,
    pub timings_ms: Option<HashMap<String, u64>>,
    pub negative_detection: bool,
    pub detection_reason: Option<DetectionReason>,
}

/// The final route output (spec §4.8 step 9, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResult {
    pub response: String,
    pub route_used: String,
    pub citations: Vec<Citation>,
    pub evidence_path: Vec<String>,
    pub metadata: RouteMetadata,
    pub total_ms: Option<u64>,
}

impl RouteResult {
    /// Package a negative result into the same `RouteResult` shape the
    /// synthesizer path uses, so callers only ever handle one return type
    /// (spec §7's structured negative-result schema).
    pub fn negative(reason: DetectionReason) -> Self {
        let negative = NegativeResult::new(reason);
        Self {
            response: negative.response,
            route_used: "route_7_hipporag2".to_string(),
            citations: Vec::new(),
            evidence_path: Vec::new(),
            metadata: RouteMetadata {
                architecture: "hipporag2".to_string(),
                negative_detection: true,
                detection_reason: Some(reason),
                ..Default::default()
            },
            total_ms: None,
        }
    }
}
