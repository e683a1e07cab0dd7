//! Synthesizer capability (spec §6): the downstream consumer of assembled
//! evidence. Answer synthesis and prompt construction are explicitly out of
//! scope (spec §1); only the fixed input/output schema is specified.

use crate::ids::DocumentId;
use crate::model::{Citation, EvidenceChunk};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SynthesizeError {
    #[error("rate limited, retry after backoff: {0}")]
    Transient(String),
    #[error("synthesis failed: {0}")]
    Fatal(String),
}

/// One coverage chunk from sentence search (spec §4.8 step 7 "Optional
/// coverage_chunks: one per sentence-search hit").
#[derive(Debug, Clone)]
pub struct CoverageChunk {
    pub text: String,
    pub document_title: String,
    pub document_id: DocumentId,
    pub section_path: Vec<String>,
    pub page_number: Option<u32>,
    pub entity_score: f32,
}

/// The fixed evidence schema the synthesizer consumes (spec §6).
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub query: String,
    pub evidence_nodes: Vec<(String, f32)>,
    pub pre_fetched_chunks: Vec<EvidenceChunk>,
    pub coverage_chunks: Option<Vec<CoverageChunk>>,
    pub graph_structural_header: Option<String>,
    pub response_type: String,
}

#[derive(Debug, Clone)]
pub struct SynthesisResponse {
    pub response: String,
    pub citations: Vec<Citation>,
    pub text_chunks_used: usize,
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisResponse, SynthesizeError>;
}

/// A synthesizer for tests that turns each pre-fetched chunk directly into a
/// citation without calling an LLM, so route-handler tests can assert on
/// which chunks survived retrieval without depending on prompt wording.
pub struct EchoSynthesizer;

#[async_trait]
impl Synthesizer for EchoSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisResponse, SynthesizeError> {
        let citations: Vec<Citation> = request
            .pre_fetched_chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| Citation {
                index: i,
                chunk_id: chunk.id.clone(),
                document_id: chunk.document_id.clone(),
                document_title: chunk.source.clone(),
                document_url: None,
                page_number: None,
                section_path: chunk.section_path.clone(),
                start_offset: None,
                end_offset: None,
                score: chunk.entity_score,
                text_preview: chunk.text.chars().take(200).collect(),
            })
            .collect();
        let text_chunks_used = citations.len();
        Ok(SynthesisResponse {
            response: format!("Synthesized answer for: {}", request.query),
            citations,
            text_chunks_used,
        })
    }
}
