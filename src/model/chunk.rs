use crate::ids::{ChunkId, DocumentId, GroupId};
use serde::{Deserialize, Serialize};

/// A linearized table found inside a chunk's extraction-unit metadata
/// (spec §3 `tables[]`). Kept small deliberately: large raw layout is
/// dropped at chunk-build time (spec §4.1 "must be dropped from chunk
/// storage to bound metadata size").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TableSummary {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// A figure reference carried in chunk metadata (spec §3 `figures[]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub id: String,
    pub caption: String,
}

/// A key/value pair extracted alongside a chunk (spec §3 `KeyValuePair`).
/// Persisted separately with a `FOUND_IN` edge to its document; also carried
/// inline on chunk metadata for the allow-listed subset the chunker keeps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyValuePair {
    pub id: String,
    pub key: String,
    pub value: String,
    pub confidence: f32,
    pub page_number: Option<u32>,
    pub section_path: Vec<String>,
    pub embedding: Option<Vec<f32>>,
}

/// The allow-listed subset of extraction-unit metadata a chunk is permitted
/// to carry (spec §4.1). Anything not named here (full layout trees, raw
/// table cell styling, etc.) must be dropped before chunk persistence.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChunkMetadata {
    pub section_path: Vec<String>,
    pub page_number: Option<u32>,
    pub source_url: Option<String>,
    pub tables: Vec<TableSummary>,
    pub figures: Vec<Figure>,
    pub key_value_pairs: Vec<KeyValuePair>,
}

/// A passage (spec §3 `TextChunk`). `chunk_index` is unique within
/// `document_id` and strictly increasing (universal invariant 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChunk {
    pub id: ChunkId,
    pub group_id: GroupId,
    pub document_id: DocumentId,
    pub text: String,
    pub chunk_index: usize,
    pub embedding: Option<Vec<f32>>,
    pub embedding_v2: Option<Vec<f32>>,
    pub tokens: usize,
    pub metadata: ChunkMetadata,
}

impl TextChunk {
    pub fn new(
        id: impl Into<ChunkId>,
        group_id: GroupId,
        document_id: DocumentId,
        chunk_index: usize,
        text: impl Into<String>,
    ) -> Self {
        let text = text.into();
        let tokens = estimate_tokens(&text);
        Self {
            id: id.into(),
            group_id,
            document_id,
            text,
            chunk_index,
            embedding: None,
            embedding_v2: None,
            tokens,
            metadata: ChunkMetadata::default(),
        }
    }

    /// The embedding PPR/DPR should use: `embedding_v2` is authoritative
    /// whenever present (DESIGN.md Open Question 3), falling back to the
    /// sole embedding if only one exists (spec §4.8 step 3b).
    pub fn retrieval_embedding(&self) -> Option<&[f32]> {
        self.embedding_v2
            .as_deref()
            .or(self.embedding.as_deref())
    }
}

/// Whitespace-split word count, a cheap stand-in for a real tokenizer.
/// The chunker targets a token budget (spec §4.1); exact BPE tokenization
/// is a concern of whichever embedding/LLM provider is plugged in, not this
/// crate, so this estimate only needs to be monotonic with text length.
fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}
