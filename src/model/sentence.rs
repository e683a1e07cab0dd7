use crate::ids::{ChunkId, DocumentId, GroupId, SentenceId};
use serde::{Deserialize, Serialize};

/// Where a sentence came from (spec §3, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentenceSource {
    Paragraph,
    TableRow,
    FigureCaption,
}

/// A fine-grained retrieval unit below chunk granularity (spec §3, §4.5).
/// `id` is always `"{chunk_id}_sent_{index_in_chunk}"`, making it
/// deterministic and reproducible across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sentence {
    pub id: SentenceId,
    pub group_id: GroupId,
    pub text: String,
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub source: SentenceSource,
    pub index_in_chunk: usize,
    pub section_path: Vec<String>,
    pub page_number: Option<u32>,
    pub embedding_v2: Option<Vec<f32>>,
}

impl Sentence {
    pub fn new(
        group_id: GroupId,
        chunk_id: ChunkId,
        document_id: DocumentId,
        index_in_chunk: usize,
        text: impl Into<String>,
        source: SentenceSource,
    ) -> Self {
        let id = SentenceId::new(format!("{}_sent_{}", chunk_id.as_str(), index_in_chunk));
        Self {
            id,
            group_id,
            text: text.into(),
            chunk_id,
            document_id,
            source,
            index_in_chunk,
            section_path: Vec::new(),
            page_number: None,
            embedding_v2: None,
        }
    }
}
