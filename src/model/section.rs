use crate::ids::{CommunityId, DocumentId, EntityId, GroupId, SectionId};
use serde::{Deserialize, Serialize};

/// A node in a document's heading hierarchy (spec §3). Leaves carry chunks
/// via `IN_SECTION`; every prefix depth of a chunk's `section_path` gets its
/// own `Section` node (spec §4.4 step 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub group_id: GroupId,
    pub document_id: DocumentId,
    /// Heading chain joined by `" > "`, e.g. `"Terms > Warranty"`.
    pub path_key: String,
    pub title: String,
    pub depth: usize,
    pub embedding: Option<Vec<f32>>,
}

impl Section {
    pub fn new(
        id: impl Into<SectionId>,
        group_id: GroupId,
        document_id: DocumentId,
        path_key: impl Into<String>,
        title: impl Into<String>,
        depth: usize,
    ) -> Self {
        Self {
            id: id.into(),
            group_id,
            document_id,
            path_key: path_key.into(),
            title: title.into(),
            depth,
            embedding: None,
        }
    }

    /// Deterministic id for a section, derived from its document and path so
    /// re-running the graph builder on the same chunks yields the same
    /// section ids (round-trip/idempotence property, spec §8).
    pub fn derive_id(document_id: &DocumentId, path_key: &str) -> SectionId {
        SectionId::new(format!("section:{}:{}", document_id.as_str(), path_key))
    }
}

/// A cluster of entities produced by hierarchical community detection
/// (spec §3, §4.4 step 10). Level 0 is finest; each parent level aggregates
/// children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub id: CommunityId,
    pub group_id: GroupId,
    pub level: usize,
    pub entity_ids: Vec<EntityId>,
    pub title: String,
    pub summary: String,
    pub summary_embedding: Option<Vec<f32>>,
    pub rank: f32,
}

impl Community {
    /// Deterministic id from the sorted member entity ids, so the same
    /// community composition always gets the same id regardless of
    /// detection-algorithm iteration order.
    pub fn derive_id(group_id: &GroupId, level: usize, entity_ids: &[EntityId]) -> CommunityId {
        let mut sorted: Vec<&str> = entity_ids.iter().map(|e| e.as_str()).collect();
        sorted.sort_unstable();
        let mut hasher = blake3::Hasher::new();
        hasher.update(group_id.as_str().as_bytes());
        hasher.update(&level.to_le_bytes());
        for id in &sorted {
            hasher.update(id.as_bytes());
            hasher.update(b"\0");
        }
        CommunityId::new(format!("community:{}", hasher.finalize().to_hex()))
    }
}
