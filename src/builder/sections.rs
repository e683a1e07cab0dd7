//! Section graph construction (spec §4.4 steps 2-4): derives a heading
//! hierarchy from each chunk's `section_path`, embeds each section from its
//! title, path, and a handful of sample chunk texts, then links sections
//! across documents that cover semantically similar ground.

use super::BuildError;
use crate::config::RetrievalConfig;
use crate::ids::{ChunkId, GroupId, SectionId};
use crate::model::{Section, TextChunk};
use crate::providers::embedding::cosine_similarity;
use crate::providers::graph_store::SectionEdge;
use crate::providers::{EmbeddingProvider, GraphStore};
use std::collections::{HashMap, HashSet};

/// Max sample chunk texts folded into a section's embedding input, and the
/// per-sample/total character caps that keep the embedding text bounded.
const MAX_SAMPLE_CHUNKS: usize = 3;
const MAX_SAMPLE_CHARS: usize = 500;
const MAX_EMBED_TEXT_CHARS: usize = 2000;

#[derive(Debug, Clone, Default)]
pub struct SectionStats {
    pub sections: usize,
    pub section_edges: usize,
    pub chunk_section_edges: usize,
    pub section_similarity_edges: usize,
}

pub async fn build_section_graph(
    store: &dyn GraphStore,
    embedder: &dyn EmbeddingProvider,
    group_id: &GroupId,
    chunks: &[TextChunk],
    config: &RetrievalConfig,
) -> Result<SectionStats, BuildError> {
    let mut sections: HashMap<SectionId, Section> = HashMap::new();
    let mut sample_texts: HashMap<SectionId, Vec<String>> = HashMap::new();
    let mut leaf_chunks: Vec<(ChunkId, SectionId)> = Vec::new();
    let mut edges: HashSet<(SectionId, Option<SectionId>)> = HashSet::new();

    for chunk in chunks {
        if chunk.metadata.section_path.is_empty() {
            continue;
        }
        let mut parent: Option<SectionId> = None;
        let leaf_depth = chunk.metadata.section_path.len() - 1;
        for depth in 0..chunk.metadata.section_path.len() {
            let path_key = chunk.metadata.section_path[..=depth].join(" > ");
            let title = chunk.metadata.section_path[depth].clone();
            let id = Section::derive_id(&chunk.document_id, &path_key);
            sections
                .entry(id.clone())
                .or_insert_with(|| Section::new(id.clone(), group_id.clone(), chunk.document_id.clone(), path_key, title, depth));
            edges.insert((id.clone(), parent.clone()));
            parent = Some(id.clone());

            if depth == leaf_depth {
                leaf_chunks.push((chunk.id.clone(), id.clone()));
                let samples = sample_texts.entry(id).or_default();
                if samples.len() < MAX_SAMPLE_CHUNKS {
                    samples.push(truncate_chars(&chunk.text, MAX_SAMPLE_CHARS));
                }
            }
        }
    }

    if sections.is_empty() {
        return Ok(SectionStats::default());
    }

    let mut ordered_ids: Vec<SectionId> = sections.keys().cloned().collect();
    ordered_ids.sort();

    let embed_texts: Vec<String> = ordered_ids
        .iter()
        .map(|id| {
            let section = &sections[id];
            let mut text = format!("{}\n{}", section.title, section.path_key);
            for sample in sample_texts.get(id).into_iter().flatten() {
                text.push('\n');
                text.push_str(sample);
            }
            truncate_chars(&text, MAX_EMBED_TEXT_CHARS)
        })
        .collect();

    let embeddings = embedder.embed_documents(&embed_texts).await?;
    for (id, embedding) in ordered_ids.iter().zip(embeddings.into_iter()) {
        if let Some(section) = sections.get_mut(id) {
            section.embedding = Some(embedding);
        }
    }

    for id in &ordered_ids {
        store.upsert_section(&sections[id]).await?;
    }
    for (child, parent) in &edges {
        store
            .upsert_section_edge(&SectionEdge {
                group_id: group_id.clone(),
                child: child.clone(),
                parent: parent.clone(),
            })
            .await?;
    }
    for (chunk_id, section_id) in &leaf_chunks {
        store.upsert_chunk_in_section(group_id, chunk_id, section_id).await?;
    }

    let section_similarity_edges = build_cross_document_similarity(store, group_id, &sections, &ordered_ids, config).await?;

    Ok(SectionStats {
        sections: sections.len(),
        section_edges: edges.len(),
        chunk_section_edges: leaf_chunks.len(),
        section_similarity_edges,
    })
}

/// Cross-document `SEMANTICALLY_SIMILAR` edges (spec §4.4 step 4): every
/// pair of sections from different documents scoring at or above
/// `cross_doc_section_sim_threshold`, capped at `section_edge_cap` edges per
/// section. Candidates are gathered per-section first and truncated to the
/// cap before writing, so a section with many marginal matches doesn't drown
/// out its strongest ones.
async fn build_cross_document_similarity(
    store: &dyn GraphStore,
    group_id: &GroupId,
    sections: &HashMap<SectionId, Section>,
    ordered_ids: &[SectionId],
    config: &RetrievalConfig,
) -> Result<usize, BuildError> {
    let mut candidates: HashMap<SectionId, Vec<(SectionId, f32)>> = HashMap::new();

    for i in 0..ordered_ids.len() {
        for j in (i + 1)..ordered_ids.len() {
            let a = &sections[&ordered_ids[i]];
            let b = &sections[&ordered_ids[j]];
            if a.document_id == b.document_id {
                continue;
            }
            let (Some(emb_a), Some(emb_b)) = (a.embedding.as_deref(), b.embedding.as_deref()) else {
                continue;
            };
            let sim = cosine_similarity(emb_a, emb_b);
            if sim < config.cross_doc_section_sim_threshold {
                continue;
            }
            candidates.entry(a.id.clone()).or_default().push((b.id.clone(), sim));
            candidates.entry(b.id.clone()).or_default().push((a.id.clone(), sim));
        }
    }

    let mut to_write: HashMap<(SectionId, SectionId), f32> = HashMap::new();
    for (section_id, mut neighbors) in candidates {
        neighbors.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        neighbors.truncate(config.section_edge_cap);
        for (other, sim) in neighbors {
            let pair = canonical_pair(section_id.clone(), other);
            to_write.insert(pair, sim);
        }
    }

    let count = to_write.len();
    for ((a, b), sim) in to_write {
        store.upsert_section_similarity(group_id, &a, &b, sim).await?;
    }
    Ok(count)
}

fn canonical_pair(a: SectionId, b: SectionId) -> (SectionId, SectionId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphstore::SqliteGraphStore;
    use crate::ids::DocumentId;
    use crate::providers::embedding::DeterministicEmbedder;

    fn group() -> GroupId {
        GroupId::new("g1")
    }

    fn chunk_with_path(doc: &str, idx: usize, text: &str, path: Vec<&str>) -> TextChunk {
        let mut chunk = TextChunk::new(format!("{doc}_chunk_{idx}"), group(), DocumentId::new(doc), idx, text);
        chunk.metadata.section_path = path.into_iter().map(String::from).collect();
        chunk
    }

    #[tokio::test]
    async fn chunks_without_section_path_are_skipped() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let embedder = DeterministicEmbedder::new(8);
        let chunk = TextChunk::new("d1_chunk_0", group(), DocumentId::new("d1"), 0, "no headings here");
        let stats = build_section_graph(&store, &embedder, &group(), &[chunk], &RetrievalConfig::default())
            .await
            .unwrap();
        assert_eq!(stats.sections, 0);
    }

    #[tokio::test]
    async fn every_prefix_depth_gets_its_own_section() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let embedder = DeterministicEmbedder::new(8);
        let chunk = chunk_with_path("d1", 0, "Warranty runs for one year.", vec!["Terms", "Warranty"]);
        let stats = build_section_graph(&store, &embedder, &group(), &[chunk], &RetrievalConfig::default())
            .await
            .unwrap();
        assert_eq!(stats.sections, 2);
        assert_eq!(stats.section_edges, 2); // depth-0 -> None, depth-1 -> depth-0
        assert_eq!(stats.chunk_section_edges, 1);
    }

    #[tokio::test]
    async fn cross_document_similarity_skips_same_document_pairs() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let embedder = DeterministicEmbedder::new(8);
        let a = chunk_with_path("d1", 0, "Warranty terms for the equipment.", vec!["Terms", "Warranty"]);
        let b = chunk_with_path("d1", 1, "Warranty terms for the equipment.", vec!["Terms", "Liability"]);
        let config = RetrievalConfig {
            cross_doc_section_sim_threshold: -1.0, // force everything above threshold to isolate the same-doc guard
            ..RetrievalConfig::default()
        };
        let stats = build_section_graph(&store, &embedder, &group(), &[a, b], &config).await.unwrap();
        assert_eq!(stats.section_similarity_edges, 0);
    }

    #[tokio::test]
    async fn similarity_edge_cap_is_respected() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let embedder = DeterministicEmbedder::new(8);
        let mut chunks = Vec::new();
        for doc in 0..6 {
            chunks.push(chunk_with_path(
                &format!("d{doc}"),
                0,
                "Identical warranty clause text across every document.",
                vec!["Warranty"],
            ));
        }
        let config = RetrievalConfig {
            cross_doc_section_sim_threshold: -1.0,
            section_edge_cap: 2,
            ..RetrievalConfig::default()
        };
        let stats = build_section_graph(&store, &embedder, &group(), &chunks, &config).await.unwrap();
        // 6 sections, each capped at 2 edges -> at most 6 undirected edges.
        assert!(stats.section_similarity_edges <= 6);
        assert!(stats.section_similarity_edges > 0);
    }
}
