//! Chunker (spec §4.1): packs a document's extraction units into
//! token-budgeted, sentence-aligned `TextChunk`s with overlap, inheriting an
//! allow-listed subset of unit metadata.

use crate::ids::{DocumentId, GroupId};
use crate::model::{ChunkMetadata, TextChunk};
use crate::providers::ExtractionUnit;
use crate::textsplit::split_sentences;
use thiserror::Error;

/// Metadata items unioned from contributing units are capped at this count
/// per chunk (spec §4.1 "must be dropped... to bound metadata size").
const MAX_METADATA_ITEMS: usize = 10;

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("document has no extractable content")]
    EmptyDocument,
}

struct Segment {
    text: String,
    unit_idx: usize,
    tokens: usize,
}

/// Pack `units` into chunks targeting `chunk_size` tokens with
/// `chunk_overlap` tokens of sentence-aligned overlap between adjacent
/// chunks. `chunk_index` is assigned strictly increasing from 0.
pub fn chunk_document(
    group_id: &GroupId,
    document_id: &DocumentId,
    units: &[ExtractionUnit],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<TextChunk>, ChunkError> {
    let segments = build_segments(units);
    if segments.is_empty() {
        return Err(ChunkError::EmptyDocument);
    }

    let mut chunks = Vec::new();
    let mut current: Vec<&Segment> = Vec::new();
    let mut current_tokens = 0usize;

    for segment in &segments {
        if current_tokens + segment.tokens > chunk_size && !current.is_empty() {
            chunks.push(finalize_chunk(
                group_id,
                document_id,
                chunks.len(),
                &current,
                units,
            ));
            let (tail, tail_tokens) = trailing_overlap(&current, chunk_overlap);
            current = tail;
            current_tokens = tail_tokens;
        }
        current_tokens += segment.tokens;
        current.push(segment);
    }

    if !current.is_empty() {
        chunks.push(finalize_chunk(
            group_id,
            document_id,
            chunks.len(),
            &current,
            units,
        ));
    }

    Ok(chunks)
}

fn build_segments(units: &[ExtractionUnit]) -> Vec<Segment> {
    let mut segments = Vec::new();
    for (unit_idx, unit) in units.iter().enumerate() {
        if unit.text.trim().is_empty() {
            continue;
        }
        for sentence in split_sentences(&unit.text) {
            let tokens = sentence.split_whitespace().count();
            if tokens == 0 {
                continue;
            }
            segments.push(Segment {
                text: sentence,
                unit_idx,
                tokens,
            });
        }
    }
    segments
}

/// Trailing sentences summing to roughly `overlap` tokens, sentence-aligned
/// (never splits a sentence to hit the budget exactly).
fn trailing_overlap<'a>(current: &[&'a Segment], overlap: usize) -> (Vec<&'a Segment>, usize) {
    if overlap == 0 {
        return (Vec::new(), 0);
    }
    let mut tail = Vec::new();
    let mut tokens = 0usize;
    for segment in current.iter().rev() {
        if tokens >= overlap {
            break;
        }
        tail.push(*segment);
        tokens += segment.tokens;
    }
    tail.reverse();
    (tail, tokens)
}

fn finalize_chunk(
    group_id: &GroupId,
    document_id: &DocumentId,
    chunk_index: usize,
    segments: &[&Segment],
    units: &[ExtractionUnit],
) -> TextChunk {
    let text = segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let id = format!("{}_chunk_{}", document_id.as_str(), chunk_index);
    let mut chunk = TextChunk::new(id, group_id.clone(), document_id.clone(), chunk_index, text);
    chunk.metadata = merge_metadata(segments, units);
    chunk
}

fn merge_metadata(segments: &[&Segment], units: &[ExtractionUnit]) -> ChunkMetadata {
    let mut metadata = ChunkMetadata::default();

    if let Some(first) = segments.first() {
        let primary = &units[first.unit_idx];
        metadata.section_path = primary.section_path.clone();
        metadata.page_number = primary.page_number;
    }

    let mut seen_units = std::collections::HashSet::new();
    for segment in segments {
        if !seen_units.insert(segment.unit_idx) {
            continue;
        }
        let unit = &units[segment.unit_idx];
        for table in &unit.tables {
            if metadata.tables.len() >= MAX_METADATA_ITEMS {
                break;
            }
            metadata.tables.push(table.clone());
        }
        for figure in &unit.figures {
            if metadata.figures.len() >= MAX_METADATA_ITEMS {
                break;
            }
            metadata.figures.push(figure.clone());
        }
        for kvp in &unit.key_value_pairs {
            if metadata.key_value_pairs.len() >= MAX_METADATA_ITEMS {
                break;
            }
            metadata.key_value_pairs.push(kvp.clone());
        }
    }

    metadata
}
