//! Extraction schema (spec §4.2): allowed entity/relation labels plus the
//! tagged records extraction output is normalized into. Modeled as a sum
//! type per Design Note §9 ("Dynamic typing of extraction outputs") instead
//! of passing untyped JSON further into the pipeline.

use crate::ids::ChunkId;
use crate::model::{EntityLabel, RelationLabel};

/// One candidate entity from a single chunk's extraction (pre-dedup).
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEntity {
    pub name: String,
    pub label: EntityLabel,
    pub aliases: Vec<String>,
    pub description: String,
}

/// One candidate relation from a single chunk's extraction (pre-dedup),
/// referenced by entity *name* since ids aren't assigned until dedup runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRelation {
    pub src_name: String,
    pub tgt_name: String,
    pub label: RelationLabel,
    pub description: String,
}

/// A chunk's full extraction output (spec §4.2 contract): entities,
/// name-keyed relations, and the mention edges a downstream dedup/graph
/// builder needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkExtraction {
    pub entities: Vec<ExtractedEntity>,
    pub relations: Vec<ExtractedRelation>,
    pub mentions: Vec<(String, ChunkId)>,
}

impl ChunkExtraction {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Sum type for a single extraction attempt (Design Note §9): a clean parse,
/// a parse that only partially matched the expected shape, or an outright
/// failure. Only `Ok` carries data into the pipeline; the other two are
/// counted in `ExtractionStats` and treated as "no entities" for this chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    /// `repaired` is true when the raw completion only parsed after
    /// `repair::repair_json` fixed it up (spec §7 "JSON-repair rate").
    Ok { extraction: ChunkExtraction, repaired: bool },
    PartialParse(String),
    Failed(String),
}

/// Prune entities/relations missing required properties (spec §4.2
/// "Validation"). Returns the pruned counts alongside the surviving lists so
/// callers can feed a monitoring counter.
pub fn validate(
    mut entities: Vec<ExtractedEntity>,
    mut relations: Vec<ExtractedRelation>,
) -> (Vec<ExtractedEntity>, Vec<ExtractedRelation>, usize, usize) {
    let before_entities = entities.len();
    entities.retain(|e| !e.name.trim().is_empty());
    let pruned_entities = before_entities - entities.len();

    let before_relations = relations.len();
    relations.retain(|r| !r.src_name.trim().is_empty() && !r.tgt_name.trim().is_empty());
    let pruned_relations = before_relations - relations.len();

    (entities, relations, pruned_entities, pruned_relations)
}
