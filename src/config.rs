//! Enumerated configuration surface (spec §6, Design Note "Config via
//! environment strings"). Built once and passed by reference; library code
//! never reads the environment directly — that belongs to whatever binary
//! embeds this crate.

use crate::error::ConfigError;

/// Tunables for indexing, graph construction, and the HippoRAG-2 route.
/// Every field corresponds to an entry in spec §6's configuration-surface
/// table, plus a handful of builder-only defaults spec §4.4 requires but
/// does not tabulate (community levels/resolution, PageRank damping).
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    // Chunking
    pub chunk_size: usize,
    pub chunk_overlap: usize,

    // Embeddings
    pub embedding_dimensions: usize,

    // Entity/relation extraction
    pub min_entities: usize,
    pub min_mentions: usize,
    pub use_native_extractor: bool,
    pub extraction_concurrency: usize,

    // PPR
    pub passage_node_weight: f32,
    pub damping: f32,
    pub synonym_threshold: f32,
    pub section_sim_threshold: f32,
    pub section_edge_weight: f32,
    pub max_ppr_iterations: usize,
    pub ppr_convergence_threshold: f64,

    // Retrieval widths
    pub triple_top_k: usize,
    pub dpr_top_k: usize,
    pub ppr_passage_top_k: usize,
    pub sentence_top_k: usize,
    pub sentence_similarity_threshold: f32,

    // Optional seed weights
    pub w_structural: f32,
    pub w_community: f32,

    // Feature flags
    pub include_section_graph: bool,
    pub structural_seeds_enabled: bool,
    pub community_seeds_enabled: bool,
    pub sentence_search_enabled: bool,

    // Dedup
    pub similarity_threshold: f32,

    // Graph builder (not in the spec's table but required to run §4.4)
    pub community_max_levels: usize,
    pub community_resolution: f32,
    pub pagerank_damping: f32,
    pub pagerank_max_iterations: usize,
    pub section_edge_cap: usize,
    pub cross_doc_section_sim_threshold: f32,

    // Observability thresholds (spec §7)
    pub repair_rate_warn_threshold: f32,
    pub failure_rate_warn_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 64,
            embedding_dimensions: 3072,
            min_entities: 3,
            min_mentions: 5,
            use_native_extractor: true,
            extraction_concurrency: 4,
            passage_node_weight: 0.05,
            damping: 0.5,
            synonym_threshold: 0.8,
            section_sim_threshold: 0.5,
            section_edge_weight: 0.1,
            max_ppr_iterations: 50,
            ppr_convergence_threshold: 1e-6,
            triple_top_k: 5,
            dpr_top_k: 20,
            ppr_passage_top_k: 20,
            sentence_top_k: 30,
            sentence_similarity_threshold: 0.2,
            w_structural: 0.2,
            w_community: 0.1,
            include_section_graph: false,
            structural_seeds_enabled: false,
            community_seeds_enabled: false,
            sentence_search_enabled: false,
            similarity_threshold: 0.95,
            community_max_levels: 4,
            community_resolution: 1.0,
            pagerank_damping: 0.85,
            pagerank_max_iterations: 20,
            section_edge_cap: 5,
            cross_doc_section_sim_threshold: 0.43,
            repair_rate_warn_threshold: 0.05,
            failure_rate_warn_threshold: 0.01,
        }
    }
}

impl RetrievalConfig {
    /// Fatal-at-startup checks (spec §7 "Configuration errors"): a missing
    /// embedding dimension and any threshold outside `[0, 1]` are caller bugs,
    /// not degraded-result conditions, so they're rejected before a binary
    /// ever reaches the pipeline or the route.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dimensions == 0 {
            return Err(ConfigError::MissingEmbeddingDimensions);
        }
        let thresholds: &[(&'static str, f32)] = &[
            ("synonym_threshold", self.synonym_threshold),
            ("section_sim_threshold", self.section_sim_threshold),
            ("damping", self.damping),
            ("sentence_similarity_threshold", self.sentence_similarity_threshold),
            ("similarity_threshold", self.similarity_threshold),
            ("pagerank_damping", self.pagerank_damping),
            ("cross_doc_section_sim_threshold", self.cross_doc_section_sim_threshold),
            ("repair_rate_warn_threshold", self.repair_rate_warn_threshold),
            ("failure_rate_warn_threshold", self.failure_rate_warn_threshold),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value: *value });
            }
        }
        Ok(())
    }
}
