//! Crate-root error re-exports (spec §7.1). Each subsystem keeps its own
//! narrow `thiserror` enum; this module only adds the two error types that
//! don't belong to any single provider/store subsystem (`ConfigError`,
//! `RouteError`) and re-exports everything else so callers can `use
//! hipporag2::error::*` for a single import surface, matching the teacher's
//! `PlexusError`/`StorageError` split-by-module convention.

pub use crate::providers::embedding::EmbeddingError;
pub use crate::providers::extractor::ExtractError;
pub use crate::providers::graph_store::GraphStoreError;
pub use crate::providers::llm::LlmError;
pub use crate::providers::synthesizer::SynthesizeError;

use thiserror::Error;

/// Fatal-at-startup configuration problems (spec §7 "Configuration errors").
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("embedding dimensions must be > 0")]
    MissingEmbeddingDimensions,
    #[error("threshold {name} out of [0, 1] range: {value}")]
    ThresholdOutOfRange { name: &'static str, value: f32 },
}

/// Fatal route-level failures (spec §4.8 state machine: only `init_loaded`
/// and `embedded` fail hard; every other step degrades to
/// `model::NegativeResult` instead of returning this).
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("failed to load triple store or PPR engine for group: {0}")]
    InitLoadFailed(String),
    #[error("failed to embed query: {0}")]
    EmbedFailed(#[from] EmbeddingError),
}
