//! External collaborator interfaces (spec §2, §6). Everything in this
//! module is a trait: embedding, LLM, graph-store, document-extraction, and
//! synthesis are all treated as black boxes the core composes but never
//! implements beyond a deterministic in-memory mock used for tests and,
//! behind the `embeddings` feature, a real ONNX-backed embedder.

pub mod embedding;
pub mod extractor;
pub mod graph_store;
pub mod llm;
pub mod synthesizer;

pub use embedding::{EmbeddingError, EmbeddingProvider};
pub use extractor::{DocumentExtractor, ExtractError, ExtractionUnit};
pub use graph_store::{GraphStore, GraphStoreError};
pub use llm::{LlmCompletion, LlmError, LlmProvider, ScriptedLlmProvider};
pub use synthesizer::{SynthesisRequest, SynthesisResponse, Synthesizer, SynthesizeError};
