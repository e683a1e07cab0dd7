//! hipporag2: hybrid graph-augmented retrieval engine.
//!
//! Combines dense passage retrieval, knowledge-graph traversal, and
//! Personalized PageRank fusion over a per-tenant (`group_id`-scoped)
//! entity+passage+section graph. An indexing run
//! ([`pipeline::run`]) turns documents into that graph; a query
//! ([`route::HipporagRoute::execute`]) fuses three retrieval signals into
//! evidence for a [`providers::Synthesizer`].
//!
//! # Example
//!
//! ```no_run
//! use hipporag2::config::RetrievalConfig;
//! use hipporag2::graphstore::SqliteGraphStore;
//! use hipporag2::ids::GroupId;
//! use hipporag2::providers::embedding::DeterministicEmbedder;
//! use hipporag2::providers::llm::ScriptedLlmProvider;
//! use hipporag2::providers::synthesizer::EchoSynthesizer;
//! use hipporag2::route::HipporagRoute;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteGraphStore::open_in_memory()?;
//! let config = RetrievalConfig::default();
//! let route = HipporagRoute::new(
//!     Arc::new(store),
//!     Arc::new(DeterministicEmbedder::new(config.embedding_dimensions)),
//!     Arc::new(ScriptedLlmProvider::new("NONE")),
//!     Arc::new(EchoSynthesizer),
//!     config,
//! );
//! let result = route.execute(&GroupId::new("g1"), "What is the warranty period?", "narrative").await?;
//! println!("{}", result.response);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod canonical;
pub mod chunker;
pub mod config;
pub mod dedup;
pub mod error;
pub mod extraction;
pub mod graphstore;
pub mod ids;
pub mod model;
pub mod pipeline;
pub mod ppr;
pub mod providers;
pub mod route;
pub mod sentences;
mod textsplit;
pub mod triples;

pub use config::RetrievalConfig;
pub use error::{ConfigError, RouteError};
pub use graphstore::SqliteGraphStore;
pub use pipeline::{DocumentInput, IndexError, IndexStats};
pub use providers::{GraphStore, GraphStoreError};
pub use route::HipporagRoute;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
