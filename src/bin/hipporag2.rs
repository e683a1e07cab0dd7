//! hipporag2 CLI — index documents into a group's graph and query it.
//!
//! Usage:
//!   hipporag2 index --db path.sqlite --group g1 file1.txt file2.txt
//!   hipporag2 query --db path.sqlite --group g1 "What is the warranty period?"
//!
//! Wires the crate's trait-level providers to the minimal concrete
//! implementations this binary ships with: a plain-text extractor (one
//! file = one extraction unit) and the deterministic embedder / scripted
//! LLM the crate itself uses for its integration tests. Real LLM
//! completion and OCR/layout extraction are explicitly out of scope for
//! the library (see `providers::llm`, `providers::extractor`); callers
//! wanting a production backend wire their own providers through the
//! library API rather than this binary.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use hipporag2::config::RetrievalConfig;
use hipporag2::graphstore::SqliteGraphStore;
use hipporag2::ids::{DocumentId, GroupId};
use hipporag2::pipeline::{self, DocumentInput};
use hipporag2::providers::embedding::DeterministicEmbedder;
use hipporag2::providers::extractor::ExtractionUnit;
use hipporag2::providers::llm::ScriptedLlmProvider;
use hipporag2::providers::synthesizer::EchoSynthesizer;
use hipporag2::providers::{DocumentExtractor, ExtractError};
use hipporag2::route::HipporagRoute;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "hipporag2", version, about = "Hybrid graph-augmented retrieval engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index one or more text files into a group's graph.
    Index {
        /// Path to the SQLite database (created if missing). Defaults to
        /// `graph.sqlite` under the OS data directory.
        #[arg(long)]
        db: Option<PathBuf>,
        /// Tenant/group id to index into.
        #[arg(long)]
        group: String,
        /// Delete the group's existing graph before indexing.
        #[arg(long)]
        reindex: bool,
        /// Text files to index.
        files: Vec<PathBuf>,
    },
    /// Run a query against an already-indexed group.
    Query {
        /// Path to the SQLite database. Defaults to `graph.sqlite` under the
        /// OS data directory.
        #[arg(long)]
        db: Option<PathBuf>,
        /// Tenant/group id to query.
        #[arg(long)]
        group: String,
        /// Synthesis response shape passed through to the synthesizer.
        #[arg(long, default_value = "narrative")]
        response_type: String,
        /// The natural-language query.
        query: String,
    },
}

/// Resolves an explicit `--db` path, or falls back to
/// `<data_dir>/hipporag2/graph.sqlite` when the user didn't pass one, so a
/// first run doesn't need to think about where its database lives.
fn resolve_db_path(db: Option<PathBuf>) -> PathBuf {
    db.unwrap_or_else(|| {
        let base = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        base.join("hipporag2").join("graph.sqlite")
    })
}

/// Reads a whole file as one extraction unit. OCR/layout analysis is out
/// of scope for the library; this is the simplest extractor that
/// satisfies the `DocumentExtractor` contract for plain-text input.
struct PlainTextExtractor;

#[async_trait]
impl DocumentExtractor for PlainTextExtractor {
    async fn extract(&self, _document_id: &DocumentId, source: &str) -> Result<Vec<ExtractionUnit>, ExtractError> {
        let text = std::fs::read_to_string(source).map_err(|e| ExtractError::Fatal(e.to_string()))?;
        if text.trim().is_empty() {
            return Err(ExtractError::EmptyDocument);
        }
        Ok(vec![ExtractionUnit::new(text)])
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Index { db, group, reindex, files } => run_index(db, group, reindex, files).await,
        Commands::Query {
            db,
            group,
            response_type,
            query,
        } => run_query(db, group, response_type, query).await,
    }
}

fn open_store(db: &PathBuf) -> SqliteGraphStore {
    if let Some(parent) = db.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match SqliteGraphStore::open(db) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("error: failed to open store at {}: {err}", db.display());
            std::process::exit(1);
        }
    }
}

async fn run_index(db: Option<PathBuf>, group: String, reindex: bool, files: Vec<PathBuf>) {
    let db = resolve_db_path(db);
    let store = open_store(&db);
    let config = RetrievalConfig::default();
    if let Err(err) = config.validate() {
        eprintln!("error: invalid configuration: {err}");
        std::process::exit(1);
    }
    let embedder = DeterministicEmbedder::new(config.embedding_dimensions);
    let llm = ScriptedLlmProvider::new("NONE");
    let extractor = PlainTextExtractor;
    let group_id = GroupId::new(group);

    let documents: Vec<DocumentInput> = files
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let title = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("document-{i}"));
            DocumentInput::new(format!("doc-{i}"), title, path.display().to_string())
        })
        .collect();

    match pipeline::run(&store, &embedder, &llm, &extractor, &group_id, &documents, reindex, &config).await {
        Ok(stats) => {
            println!(
                "indexed {} document(s), {} chunk(s), {} entity(ies), {} communit(y/ies), {} sentence(s)",
                stats.documents_indexed, stats.chunks, stats.build.entities, stats.build.communities, stats.sentences
            );
            if stats.documents_skipped > 0 {
                println!("skipped {} document(s) with no extractable content", stats.documents_skipped);
            }
        }
        Err(err) => {
            eprintln!("error: indexing failed: {err}");
            std::process::exit(1);
        }
    }
}

async fn run_query(db: Option<PathBuf>, group: String, response_type: String, query: String) {
    let db = resolve_db_path(db);
    let store = open_store(&db);
    let config = RetrievalConfig::default();
    if let Err(err) = config.validate() {
        eprintln!("error: invalid configuration: {err}");
        std::process::exit(1);
    }
    let route = HipporagRoute::new(
        Arc::new(store),
        Arc::new(DeterministicEmbedder::new(config.embedding_dimensions)),
        Arc::new(ScriptedLlmProvider::new("NONE")),
        Arc::new(EchoSynthesizer),
        config,
    );

    match route.execute(&GroupId::new(group), &query, &response_type).await {
        Ok(result) => {
            println!("{}", result.response);
            if result.metadata.negative_detection {
                if let Some(reason) = result.metadata.detection_reason {
                    eprintln!("(negative result: {reason:?})");
                }
            }
            for citation in &result.citations {
                println!("  [{}] {} ({})", citation.index, citation.document_title, citation.chunk_id);
            }
        }
        Err(err) => {
            eprintln!("error: query failed: {err}");
            std::process::exit(1);
        }
    }
}
