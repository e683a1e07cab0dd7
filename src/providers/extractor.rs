//! Document extractor capability (spec §2, §6): a black-box that turns a
//! raw document into pre-split "extraction units" carrying layout metadata
//! (section path, page, tables, figures, key/value pairs). OCR/layout
//! analysis itself is explicitly out of scope (spec §1); only the shape of
//! its output is specified here.

use crate::ids::DocumentId;
use crate::model::{Figure, KeyValuePair, TableSummary};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("document has no extractable content")]
    EmptyDocument,
    #[error("extractor failed: {0}")]
    Fatal(String),
}

/// A single pre-split unit of a document (spec §4.1 "extraction-unit
/// input"). `role` carries the upstream layout classifier's label (e.g.
/// `"signature"`, `"pageHeader"`) consumed by the Sentence Extractor's
/// `SKIP_ROLES` gate (DESIGN.md Open Question 1); it has no effect on
/// chunking itself.
#[derive(Debug, Clone, Default)]
pub struct ExtractionUnit {
    pub text: String,
    pub section_path: Vec<String>,
    pub page_number: Option<u32>,
    pub tables: Vec<TableSummary>,
    pub figures: Vec<Figure>,
    pub key_value_pairs: Vec<KeyValuePair>,
    pub role: Option<String>,
}

impl ExtractionUnit {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            section_path: Vec::new(),
            page_number: None,
            tables: Vec::new(),
            figures: Vec::new(),
            key_value_pairs: Vec::new(),
            role: None,
        }
    }

    pub fn with_section_path(mut self, path: Vec<String>) -> Self {
        self.section_path = path;
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, document_id: &DocumentId, source: &str) -> Result<Vec<ExtractionUnit>, ExtractError>;
}

/// A fixed-units extractor for tests: hands back whatever units it was
/// constructed with, ignoring `source`. Stands in for an OCR/layout
/// pipeline so indexing-pipeline and chunker tests don't need one.
pub struct FixedExtractor {
    units: Vec<ExtractionUnit>,
}

impl FixedExtractor {
    pub fn new(units: Vec<ExtractionUnit>) -> Self {
        Self { units }
    }
}

#[async_trait]
impl DocumentExtractor for FixedExtractor {
    async fn extract(&self, _document_id: &DocumentId, _source: &str) -> Result<Vec<ExtractionUnit>, ExtractError> {
        if self.units.is_empty() {
            return Err(ExtractError::EmptyDocument);
        }
        Ok(self.units.clone())
    }
}
