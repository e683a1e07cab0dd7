use crate::ids::{DocumentId, GroupId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A source document (spec §3). Immutable after ingest for a given group;
/// the only way to change one is a full reindex of its group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub group_id: GroupId,
    pub title: String,
    pub source: String,
    pub metadata: HashMap<String, String>,
    pub document_date: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(id: impl Into<DocumentId>, group_id: GroupId, title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            group_id,
            title: title.into(),
            source: source.into(),
            metadata: HashMap::new(),
            document_date: None,
        }
    }

    pub fn with_document_date(mut self, date: DateTime<Utc>) -> Self {
        self.document_date = Some(date);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
