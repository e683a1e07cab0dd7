//! SQLite-backed `GraphStore` (spec §6). Grounded on
//! `src/storage/sqlite.rs` (WAL mode, `Mutex<Connection>`, migration-safe
//! `init_schema`) and `src/storage/sqlite_vec.rs` (the `embeddings`-gated
//! persistent vector index with a `group_id TEXT PARTITION KEY` column).
//!
//! Every table carries `group_id` and every query filters by it (universal
//! invariant 1). Embeddings without the `embeddings` feature are stored as
//! JSON and searched by brute-force cosine scan in Rust (`rayon`-parallel
//! once a group has enough rows to matter); with the feature enabled, chunk
//! vectors additionally populate a `vec0` virtual table for ANN search.

use crate::ids::{ChunkId, CommunityId, DocumentId, EntityId, GroupId, SectionId, SentenceId};
use crate::model::{
    ChunkMetadata, Community, Document, Entity, Mention, Relationship, Section, Sentence,
    SentenceSource, TextChunk,
};
use crate::model::EntityLabel;
use crate::providers::embedding::cosine_similarity;
use crate::providers::graph_store::{
    ChunkFetchResult, EntityImportance, EntitySimilarityEdge, GraphStore, GraphStoreError,
    SectionEdge, SharesEntityEdge,
};
use super::vec_index::VecIndex;
use async_trait::async_trait;
use rayon::prelude::*;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
    vec_index: VecIndex,
}

impl SqliteGraphStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GraphStoreError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, GraphStoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, GraphStoreError> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS documents (
                group_id TEXT NOT NULL, id TEXT NOT NULL,
                title TEXT NOT NULL, source TEXT NOT NULL,
                metadata_json TEXT NOT NULL, document_date TEXT,
                PRIMARY KEY (group_id, id)
            );

            CREATE TABLE IF NOT EXISTS chunks (
                group_id TEXT NOT NULL, id TEXT NOT NULL,
                document_id TEXT NOT NULL, text TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                embedding_json TEXT, embedding_v2_json TEXT,
                tokens INTEGER NOT NULL, metadata_json TEXT NOT NULL,
                PRIMARY KEY (group_id, id)
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(group_id, document_id, chunk_index);

            CREATE TABLE IF NOT EXISTS sections (
                group_id TEXT NOT NULL, id TEXT NOT NULL,
                document_id TEXT NOT NULL, path_key TEXT NOT NULL,
                title TEXT NOT NULL, depth INTEGER NOT NULL,
                embedding_json TEXT,
                PRIMARY KEY (group_id, id)
            );
            CREATE TABLE IF NOT EXISTS section_edges (
                group_id TEXT NOT NULL, child TEXT NOT NULL, parent TEXT,
                PRIMARY KEY (group_id, child)
            );
            CREATE TABLE IF NOT EXISTS chunk_sections (
                group_id TEXT NOT NULL, chunk_id TEXT NOT NULL, section_id TEXT NOT NULL,
                PRIMARY KEY (group_id, chunk_id)
            );
            CREATE TABLE IF NOT EXISTS section_similarity (
                group_id TEXT NOT NULL, section_a TEXT NOT NULL, section_b TEXT NOT NULL,
                similarity REAL NOT NULL,
                PRIMARY KEY (group_id, section_a, section_b)
            );
            CREATE TABLE IF NOT EXISTS shares_entity (
                group_id TEXT NOT NULL, section_a TEXT NOT NULL, section_b TEXT NOT NULL,
                shared_entities_json TEXT NOT NULL,
                PRIMARY KEY (group_id, section_a, section_b)
            );
            CREATE TABLE IF NOT EXISTS hub_entities (
                group_id TEXT NOT NULL, section_id TEXT NOT NULL, entity_id TEXT NOT NULL, rank INTEGER NOT NULL,
                PRIMARY KEY (group_id, section_id, entity_id)
            );

            CREATE TABLE IF NOT EXISTS entities (
                group_id TEXT NOT NULL, id TEXT NOT NULL,
                name TEXT NOT NULL, label TEXT NOT NULL, description TEXT NOT NULL,
                aliases_json TEXT NOT NULL, embedding_json TEXT,
                metadata_json TEXT NOT NULL, text_unit_ids_json TEXT NOT NULL,
                degree INTEGER NOT NULL DEFAULT 0,
                chunk_count INTEGER NOT NULL DEFAULT 0,
                importance_score REAL NOT NULL DEFAULT 0,
                pagerank REAL NOT NULL DEFAULT 0,
                PRIMARY KEY (group_id, id)
            );
            CREATE TABLE IF NOT EXISTS relationships (
                group_id TEXT NOT NULL, source_id TEXT NOT NULL, target_id TEXT NOT NULL,
                relation_type TEXT NOT NULL, description TEXT NOT NULL, weight REAL NOT NULL,
                PRIMARY KEY (group_id, source_id, target_id, relation_type)
            );
            CREATE TABLE IF NOT EXISTS mentions (
                group_id TEXT NOT NULL, chunk_id TEXT NOT NULL, entity_id TEXT NOT NULL,
                PRIMARY KEY (group_id, chunk_id, entity_id)
            );
            CREATE TABLE IF NOT EXISTS entity_similarity (
                group_id TEXT NOT NULL, source_id TEXT NOT NULL, target_id TEXT NOT NULL,
                relationship TEXT NOT NULL, similarity REAL NOT NULL,
                PRIMARY KEY (group_id, source_id, target_id, relationship)
            );

            CREATE TABLE IF NOT EXISTS sentences (
                group_id TEXT NOT NULL, id TEXT NOT NULL, text TEXT NOT NULL,
                chunk_id TEXT NOT NULL, document_id TEXT NOT NULL, source TEXT NOT NULL,
                index_in_chunk INTEGER NOT NULL, section_path_json TEXT NOT NULL,
                page_number INTEGER, embedding_v2_json TEXT,
                PRIMARY KEY (group_id, id)
            );
            CREATE TABLE IF NOT EXISTS sentence_next (
                group_id TEXT NOT NULL, from_id TEXT NOT NULL, to_id TEXT NOT NULL,
                PRIMARY KEY (group_id, from_id)
            );

            CREATE TABLE IF NOT EXISTS communities (
                group_id TEXT NOT NULL, id TEXT NOT NULL, level INTEGER NOT NULL,
                entity_ids_json TEXT NOT NULL, title TEXT NOT NULL, summary TEXT NOT NULL,
                summary_embedding_json TEXT, rank REAL NOT NULL,
                PRIMARY KEY (group_id, id)
            );
            "#,
        )?;
        Ok(Self { conn: Mutex::new(conn), vec_index: VecIndex::new() })
    }

    fn embed_json(v: &Option<Vec<f32>>) -> Result<Option<String>, GraphStoreError> {
        match v {
            Some(v) => Ok(Some(serde_json::to_string(v)?)),
            None => Ok(None),
        }
    }

    fn parse_embed(s: Option<String>) -> Option<Vec<f32>> {
        s.and_then(|s| serde_json::from_str(&s).ok())
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn upsert_document(&self, document: &Document) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO documents (group_id, id, title, source, metadata_json, document_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                document.group_id.as_str(),
                document.id.as_str(),
                document.title,
                document.source,
                serde_json::to_string(&document.metadata)?,
                document.document_date.map(|d| d.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    async fn upsert_chunk(&self, chunk: &TextChunk) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO chunks
             (group_id, id, document_id, text, chunk_index, embedding_json, embedding_v2_json, tokens, metadata_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                chunk.group_id.as_str(),
                chunk.id.as_str(),
                chunk.document_id.as_str(),
                chunk.text,
                chunk.chunk_index as i64,
                Self::embed_json(&chunk.embedding)?,
                Self::embed_json(&chunk.embedding_v2)?,
                chunk.tokens as i64,
                serde_json::to_string(&chunk.metadata)?,
            ],
        )?;
        if let Some(embedding) = chunk.retrieval_embedding() {
            self.vec_index.upsert(&conn, chunk.group_id.as_str(), chunk.id.as_str(), embedding);
        }
        Ok(())
    }

    async fn upsert_section(&self, section: &Section) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO sections (group_id, id, document_id, path_key, title, depth, embedding_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                section.group_id.as_str(),
                section.id.as_str(),
                section.document_id.as_str(),
                section.path_key,
                section.title,
                section.depth as i64,
                Self::embed_json(&section.embedding)?,
            ],
        )?;
        Ok(())
    }

    async fn upsert_section_edge(&self, edge: &SectionEdge) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO section_edges (group_id, child, parent) VALUES (?1, ?2, ?3)",
            params![edge.group_id.as_str(), edge.child.as_str(), edge.parent.as_ref().map(|p| p.as_str())],
        )?;
        Ok(())
    }

    async fn upsert_chunk_in_section(&self, group: &GroupId, chunk: &ChunkId, section: &SectionId) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO chunk_sections (group_id, chunk_id, section_id) VALUES (?1, ?2, ?3)",
            params![group.as_str(), chunk.as_str(), section.as_str()],
        )?;
        Ok(())
    }

    async fn upsert_entity(&self, entity: &Entity) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO entities
             (group_id, id, name, label, description, aliases_json, embedding_json, metadata_json, text_unit_ids_json,
              degree, chunk_count, importance_score, pagerank)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9,
                     COALESCE((SELECT degree FROM entities WHERE group_id = ?1 AND id = ?2), 0),
                     COALESCE((SELECT chunk_count FROM entities WHERE group_id = ?1 AND id = ?2), 0),
                     COALESCE((SELECT importance_score FROM entities WHERE group_id = ?1 AND id = ?2), 0.0),
                     COALESCE((SELECT pagerank FROM entities WHERE group_id = ?1 AND id = ?2), 0.0))",
            params![
                entity.group_id.as_str(),
                entity.id.as_str(),
                entity.name,
                entity.label.as_str(),
                entity.description,
                serde_json::to_string(&entity.aliases)?,
                Self::embed_json(&entity.embedding)?,
                serde_json::to_string(&entity.metadata)?,
                serde_json::to_string(&entity.text_unit_ids)?,
            ],
        )?;
        Ok(())
    }

    async fn upsert_relationship(&self, relationship: &Relationship) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO relationships (group_id, source_id, target_id, relation_type, description, weight)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                relationship.group_id.as_str(),
                relationship.source_id.as_str(),
                relationship.target_id.as_str(),
                relationship.relation_type,
                relationship.description,
                relationship.weight,
            ],
        )?;
        Ok(())
    }

    async fn upsert_mention(&self, mention: &Mention) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO mentions (group_id, chunk_id, entity_id) VALUES (?1, ?2, ?3)",
            params![mention.group_id.as_str(), mention.chunk_id.as_str(), mention.entity_id.as_str()],
        )?;
        Ok(())
    }

    async fn upsert_sentence(&self, sentence: &Sentence) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        let source = match sentence.source {
            SentenceSource::Paragraph => "paragraph",
            SentenceSource::TableRow => "table_row",
            SentenceSource::FigureCaption => "figure_caption",
        };
        conn.execute(
            "INSERT OR REPLACE INTO sentences
             (group_id, id, text, chunk_id, document_id, source, index_in_chunk, section_path_json, page_number, embedding_v2_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                sentence.group_id.as_str(),
                sentence.id.as_str(),
                sentence.text,
                sentence.chunk_id.as_str(),
                sentence.document_id.as_str(),
                source,
                sentence.index_in_chunk as i64,
                serde_json::to_string(&sentence.section_path)?,
                sentence.page_number,
                Self::embed_json(&sentence.embedding_v2)?,
            ],
        )?;
        Ok(())
    }

    async fn upsert_sentence_next_edge(&self, group: &GroupId, from: &SentenceId, to: &SentenceId) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO sentence_next (group_id, from_id, to_id) VALUES (?1, ?2, ?3)",
            params![group.as_str(), from.as_str(), to.as_str()],
        )?;
        Ok(())
    }

    async fn upsert_community(&self, community: &Community) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO communities
             (group_id, id, level, entity_ids_json, title, summary, summary_embedding_json, rank)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                community.group_id.as_str(),
                community.id.as_str(),
                community.level as i64,
                serde_json::to_string(&community.entity_ids)?,
                community.title,
                community.summary,
                Self::embed_json(&community.summary_embedding)?,
                community.rank,
            ],
        )?;
        Ok(())
    }

    async fn upsert_section_similarity(&self, group: &GroupId, a: &SectionId, b: &SectionId, similarity: f32) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO section_similarity (group_id, section_a, section_b, similarity) VALUES (?1, ?2, ?3, ?4)",
            params![group.as_str(), a.as_str(), b.as_str(), similarity],
        )?;
        Ok(())
    }

    async fn upsert_shares_entity(&self, edge: &SharesEntityEdge) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        let ids: Vec<&str> = edge.shared_entities.iter().map(|e| e.as_str()).collect();
        conn.execute(
            "INSERT OR REPLACE INTO shares_entity (group_id, section_a, section_b, shared_entities_json) VALUES (?1, ?2, ?3, ?4)",
            params![edge.group_id.as_str(), edge.section_a.as_str(), edge.section_b.as_str(), serde_json::to_string(&ids)?],
        )?;
        Ok(())
    }

    async fn upsert_entity_similarity(&self, edge: &EntitySimilarityEdge) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO entity_similarity (group_id, source_id, target_id, relationship, similarity)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![edge.group_id.as_str(), edge.source.as_str(), edge.target.as_str(), edge.relationship, edge.similarity],
        )?;
        Ok(())
    }

    async fn upsert_hub_entity(&self, group: &GroupId, section: &SectionId, entity: &EntityId, rank: usize) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO hub_entities (group_id, section_id, entity_id, rank) VALUES (?1, ?2, ?3, ?4)",
            params![group.as_str(), section.as_str(), entity.as_str(), rank as i64],
        )?;
        Ok(())
    }

    async fn set_entity_importance(&self, group: &GroupId, entity: &EntityId, importance: EntityImportance) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE entities SET degree = ?3, chunk_count = ?4, importance_score = ?5 WHERE group_id = ?1 AND id = ?2",
            params![group.as_str(), entity.as_str(), importance.degree as i64, importance.chunk_count as i64, importance.importance_score],
        )?;
        Ok(())
    }

    async fn set_pagerank(&self, group: &GroupId, scores: &[(String, f32)]) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        for (entity_id, score) in scores {
            conn.execute(
                "UPDATE entities SET pagerank = ?3 WHERE group_id = ?1 AND id = ?2",
                params![group.as_str(), entity_id, score],
            )?;
        }
        Ok(())
    }

    async fn delete_group(&self, group: &GroupId) -> Result<(), GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        let g = group.as_str();
        for table in [
            "documents", "chunks", "sections", "section_edges", "chunk_sections",
            "entities", "relationships", "mentions", "sentences", "sentence_next",
            "communities", "section_similarity", "shares_entity", "entity_similarity", "hub_entities",
        ] {
            conn.execute(&format!("DELETE FROM {table} WHERE group_id = ?1"), params![g])?;
        }
        self.vec_index.delete_group(&conn, g);
        Ok(())
    }

    async fn count_documents(&self, group: &GroupId) -> Result<usize, GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE group_id = ?1",
            params![group.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    async fn all_entities(&self, group: &GroupId) -> Result<Vec<Entity>, GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, label, description, aliases_json, embedding_json, metadata_json, text_unit_ids_json FROM entities WHERE group_id = ?1",
        )?;
        let rows = stmt.query_map(params![group.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;
        let mut entities = Vec::new();
        for row in rows {
            let (id, name, label, description, aliases_json, embedding_json, metadata_json, text_unit_ids_json) = row?;
            entities.push(Entity {
                id: EntityId::new(id),
                group_id: group.clone(),
                name,
                label: EntityLabel::parse(&label),
                description,
                aliases: serde_json::from_str(&aliases_json)?,
                embedding: Self::parse_embed(embedding_json),
                metadata: serde_json::from_str(&metadata_json)?,
                text_unit_ids: serde_json::from_str::<Vec<String>>(&text_unit_ids_json)?
                    .into_iter()
                    .map(ChunkId::new)
                    .collect(),
            });
        }
        Ok(entities)
    }

    async fn all_chunks(&self, group: &GroupId) -> Result<Vec<TextChunk>, GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, document_id, text, chunk_index, embedding_json, embedding_v2_json, tokens, metadata_json
             FROM chunks WHERE group_id = ?1 ORDER BY document_id, chunk_index",
        )?;
        let rows = stmt.query_map(params![group.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;
        let mut chunks = Vec::new();
        for row in rows {
            let (id, document_id, text, chunk_index, embedding_json, embedding_v2_json, tokens, metadata_json) = row?;
            chunks.push(TextChunk {
                id: ChunkId::new(id),
                group_id: group.clone(),
                document_id: DocumentId::new(document_id),
                text,
                chunk_index: chunk_index as usize,
                embedding: Self::parse_embed(embedding_json),
                embedding_v2: Self::parse_embed(embedding_v2_json),
                tokens: tokens as usize,
                metadata: serde_json::from_str::<ChunkMetadata>(&metadata_json)?,
            });
        }
        Ok(chunks)
    }

    async fn all_relationships(&self, group: &GroupId) -> Result<Vec<Relationship>, GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT source_id, target_id, relation_type, description, weight FROM relationships WHERE group_id = ?1",
        )?;
        let rows = stmt.query_map(params![group.as_str()], |row| {
            Ok(Relationship {
                group_id: GroupId::new(""),
                source_id: EntityId::new(row.get::<_, String>(0)?),
                target_id: EntityId::new(row.get::<_, String>(1)?),
                relation_type: row.get(2)?,
                description: row.get(3)?,
                weight: row.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            let mut r = row?;
            r.group_id = group.clone();
            out.push(r);
        }
        Ok(out)
    }

    async fn all_sections(&self, group: &GroupId) -> Result<Vec<Section>, GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, document_id, path_key, title, depth, embedding_json FROM sections WHERE group_id = ?1",
        )?;
        let rows = stmt.query_map(params![group.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, document_id, path_key, title, depth, embedding_json) = row?;
            out.push(Section {
                id: SectionId::new(id),
                group_id: group.clone(),
                document_id: DocumentId::new(document_id),
                path_key,
                title,
                depth: depth as usize,
                embedding: Self::parse_embed(embedding_json),
            });
        }
        Ok(out)
    }

    async fn mentions_for_group(&self, group: &GroupId) -> Result<Vec<Mention>, GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT chunk_id, entity_id FROM mentions WHERE group_id = ?1")?;
        let rows = stmt.query_map(params![group.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (chunk_id, entity_id) = row?;
            out.push(Mention::new(group.clone(), ChunkId::new(chunk_id), EntityId::new(entity_id)));
        }
        Ok(out)
    }

    async fn described_relationships(&self, group: &GroupId) -> Result<Vec<(Entity, Entity, Relationship)>, GraphStoreError> {
        let relationships = self.all_relationships(group).await?;
        let entities = self.all_entities(group).await?;
        let by_id: std::collections::HashMap<&str, &Entity> =
            entities.iter().map(|e| (e.id.as_str(), e)).collect();
        let mut out = Vec::new();
        for rel in relationships {
            if rel.description.trim().is_empty() {
                continue;
            }
            if let (Some(s), Some(t)) = (by_id.get(rel.source_id.as_str()), by_id.get(rel.target_id.as_str())) {
                out.push(((*s).clone(), (*t).clone(), rel));
            }
        }
        Ok(out)
    }

    async fn entity_similarity_edges(&self, group: &GroupId, threshold: f32) -> Result<Vec<EntitySimilarityEdge>, GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT source_id, target_id, relationship, similarity FROM entity_similarity WHERE group_id = ?1 AND similarity >= ?2",
        )?;
        let rows = stmt.query_map(params![group.as_str(), threshold], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f32>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (source, target, relationship, similarity) = row?;
            let relationship = match relationship.as_str() {
                "SIMILAR_TO" => "SIMILAR_TO",
                _ => "SEMANTICALLY_SIMILAR",
            };
            out.push(EntitySimilarityEdge {
                group_id: group.clone(),
                source: EntityId::new(source),
                target: EntityId::new(target),
                relationship,
                similarity,
            });
        }
        Ok(out)
    }

    async fn chunk_section_edges(&self, group: &GroupId) -> Result<Vec<(ChunkId, SectionId)>, GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT chunk_id, section_id FROM chunk_sections WHERE group_id = ?1")?;
        let rows = stmt.query_map(params![group.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (chunk_id, section_id) = row?;
            out.push((ChunkId::new(chunk_id), SectionId::new(section_id)));
        }
        Ok(out)
    }

    async fn section_similarity_edges(&self, group: &GroupId, threshold: f32) -> Result<Vec<(SectionId, SectionId, f32)>, GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT section_a, section_b, similarity FROM section_similarity WHERE group_id = ?1 AND similarity >= ?2",
        )?;
        let rows = stmt.query_map(params![group.as_str(), threshold], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, f32>(2)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (a, b, sim) = row?;
            out.push((SectionId::new(a), SectionId::new(b), sim));
        }
        Ok(out)
    }

    async fn vector_search_chunks(&self, group: &GroupId, query: &[f32], top_k: usize) -> Result<Vec<(ChunkId, f32)>, GraphStoreError> {
        {
            let conn = self.conn.lock().unwrap();
            if let Some(hits) = self.vec_index.search(&conn, group.as_str(), query, top_k) {
                return Ok(hits.into_iter().map(|(id, score)| (ChunkId::new(id), score)).collect());
            }
        }
        let chunks = self.all_chunks(group).await?;
        let mut scored: Vec<(ChunkId, f32)> = chunks
            .par_iter()
            .filter_map(|c| {
                c.retrieval_embedding()
                    .map(|e| (c.id.clone(), cosine_similarity(query, e)))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn vector_search_sentences(&self, group: &GroupId, query: &[f32], top_k: usize, threshold: f32) -> Result<Vec<(SentenceId, f32)>, GraphStoreError> {
        let conn_rows = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare("SELECT id, embedding_v2_json FROM sentences WHERE group_id = ?1")?;
            let rows = stmt.query_map(params![group.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            out
        };
        let mut scored: Vec<(SentenceId, f32)> = conn_rows
            .into_iter()
            .filter_map(|(id, embedding_json)| {
                Self::parse_embed(embedding_json).map(|e| (SentenceId::new(id), cosine_similarity(query, &e)))
            })
            .filter(|(_, score)| *score >= threshold)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn fetch_chunks(&self, group: &GroupId, ids: &[ChunkId]) -> Result<Vec<ChunkFetchResult>, GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        let mut out = Vec::new();
        for id in ids {
            let row: Option<(String, String, i64, Option<String>, Option<String>, i64, String)> = conn
                .query_row(
                    "SELECT text, document_id, chunk_index, embedding_json, embedding_v2_json, tokens, metadata_json
                     FROM chunks WHERE group_id = ?1 AND id = ?2",
                    params![group.as_str(), id.as_str()],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                        ))
                    },
                )
                .optional()?;
            let Some((text, document_id, chunk_index, embedding_json, embedding_v2_json, tokens, metadata_json)) = row else {
                continue;
            };
            let document_title: String = conn
                .query_row(
                    "SELECT title FROM documents WHERE group_id = ?1 AND id = ?2",
                    params![group.as_str(), document_id],
                    |row| row.get(0),
                )
                .unwrap_or_default();
            let section_row: Option<(String, String)> = conn
                .query_row(
                    "SELECT s.title, s.path_key FROM chunk_sections cs
                     JOIN sections s ON s.group_id = cs.group_id AND s.id = cs.section_id
                     WHERE cs.group_id = ?1 AND cs.chunk_id = ?2",
                    params![group.as_str(), id.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let metadata: ChunkMetadata = serde_json::from_str(&metadata_json)?;
            let chunk = TextChunk {
                id: id.clone(),
                group_id: group.clone(),
                document_id: DocumentId::new(document_id),
                text,
                chunk_index: chunk_index as usize,
                embedding: Self::parse_embed(embedding_json),
                embedding_v2: Self::parse_embed(embedding_v2_json),
                tokens: tokens as usize,
                metadata,
            };
            let (section_title, section_path) = match section_row {
                Some((title, path_key)) => (
                    Some(title),
                    path_key.split(" > ").map(|s| s.to_string()).collect(),
                ),
                None => (None, chunk.metadata.section_path.clone()),
            };
            out.push(ChunkFetchResult {
                chunk,
                document_title,
                section_title,
                section_path,
            });
        }
        Ok(out)
    }

    async fn fetch_sentences(&self, group: &GroupId, ids: &[SentenceId]) -> Result<Vec<Sentence>, GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        let mut out = Vec::new();
        for id in ids {
            let row: Option<(String, String, String, String, i64, String, Option<i64>, Option<String>)> = conn
                .query_row(
                    "SELECT text, chunk_id, document_id, source, index_in_chunk, section_path_json, page_number, embedding_v2_json
                     FROM sentences WHERE group_id = ?1 AND id = ?2",
                    params![group.as_str(), id.as_str()],
                    |row| {
                        Ok((
                            row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?,
                            row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?,
                        ))
                    },
                )
                .optional()?;
            let Some((text, chunk_id, document_id, source, index_in_chunk, section_path_json, page_number, embedding_v2_json)) = row else {
                continue;
            };
            let source = match source.as_str() {
                "table_row" => SentenceSource::TableRow,
                "figure_caption" => SentenceSource::FigureCaption,
                _ => SentenceSource::Paragraph,
            };
            out.push(Sentence {
                id: id.clone(),
                group_id: group.clone(),
                text,
                chunk_id: ChunkId::new(chunk_id),
                document_id: DocumentId::new(document_id),
                source,
                index_in_chunk: index_in_chunk as usize,
                section_path: serde_json::from_str(&section_path_json)?,
                page_number: page_number.map(|p| p as u32),
                embedding_v2: Self::parse_embed(embedding_v2_json),
            });
        }
        Ok(out)
    }

    async fn match_sections_by_embedding(&self, group: &GroupId, query: &[f32], top_k: usize) -> Result<Vec<(SectionId, f32)>, GraphStoreError> {
        let sections = self.all_sections(group).await?;
        let mut scored: Vec<(SectionId, f32)> = sections
            .iter()
            .filter_map(|s| s.embedding.as_ref().map(|e| (s.id.clone(), cosine_similarity(query, e))))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn top_entities_in_sections(&self, group: &GroupId, sections: &[SectionId], top_k: usize) -> Result<Vec<EntityId>, GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
        for section in sections {
            let mut stmt = conn.prepare(
                "SELECT m.entity_id FROM mentions m
                 JOIN chunk_sections cs ON cs.group_id = m.group_id AND cs.chunk_id = m.chunk_id
                 WHERE m.group_id = ?1 AND cs.section_id = ?2",
            )?;
            let rows = stmt.query_map(params![group.as_str(), section.as_str()], |row| row.get::<_, String>(0))?;
            for row in rows {
                *counts.entry(row?).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(top_k);
        Ok(ranked.into_iter().map(|(id, _)| EntityId::new(id)).collect())
    }

    async fn match_communities_by_embedding(&self, group: &GroupId, query: &[f32], top_k: usize) -> Result<Vec<(CommunityId, f32)>, GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, summary_embedding_json FROM communities WHERE group_id = ?1")?;
        let rows = stmt.query_map(params![group.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;
        let mut scored = Vec::new();
        for row in rows {
            let (id, embedding_json) = row?;
            if let Some(e) = Self::parse_embed(embedding_json) {
                scored.push((CommunityId::new(id), cosine_similarity(query, &e)));
            }
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn top_entities_by_degree(&self, group: &GroupId, entities: &[EntityId], top_k: usize) -> Result<Vec<EntityId>, GraphStoreError> {
        let conn = self.conn.lock().unwrap();
        let mut ranked = Vec::new();
        for entity in entities {
            let degree: i64 = conn
                .query_row(
                    "SELECT degree FROM entities WHERE group_id = ?1 AND id = ?2",
                    params![group.as_str(), entity.as_str()],
                    |row| row.get(0),
                )
                .unwrap_or(0);
            ranked.push((entity.clone(), degree));
        }
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(top_k);
        Ok(ranked.into_iter().map(|(id, _)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Document, EntityLabel};

    fn group() -> GroupId {
        GroupId::new("g-test")
    }

    #[tokio::test]
    async fn upsert_and_count_documents_scoped_by_group() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let doc = Document::new("D1", group(), "Contract", "upload://d1");
        store.upsert_document(&doc).await.unwrap();
        assert_eq!(store.count_documents(&group()).await.unwrap(), 1);
        assert_eq!(store.count_documents(&GroupId::new("other")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn chunk_round_trip_preserves_embedding() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let mut chunk = TextChunk::new("D1_chunk_0", group(), DocumentId::new("D1"), 0, "hello world");
        chunk.embedding_v2 = Some(vec![0.1, 0.2, 0.3]);
        store.upsert_chunk(&chunk).await.unwrap();
        let all = store.all_chunks(&group()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].embedding_v2, Some(vec![0.1, 0.2, 0.3]));
    }

    #[tokio::test]
    async fn vector_search_ranks_by_cosine() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let mut a = TextChunk::new("a", group(), DocumentId::new("D1"), 0, "a");
        a.embedding_v2 = Some(vec![1.0, 0.0]);
        let mut b = TextChunk::new("b", group(), DocumentId::new("D1"), 1, "b");
        b.embedding_v2 = Some(vec![0.0, 1.0]);
        store.upsert_chunk(&a).await.unwrap();
        store.upsert_chunk(&b).await.unwrap();
        let results = store.vector_search_chunks(&group(), &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(results[0].0, ChunkId::new("a"));
    }

    #[tokio::test]
    async fn delete_group_removes_all_rows() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let doc = Document::new("D1", group(), "Contract", "upload://d1");
        store.upsert_document(&doc).await.unwrap();
        let entity = Entity::new(group(), "Fabrikam", EntityLabel::Organization);
        store.upsert_entity(&entity).await.unwrap();
        store.delete_group(&group()).await.unwrap();
        assert_eq!(store.count_documents(&group()).await.unwrap(), 0);
        assert!(store.all_entities(&group()).await.unwrap().is_empty());
    }
}
