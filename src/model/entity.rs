use super::EntityLabel;
use crate::canonical::{canonical_key, entity_id};
use crate::ids::{ChunkId, EntityId, GroupId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A canonical entity (spec §3). `id` is always `hash(group_id,
/// canonical_key(name))`; constructing an `Entity` any other way would
/// violate universal invariant 3, so `Entity::new` derives it rather than
/// accepting one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub group_id: GroupId,
    pub name: String,
    pub label: EntityLabel,
    pub description: String,
    pub aliases: Vec<String>,
    pub embedding: Option<Vec<f32>>,
    pub metadata: HashMap<String, String>,
    pub text_unit_ids: Vec<ChunkId>,
}

impl Entity {
    pub fn new(group_id: GroupId, name: impl Into<String>, label: EntityLabel) -> Self {
        let name = name.into();
        let key = canonical_key(&name);
        let id = entity_id(&group_id, &key);
        Self {
            id,
            group_id,
            name,
            label,
            description: String::new(),
            aliases: Vec::new(),
            embedding: None,
            metadata: HashMap::new(),
            text_unit_ids: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        if !self.aliases.contains(&alias) {
            self.aliases.push(alias);
        }
        self
    }

    pub fn with_text_unit(mut self, chunk_id: ChunkId) -> Self {
        if !self.text_unit_ids.contains(&chunk_id) {
            self.text_unit_ids.push(chunk_id);
        }
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn canonical_key(&self) -> String {
        canonical_key(&self.name)
    }
}

/// A directed fact between two entities (spec §3 `Relationship`). Treated as
/// undirected at query time (triple-store and PPR graph both canonicalize
/// the pair), but stored directed since extraction naturally produces a
/// subject→object orientation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub group_id: GroupId,
    pub source_id: EntityId,
    pub target_id: EntityId,
    pub relation_type: String,
    pub description: String,
    pub weight: f32,
}

impl Relationship {
    pub fn new(
        group_id: GroupId,
        source_id: EntityId,
        target_id: EntityId,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            group_id,
            source_id,
            target_id,
            relation_type: relation_type.into(),
            description: String::new(),
            weight: 1.0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }
}

/// `TextChunk —[MENTIONS]→ Entity` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mention {
    pub group_id: GroupId,
    pub chunk_id: ChunkId,
    pub entity_id: EntityId,
}

impl Mention {
    pub fn new(group_id: GroupId, chunk_id: ChunkId, entity_id: EntityId) -> Self {
        Self {
            group_id,
            chunk_id,
            entity_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_derived_from_name_not_stored_separately() {
        let e1 = Entity::new(GroupId::new("g"), "Fabrikam Construction Inc.", EntityLabel::Organization);
        let e2 = Entity::new(GroupId::new("g"), "Fabrikam Inc", EntityLabel::Organization);
        assert_eq!(e1.id, e2.id);
    }

    #[test]
    fn with_alias_is_deduplicating() {
        let e = Entity::new(GroupId::new("g"), "Fabrikam", EntityLabel::Organization)
            .with_alias("Fabrikam")
            .with_alias("Fabrikam");
        assert_eq!(e.aliases.len(), 1);
    }
}
