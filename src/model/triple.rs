use crate::ids::EntityId;
use serde::{Deserialize, Serialize};

/// A derived `(subject, predicate, object)` fact (spec §3, §4.6). Triples
/// are never persisted directly; they're reconstructed from
/// `Entity —[RELATED_TO {description}]→ Entity` edges each time a
/// `TripleStore` loads for a group, which is why this type lives in
/// `model` rather than alongside the graph-store schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Triple {
    pub subject_id: EntityId,
    pub subject_name: String,
    pub predicate: String,
    pub object_id: EntityId,
    pub object_name: String,
    pub embedding: Vec<f32>,
}

impl Triple {
    /// The exact text the triple-store embeds (spec §4.6 step 2):
    /// `"<subject_name> <description> <object_name>"`.
    pub fn embedding_text(subject_name: &str, description: &str, object_name: &str) -> String {
        format!("{} {} {}", subject_name, description, object_name)
    }

    /// `"- <subject> → <predicate> → <object>"`, the bullet format the route
    /// handler assembles into `graph_structural_header` (spec §4.8 step 7).
    pub fn as_structural_bullet(&self) -> String {
        format!("- {} → {} → {}", self.subject_name, self.predicate, self.object_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_text_matches_spec_format() {
        assert_eq!(
            Triple::embedding_text("Fabrikam", "is a party to", "Contoso Lifts LLC"),
            "Fabrikam is a party to Contoso Lifts LLC"
        );
    }

    #[test]
    fn structural_bullet_format() {
        let t = Triple {
            subject_id: EntityId::new("e1"),
            subject_name: "Fabrikam".to_string(),
            predicate: "PARTY_TO".to_string(),
            object_id: EntityId::new("e2"),
            object_name: "Contoso Lifts LLC".to_string(),
            embedding: vec![],
        };
        assert_eq!(t.as_structural_bullet(), "- Fabrikam → PARTY_TO → Contoso Lifts LLC");
    }
}
