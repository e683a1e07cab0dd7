//! Lightweight heuristic NER (spec §4.2 fallback cascade, final tier): a
//! capitalized-word pattern matcher used only when the primary and
//! prompt-only secondary extractors both return too few entities/mentions.
//! Never produces relations — just enough entity candidates to avoid an
//! empty result.

use super::schema::ExtractedEntity;
use crate::model::EntityLabel;
use std::collections::HashSet;

const STOPWORDS: &[&str] = &[
    "The", "This", "That", "These", "Those", "A", "An", "It", "They", "We",
    "He", "She", "I", "You", "In", "On", "At", "By", "For", "With", "As",
    "Of", "To", "And", "Or", "But",
];

/// Scan `text` for runs of capitalized words (`"Fabrikam Construction Inc"`)
/// and return them as `CONCEPT`-labeled candidates, deduplicated by surface
/// form.
pub fn extract_capitalized_entities(text: &str) -> Vec<ExtractedEntity> {
    let mut seen = HashSet::new();
    let mut entities = Vec::new();
    let mut current_run: Vec<&str> = Vec::new();

    let mut flush = |run: &mut Vec<&str>, seen: &mut HashSet<String>, out: &mut Vec<ExtractedEntity>| {
        if run.len() >= 1 {
            let candidate = run.join(" ");
            let trimmed = candidate.trim_matches(|c: char| !c.is_alphanumeric());
            if run.len() >= 2 || !STOPWORDS.contains(&trimmed) {
                if trimmed.len() > 1 && seen.insert(trimmed.to_string()) {
                    out.push(ExtractedEntity {
                        name: trimmed.to_string(),
                        label: EntityLabel::Concept,
                        aliases: Vec::new(),
                        description: String::new(),
                    });
                }
            }
        }
        run.clear();
    };

    for word in text.split_whitespace() {
        let core = word.trim_matches(|c: char| !c.is_alphanumeric());
        let starts_capital = core
            .chars()
            .next()
            .map(|c| c.is_uppercase())
            .unwrap_or(false);
        if starts_capital && !STOPWORDS.contains(&core) {
            current_run.push(word);
        } else if !current_run.is_empty() && STOPWORDS.contains(&core) {
            // A stopword inside a run ("Bank of America") keeps it joined.
            current_run.push(word);
        } else {
            flush(&mut current_run, &mut seen, &mut entities);
        }
    }
    flush(&mut current_run, &mut seen, &mut entities);

    entities
}
