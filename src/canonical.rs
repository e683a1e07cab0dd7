//! Canonical key normalization and deterministic entity id derivation.
//!
//! `Entity.id = hash(group_id, canonical_key(name))` (spec §3), so two
//! mentions of "Fabrikam Inc." and "Fabrikam, Inc." across different chunks
//! resolve to the same entity without a round-trip through the graph store.

use crate::ids::{EntityId, GroupId};

/// Corporate suffixes stripped during canonicalization, checked longest-first
/// so "incorporated" is not left with a dangling "ed" after "inc" matches.
const CORPORATE_SUFFIXES: &[&str] = &[
    "incorporated",
    "corporation",
    "company",
    "limited",
    "corp",
    "llc",
    "ltd",
    "inc",
    "co",
];

/// Normalize an entity name into a stable key for deduplication and id
/// derivation: lowercase, strip punctuation, collapse whitespace, drop a
/// trailing corporate suffix. Idempotent: `canonical_key(canonical_key(x))
/// == canonical_key(x)`.
pub fn canonical_key(name: &str) -> String {
    let lowered = name.to_lowercase();

    let stripped: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || is_cjk(c) {
                c
            } else {
                ' '
            }
        })
        .collect();

    let mut words: Vec<&str> = stripped.split_whitespace().collect();

    while let Some(last) = words.last() {
        if CORPORATE_SUFFIXES.contains(last) {
            words.pop();
        } else {
            break;
        }
    }

    words.join(" ")
}

/// CJK scripts are kept as individual characters rather than word-split;
/// Latin-script whitespace collapsing does not apply meaningfully to them,
/// but they still need to survive the alphanumeric filter above.
fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF   // CJK Unified Ideographs
        | 0x3040..=0x30FF // Hiragana + Katakana
        | 0xAC00..=0xD7A3 // Hangul syllables
    )
}

/// Deterministic entity id from a group and a canonical key. Stable across
/// indexing runs: same `(group_id, name)` pair always yields the same id,
/// which is what lets dedup and re-indexing converge to identical counts.
pub fn entity_id(group_id: &GroupId, canonical_key: &str) -> EntityId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(group_id.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(canonical_key.as_bytes());
    let digest = hasher.finalize();
    EntityId::new(format!("entity:{}", digest.to_hex()))
}
