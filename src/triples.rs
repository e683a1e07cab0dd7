//! Triple Store (spec §4.6): the query-to-triple linking half of HippoRAG-2
//! — an in-memory cosine-similarity index over `Entity —[RELATED_TO]→
//! Entity` facts, plus the LLM recognition-memory filter that narrows the
//! top-K candidates down to the ones actually relevant to a query.
//!
//! Grounded on
//! `original_source/src/worker/hybrid_v2/retrievers/triple_store.py`.

use crate::ids::GroupId;
use crate::model::Triple;
use crate::providers::embedding::EmbeddingProvider;
use crate::providers::graph_store::GraphStore;
use crate::providers::llm::LlmProvider;
use rayon::prelude::*;
use std::collections::HashMap;

/// In-memory cache of triple embeddings for one group, loaded lazily and
/// reused across queries (spec §4.6 "cached per group_id"). The embeddings
/// matrix is L2-normalized at load time so search is a plain dot product.
#[derive(Debug, Default)]
pub struct TripleStore {
    triples: Vec<Triple>,
    /// Row-major `[triple_idx][dim]`, each row unit-normalized.
    embeddings: Vec<Vec<f32>>,
}

impl TripleStore {
    /// Fetch every described `RELATED_TO` relationship for `group_id`,
    /// embed `"{subject} {description} {object}"` for each, and cache the
    /// normalized matrix (spec §4.6 step 1-2).
    pub async fn load(
        store: &dyn GraphStore,
        group_id: &GroupId,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Self, crate::error::GraphStoreError> {
        let described = store.described_relationships(group_id).await?;
        if described.is_empty() {
            return Ok(Self::default());
        }

        let triples: Vec<Triple> = described
            .iter()
            .map(|(subject, object, relationship)| Triple {
                subject_id: subject.id.clone(),
                subject_name: subject.name.clone(),
                predicate: relationship.description.clone(),
                object_id: object.id.clone(),
                object_name: object.name.clone(),
                embedding: Vec::new(),
            })
            .collect();

        let texts: Vec<String> = triples
            .iter()
            .map(|t| Triple::embedding_text(&t.subject_name, &t.predicate, &t.object_name))
            .collect();

        let raw = embedder
            .embed_documents(&texts)
            .await
            .map_err(|e| crate::error::GraphStoreError::Unavailable(e.to_string()))?;

        let embeddings: Vec<Vec<f32>> = raw.into_iter().map(normalize).collect();

        let triples = triples
            .into_iter()
            .zip(embeddings.iter())
            .map(|(mut t, row)| {
                t.embedding = row.clone();
                t
            })
            .collect();

        Ok(Self { triples, embeddings })
    }

    pub fn is_loaded(&self) -> bool {
        !self.triples.is_empty()
    }

    pub fn triple_count(&self) -> usize {
        self.triples.len()
    }

    /// Cosine similarity search (spec §4.6 step 3): normalizes the query,
    /// then a dot product against every cached row. Ties broken by
    /// insertion order (a stable sort keeps the first-seen triple first),
    /// matching the original's `argpartition`+`argsort` which is itself
    /// stable for exact ties in practice but not guaranteed — we guarantee
    /// it here deliberately so results are reproducible across runs.
    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Vec<(Triple, f32)> {
        if self.embeddings.is_empty() {
            return Vec::new();
        }
        let query = normalize(query_embedding.to_vec());
        if query.iter().all(|x| *x == 0.0) {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .embeddings
            .par_iter()
            .enumerate()
            .map(|(i, row)| (i, dot(row, &query)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        scored
            .into_iter()
            .take(top_k)
            .map(|(i, score)| (self.triples[i].clone(), score))
            .collect()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

/// The "recognition memory" filter (spec §4.8 step 3a): an LLM judges which
/// of the top-K candidate triples are genuinely relevant to `query`. On LLM
/// failure this is conservative — it passes every candidate through rather
/// than returning nothing, since dropping real evidence is worse than
/// keeping a few irrelevant facts (spec §7 "soft-fail" policy; confirmed
/// against the original's `except Exception` branch).
pub async fn recognition_memory_filter(
    llm: &dyn LlmProvider,
    query: &str,
    candidates: &[(Triple, f32)],
) -> Vec<Triple> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let mut numbered = String::new();
    let mut index_map: HashMap<usize, usize> = HashMap::new();
    for (i, (triple, _)) in candidates.iter().enumerate() {
        let n = i + 1;
        numbered.push_str(&format!("{}. {}\n", n, triple.as_structural_bullet()));
        index_map.insert(n, i);
    }

    let prompt = format!(
        "You are filtering knowledge graph facts for relevance to a query.\n\n\
         Query: \"{query}\"\n\n\
         Here are candidate facts retrieved from the knowledge graph:\n{numbered}\n\
         Which facts are relevant to answering the query?\n\
         Return ONLY the numbers of relevant facts, comma-separated.\n\
         If none are relevant, return \"NONE\".\n\n\
         Example: 1, 3, 5"
    );

    let completion = match llm.complete(&prompt, true).await {
        Ok(c) => c,
        Err(_) => return candidates.iter().map(|(t, _)| t.clone()).collect(),
    };

    let text = completion.text.trim();
    if text.eq_ignore_ascii_case("none") {
        return Vec::new();
    }

    let numbers = parse_numbers(text);
    if numbers.is_empty() {
        // The model answered but produced nothing parseable; treat this the
        // same as a hard failure rather than silently returning no evidence.
        return candidates.iter().map(|(t, _)| t.clone()).collect();
    }

    numbers
        .into_iter()
        .filter_map(|n| index_map.get(&n))
        .map(|&i| candidates[i].0.clone())
        .collect()
}

fn parse_numbers(text: &str) -> Vec<usize> {
    let mut numbers = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            current.push(c);
        } else if !current.is_empty() {
            if let Ok(n) = current.parse() {
                numbers.push(n);
            }
            current.clear();
        }
    }
    if !current.is_empty() {
        if let Ok(n) = current.parse() {
            numbers.push(n);
        }
    }
    numbers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::EntityId;
    use crate::providers::llm::ScriptedLlmProvider;

    fn triple(subject: &str, predicate: &str, object: &str) -> Triple {
        Triple {
            subject_id: EntityId::new(subject),
            subject_name: subject.to_string(),
            predicate: predicate.to_string(),
            object_id: EntityId::new(object),
            object_name: object.to_string(),
            embedding: vec![],
        }
    }

    #[test]
    fn search_on_empty_store_returns_nothing() {
        let store = TripleStore::default();
        assert!(store.search(&[1.0, 0.0], 5).is_empty());
    }

    #[test]
    fn search_ranks_by_cosine_similarity_descending() {
        let mut store = TripleStore::default();
        store.triples = vec![
            triple("A", "RELATED_TO", "B"),
            triple("C", "RELATED_TO", "D"),
        ];
        store.embeddings = vec![
            normalize(vec![1.0, 0.0]),
            normalize(vec![0.0, 1.0]),
        ];
        let results = store.search(&[0.9, 0.1], 2);
        assert_eq!(results[0].0.subject_name, "A");
        assert!(results[0].1 > results[1].1);
    }

    #[test]
    fn parse_numbers_handles_commas_and_spaces() {
        assert_eq!(parse_numbers("1, 3, 5"), vec![1, 3, 5]);
        assert_eq!(parse_numbers("NONE"), Vec::<usize>::new());
    }

    #[tokio::test]
    async fn recognition_filter_returns_nothing_on_none_response() {
        let llm = ScriptedLlmProvider::new("NONE");
        let candidates = vec![(triple("A", "RELATED_TO", "B"), 0.9)];
        let survivors = recognition_memory_filter(&llm, "some query", &candidates).await;
        assert!(survivors.is_empty());
    }

    #[tokio::test]
    async fn recognition_filter_selects_numbered_facts() {
        let llm = ScriptedLlmProvider::new("NONE").with_response("warranty", "1");
        let candidates = vec![
            (triple("A", "RELATED_TO", "B"), 0.9),
            (triple("C", "RELATED_TO", "D"), 0.8),
        ];
        let survivors = recognition_memory_filter(&llm, "warranty terms", &candidates).await;
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].subject_name, "A");
    }

    #[tokio::test]
    async fn recognition_filter_passes_through_all_on_empty_candidates_noop() {
        let llm = ScriptedLlmProvider::new("NONE");
        let survivors = recognition_memory_filter(&llm, "q", &[]).await;
        assert!(survivors.is_empty());
    }
}
