//! PPR Engine (spec §4.7): true Personalized PageRank over a unified
//! Entity + Passage (+ optional Section) graph, the core of HippoRAG-2's
//! graph-augmented fusion. Grounded on
//! `original_source/src/worker/hybrid_v2/retrievers/hipporag2_ppr.py`.
//!
//! The graph is arena-style (`nodes[]`/`adj[]`, integer indices, no
//! pointers or `Rc`/`RefCell`) per Design Note §9 "Cyclic graphs" — entities
//! and passages reference each other in cycles that a borrow-checked
//! pointer graph can't express without unsafe code or reference counting,
//! so indices into flat vectors stand in for pointers.

use crate::config::RetrievalConfig;
use crate::ids::GroupId;
use crate::providers::graph_store::GraphStore;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Entity,
    Passage,
    Section,
}

struct NodeData {
    node_type: NodeType,
    /// Display name for entities, first 80 chars of text for passages.
    name: String,
}

/// The in-memory weighted, undirected graph a group's PPR run operates on.
/// Built once per group and cached alongside the group's `TripleStore`
/// (spec §5 "per-group single-flight lock").
#[derive(Default)]
pub struct PprEngine {
    node_ids: Vec<String>,
    nodes: Vec<NodeData>,
    node_index: HashMap<String, usize>,
    /// `adj[i]` = `[(target_idx, weight)]`, populated symmetrically for
    /// every edge (spec §4.7 "all edges undirected").
    adj: Vec<Vec<(usize, f32)>>,
    out_weight_sum: Vec<f32>,
}

impl PprEngine {
    pub fn is_loaded(&self) -> bool {
        !self.node_index.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.node_ids.len()
    }

    fn add_node(&mut self, node_id: &str, node_type: NodeType, name: &str) -> usize {
        if let Some(&idx) = self.node_index.get(node_id) {
            return idx;
        }
        let idx = self.node_ids.len();
        self.node_index.insert(node_id.to_string(), idx);
        self.node_ids.push(node_id.to_string());
        self.nodes.push(NodeData {
            node_type,
            name: name.to_string(),
        });
        self.adj.push(Vec::new());
        idx
    }

    /// Add an undirected edge; both directions get an adjacency entry so a
    /// single power-iteration pass over `adj[src]` naturally distributes
    /// mass both ways (spec §4.7 "bidirectional" graph construction).
    fn add_edge(&mut self, a: usize, b: usize, weight: f32) {
        self.adj[a].push((b, weight));
        self.adj[b].push((a, weight));
    }

    fn finalize(&mut self) {
        self.out_weight_sum = self
            .adj
            .iter()
            .map(|edges| edges.iter().map(|(_, w)| w).sum())
            .collect();
    }

    /// Load entity/passage (+section) nodes and their weighted edges for
    /// `group_id` (spec §4.7 steps 1-2, graph-construction rules). Canonicalizes
    /// undirected entity-entity and section-section edge pairs via
    /// `(min_idx, max_idx)` so a store that records both directions of the
    /// same relationship never double-counts its weight (the original's
    /// documented "Bug 11 fix").
    pub async fn load_graph(
        store: &dyn GraphStore,
        group_id: &GroupId,
        config: &RetrievalConfig,
    ) -> Result<Self, crate::error::GraphStoreError> {
        let mut engine = Self::default();

        for entity in store.all_entities(group_id).await? {
            engine.add_node(entity.id.as_str(), NodeType::Entity, &entity.name);
        }
        for chunk in store.all_chunks(group_id).await? {
            let preview: String = chunk.text.chars().take(80).collect();
            engine.add_node(chunk.id.as_str(), NodeType::Passage, &preview);
        }

        let mut seen_entity_edges: HashSet<(usize, usize)> = HashSet::new();
        for relationship in store.all_relationships(group_id).await? {
            let (Some(&src), Some(&tgt)) = (
                engine.node_index.get(relationship.source_id.as_str()),
                engine.node_index.get(relationship.target_id.as_str()),
            ) else {
                continue;
            };
            let key = (src.min(tgt), src.max(tgt));
            if seen_entity_edges.insert(key) {
                engine.add_edge(src, tgt, relationship.weight);
            }
        }

        for mention in store.mentions_for_group(group_id).await? {
            let (Some(&chunk_idx), Some(&entity_idx)) = (
                engine.node_index.get(mention.chunk_id.as_str()),
                engine.node_index.get(mention.entity_id.as_str()),
            ) else {
                continue;
            };
            engine.add_edge(chunk_idx, entity_idx, config.passage_node_weight);
        }

        let mut seen_synonym_edges: HashSet<(usize, usize)> = HashSet::new();
        for edge in store.entity_similarity_edges(group_id, config.synonym_threshold).await? {
            let (Some(&src), Some(&tgt)) = (
                engine.node_index.get(edge.source.as_str()),
                engine.node_index.get(edge.target.as_str()),
            ) else {
                continue;
            };
            let key = (src.min(tgt), src.max(tgt));
            if seen_synonym_edges.insert(key) {
                engine.add_edge(src, tgt, edge.similarity);
            }
        }

        if config.include_section_graph {
            for section in store.all_sections(group_id).await? {
                engine.add_node(section.id.as_str(), NodeType::Section, &section.title);
            }
            for (chunk_id, section_id) in store.chunk_section_edges(group_id).await? {
                let (Some(&chunk_idx), Some(&section_idx)) = (
                    engine.node_index.get(chunk_id.as_str()),
                    engine.node_index.get(section_id.as_str()),
                ) else {
                    continue;
                };
                engine.add_edge(chunk_idx, section_idx, config.section_edge_weight);
            }
            let mut seen_section_edges: HashSet<(usize, usize)> = HashSet::new();
            for (a, b, similarity) in store
                .section_similarity_edges(group_id, config.section_sim_threshold)
                .await?
            {
                let (Some(&src), Some(&tgt)) = (
                    engine.node_index.get(a.as_str()),
                    engine.node_index.get(b.as_str()),
                ) else {
                    continue;
                };
                let key = (src.min(tgt), src.max(tgt));
                if seen_section_edges.insert(key) {
                    engine.add_edge(src, tgt, similarity);
                }
            }
        }

        engine.finalize();
        Ok(engine)
    }

    /// Power-iterate Personalized PageRank from weighted entity/passage
    /// seeds (spec §4.7 step 3). Returns `(passage_scores, entity_scores)`,
    /// both sorted descending by score; empty when there is no graph or no
    /// seed mass (spec §8 boundary behavior — callers fall back to raw DPR
    /// in that case, not this function's job).
    pub fn run_ppr(
        &self,
        entity_seeds: &HashMap<String, f32>,
        passage_seeds: &HashMap<String, f32>,
        damping: f32,
        max_iterations: usize,
        convergence_threshold: f64,
    ) -> (Vec<(String, f32)>, Vec<(String, f32)>) {
        let n = self.node_count();
        if n == 0 {
            return (Vec::new(), Vec::new());
        }

        let mut personalization = vec![0.0f32; n];
        for (node_id, weight) in entity_seeds {
            if let Some(&idx) = self.node_index.get(node_id) {
                personalization[idx] += weight;
            }
        }
        for (node_id, weight) in passage_seeds {
            if let Some(&idx) = self.node_index.get(node_id) {
                personalization[idx] += weight;
            }
        }

        let total: f32 = personalization.iter().sum();
        if total <= 0.0 {
            return (Vec::new(), Vec::new());
        }
        for p in personalization.iter_mut() {
            *p /= total;
        }

        let mut rank = personalization.clone();

        for _ in 0..max_iterations {
            let mut new_rank: Vec<f32> = personalization.iter().map(|p| (1.0 - damping) * p).collect();

            for src in 0..n {
                if rank[src] == 0.0 {
                    continue;
                }
                let out_sum = self.out_weight_sum[src];
                if out_sum == 0.0 {
                    continue;
                }
                for &(tgt, weight) in &self.adj[src] {
                    new_rank[tgt] += damping * rank[src] * weight / out_sum;
                }
            }

            let diff: f64 = (0..n).map(|i| (new_rank[i] - rank[i]).abs() as f64).sum();
            rank = new_rank;
            if diff < convergence_threshold {
                break;
            }
        }

        let mut passage_scores = Vec::new();
        let mut entity_scores = Vec::new();
        for idx in 0..n {
            let score = rank[idx];
            match self.nodes[idx].node_type {
                NodeType::Passage => passage_scores.push((self.node_ids[idx].clone(), score)),
                NodeType::Entity => entity_scores.push((self.nodes[idx].name.clone(), score)),
                NodeType::Section => {}
            }
        }
        passage_scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        entity_scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        (passage_scores, entity_scores)
    }

    /// Global, non-personalized PageRank (spec §4.4 step 12): every node
    /// seeds uniformly rather than from a query's triple/DPR hits. Returns
    /// `(entity_id, score)` pairs only, sorted descending — passage and
    /// section scores aren't persisted anywhere, so there's no caller for
    /// them here the way `run_ppr`'s callers want passage scores too.
    pub fn global_pagerank(&self, damping: f32, max_iterations: usize, convergence_threshold: f64) -> Vec<(String, f32)> {
        let n = self.node_count();
        if n == 0 {
            return Vec::new();
        }

        let personalization = vec![1.0f32 / n as f32; n];
        let mut rank = personalization.clone();

        for _ in 0..max_iterations {
            let mut new_rank: Vec<f32> = personalization.iter().map(|p| (1.0 - damping) * p).collect();

            for src in 0..n {
                if rank[src] == 0.0 {
                    continue;
                }
                let out_sum = self.out_weight_sum[src];
                if out_sum == 0.0 {
                    continue;
                }
                for &(tgt, weight) in &self.adj[src] {
                    new_rank[tgt] += damping * rank[src] * weight / out_sum;
                }
            }

            let diff: f64 = (0..n).map(|i| (new_rank[i] - rank[i]).abs() as f64).sum();
            rank = new_rank;
            if diff < convergence_threshold {
                break;
            }
        }

        let mut entity_scores: Vec<(String, f32)> = (0..n)
            .filter(|&idx| self.nodes[idx].node_type == NodeType::Entity)
            .map(|idx| (self.node_ids[idx].clone(), rank[idx]))
            .collect();
        entity_scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        entity_scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeds(pairs: &[(&str, f32)]) -> HashMap<String, f32> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn empty_graph_returns_no_scores() {
        let engine = PprEngine::default();
        let (p, e) = engine.run_ppr(&seeds(&[("x", 1.0)]), &HashMap::new(), 0.5, 50, 1e-6);
        assert!(p.is_empty());
        assert!(e.is_empty());
    }

    #[test]
    fn zero_seed_mass_returns_no_scores() {
        let mut engine = PprEngine::default();
        engine.add_node("e1", NodeType::Entity, "Fabrikam");
        engine.finalize();
        let (p, e) = engine.run_ppr(&HashMap::new(), &HashMap::new(), 0.5, 50, 1e-6);
        assert!(p.is_empty());
        assert!(e.is_empty());
    }

    #[test]
    fn mass_flows_from_entity_seed_to_connected_passage() {
        let mut engine = PprEngine::default();
        let e1 = engine.add_node("e1", NodeType::Entity, "Fabrikam");
        let c1 = engine.add_node("c1", NodeType::Passage, "preview text");
        engine.add_edge(e1, c1, 0.05);
        engine.finalize();

        let (passages, entities) = engine.run_ppr(&seeds(&[("e1", 1.0)]), &HashMap::new(), 0.5, 50, 1e-6);
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].0, "c1");
        assert!(passages[0].1 > 0.0);
        assert_eq!(entities[0].0, "Fabrikam");
        assert!(entities[0].1 > passages[0].1);
    }

    #[test]
    fn undirected_edge_pair_is_not_double_counted() {
        // Two entities connected by a single RELATED_TO edge should behave
        // identically whether load_graph saw it once or (if a store returned
        // both directions) twice, thanks to canonical-pair dedup in
        // load_graph. Here we exercise add_edge directly since that dedup
        // lives in load_graph, not add_edge itself.
        let mut engine = PprEngine::default();
        let a = engine.add_node("a", NodeType::Entity, "A");
        let b = engine.add_node("b", NodeType::Entity, "B");
        engine.add_edge(a, b, 1.0);
        engine.finalize();
        assert_eq!(engine.out_weight_sum[a], 1.0);
        assert_eq!(engine.out_weight_sum[b], 1.0);
    }

    #[test]
    fn results_are_sorted_descending() {
        let mut engine = PprEngine::default();
        let e1 = engine.add_node("e1", NodeType::Entity, "E1");
        let c1 = engine.add_node("c1", NodeType::Passage, "p1");
        let c2 = engine.add_node("c2", NodeType::Passage, "p2");
        engine.add_edge(e1, c1, 0.1);
        engine.add_edge(e1, c2, 0.01);
        engine.finalize();
        let (passages, _) = engine.run_ppr(&seeds(&[("e1", 1.0)]), &HashMap::new(), 0.5, 50, 1e-6);
        assert_eq!(passages[0].0, "c1");
        assert!(passages[0].1 >= passages[1].1);
    }

    #[test]
    fn deterministic_across_repeated_runs() {
        let mut engine = PprEngine::default();
        let e1 = engine.add_node("e1", NodeType::Entity, "E1");
        let c1 = engine.add_node("c1", NodeType::Passage, "p1");
        engine.add_edge(e1, c1, 0.05);
        engine.finalize();
        let seeds_map = seeds(&[("e1", 1.0)]);
        let first = engine.run_ppr(&seeds_map, &HashMap::new(), 0.5, 50, 1e-6);
        let second = engine.run_ppr(&seeds_map, &HashMap::new(), 0.5, 50, 1e-6);
        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
    }
}
