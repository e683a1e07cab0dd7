//! Hierarchical community detection and summarization (spec §4.4 steps
//! 10-11). Community membership is derived from a threshold cascade over
//! the entity relationship/similarity subgraph using `petgraph`'s
//! union-find: level 0 unions only the strongest edges (finest clusters),
//! each subsequent level relaxes the threshold, so level *L*'s communities
//! are always unions of level *L-1*'s (a strictly monotonic hierarchy, unlike
//! Neo4j GDS's Leiden/Louvain writeback this is grounded on — no GDS
//! equivalent exists outside a running Neo4j instance, so this reproduces
//! the same "coarser levels merge finer ones" property with a simpler,
//! fully deterministic algorithm).
//!
//! Summarization is grounded on
//! `graphrag-orchestration/app/v3/services/indexing_pipeline.py::_generate_community_summary`:
//! a prompt that must use only the supplied excerpts, a hallucination check
//! (every concrete value the model wrote must be traceable to the excerpts),
//! an omission check (every concrete fact present in the excerpts must
//! survive into the report), up to two corrective re-prompts, and a final
//! enumerative fallback if grounding still fails.

use crate::config::RetrievalConfig;
use crate::ids::{ChunkId, EntityId, GroupId};
use crate::model::{Community, Entity, Relationship};
use crate::providers::graph_store::{EntitySimilarityEdge, GraphStoreError};
use crate::providers::{EmbeddingProvider, GraphStore, LlmProvider};
use petgraph::unionfind::UnionFind;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

const MAX_EXCERPTS: usize = 20;
const MAX_EXCERPT_CHARS: usize = 1500;
const MAX_TOTAL_EXCERPT_CHARS: usize = 8000;
const MIN_CANDIDATE_CHUNKS: usize = 12;
const MAX_FACT_SPANS: usize = 14;

pub async fn detect_and_summarize(
    store: &dyn GraphStore,
    embedder: &dyn EmbeddingProvider,
    llm: &dyn LlmProvider,
    group_id: &GroupId,
    config: &RetrievalConfig,
) -> Result<usize, GraphStoreError> {
    let entities = store.all_entities(group_id).await?;
    if entities.is_empty() {
        return Ok(0);
    }
    let relationships = store.all_relationships(group_id).await?;
    let similarity_edges = store.entity_similarity_edges(group_id, 0.0).await?;

    let levels = detect_communities(&entities, &relationships, &similarity_edges, config);
    let entity_lookup: HashMap<EntityId, &Entity> = entities.iter().map(|e| (e.id.clone(), e)).collect();

    let mut count = 0;
    for (level, groups) in levels.into_iter().enumerate() {
        let total = groups.len().max(1);
        for entity_ids in groups {
            if entity_ids.is_empty() {
                continue;
            }
            let id = Community::derive_id(group_id, level, &entity_ids);
            let title = title_for(&entity_ids, &entity_lookup);
            let summary = summarize_community(store, embedder, llm, group_id, &title, &entity_ids, &entity_lookup).await;
            let summary_embedding = if summary.is_empty() {
                None
            } else {
                embedder.embed_query(&summary).await.ok()
            };
            let rank = entity_ids.len() as f32 / total as f32;
            let community = Community {
                id,
                group_id: group_id.clone(),
                level,
                entity_ids,
                title,
                summary,
                summary_embedding,
                rank,
            };
            store.upsert_community(&community).await?;
            count += 1;
        }
    }
    Ok(count)
}

/// Threshold-cascade union-find hierarchy: returns one level per entry in
/// `config.community_max_levels`, level 0 finest, each group a list of
/// member entity ids.
fn detect_communities(
    entities: &[Entity],
    relationships: &[Relationship],
    similarity_edges: &[EntitySimilarityEdge],
    config: &RetrievalConfig,
) -> Vec<Vec<Vec<EntityId>>> {
    let index: HashMap<EntityId, usize> = entities.iter().enumerate().map(|(i, e)| (e.id.clone(), i)).collect();

    let mut edges: Vec<(usize, usize, f32)> = Vec::new();
    for relationship in relationships {
        if let (Some(&a), Some(&b)) = (index.get(&relationship.source_id), index.get(&relationship.target_id)) {
            let weight = if relationship.weight > 0.0 { relationship.weight.min(1.0) } else { 1.0 };
            edges.push((a, b, weight));
        }
    }
    for edge in similarity_edges {
        if let (Some(&a), Some(&b)) = (index.get(&edge.source), index.get(&edge.target)) {
            edges.push((a, b, edge.similarity));
        }
    }

    let levels = config.community_max_levels.max(1);
    let thresholds = level_thresholds(levels, config.community_resolution);

    let mut result = Vec::with_capacity(levels);
    for threshold in thresholds {
        let mut uf = UnionFind::<usize>::new(entities.len());
        for &(a, b, weight) in &edges {
            if weight >= threshold {
                uf.union(a, b);
            }
        }
        let mut groups: HashMap<usize, Vec<EntityId>> = HashMap::new();
        for (i, entity) in entities.iter().enumerate() {
            groups.entry(uf.find(i)).or_default().push(entity.id.clone());
        }
        let mut level_groups: Vec<Vec<EntityId>> = groups.into_values().collect();
        for group in &mut level_groups {
            group.sort();
        }
        level_groups.sort_by(|a, b| a[0].cmp(&b[0]));
        result.push(level_groups);
    }
    result
}

/// Level 0's threshold is the strictest (finest clusters); each subsequent
/// level relaxes linearly down to 0 at the coarsest level, scaled by
/// `resolution` (higher resolution keeps more/smaller communities longer).
fn level_thresholds(levels: usize, resolution: f32) -> Vec<f32> {
    if levels == 1 {
        return vec![(0.9 * resolution).clamp(0.0, 1.0)];
    }
    (0..levels)
        .map(|i| {
            let t = 0.9 - (i as f32 / (levels - 1) as f32) * 0.9;
            (t * resolution).clamp(0.0, 1.0)
        })
        .collect()
}

fn title_for(entity_ids: &[EntityId], entities: &HashMap<EntityId, &Entity>) -> String {
    let mut names: Vec<&str> = entity_ids.iter().filter_map(|id| entities.get(id).map(|e| e.name.as_str())).collect();
    names.sort_unstable();
    names.truncate(3);
    if names.is_empty() {
        "Untitled community".to_string()
    } else {
        names.join(", ")
    }
}

async fn summarize_community(
    store: &dyn GraphStore,
    embedder: &dyn EmbeddingProvider,
    llm: &dyn LlmProvider,
    group_id: &GroupId,
    title: &str,
    entity_ids: &[EntityId],
    entities: &HashMap<EntityId, &Entity>,
) -> String {
    let members: Vec<&Entity> = entity_ids.iter().filter_map(|id| entities.get(id).copied()).collect();
    let fallback = || {
        let names: Vec<String> = members.iter().take(8).map(|e| e.name.clone()).collect();
        format!("Community entities: {}", names.join(", "))
    };
    if members.is_empty() {
        return String::new();
    }

    let mut chunk_counts: HashMap<ChunkId, usize> = HashMap::new();
    for member in &members {
        for chunk_id in &member.text_unit_ids {
            *chunk_counts.entry(chunk_id.clone()).or_insert(0) += 1;
        }
    }
    let mut chunk_ids: Vec<ChunkId> = chunk_counts.keys().cloned().collect();
    chunk_ids.sort_by(|a, b| chunk_counts[b].cmp(&chunk_counts[a]).then_with(|| a.cmp(b)));

    if chunk_ids.len() < MIN_CANDIDATE_CHUNKS {
        let names: Vec<String> = members.iter().take(10).map(|e| e.name.clone()).collect();
        let theme = format!("{}\n{}", title, names.join("\n"));
        if let Ok(query_embedding) = embedder.embed_query(&theme).await {
            if let Ok(hits) = store.vector_search_chunks(group_id, &query_embedding, MAX_EXCERPTS).await {
                for (chunk_id, _) in hits {
                    if !chunk_ids.contains(&chunk_id) {
                        chunk_ids.push(chunk_id);
                    }
                }
            }
        }
    }
    chunk_ids.truncate(MAX_EXCERPTS);

    let fetched = store.fetch_chunks(group_id, &chunk_ids).await.unwrap_or_default();
    let mut excerpts = Vec::new();
    let mut total_chars = 0usize;
    for result in &fetched {
        let text = truncate_chars(&result.chunk.text, MAX_EXCERPT_CHARS);
        let piece = format!("[Chunk {} | doc={}]\n{}", result.chunk.id, result.document_title, text);
        total_chars += piece.chars().count();
        excerpts.push(piece);
        if total_chars >= MAX_TOTAL_EXCERPT_CHARS {
            break;
        }
    }
    if excerpts.is_empty() {
        return fallback();
    }
    let excerpts_text = excerpts.join("\n\n---\n\n");

    let entity_hints: Vec<String> = members
        .iter()
        .take(15)
        .map(|e| format!("- {} ({})", e.name, e.label.as_str()))
        .collect();
    let required_fact_spans = extract_concrete_fact_spans(&excerpts_text);

    let prompt = build_prompt(title, &entity_hints, &excerpts_text, &required_fact_spans);
    let Ok(completion) = llm.complete(&prompt, true).await else {
        return fallback();
    };
    let mut report = completion.text.trim().to_string();
    if report.is_empty() {
        return fallback();
    }

    if !value_spans_grounded(&report, &excerpts_text) {
        let offending = extract_value_like_spans(&report);
        let fix_prompt = build_hallucination_fix_prompt(&offending, &excerpts_text);
        if let Ok(retry) = llm.complete(&fix_prompt, true).await {
            let candidate = retry.text.trim().to_string();
            if !candidate.is_empty() && value_spans_grounded(&candidate, &excerpts_text) {
                report = candidate;
            }
        }
    }

    if !required_fact_spans.is_empty() && !concrete_facts_covered(&report, &required_fact_spans) {
        let fix_prompt = build_omission_fix_prompt(&required_fact_spans, &excerpts_text);
        if let Ok(retry) = llm.complete(&fix_prompt, true).await {
            let candidate = retry.text.trim().to_string();
            if !candidate.is_empty() && value_spans_grounded(&candidate, &excerpts_text) && concrete_facts_covered(&candidate, &required_fact_spans) {
                report = candidate;
            }
        }
    }

    if !value_spans_grounded(&report, &excerpts_text) {
        return fallback();
    }
    report
}

fn build_prompt(title: &str, entity_hints: &[String], excerpts_text: &str, required_fact_spans: &[String]) -> String {
    format!(
        "You are writing a community report summarizing a cluster of related entities from a knowledge graph.\n\n\
         Rules:\n\
         - Use ONLY the text in the excerpts below. Do not invent or guess any value.\n\
         - If a specific value (amount, date, deadline, jurisdiction) is not explicitly present, write \"Not specified in excerpts.\"\n\
         - Any concrete fact listed below that appears in the excerpts must be carried into the report verbatim.\n\n\
         Community title: {title}\n\n\
         Entity hints:\n{}\n\n\
         Supporting excerpts:\n{excerpts_text}\n\n\
         Concrete facts to preserve: {:?}\n\n\
         Write a short report (Overview, Key entities, Key terms, Key dates) grounded entirely in the excerpts.\n\nReport:",
        entity_hints.join("\n"),
        required_fact_spans,
    )
}

fn build_hallucination_fix_prompt(offending: &[String], excerpts_text: &str) -> String {
    format!(
        "Your community report included values not present in the excerpts: {offending:?}.\n\
         Rewrite the report using ONLY the excerpts below. If a value is not present, write \"Not specified in excerpts.\"\n\n\
         Supporting excerpts:\n{excerpts_text}\n\nCorrected report:"
    )
}

fn build_omission_fix_prompt(required: &[String], excerpts_text: &str) -> String {
    format!(
        "Your community report omitted concrete facts present in the excerpts: {required:?}.\n\
         Rewrite the report to include all of them, verbatim or near-verbatim, without adding new facts.\n\n\
         Supporting excerpts:\n{excerpts_text}\n\nCorrected report:"
    )
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect::<String>() + "..."
    }
}

fn normalize_for_grounding(s: &str) -> String {
    whitespace_pattern().replace_all(&s.to_lowercase(), " ").trim().to_string()
}

fn alnum_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let key = alnum_only(&item.to_lowercase());
        if !key.is_empty() && seen.insert(key) {
            out.push(item);
        }
    }
    out
}

/// URLs, 4+ digit numbers, and alphanumeric codes (e.g. "AB-123") — the
/// kinds of value the model could plausibly hallucinate.
fn extract_value_like_spans(text: &str) -> Vec<String> {
    let mut spans = Vec::new();
    for m in money_pattern().find_iter(text) {
        spans.push(m.as_str().to_string());
    }
    for m in big_number_pattern().find_iter(text) {
        spans.push(m.as_str().to_string());
    }
    for m in alnum_id_pattern().find_iter(text) {
        spans.push(m.as_str().to_string());
    }
    dedup_preserving_order(spans)
}

/// Every value-like span in `answer` must have its alphanumeric content
/// traceable inside `context`'s alphanumeric content — a normalized
/// substring check that tolerates whitespace/punctuation differences.
fn value_spans_grounded(answer: &str, context: &str) -> bool {
    let context_key = alnum_only(&normalize_for_grounding(context));
    if context_key.is_empty() {
        return false;
    }
    for span in extract_value_like_spans(answer) {
        let span_key = alnum_only(&span.to_lowercase());
        if !span_key.is_empty() && !context_key.contains(&span_key) {
            return false;
        }
    }
    true
}

/// Up to `MAX_FACT_SPANS` concrete fact phrases found in the excerpts:
/// delivery/notice language, governing-law/jurisdiction phrases, deadlines,
/// and financial amounts (labeled and standalone).
fn extract_concrete_fact_spans(excerpts: &str) -> Vec<String> {
    let text = normalize_for_grounding(excerpts);
    if text.is_empty() {
        return Vec::new();
    }
    let mut spans = Vec::new();
    for phrase in [
        "certified mail return receipt requested",
        "return receipt requested",
        "certified mail",
        "written notice",
    ] {
        if text.contains(phrase) {
            spans.push(phrase.to_string());
        }
    }
    for m in governing_law_pattern().find_iter(&text) {
        spans.push(m.as_str().trim().to_string());
    }
    for m in deadline_pattern().find_iter(&text) {
        spans.push(m.as_str().trim().to_string());
    }
    for m in money_label_pattern().find_iter(&text) {
        spans.push(m.as_str().trim().to_string());
    }
    for m in money_pattern().find_iter(&text) {
        spans.push(m.as_str().trim().to_string());
    }
    dedup_preserving_order(spans).into_iter().take(MAX_FACT_SPANS).collect()
}

/// Every required fact span's alphanumeric content must appear somewhere in
/// the report's alphanumeric content.
fn concrete_facts_covered(report: &str, fact_spans: &[String]) -> bool {
    if fact_spans.is_empty() {
        return true;
    }
    let report_key = alnum_only(&normalize_for_grounding(report));
    if report_key.is_empty() {
        return false;
    }
    for span in fact_spans {
        let span_key = alnum_only(&span.to_lowercase());
        if !span_key.is_empty() && !report_key.contains(&span_key) {
            return false;
        }
    }
    true
}

fn whitespace_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}
fn money_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\s*\d[\d,]*(?:\.\d{2})?").unwrap())
}
fn big_number_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{4,}\b").unwrap())
}
fn alnum_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b[a-z]{1,6}[-_]\d{2,}\b").unwrap())
}
fn deadline_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{1,3}\s+(?:business\s+)?days\b").unwrap())
}
fn governing_law_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:governed by|laws of)\b[^.\n]{0,120}").unwrap())
}
fn money_label_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:subtotal|total|amount due|balance due)\b\s*[:\-|]?\s*\$?\s*\d[\d,]*(?:\.\d{2})?").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::EntityId;
    use crate::model::EntityLabel;

    fn group() -> GroupId {
        GroupId::new("g1")
    }

    #[test]
    fn level_thresholds_decrease_monotonically() {
        let thresholds = level_thresholds(4, 1.0);
        assert_eq!(thresholds.len(), 4);
        for pair in thresholds.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        assert_eq!(*thresholds.last().unwrap(), 0.0);
    }

    #[test]
    fn coarser_levels_are_unions_of_finer_levels() {
        let e1 = Entity::new(group(), "Fabrikam", EntityLabel::Organization);
        let e2 = Entity::new(group(), "Contoso", EntityLabel::Organization);
        let e3 = Entity::new(group(), "Acme", EntityLabel::Organization);
        let rel_weak = Relationship::new(group(), e1.id.clone(), e2.id.clone(), "RELATED_TO").with_weight(0.4);
        let rel_none_to_acme = Relationship::new(group(), e2.id.clone(), e3.id.clone(), "RELATED_TO").with_weight(0.05);
        let config = RetrievalConfig {
            community_max_levels: 3,
            community_resolution: 1.0,
            ..RetrievalConfig::default()
        };
        let levels = detect_communities(&[e1, e2, e3], &[rel_weak, rel_none_to_acme], &[], &config);
        assert_eq!(levels.len(), 3);

        // Every finest-level member set must be a subset of some coarser-level set.
        for fine_group in &levels[0] {
            let member = &fine_group[0];
            let contains_member = |ids: &Vec<EntityId>| ids.contains(member);
            assert!(levels[2].iter().any(|coarse_group| fine_group.iter().all(|m| coarse_group.contains(m)) && contains_member(coarse_group)));
        }
    }

    #[test]
    fn value_spans_grounded_rejects_invented_amounts() {
        let context = "The total due is $1,200.00 per the invoice.";
        let answer_ok = "The report shows a total of $1,200.00.";
        let answer_bad = "The report shows a total of $9,999.00.";
        assert!(value_spans_grounded(answer_ok, context));
        assert!(!value_spans_grounded(answer_bad, context));
    }

    #[test]
    fn concrete_facts_covered_requires_every_span() {
        let report = "Notice must be given in writing within 30 days.";
        let spans = vec!["30 days".to_string(), "written notice".to_string()];
        assert!(!concrete_facts_covered(report, &spans));
        let report2 = "Notice must be given via written notice within 30 days.";
        assert!(concrete_facts_covered(report2, &spans));
    }

    #[test]
    fn extract_concrete_fact_spans_finds_deadlines_and_money() {
        let excerpts = "Payment of $500.00 is due. Notice must be given within 60 business days.";
        let spans = extract_concrete_fact_spans(excerpts);
        assert!(spans.iter().any(|s| s.contains("500.00")));
        assert!(spans.iter().any(|s| s.contains("days")));
    }

    #[test]
    fn title_for_picks_up_to_three_sorted_names() {
        let mut lookup = HashMap::new();
        let e1 = Entity::new(group(), "Zeta", EntityLabel::Organization);
        let e2 = Entity::new(group(), "Alpha", EntityLabel::Organization);
        lookup.insert(e1.id.clone(), &e1);
        lookup.insert(e2.id.clone(), &e2);
        let title = title_for(&[e1.id.clone(), e2.id.clone()], &lookup);
        assert_eq!(title, "Alpha, Zeta");
    }
}
