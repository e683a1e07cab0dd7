//! Global PageRank (spec §4.4 step 12): one non-personalized PageRank pass
//! over the whole entity+passage+section subgraph, persisted per entity via
//! `GraphStore::set_pagerank`.

use crate::config::RetrievalConfig;
use crate::ids::GroupId;
use crate::ppr::PprEngine;
use crate::providers::graph_store::GraphStoreError;
use crate::providers::GraphStore;

pub async fn compute_pagerank(store: &dyn GraphStore, group_id: &GroupId, config: &RetrievalConfig) -> Result<usize, GraphStoreError> {
    let engine = PprEngine::load_graph(store, group_id, config).await?;
    let scores = engine.global_pagerank(config.pagerank_damping, config.pagerank_max_iterations, config.ppr_convergence_threshold);
    if scores.is_empty() {
        return Ok(0);
    }
    store.set_pagerank(group_id, &scores).await?;
    Ok(scores.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphstore::SqliteGraphStore;
    use crate::ids::ChunkId;
    use crate::model::{Entity, EntityLabel, Relationship};

    fn group() -> GroupId {
        GroupId::new("g1")
    }

    #[tokio::test]
    async fn pagerank_is_empty_for_entity_free_group() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let config = RetrievalConfig::default();
        let count = compute_pagerank(&store, &group(), &config).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn pagerank_scores_every_entity() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let a = Entity::new(group(), "Fabrikam", EntityLabel::Organization).with_text_unit(ChunkId::new("c1"));
        let b = Entity::new(group(), "Contoso", EntityLabel::Organization).with_text_unit(ChunkId::new("c1"));
        let rel = Relationship::new(group(), a.id.clone(), b.id.clone(), "PARTY_TO");
        store.upsert_entity(&a).await.unwrap();
        store.upsert_entity(&b).await.unwrap();
        store.upsert_relationship(&rel).await.unwrap();

        let config = RetrievalConfig::default();
        let count = compute_pagerank(&store, &group(), &config).await.unwrap();
        assert_eq!(count, 2);
    }
}
