//! Retrieval Gateway: relevance-filtered fact lookup.
//!
//! Wraps a [`KnowledgeStore`] and applies the relevance floor. Store
//! failures degrade to "no facts" so a broken store never fails a turn.

use std::sync::Arc;

use ordered_float::OrderedFloat;
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::knowledge::KnowledgeStore;
use crate::types::{CharacterId, RetrievedFact};

/// Relevance-filtered view over a knowledge store.
#[derive(Clone)]
pub struct RetrievalGateway {
    store: Arc<dyn KnowledgeStore>,
    relevance_floor: f32,
}

impl RetrievalGateway {
    /// Gateway over `store` using the configured floor.
    #[must_use]
    pub fn new(store: Arc<dyn KnowledgeStore>, config: &RetrievalConfig) -> Self {
        Self {
            store,
            relevance_floor: config.relevance_floor,
        }
    }

    /// Underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KnowledgeStore> {
        &self.store
    }

    /// Facts strictly above the floor, best first, at most `max_results`.
    /// Each fact keeps the rank the store assigned it.
    pub async fn retrieve(
        &self,
        character_id: &CharacterId,
        query: &str,
        max_results: usize,
    ) -> Vec<RetrievedFact> {
        if max_results == 0 {
            return Vec::new();
        }

        let candidates = match self.store.search(character_id, query, max_results).await {
            Ok(facts) => facts,
            Err(e) => {
                warn!(character = %character_id, error = %e, "Knowledge search failed, continuing without facts");
                return Vec::new();
            }
        };

        let returned = candidates.len();
        let mut relevant: Vec<RetrievedFact> = candidates
            .into_iter()
            .filter(|fact| fact.relevance_score > self.relevance_floor)
            .collect();
        relevant.sort_by_key(|fact| std::cmp::Reverse(OrderedFloat(fact.relevance_score)));
        relevant.truncate(max_results);

        debug!(
            character = %character_id,
            returned,
            kept = relevant.len(),
            floor = self.relevance_floor,
            "Retrieved facts"
        );
        relevant
    }
}
