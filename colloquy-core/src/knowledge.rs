//! Knowledge store seam and the bundled in-memory implementation.
//!
//! The store is partitioned by character: facts added for one persona are
//! never returned for another. Only partitions that were explicitly created
//! accept writes or answer searches.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use ordered_float::OrderedFloat;
use tracing::debug;

use crate::embedding::{cosine_similarity, Embedding, EmbeddingProvider, HashingEmbeddingProvider};
use crate::error::KnowledgeError;
use crate::types::{CharacterId, FactRecord, RetrievedFact};

/// Character-scoped semantic fact store.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Append facts to a character's partition. Returns how many were stored.
    ///
    /// # Errors
    /// [`KnowledgeError::UnknownPartition`] for a character without a
    /// partition, or a backend failure.
    async fn add(
        &self,
        character_id: &CharacterId,
        facts: &[FactRecord],
    ) -> Result<usize, KnowledgeError>;

    /// Up to `k` facts ranked by similarity to `query`, best first, with a
    /// relevance score in `[0, 1]` and a 1-based rank.
    ///
    /// # Errors
    /// [`KnowledgeError::UnknownPartition`] for a character without a
    /// partition, or a backend failure.
    async fn search(
        &self,
        character_id: &CharacterId,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedFact>, KnowledgeError>;

    /// Number of facts in a character's partition.
    ///
    /// # Errors
    /// [`KnowledgeError::UnknownPartition`] for a character without a partition.
    async fn count(&self, character_id: &CharacterId) -> Result<usize, KnowledgeError>;
}

struct StoredFact {
    record: FactRecord,
    embedding: Embedding,
}

/// Embedding-backed store held entirely in memory.
pub struct InMemoryKnowledgeStore {
    partitions: DashMap<CharacterId, Vec<StoredFact>>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl InMemoryKnowledgeStore {
    /// Empty store over the given embedding provider.
    #[must_use]
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            partitions: DashMap::new(),
            embedder,
        }
    }

    /// Empty store with one partition per id, using the hashing provider.
    #[must_use]
    pub fn with_partitions<'a>(ids: impl IntoIterator<Item = &'a CharacterId>) -> Self {
        let store = Self::new(Arc::new(HashingEmbeddingProvider::default()));
        for id in ids {
            store.create_partition(id);
        }
        store
    }

    /// Create a partition if it does not exist yet.
    pub fn create_partition(&self, character_id: &CharacterId) {
        self.partitions.entry(character_id.clone()).or_default();
    }

    /// Whether a partition exists.
    #[must_use]
    pub fn has_partition(&self, character_id: &CharacterId) -> bool {
        self.partitions.contains_key(character_id)
    }

    /// Copy of every record in a partition, in insertion order.
    #[must_use]
    pub fn records(&self, character_id: &CharacterId) -> Option<Vec<FactRecord>> {
        self.partitions
            .get(character_id)
            .map(|p| p.iter().map(|f| f.record.clone()).collect())
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn add(
        &self,
        character_id: &CharacterId,
        facts: &[FactRecord],
    ) -> Result<usize, KnowledgeError> {
        if !self.has_partition(character_id) {
            return Err(KnowledgeError::UnknownPartition(character_id.clone()));
        }

        let texts: Vec<&str> = facts.iter().map(FactRecord::search_text).collect();
        let embeddings = self.embedder.embed_batch(&texts)?;

        let mut partition = self
            .partitions
            .get_mut(character_id)
            .ok_or_else(|| KnowledgeError::UnknownPartition(character_id.clone()))?;
        partition.extend(
            facts
                .iter()
                .cloned()
                .zip(embeddings)
                .map(|(record, embedding)| StoredFact { record, embedding }),
        );

        debug!(character = %character_id, added = facts.len(), total = partition.len(), "Stored facts");
        Ok(facts.len())
    }

    async fn search(
        &self,
        character_id: &CharacterId,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedFact>, KnowledgeError> {
        let query_embedding = self.embedder.embed(query)?;

        let partition = self
            .partitions
            .get(character_id)
            .ok_or_else(|| KnowledgeError::UnknownPartition(character_id.clone()))?;

        let mut scored: Vec<(f32, &StoredFact)> = partition
            .iter()
            .map(|fact| {
                let score = cosine_similarity(&query_embedding, &fact.embedding).clamp(0.0, 1.0);
                (score, fact)
            })
            .collect();
        scored.sort_by_key(|(score, _)| std::cmp::Reverse(OrderedFloat(*score)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(i, (score, fact))| RetrievedFact {
                text: fact.record.text.clone(),
                category: fact.record.category.clone(),
                source: fact.record.source.clone(),
                relevance_score: score,
                rank: i + 1,
            })
            .collect())
    }

    async fn count(&self, character_id: &CharacterId) -> Result<usize, KnowledgeError> {
        self.partitions
            .get(character_id)
            .map(|p| p.len())
            .ok_or_else(|| KnowledgeError::UnknownPartition(character_id.clone()))
    }
}
