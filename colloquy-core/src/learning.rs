//! Learning Promoter: turns high-quality interactions into stored facts.
//!
//! Flow per interaction:
//!
//! ```text
//! assess ──► gates pass? ──no──► Skipped { reason }
//!                 │
//!                yes
//!                 ▼
//!   categorise query ──► build LearnedFact ──► store.add ──► statistics
//! ```
//!
//! The promoter never fails: a store error becomes
//! `Skipped { reason: "store unavailable" }` and is counted.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::LearningConfig;
use crate::knowledge::KnowledgeStore;
use crate::quality::{QualityAssessment, QualityEvaluator};
use crate::types::{CharacterId, FactRecord, RetrievedFact};

/// Subcategory stamped on every learned fact.
pub const USER_INTERACTION: &str = "user_interaction";

/// Skip reason used when the store rejects a promotion.
pub const STORE_UNAVAILABLE: &str = "store unavailable";

// ---------------------------------------------------------------------------
// LearnedFact / LearningOutcome
// ---------------------------------------------------------------------------

/// A fact derived from a live interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedFact {
    /// `"User inquiry: {query}. Response: {excerpt}..."`.
    pub text: String,
    /// The user's question, used as the fact's search key.
    pub inquiry: String,
    /// Keyword-derived category.
    pub category: String,
    /// Always [`USER_INTERACTION`].
    pub subcategory: String,
    /// `"interactive learning session YYYY-MM-DD"`.
    pub source: String,
    /// Overall score of the interaction.
    pub quality_score: f32,
    /// First 8 hex chars of the SHA-256 of the query.
    pub query_hash: String,
    /// When the fact was produced.
    pub learned_at: DateTime<Utc>,
}

impl LearnedFact {
    /// The record written to the knowledge store.
    ///
    /// Embedded on the inquiry alone so a short follow-up question is not
    /// diluted by the response excerpt.
    #[must_use]
    pub fn to_record(&self) -> FactRecord {
        FactRecord::new(self.text.clone(), self.category.clone(), self.source.clone())
            .with_search_key(self.inquiry.clone())
            .with_added_at(self.learned_at)
    }
}

/// Result of considering one interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum LearningOutcome {
    /// The fact was stored.
    Learned(LearnedFact),
    /// Nothing was stored.
    Skipped {
        /// Why not.
        reason: String,
    },
}

impl LearningOutcome {
    /// Whether a fact was stored.
    #[must_use]
    pub fn is_learned(&self) -> bool {
        matches!(self, Self::Learned(_))
    }
}

// ---------------------------------------------------------------------------
// LearningStatistics
// ---------------------------------------------------------------------------

/// Per-character learning tally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterLearning {
    /// Facts promoted for this character.
    pub learned_facts: u64,
    /// Promoted facts per category.
    pub categories: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
struct StatsInner {
    per_character: BTreeMap<CharacterId, CharacterLearning>,
    evaluations: u64,
    skips: u64,
    promotion_failures: u64,
}

/// Process-wide learning statistics, mutated only by the promoter.
#[derive(Debug, Default)]
pub struct LearningStatistics {
    inner: Mutex<StatsInner>,
}

/// Point-in-time view of [`LearningStatistics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningStatisticsSnapshot {
    /// Tally per character that has learned at least once.
    pub per_character: BTreeMap<CharacterId, CharacterLearning>,
    /// Sum of learned facts over all characters.
    pub total_learned_facts: u64,
    /// Characters with at least one learned fact.
    pub characters_learning: usize,
    /// Interactions evaluated.
    pub evaluations: u64,
    /// Interactions that were not promoted.
    pub skips: u64,
    /// Promotions the store rejected.
    pub promotion_failures: u64,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

impl LearningStatistics {
    /// Empty statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record_evaluation(&self) {
        self.inner.lock().evaluations += 1;
    }

    fn record_skip(&self) {
        self.inner.lock().skips += 1;
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.skips += 1;
        inner.promotion_failures += 1;
    }

    fn record_learned(&self, character_id: &CharacterId, category: &str) {
        let mut inner = self.inner.lock();
        let entry = inner.per_character.entry(character_id.clone()).or_default();
        entry.learned_facts += 1;
        *entry.categories.entry(category.to_string()).or_insert(0) += 1;
    }

    /// Snapshot stamped with the current time.
    #[must_use]
    pub fn snapshot(&self) -> LearningStatisticsSnapshot {
        self.snapshot_at(Utc::now())
    }

    /// Snapshot stamped with `now`.
    #[must_use]
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> LearningStatisticsSnapshot {
        let inner = self.inner.lock();
        LearningStatisticsSnapshot {
            per_character: inner.per_character.clone(),
            total_learned_facts: inner.per_character.values().map(|c| c.learned_facts).sum(),
            characters_learning: inner.per_character.len(),
            evaluations: inner.evaluations,
            skips: inner.skips,
            promotion_failures: inner.promotion_failures,
            timestamp: now,
        }
    }

    /// Clear every counter.
    pub fn reset(&self) {
        *self.inner.lock() = StatsInner::default();
    }
}

// ---------------------------------------------------------------------------
// LearningPromoter
// ---------------------------------------------------------------------------

/// Evaluates interactions and writes the good ones back to the store.
pub struct LearningPromoter {
    store: Arc<dyn KnowledgeStore>,
    evaluator: QualityEvaluator,
    config: LearningConfig,
    stats: Arc<LearningStatistics>,
}

impl LearningPromoter {
    /// Create a promoter with fresh statistics.
    #[must_use]
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        evaluator: QualityEvaluator,
        config: LearningConfig,
    ) -> Self {
        Self {
            store,
            evaluator,
            config,
            stats: Arc::new(LearningStatistics::new()),
        }
    }

    /// Shared statistics handle.
    #[must_use]
    pub fn statistics(&self) -> &Arc<LearningStatistics> {
        &self.stats
    }

    /// Evaluator in use.
    #[must_use]
    pub fn evaluator(&self) -> &QualityEvaluator {
        &self.evaluator
    }

    /// Consider one interaction for promotion.
    pub async fn consider_learning(
        &self,
        character_id: &CharacterId,
        query: &str,
        facts: &[RetrievedFact],
        response: &str,
    ) -> LearningOutcome {
        self.consider_learning_at(character_id, query, facts, response, Utc::now())
            .await
    }

    /// Consider one interaction, stamping any learned fact with `now`.
    pub async fn consider_learning_at(
        &self,
        character_id: &CharacterId,
        query: &str,
        facts: &[RetrievedFact],
        response: &str,
        now: DateTime<Utc>,
    ) -> LearningOutcome {
        if !self.config.enabled {
            return LearningOutcome::Skipped {
                reason: "learning disabled".to_string(),
            };
        }

        self.stats.record_evaluation();
        let assessment = self.evaluator.assess(query, facts, response);
        if !assessment.should_learn {
            debug!(character = %character_id, reason = %assessment.reason, "Interaction not promoted");
            self.stats.record_skip();
            return LearningOutcome::Skipped {
                reason: assessment.reason,
            };
        }

        let fact = self.build_fact(query, response, &assessment, now);
        match self.store.add(character_id, &[fact.to_record()]).await {
            Ok(_) => {
                self.stats.record_learned(character_id, &fact.category);
                info!(
                    character = %character_id,
                    category = %fact.category,
                    score = fact.quality_score,
                    hash = %fact.query_hash,
                    "Learned new fact"
                );
                LearningOutcome::Learned(fact)
            }
            Err(e) => {
                warn!(character = %character_id, error = %e, "Failed to store learned fact");
                self.stats.record_failure();
                LearningOutcome::Skipped {
                    reason: STORE_UNAVAILABLE.to_string(),
                }
            }
        }
    }

    /// First category whose keywords appear in the query, else the default.
    #[must_use]
    pub fn categorize(&self, query: &str) -> String {
        let lower = query.to_lowercase();
        self.config
            .categories
            .iter()
            .find(|rule| {
                rule.keywords
                    .iter()
                    .any(|k| lower.contains(k.to_lowercase().as_str()))
            })
            .map_or_else(|| self.config.default_category.clone(), |rule| rule.category.clone())
    }

    fn build_fact(
        &self,
        query: &str,
        response: &str,
        assessment: &QualityAssessment,
        now: DateTime<Utc>,
    ) -> LearnedFact {
        let excerpt: String = response
            .chars()
            .take(self.config.response_excerpt_chars)
            .collect();
        LearnedFact {
            text: format!("User inquiry: {query}. Response: {excerpt}..."),
            inquiry: query.to_string(),
            category: self.categorize(query),
            subcategory: USER_INTERACTION.to_string(),
            source: format!("interactive learning session {}", now.format("%Y-%m-%d")),
            quality_score: assessment.overall_score,
            query_hash: query_hash(query),
            learned_at: now,
        }
    }
}

/// First 8 hex characters of the SHA-256 digest of `query`.
#[must_use]
pub fn query_hash(query: &str) -> String {
    let digest = Sha256::digest(query.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(8);
    hex
}
