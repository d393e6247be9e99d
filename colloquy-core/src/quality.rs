//! Quality Evaluator: heuristic scoring of a finished interaction.
//!
//! Four components, each in `[0, 1]`, combined by a weighted sum:
//!
//! | Component                  | Signal                                               |
//! |----------------------------|------------------------------------------------------|
//! | `query_specificity`        | interrogative / domain keywords, query length         |
//! | `fact_relevance`           | mean retrieval relevance, category diversity          |
//! | `response_informativeness` | length, informative vocabulary, first-person voice    |
//! | `response_accuracy`        | confidence vs. hedging phrases around a baseline      |
//!
//! All of these are cheap lexical estimates. `response_accuracy` in
//! particular is a tone heuristic, not a correctness check.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{QualityConfig, QualityWeights};
use crate::types::RetrievedFact;

/// Scores for one interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// How pointed the user's question was.
    pub query_specificity: f32,
    /// How relevant and varied the retrieved facts were.
    pub fact_relevance: f32,
    /// How much substance the response carries.
    pub response_informativeness: f32,
    /// Estimated reliability of the response.
    pub response_accuracy: f32,
    /// Weighted sum of the components.
    pub overall_score: f32,
    /// Whether the interaction clears both learning gates.
    pub should_learn: bool,
    /// Human-readable summary, e.g. `"score 0.42, specificity 0.30"`.
    pub reason: String,
}

/// Scores interactions and applies the learning gates.
#[derive(Debug, Clone)]
pub struct QualityEvaluator {
    weights: QualityWeights,
    learning_threshold: f32,
    specificity_threshold: f32,
    specificity_keywords: Vec<String>,
    informative_keywords: Vec<String>,
    first_person_words: HashSet<String>,
    confidence_markers: Vec<String>,
    hedging_markers: Vec<String>,
    target_response_words: usize,
    baseline_accuracy: f32,
}

impl QualityEvaluator {
    /// Build an evaluator from configuration, resolving the profile.
    #[must_use]
    pub fn new(config: &QualityConfig) -> Self {
        let lower = |list: &[String]| -> Vec<String> {
            list.iter().map(|s| s.to_lowercase()).collect()
        };
        Self {
            weights: config.effective_weights(),
            learning_threshold: config.effective_learning_threshold(),
            specificity_threshold: config.effective_specificity_threshold(),
            specificity_keywords: lower(&config.specificity_keywords),
            informative_keywords: lower(&config.informative_keywords),
            first_person_words: config
                .first_person_words
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            confidence_markers: lower(&config.confidence_markers),
            hedging_markers: lower(&config.hedging_markers),
            target_response_words: config.target_response_words.max(1),
            baseline_accuracy: config.baseline_accuracy,
        }
    }

    /// Weights in effect.
    #[must_use]
    pub fn weights(&self) -> QualityWeights {
        self.weights
    }

    /// Score an interaction.
    #[must_use]
    pub fn assess(&self, query: &str, facts: &[RetrievedFact], response: &str) -> QualityAssessment {
        self.assess_with_rating(query, facts, response, None)
    }

    /// Score an interaction, using an externally supplied accuracy rating
    /// (e.g. user feedback) instead of the lexical estimate when present.
    #[must_use]
    pub fn assess_with_rating(
        &self,
        query: &str,
        facts: &[RetrievedFact],
        response: &str,
        accuracy_rating: Option<f32>,
    ) -> QualityAssessment {
        let query_specificity = self.query_specificity(query);
        let fact_relevance = fact_relevance(facts);
        let response_informativeness = self.response_informativeness(response);
        let response_accuracy = accuracy_rating
            .map_or_else(|| self.response_accuracy(response), |r| r.clamp(0.0, 1.0));

        let w = self.weights;
        let overall_score = query_specificity * w.query_specificity
            + fact_relevance * w.fact_relevance
            + response_informativeness * w.response_informativeness
            + response_accuracy * w.response_accuracy;

        let should_learn = overall_score >= self.learning_threshold
            && query_specificity >= self.specificity_threshold;

        let assessment = QualityAssessment {
            query_specificity,
            fact_relevance,
            response_informativeness,
            response_accuracy,
            overall_score,
            should_learn,
            reason: format!("score {overall_score:.2}, specificity {query_specificity:.2}"),
        };

        debug!(
            specificity = query_specificity,
            relevance = fact_relevance,
            informativeness = response_informativeness,
            accuracy = response_accuracy,
            overall = overall_score,
            should_learn,
            "Quality assessed"
        );
        assessment
    }

    /// +0.1 per keyword present, halved for short queries, boosted for long
    /// ones, clamped to `[0, 1]`.
    #[must_use]
    pub fn query_specificity(&self, query: &str) -> f32 {
        let lower = query.to_lowercase();
        let mut score = 0.1 * count_contained(&lower, &self.specificity_keywords);

        let words = query.split_whitespace().count();
        if words < 4 {
            score *= 0.5;
        }
        if words > 8 {
            score *= 1.2;
        }
        score.clamp(0.0, 1.0)
    }

    /// Length, vocabulary and first-person voice, weighted 0.4/0.4/0.2.
    #[must_use]
    pub fn response_informativeness(&self, response: &str) -> f32 {
        let lower = response.to_lowercase();

        #[allow(clippy::cast_precision_loss)]
        let length_score = {
            let words = response.split_whitespace().count() as f32;
            (words / self.target_response_words as f32).min(1.0)
        };

        let mut content = 0.1 * count_contained(&lower, &self.informative_keywords);
        if response.chars().any(|c| c.is_ascii_digit()) {
            content += 0.1;
        }
        let content_score = content.min(1.0);

        let voiced: HashSet<&str> = lower
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| self.first_person_words.contains(*w))
            .collect();
        #[allow(clippy::cast_precision_loss)]
        let voice_score = (voiced.len() as f32 / 3.0).min(1.0);

        (0.4 * length_score + 0.4 * content_score + 0.2 * voice_score).clamp(0.0, 1.0)
    }

    /// Baseline ±0.1 per confidence/hedging phrase, clamped to `[0, 1]`.
    #[must_use]
    pub fn response_accuracy(&self, response: &str) -> f32 {
        let lower = response.to_lowercase();
        let confidence = count_contained(&lower, &self.confidence_markers);
        let hedging = count_contained(&lower, &self.hedging_markers);
        (self.baseline_accuracy + 0.1 * confidence - 0.1 * hedging).clamp(0.0, 1.0)
    }
}

impl Default for QualityEvaluator {
    fn default() -> Self {
        Self::new(&QualityConfig::default())
    }
}

/// `0.7 · mean relevance + 0.3 · category diversity`; zero without facts.
#[must_use]
pub fn fact_relevance(facts: &[RetrievedFact]) -> f32 {
    if facts.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = facts.len() as f32;
    let mean = facts.iter().map(|f| f.relevance_score.clamp(0.0, 1.0)).sum::<f32>() / n;
    let categories: HashSet<&str> = facts.iter().map(|f| f.category.as_str()).collect();
    #[allow(clippy::cast_precision_loss)]
    let diversity = categories.len() as f32 / n;
    (0.7 * mean + 0.3 * diversity).clamp(0.0, 1.0)
}

/// How many of `needles` occur in `haystack` as substrings.
#[allow(clippy::cast_precision_loss)]
fn count_contained(haystack: &str, needles: &[String]) -> f32 {
    needles.iter().filter(|n| haystack.contains(n.as_str())).count() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QualityProfile;

    fn fact(score: f32, category: &str) -> RetrievedFact {
        RetrievedFact {
            text: "fact".to_string(),
            category: category.to_string(),
            source: "test".to_string(),
            relevance_score: score,
            rank: 1,
        }
    }

    #[test]
    fn no_facts_means_zero_relevance() {
        let eval = QualityEvaluator::default();
        let a = eval.assess("How did gladiators train?", &[], "We trained daily.");
        assert_eq!(a.fact_relevance, 0.0);
    }

    #[test]
    fn fact_relevance_blends_mean_and_diversity() {
        let facts = [fact(0.8, "training"), fact(0.6, "training")];
        // 0.7 * 0.7 + 0.3 * 0.5
        assert!((fact_relevance(&facts) - 0.64).abs() < 1e-5);
    }

    #[test]
    fn short_queries_are_halved() {
        let eval = QualityEvaluator::default();
        // "how" only, two words
        assert!((eval.query_specificity("how so") - 0.05).abs() < 1e-6);
    }

    #[test]
    fn long_queries_are_boosted() {
        let eval = QualityEvaluator::default();
        let query = "please explain the training method used by the veterans at the school";
        // explain, training, method = 0.3, 12 words, * 1.2
        assert!((eval.query_specificity(query) - 0.36).abs() < 1e-5);
    }

    #[test]
    fn specificity_is_clamped() {
        let eval = QualityEvaluator::default();
        let query = "how why when where what which describe explain technique method \
                     process construction training weapon material design";
        assert!((eval.query_specificity(query) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn accuracy_moves_with_markers() {
        let eval = QualityEvaluator::default();
        assert!((eval.response_accuracy("It was so.") - 0.7).abs() < 1e-6);
        assert!((eval.response_accuracy("Exactly as documented.") - 0.9).abs() < 1e-6);
        assert!((eval.response_accuracy("It might perhaps be unclear.") - 0.4).abs() < 1e-6);
    }

    #[test]
    fn first_person_voice_counts_whole_words() {
        let eval = QualityEvaluator::default();
        // "mine" and "wemust" are not first-person words
        let without = eval.response_informativeness("mine wemust");
        let with = eval.response_informativeness("I and my men and our swords");
        assert!(with > without);
        // 7 words → 0.4 * 7/50; voice 3/3 → 0.2
        assert!((with - (0.4 * 7.0 / 50.0 + 0.2)).abs() < 1e-5);
    }

    #[test]
    fn numerals_count_as_content() {
        let eval = QualityEvaluator::default();
        let plain = eval.response_informativeness("many years");
        let numeric = eval.response_informativeness("8 years");
        assert!(numeric > plain);
    }

    #[test]
    fn specific_question_with_good_answer_is_learned() {
        let eval = QualityEvaluator::default();
        let a = eval.assess(
            "How did you train new gladiators for combat in the ludus?",
            &[fact(0.8, "training"), fact(0.7, "combat_techniques")],
            "I trained them daily with wooden swords, because the technique must become \
             instinct. During my 8 years in the ludus we drilled footwork specifically.",
        );
        assert!(a.should_learn, "{}", a.reason);
        assert!(a.reason.starts_with("score "));
    }

    #[test]
    fn greeting_is_not_learned() {
        let eval = QualityEvaluator::default();
        let a = eval.assess("hi", &[], "Salve!");
        assert!(!a.should_learn);
    }

    #[test]
    fn external_rating_replaces_estimate() {
        let eval = QualityEvaluator::default();
        let a = eval.assess_with_rating("q", &[], "might", Some(1.0));
        assert!((a.response_accuracy - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn balanced_profile_uses_lower_gate() {
        let config = QualityConfig {
            profile: QualityProfile::Balanced,
            ..QualityConfig::default()
        };
        let eval = QualityEvaluator::new(&config);
        assert!((eval.weights().fact_relevance - 0.3).abs() < 1e-6);
    }
}
