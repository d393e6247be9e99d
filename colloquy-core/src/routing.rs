//! Routing Policy: lexical triage between retrieval and plain conversation.
//!
//! The decision is pure and deterministic. Rules are applied in order and
//! the first one that fires wins:
//!
//! 1. a conversational marker on word boundaries → conversational
//! 2. a topical marker anywhere (substring) → retrieval
//! 3. trimmed utterance shorter than `min_retrieval_chars` → conversational
//! 4. otherwise → retrieval
//!
//! Conversational markers are whole-word so `"hi"` does not fire inside
//! `"which"`. Topical markers are substrings so a stem covers its
//! inflections.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::config::RoutingConfig;
use crate::types::Route;

/// Why a route was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", content = "detail", rename_all = "snake_case")]
pub enum RouteReason {
    /// Matched this conversational marker.
    ConversationalMarker(String),
    /// Matched this topical marker.
    TopicalMarker(String),
    /// Trimmed length below the retrieval threshold.
    TooShort(usize),
    /// Long enough to be worth a lookup.
    LongUtterance(usize),
}

impl fmt::Display for RouteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConversationalMarker(m) => write!(f, "conversational marker '{m}'"),
            Self::TopicalMarker(m) => write!(f, "topical marker '{m}'"),
            Self::TooShort(n) => write!(f, "too short ({n} chars)"),
            Self::LongUtterance(n) => write!(f, "long utterance ({n} chars)"),
        }
    }
}

/// A routing outcome plus the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDecision {
    /// Chosen path.
    pub route: Route,
    /// Rule that fired.
    pub reason: RouteReason,
}

/// Decides per utterance whether to consult the knowledge store.
#[derive(Debug, Clone)]
pub struct RoutingPolicy {
    conversational: Vec<String>,
    topical: Vec<String>,
    min_retrieval_chars: usize,
}

impl RoutingPolicy {
    /// Build a policy from configuration. Markers are lower-cased once here.
    #[must_use]
    pub fn new(config: &RoutingConfig) -> Self {
        let lower = |list: &[String]| -> Vec<String> {
            list.iter()
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect()
        };
        Self {
            conversational: lower(&config.conversational_markers),
            topical: lower(&config.topical_markers),
            min_retrieval_chars: config.min_retrieval_chars,
        }
    }

    /// `true` when the utterance should go through retrieval.
    #[must_use]
    pub fn should_use_retrieval(&self, utterance: &str) -> bool {
        self.decide(utterance).route == Route::Retrieval
    }

    /// Full decision with the rule that fired.
    #[must_use]
    pub fn decide(&self, utterance: &str) -> RouteDecision {
        let lower = utterance.to_lowercase();
        let padded = padded_words(&lower);

        let decision = if let Some(marker) = self
            .conversational
            .iter()
            .find(|m| padded.contains(&format!(" {} ", normalize_phrase(m))))
        {
            RouteDecision {
                route: Route::Conversational,
                reason: RouteReason::ConversationalMarker(marker.clone()),
            }
        } else if let Some(marker) = self.topical.iter().find(|m| lower.contains(m.as_str())) {
            RouteDecision {
                route: Route::Retrieval,
                reason: RouteReason::TopicalMarker(marker.clone()),
            }
        } else {
            let length = lower.trim().chars().count();
            if length < self.min_retrieval_chars {
                RouteDecision {
                    route: Route::Conversational,
                    reason: RouteReason::TooShort(length),
                }
            } else {
                RouteDecision {
                    route: Route::Retrieval,
                    reason: RouteReason::LongUtterance(length),
                }
            }
        };

        debug!(route = %decision.route, reason = %decision.reason, "Routing decision");
        decision
    }
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self::new(&RoutingConfig::default())
    }
}

/// Words of `text` joined by single spaces, with a leading and trailing
/// space so whole-word lookups reduce to a substring search.
fn padded_words(text: &str) -> String {
    format!(" {} ", normalize_phrase(text))
}

fn normalize_phrase(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RoutingPolicy {
        RoutingPolicy::default()
    }

    #[test]
    fn greeting_is_conversational() {
        assert!(!policy().should_use_retrieval("hello"));
        assert!(!policy().should_use_retrieval("Hello there!"));
    }

    #[test]
    fn acknowledgement_is_conversational() {
        assert!(!policy().should_use_retrieval("ok"));
        assert!(!policy().should_use_retrieval("OK."));
    }

    #[test]
    fn topical_question_uses_retrieval() {
        let decision = policy().decide("how did gladiators train for combat");
        assert_eq!(decision.route, Route::Retrieval);
        assert!(matches!(decision.reason, RouteReason::TopicalMarker(_)));
    }

    #[test]
    fn long_plain_sentence_uses_retrieval() {
        let text = "the river flows past the old stone bridge";
        assert!(text.len() >= 40);
        let decision = policy().decide(text);
        assert_eq!(decision.route, Route::Retrieval);
    }

    #[test]
    fn short_plain_sentence_is_conversational() {
        let decision = policy().decide("sounds lovely");
        assert_eq!(decision.route, Route::Conversational);
        assert_eq!(decision.reason, RouteReason::TooShort(13));
    }

    #[test]
    fn hi_does_not_fire_inside_which() {
        let decision = policy().decide("which emperor opened the games");
        assert_eq!(decision.route, Route::Retrieval);
    }

    #[test]
    fn conversational_marker_wins_over_topical() {
        let decision = policy().decide("thanks, how were the domes built?");
        assert_eq!(decision.route, Route::Conversational);
        assert_eq!(
            decision.reason,
            RouteReason::ConversationalMarker("thanks".to_string())
        );
    }

    #[test]
    fn multi_word_marker_matches_across_punctuation() {
        let decision = policy().decide("Thank you!");
        assert_eq!(decision.route, Route::Conversational);
    }

    #[test]
    fn empty_input_is_conversational() {
        assert!(!policy().should_use_retrieval(""));
        assert!(!policy().should_use_retrieval("   "));
    }

    #[test]
    fn markers_come_from_config() {
        let config = RoutingConfig {
            conversational_markers: vec!["salve".to_string()],
            topical_markers: vec!["aqueduct".to_string()],
            min_retrieval_chars: 5,
        };
        let policy = RoutingPolicy::new(&config);
        assert!(!policy.should_use_retrieval("Salve, Marcus"));
        assert!(policy.should_use_retrieval("aqueducts?"));
        assert!(!policy.should_use_retrieval("hmm"));
    }
}
