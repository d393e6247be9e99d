//! Shared fixtures for the Colloquy benchmark suite.

use colloquy_core::types::{RetrievedFact, SessionId};

/// Utterances covering both routes and every routing reason.
pub const UTTERANCES: &[&str] = &[
    "hello",
    "thank you, that was interesting",
    "How did gladiators train for combat in the ludus?",
    "Tell me about the construction of the great dome",
    "ok",
    "The river flooded the fields again this season near the temple",
];

/// A specific question and an informative first-person answer.
pub const QUERY: &str = "How did you train new gladiators for combat in the ludus?";

/// Answer paired with [`QUERY`].
pub const RESPONSE: &str = "I trained them daily with wooden swords, because the technique \
                            must become instinct. During my 8 years we drilled footwork specifically.";

/// `n` retrieved facts with descending relevance over a few categories.
#[must_use]
pub fn facts(n: usize) -> Vec<RetrievedFact> {
    const CATEGORIES: [&str; 3] = ["training", "combat_techniques", "daily_life"];
    (0..n)
        .map(|i| RetrievedFact {
            text: format!("Fact number {i} about life in the arena"),
            category: CATEGORIES[i % CATEGORIES.len()].to_string(),
            source: "bench".to_string(),
            relevance_score: 0.9 - (i as f32) * 0.05,
            rank: i + 1,
        })
        .collect()
}

/// Deterministic session id for the `i`-th bench session.
#[must_use]
pub fn session_id(i: usize) -> SessionId {
    SessionId(format!("bench-session-{i}"))
}
