//! Core types for LLM requests and responses.

use serde::{Deserialize, Serialize};

/// A completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmRequest {
    /// Full prompt text.
    pub prompt: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f32,
    /// Nucleus sampling cutoff.
    pub top_p: f32,
    /// Sequences that end generation early.
    pub stop: Vec<String>,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
}

impl LlmRequest {
    /// A request with default sampling (0.7 temperature, 150 tokens).
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: 150,
            temperature: 0.7,
            top_p: 0.9,
            stop: Vec::new(),
            timeout_ms: 20_000,
        }
    }

    /// Set temperature and token budget.
    #[must_use]
    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Set stop sequences.
    #[must_use]
    pub fn with_stop(mut self, stop: &[&str]) -> Self {
        self.stop = stop.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// A response from the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// The generated text.
    pub text: String,
    /// How many tokens were generated.
    pub tokens_generated: u32,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Which model was used.
    pub model: String,
}
