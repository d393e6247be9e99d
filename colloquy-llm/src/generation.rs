//! Generation Gateway: persona-conditioned completion with a guaranteed line.
//!
//! The gateway never fails. Backend errors, timeouts and empty completions
//! all fall back to the persona's greeting, tagged `model_used = "fallback"`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use colloquy_core::config::{GenerationConfig, LlmConfig};
use colloquy_core::persona::Persona;
use colloquy_core::types::{Exchange, RetrievedFact};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::prompt::{clean_response, PromptTemplates, STOP_SEQUENCES};
use crate::types::{LlmRequest, LlmResponse};

/// `model_used` value for fallback responses.
pub const FALLBACK_MODEL: &str = "fallback";

/// Anything that can turn a prompt into text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Run one completion.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Model identifier reported in responses.
    fn model_name(&self) -> &str;
}

/// The line a character speaks for one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedResponse {
    /// Cleaned response text.
    pub text: String,
    /// Model that produced it, or [`FALLBACK_MODEL`].
    pub model_used: String,
    /// When generation finished.
    pub timestamp: DateTime<Utc>,
}

impl GeneratedResponse {
    /// Whether this is the canned fallback line.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.model_used == FALLBACK_MODEL
    }
}

/// Builds prompts, calls the backend and cleans the result.
pub struct GenerationGateway {
    backend: Arc<dyn CompletionBackend>,
    templates: PromptTemplates,
    config: GenerationConfig,
    timeout: Duration,
}

impl GenerationGateway {
    /// Gateway with built-in templates and a deadline covering every retry.
    #[must_use]
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        config: GenerationConfig,
        llm: &LlmConfig,
    ) -> Self {
        let attempts = u64::from(llm.max_retries) + 1;
        Self {
            backend,
            templates: PromptTemplates::builtin(),
            config,
            timeout: Duration::from_millis(llm.request_timeout_ms.saturating_mul(attempts)),
        }
    }

    /// Replace the prompt templates.
    #[must_use]
    pub fn with_templates(mut self, templates: PromptTemplates) -> Self {
        self.templates = templates;
        self
    }

    /// Override the overall deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Generate the character's reply.
    ///
    /// `facts = Some(..)` selects the retrieval-augmented template (an empty
    /// slice still counts and tells the model to use general knowledge);
    /// `None` selects the conversational template.
    pub async fn generate(
        &self,
        persona: &Persona,
        query: &str,
        facts: Option<&[RetrievedFact]>,
        history: Option<&[Exchange]>,
    ) -> GeneratedResponse {
        let history = history.unwrap_or(&[]);
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);

        let request = match facts {
            Some(facts) => LlmRequest::new(self.templates.render_retrieval(
                persona,
                query,
                facts,
                history,
                &self.config,
            ))
            .with_sampling(self.config.retrieval_temperature, self.config.retrieval_max_tokens),
            None => LlmRequest::new(self.templates.render_conversational(
                persona,
                query,
                history,
                &self.config,
            ))
            .with_sampling(
                self.config.conversational_temperature,
                self.config.conversational_max_tokens,
            ),
        }
        .with_stop(STOP_SEQUENCES)
        .with_timeout(timeout_ms);

        let outcome = match tokio::time::timeout(self.timeout, self.backend.complete(&request)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(timeout_ms)),
        };

        match outcome {
            Ok(response) => {
                let text = clean_response(&response.text, persona);
                if text.is_empty() {
                    warn!(character = %persona.id, "LLM returned an empty line, using fallback");
                    return self.fallback(persona);
                }
                debug!(
                    character = %persona.id,
                    model = %response.model,
                    latency_ms = response.latency_ms,
                    chars = text.len(),
                    "Generated response"
                );
                GeneratedResponse {
                    text,
                    model_used: response.model,
                    timestamp: Utc::now(),
                }
            }
            Err(e) => {
                warn!(character = %persona.id, error = %e, "Generation failed, using fallback");
                self.fallback(persona)
            }
        }
    }

    /// Model name of the backend.
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    fn fallback(&self, persona: &Persona) -> GeneratedResponse {
        GeneratedResponse {
            text: persona.greeting.clone(),
            model_used: FALLBACK_MODEL.to_string(),
            timestamp: Utc::now(),
        }
    }
}
