//! LLM Client: unified interface for Ollama and OpenAI-compatible backends.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use colloquy_core::config::LlmConfig;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::generation::CompletionBackend;
use crate::types::{LlmRequest, LlmResponse};

/// Provider backend for LLM inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmProvider {
    /// Ollama running locally (recommended).
    Ollama {
        /// Server root, e.g. `http://127.0.0.1:11434`.
        base_url: String,
    },
    /// OpenAI-compatible chat completions API.
    OpenAiCompatible {
        /// API root without the `/v1` suffix.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No LLM available; every call fails and the caller falls back.
    None,
}

/// HTTP client for a single configured model.
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    model: String,
    max_retries: u32,
    request_timeout_ms: u64,
}

impl LlmClient {
    /// Create a new LLM client.
    #[must_use]
    pub fn new(provider: LlmProvider, model: impl Into<String>, max_retries: u32) -> Self {
        Self {
            provider,
            http: Client::new(),
            model: model.into(),
            max_retries,
            request_timeout_ms: 20_000,
        }
    }

    /// Build a client from the `[llm]` configuration section.
    ///
    /// # Errors
    /// [`LlmError::ConfigError`] for an unknown provider or an OpenAI
    /// provider without an API key.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let provider = match config.provider.to_lowercase().as_str() {
            "ollama" => LlmProvider::Ollama { base_url },
            "openai" | "openai_compatible" => {
                let api_key = config.api_key.clone().ok_or_else(|| {
                    LlmError::ConfigError("llm.api_key is required for the openai provider".into())
                })?;
                LlmProvider::OpenAiCompatible { base_url, api_key }
            }
            "none" => LlmProvider::None,
            other => {
                return Err(LlmError::ConfigError(format!("unknown llm.provider '{other}'")));
            }
        };

        let mut client = Self::new(provider, config.model.clone(), config.max_retries);
        client.request_timeout_ms = config.request_timeout_ms;
        Ok(client)
    }

    /// Create a client with no LLM backend (all calls fail, callers fall back).
    #[must_use]
    pub fn none() -> Self {
        Self::new(LlmProvider::None, String::new(), 0)
    }

    /// Configured provider.
    #[must_use]
    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    /// Configured per-attempt timeout.
    #[must_use]
    pub fn request_timeout_ms(&self) -> u64 {
        self.request_timeout_ms
    }

    /// Generate a completion.
    ///
    /// # Errors
    /// Returns `Err` if the LLM is unavailable or all retries fail. The
    /// caller should fall back to a canned line on error.
    pub async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        match &self.provider {
            LlmProvider::None => Err(LlmError::Unavailable("No LLM provider configured".into())),
            LlmProvider::Ollama { base_url } => self.generate_ollama(base_url, request).await,
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                self.generate_openai(base_url, api_key, request).await
            }
        }
    }

    async fn generate_ollama(
        &self,
        base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse, LlmError> {
        let url = format!("{base_url}/api/generate");
        let body = json!({
            "model": self.model,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "top_p": request.top_p,
                "num_predict": request.max_tokens,
                "stop": request.stop,
            }
        });

        self.send_with_retries("Ollama", request, || self.http.post(&url).json(&body), |json| {
            let text = json["response"].as_str().map(str::to_string);
            let tokens = json["eval_count"].as_u64();
            (text, tokens)
        })
        .await
    }

    async fn generate_openai(
        &self,
        base_url: &str,
        api_key: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse, LlmError> {
        let url = format!("{base_url}/v1/chat/completions");
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": request.prompt },
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "top_p": request.top_p,
            "stop": request.stop,
        });

        self.send_with_retries(
            "OpenAI",
            request,
            || {
                self.http
                    .post(&url)
                    .header("Authorization", format!("Bearer {api_key}"))
                    .json(&body)
            },
            |json| {
                let text = json["choices"][0]["message"]["content"]
                    .as_str()
                    .map(str::to_string);
                let tokens = json["usage"]["completion_tokens"].as_u64();
                (text, tokens)
            },
        )
        .await
    }

    /// Shared retry loop: send, check status, decode, extract.
    async fn send_with_retries(
        &self,
        label: &str,
        request: &LlmRequest,
        build: impl Fn() -> RequestBuilder,
        extract: impl Fn(&Value) -> (Option<String>, Option<u64>),
    ) -> Result<LlmResponse, LlmError> {
        let timeout_ms = request.timeout_ms.min(self.request_timeout_ms).max(1);
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(
                    backend = label,
                    attempt = attempt + 1,
                    of = self.max_retries + 1,
                    "Retrying LLM call"
                );
            }

            let start = Instant::now();
            let result = build()
                .timeout(Duration::from_millis(timeout_ms))
                .send()
                .await;
            let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let json: Value = resp
                        .json()
                        .await
                        .map_err(|e| LlmError::ParseError(e.to_string()))?;
                    let (text, tokens) = extract(&json);
                    let text = text.ok_or_else(|| {
                        LlmError::ParseError(format!("{label} response had no text field"))
                    })?;

                    return Ok(LlmResponse {
                        text,
                        tokens_generated: tokens
                            .and_then(|t| u32::try_from(t).ok())
                            .unwrap_or(0),
                        latency_ms,
                        model: self.model.clone(),
                    });
                }
                Ok(resp) => {
                    let status = resp.status();
                    last_error = format!("HTTP {status}: {}", resp.text().await.unwrap_or_default());
                    warn!(backend = label, error = %last_error, "LLM backend returned error");
                }
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() {
                        warn!(backend = label, timeout_ms, "LLM request timed out");
                    } else {
                        warn!(backend = label, error = %last_error, "LLM request failed");
                    }
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }

    /// Check if the LLM client has a backend configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.generate(request).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_is_the_default_provider() {
        let client = LlmClient::from_config(&LlmConfig::default()).expect("config");
        assert_eq!(
            client.provider(),
            &LlmProvider::Ollama {
                base_url: "http://127.0.0.1:11434".to_string()
            }
        );
        assert!(client.is_available());
        assert_eq!(client.model_name(), "llama3.2:3b");
    }

    #[test]
    fn openai_requires_api_key() {
        let config = LlmConfig {
            provider: "openai".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(
            LlmClient::from_config(&config),
            Err(LlmError::ConfigError(_))
        ));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let config = LlmConfig {
            provider: "openai".to_string(),
            base_url: "https://api.example.com/".to_string(),
            api_key: Some("sk-test".to_string()),
            ..LlmConfig::default()
        };
        let client = LlmClient::from_config(&config).expect("config");
        assert!(matches!(
            client.provider(),
            LlmProvider::OpenAiCompatible { base_url, .. } if base_url == "https://api.example.com"
        ));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = LlmConfig {
            provider: "carrier-pigeon".to_string(),
            ..LlmConfig::default()
        };
        assert!(LlmClient::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn none_provider_is_unavailable() {
        let client = LlmClient::none();
        assert!(!client.is_available());
        let err = client
            .complete(&LlmRequest::new("hello"))
            .await
            .expect_err("no backend");
        assert!(matches!(err, LlmError::Unavailable(_)));
    }

    #[tokio::test]
    async fn unreachable_server_exhausts_retries() {
        let client = LlmClient::new(
            LlmProvider::Ollama {
                base_url: "http://127.0.0.1:1".to_string(),
            },
            "test-model",
            1,
        );
        let err = client
            .generate(&LlmRequest::new("hello").with_timeout(500))
            .await
            .expect_err("nothing listens on port 1");
        assert!(matches!(err, LlmError::RetriesExhausted { attempts: 2, .. }));
    }
}
