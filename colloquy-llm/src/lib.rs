//! # colloquy-llm: generation layer for Colloquy
//!
//! Everything between a routed turn and the character's spoken line:
//!   - **Ollama** (local, default) and **OpenAI-compatible** HTTP backends
//!   - Persona prompt templates with retrieved facts and recent history
//!   - A generation gateway that always produces a line, falling back to
//!     the persona greeting when the model is slow, down or silent
//!
//! ```text
//! Route::Retrieval      -> retrieval template, temperature 0.7, 150 tokens
//! Route::Conversational -> conversational template, temperature 0.8, 100 tokens
//! ```

pub mod client;
pub mod error;
pub mod generation;
pub mod prompt;
pub mod types;

pub use client::{LlmClient, LlmProvider};
pub use error::LlmError;
pub use generation::{CompletionBackend, GeneratedResponse, GenerationGateway, FALLBACK_MODEL};
pub use prompt::PromptTemplates;
pub use types::{LlmRequest, LlmResponse};
