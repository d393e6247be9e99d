//! # Colloquy Core Library
//!
//! Domain logic for persona-driven, multi-turn dialogue:
//!
//! - **Session Store**: bounded, expiring per-conversation memory
//! - **Routing Policy**: lexical triage between retrieval and plain chat
//! - **Retrieval Gateway**: relevance-filtered lookups over a [`KnowledgeStore`]
//! - **Quality Evaluator**: heuristic interaction scoring
//! - **Learning Promoter**: writes high-quality interactions back as facts
//!
//! Nothing in this crate talks to a model or a speech service; those live in
//! `colloquy-llm` and `colloquy-dialogue`.
//!
//! ## Performance Contract
//!
//! Routing, scoring and session appends are pure in-memory work and stay in
//! the low microseconds; see `colloquy-bench`.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod learning;
pub mod metrics;
pub mod persona;
pub mod quality;
pub mod retrieval;
pub mod routing;
pub mod seed;
pub mod session;
pub mod types;

pub use config::ColloquyConfig;
pub use error::{ColloquyError, KnowledgeError};
pub use knowledge::{InMemoryKnowledgeStore, KnowledgeStore};
pub use learning::{LearnedFact, LearningOutcome, LearningPromoter, LearningStatistics};
pub use persona::{Persona, PersonaRegistry};
pub use quality::{QualityAssessment, QualityEvaluator};
pub use retrieval::RetrievalGateway;
pub use routing::{RouteDecision, RoutingPolicy};
pub use session::{SessionHandle, SessionStats, SessionStore};
pub use types::*;
