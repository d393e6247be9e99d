//! # colloquy-dialogue: turn orchestration for Colloquy
//!
//! Glues the core components and the generation layer into a single
//! `process_turn` operation:
//!
//! ```text
//! TurnRequest
//!   -> [speech-to-text] -> Session Store -> Routing Policy
//!   -> [Retrieval Gateway] -> Generation Gateway -> append exchange
//!   -> learning queue (detached) -> [text-to-speech] -> TurnResult
//! ```
//!
//! Background tasks (the learning worker and the session sweeper) run on the
//! tokio runtime and are started explicitly by the host process.

#![deny(clippy::unwrap_used)]

pub mod error;
pub mod orchestrator;
pub mod queue;
pub mod speech;
pub mod sweeper;
pub mod telemetry;

pub use error::DialogueError;
pub use orchestrator::{
    DialogueOrchestrator, DialogueOrchestratorBuilder, TurnInput, TurnRequest, TurnResult,
};
pub use queue::{LearningJob, LearningQueue, LearningWorker, QueueStats};
pub use speech::{SpeechError, SpeechToText, SynthesizedSpeech, TextToSpeech, Transcription};
pub use sweeper::{spawn_session_sweeper, spawn_session_sweeper_from_config};
pub use telemetry::init_tracing;
