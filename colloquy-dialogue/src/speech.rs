//! Speech collaborator seams.
//!
//! Transcription runs before routing; synthesis runs on the final response
//! text and never feeds back into routing or learning.

use async_trait::async_trait;
use colloquy_core::types::{CharacterId, SessionId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a speech service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpeechError {
    /// The service is not reachable or not loaded.
    #[error("speech service unavailable: {0}")]
    Unavailable(String),
    /// The service ran but could not process the input.
    #[error("speech processing failed: {0}")]
    Failed(String),
}

/// Output of speech-to-text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcription {
    /// Recognised text.
    pub transcript: String,
    /// Detected language, `"unknown"` when the service cannot tell.
    pub language: String,
}

/// Output of text-to-speech.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizedSpeech {
    /// Where the rendered audio can be fetched.
    pub audio_url: String,
}

/// Turns raw audio into text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe one utterance.
    async fn transcribe(&self, audio: &[u8]) -> Result<Transcription, SpeechError>;
}

/// Renders a character's line as audio.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Synthesize `text` in the character's voice.
    async fn synthesize(
        &self,
        character_id: &CharacterId,
        text: &str,
        session_id: &SessionId,
    ) -> Result<SynthesizedSpeech, SpeechError>;
}
