//! Turn-level error types.

use colloquy_core::types::{CharacterId, SessionId};
use thiserror::Error;

use crate::speech::SpeechError;

/// Why a turn was rejected or aborted.
///
/// Every variant is raised before the turn's exchange is recorded.
/// [`Internal`](Self::Internal) and [`Transcription`](Self::Transcription)
/// are service-side failures; the rest are caller errors, see
/// [`is_caller_error`](Self::is_caller_error).
#[derive(Debug, Error)]
pub enum DialogueError {
    /// The requested character is not registered.
    #[error("Unknown character: {requested}. Available: {}", format_ids(.available))]
    UnknownCharacter {
        /// Id the caller asked for.
        requested: CharacterId,
        /// Ids the engine knows.
        available: Vec<CharacterId>,
    },

    /// An audio turn carried no bytes.
    #[error("Empty audio payload received")]
    EmptyAudio,

    /// The speech-to-text collaborator failed.
    #[error("Could not transcribe audio: {0}")]
    Transcription(#[source] SpeechError),

    /// The session id is bound to a different character.
    #[error("Session {session_id} belongs to {bound}, not {requested}")]
    SessionCharacterMismatch {
        /// Session the caller supplied.
        session_id: SessionId,
        /// Character the session is bound to.
        bound: CharacterId,
        /// Character the caller asked for.
        requested: CharacterId,
    },

    /// The turn pipeline failed unexpectedly.
    #[error("Dialogue processing failed after {elapsed_ms}ms: {message}")]
    Internal {
        /// Panic or failure message.
        message: String,
        /// Time spent before the failure.
        elapsed_ms: u64,
    },
}

impl DialogueError {
    /// Whether the caller can fix this by changing the request.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, Self::Internal { .. } | Self::Transcription(_))
    }
}

fn format_ids(ids: &[CharacterId]) -> String {
    ids.iter()
        .map(CharacterId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result alias for turn processing.
pub type Result<T> = std::result::Result<T, DialogueError>;
