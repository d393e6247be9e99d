//! Error types for the Colloquy core library.

use thiserror::Error;

use crate::types::CharacterId;

/// Top-level error type for core operations.
#[derive(Error, Debug)]
pub enum ColloquyError {
    /// The requested persona is not registered.
    #[error("Unknown character: {0}")]
    UnknownCharacter(CharacterId),

    /// Configuration could not be parsed or failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Knowledge store failure.
    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a [`KnowledgeStore`](crate::knowledge::KnowledgeStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KnowledgeError {
    /// The character has no knowledge partition.
    #[error("No knowledge partition for character: {0}")]
    UnknownPartition(CharacterId),

    /// The store could not be reached or refused the request.
    #[error("Knowledge store unavailable: {0}")]
    Unavailable(String),

    /// Embedding the text failed.
    #[error("Embedding failed: {0}")]
    Embedding(String),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, ColloquyError>;
