//! Core type definitions shared by every Colloquy component.
//!
//! All types are serializable so they can cross process or API boundaries
//! without extra glue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Identifier of a persona (e.g. `"roman_gladiator"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(pub String);

impl CharacterId {
    /// Create a character id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CharacterId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Opaque session token. Callers may supply their own; otherwise a UUID v4
/// is minted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Mint a fresh random session id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// One user utterance and the character's reply. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    /// What the user said.
    pub user_text: String,
    /// What the character answered.
    pub character_text: String,
    /// When the exchange was recorded.
    pub timestamp: DateTime<Utc>,
    /// Position within the session, starting at 1 and never reused.
    pub sequence_number: u64,
}

// ---------------------------------------------------------------------------
// Knowledge
// ---------------------------------------------------------------------------

/// A fact as written into the knowledge store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
    /// The fact in natural language.
    pub text: String,
    /// Topical category (e.g. `"training"`, `"construction"`).
    pub category: String,
    /// Provenance tag.
    pub source: String,
    /// Text to embed instead of `text`, when the searchable part of a fact is
    /// shorter than what gets shown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_key: Option<String>,
    /// When the fact entered the store, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

impl FactRecord {
    /// Create a new fact record.
    #[must_use]
    pub fn new(
        text: impl Into<String>,
        category: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            category: category.into(),
            source: source.into(),
            search_key: None,
            added_at: None,
        }
    }

    /// Embed `key` in place of the full text.
    #[must_use]
    pub fn with_search_key(mut self, key: impl Into<String>) -> Self {
        self.search_key = Some(key.into());
        self
    }

    /// Stamp the time the fact was added.
    #[must_use]
    pub fn with_added_at(mut self, at: DateTime<Utc>) -> Self {
        self.added_at = Some(at);
        self
    }

    /// The text the store should embed.
    #[must_use]
    pub fn search_text(&self) -> &str {
        self.search_key.as_deref().unwrap_or(&self.text)
    }
}

/// A fact returned by the knowledge store for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedFact {
    /// The fact text.
    pub text: String,
    /// Topical category.
    pub category: String,
    /// Provenance tag.
    pub source: String,
    /// Similarity to the query in `[0, 1]`.
    pub relevance_score: f32,
    /// 1-based position in the store's ranked result list.
    pub rank: usize,
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Which generation path a turn took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Facts were retrieved and fed to generation.
    Retrieval,
    /// Plain persona conversation, no retrieval.
    Conversational,
}

impl Route {
    /// How many prior exchanges to feed the model on this path.
    #[must_use]
    pub fn context_budget(self) -> usize {
        match self {
            Self::Retrieval => 3,
            Self::Conversational => 2,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retrieval => f.write_str("retrieval"),
            Self::Conversational => f.write_str("conversational"),
        }
    }
}
