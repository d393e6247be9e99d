//! Vector embedding abstraction layer.
//!
//! Provides a trait-based interface for turning text into vectors used by
//! the in-memory knowledge store for similarity search.
//!
//! The bundled [`HashingEmbeddingProvider`] is a feature-hashing
//! bag-of-words model: no weights to load, deterministic across runs, and
//! good enough that a query sharing content words with a fact scores well
//! above the relevance floor. Production deployments plug a real model in
//! behind the same trait.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::KnowledgeError;

/// A dense embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Generate vector embeddings from text.
///
/// Implementations must be `Send + Sync` for use from async contexts.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string.
    ///
    /// # Errors
    ///
    /// Returns [`KnowledgeError::Embedding`] if the model fails to produce
    /// an embedding.
    fn embed(&self, text: &str) -> Result<Embedding, KnowledgeError>;

    /// Embed a batch of texts.
    ///
    /// Default implementation calls `embed` in a loop.
    ///
    /// # Errors
    ///
    /// Returns an error if any embedding in the batch fails.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, KnowledgeError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// The dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A human-readable name for the model.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Cosine similarity
// ---------------------------------------------------------------------------

/// Compute the cosine similarity between two embedding vectors.
///
/// Returns a value in \[-1.0, 1.0\]. Returns `0.0` if either vector has
/// zero magnitude or the dimensions differ.
#[must_use]
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    if a.0.len() != b.0.len() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut mag_a = 0.0_f32;
    let mut mag_b = 0.0_f32;

    for (x, y) in a.0.iter().zip(b.0.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

// ---------------------------------------------------------------------------
// Feature-hashing provider
// ---------------------------------------------------------------------------

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "was", "were", "are", "did",
    "you", "your", "how", "what", "when", "where", "why", "who", "which",
    "about", "from", "into", "tell", "does", "have", "had", "has", "they",
    "them", "their", "its", "can", "could", "would", "will",
];

/// Hashes content words into a fixed number of buckets and L2-normalises.
///
/// All components are non-negative, so similarity between two outputs is
/// always in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dims: usize,
}

impl HashingEmbeddingProvider {
    /// Create a provider with the given number of buckets (at least 1).
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dims: dimensions.max(1),
        }
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        // Bucket count is far below u32::MAX, so the narrowing is lossless.
        #[allow(clippy::cast_possible_truncation)]
        let index = (hasher.finish() % self.dims as u64) as usize;
        index
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::new(512)
    }
}

impl EmbeddingProvider for HashingEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Embedding, KnowledgeError> {
        let mut raw = vec![0.0_f32; self.dims];
        for token in content_tokens(text) {
            raw[self.bucket(&token)] += 1.0;
        }

        let mag: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        if mag < f32::EPSILON {
            return Ok(Embedding(raw));
        }
        Ok(Embedding(raw.into_iter().map(|x| x / mag).collect()))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "feature-hashing-bow"
    }
}

/// Lower-cased alphanumeric words of three or more characters, minus
/// stopwords, reduced to a rough stem.
fn content_tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .map(|w| stem(&w))
}

/// Light suffix stripping so inflections share a bucket:
/// "trained", "training" and "trains" all become "train".
///
/// Not a full Porter stemmer. Both sides of a comparison go through the
/// same function, so only consistency matters.
fn stem(word: &str) -> String {
    let mut base = word;
    for suffix in ["ing", "ed", "s"] {
        if let Some(rest) = base.strip_suffix(suffix) {
            if rest.chars().count() >= 3 && !(suffix == "s" && rest.ends_with('s')) {
                base = rest;
                break;
            }
        }
    }

    let mut out: Vec<char> = base.chars().collect();
    // running -> runn -> run
    let n = out.len();
    if n >= 4 && out[n - 1] == out[n - 2] {
        let last = out[n - 1];
        if !matches!(last, 'l' | 's' | 'z') && !is_vowel(last) {
            out.pop();
        }
    }
    // carve / carved -> carv
    if out.len() >= 4 && out.last() == Some(&'e') {
        out.pop();
    }
    out.into_iter().collect()
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
