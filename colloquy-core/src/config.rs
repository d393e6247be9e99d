//! Configuration for the Colloquy dialogue engine.
//!
//! Maps directly to `colloquy.toml`. Every field has a default, so an empty
//! file yields a working configuration. Keyword tables live here rather than
//! in the scoring code so they can be tuned without touching algorithms.

use serde::{Deserialize, Serialize};

use crate::persona::Persona;

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColloquyConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Session memory bounds and expiry.
    #[serde(default)]
    pub session: SessionConfig,
    /// Retrieval-vs-conversation triage.
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Knowledge retrieval settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Interaction quality scoring.
    #[serde(default)]
    pub quality: QualityConfig,
    /// Self-learning promotion.
    #[serde(default)]
    pub learning: LearningConfig,
    /// Prompt assembly.
    #[serde(default)]
    pub generation: GenerationConfig,
    /// LLM backend.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Speech collaborators.
    #[serde(default)]
    pub speech: SpeechConfig,
    /// Additional personas on top of the built-in cast.
    #[serde(default)]
    pub personas: Vec<Persona>,
}

impl ColloquyConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ColloquyError::Config` if the TOML is invalid or fails
    /// [`validate`](Self::validate).
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| crate::ColloquyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Check cross-field constraints serde cannot express.
    ///
    /// # Errors
    /// Returns `ColloquyError::Config` describing the first violation.
    pub fn validate(&self) -> crate::error::Result<()> {
        let config_err = |msg: String| Err(crate::ColloquyError::Config(msg));

        if self.session.max_history == 0 {
            return config_err("session.max_history must be at least 1".into());
        }
        if self.session.sweep_interval_secs == 0 {
            return config_err("session.sweep_interval_secs must be at least 1".into());
        }
        if !(0.0..1.0).contains(&self.retrieval.relevance_floor) {
            return config_err(format!(
                "retrieval.relevance_floor must be in [0, 1), got {}",
                self.retrieval.relevance_floor
            ));
        }

        let weights = self.quality.effective_weights();
        let sum = weights.sum();
        if (sum - 1.0).abs() > 0.01 {
            return config_err(format!("quality weights must sum to 1.0, got {sum:.3}"));
        }
        for (name, value) in [
            ("learning_threshold", self.quality.effective_learning_threshold()),
            ("specificity_threshold", self.quality.effective_specificity_threshold()),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return config_err(format!("quality.{name} must be in [0, 1], got {value}"));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Session memory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sliding-window size for per-session history.
    #[serde(default = "default_10")]
    pub max_history: usize,
    /// Idle minutes after which a session is considered expired.
    #[serde(default = "default_30")]
    pub timeout_minutes: i64,
    /// Seconds between background sweeps of expired sessions.
    #[serde(default = "default_60")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history: 10,
            timeout_minutes: 30,
            sweep_interval_secs: 60,
        }
    }
}

impl SessionConfig {
    /// The idle timeout as a `chrono` duration.
    #[must_use]
    pub fn timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.timeout_minutes)
    }

    /// Period of the background expiry sweep.
    #[must_use]
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Lexical triage marker tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Small-talk markers; any whole-word hit disables retrieval.
    #[serde(default = "default_conversational_markers")]
    pub conversational_markers: Vec<String>,
    /// Information-request markers; any substring hit enables retrieval.
    #[serde(default = "default_topical_markers")]
    pub topical_markers: Vec<String>,
    /// Utterances shorter than this (after trimming) skip retrieval.
    #[serde(default = "default_20")]
    pub min_retrieval_chars: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            conversational_markers: default_conversational_markers(),
            topical_markers: default_topical_markers(),
            min_retrieval_chars: 20,
        }
    }
}

/// Knowledge retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Facts at or below this relevance are discarded.
    #[serde(default = "default_0_3")]
    pub relevance_floor: f32,
    /// Facts requested per retrieval-routed turn.
    #[serde(default = "default_3_usize")]
    pub max_results: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            relevance_floor: 0.3,
            max_results: 3,
        }
    }
}

/// Named weight/threshold sets for the quality evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityProfile {
    /// Query specificity weighted highest; specificity gate 0.2.
    #[default]
    SpecificityFirst,
    /// Fact relevance and informativeness weighted highest; specificity gate 0.1.
    Balanced,
}

impl QualityProfile {
    /// Component weights for this profile.
    #[must_use]
    pub fn weights(self) -> QualityWeights {
        match self {
            Self::SpecificityFirst => QualityWeights {
                query_specificity: 0.30,
                fact_relevance: 0.25,
                response_informativeness: 0.25,
                response_accuracy: 0.20,
            },
            Self::Balanced => QualityWeights {
                query_specificity: 0.20,
                fact_relevance: 0.30,
                response_informativeness: 0.30,
                response_accuracy: 0.20,
            },
        }
    }

    /// Minimum overall score required to learn.
    #[must_use]
    pub fn learning_threshold(self) -> f32 {
        0.3
    }

    /// Minimum query specificity required to learn.
    #[must_use]
    pub fn specificity_threshold(self) -> f32 {
        match self {
            Self::SpecificityFirst => 0.2,
            Self::Balanced => 0.1,
        }
    }
}

/// Weights of the four quality components. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityWeights {
    /// Weight for query specificity.
    pub query_specificity: f32,
    /// Weight for retrieved-fact relevance.
    pub fact_relevance: f32,
    /// Weight for response informativeness.
    pub response_informativeness: f32,
    /// Weight for estimated response accuracy.
    pub response_accuracy: f32,
}

impl QualityWeights {
    /// Sum of all weights.
    #[must_use]
    pub fn sum(&self) -> f32 {
        self.query_specificity
            + self.fact_relevance
            + self.response_informativeness
            + self.response_accuracy
    }
}

/// Quality evaluator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Base profile for weights and thresholds.
    #[serde(default)]
    pub profile: QualityProfile,
    /// Explicit weights overriding the profile.
    #[serde(default)]
    pub weights: Option<QualityWeights>,
    /// Explicit overall-score gate overriding the profile.
    #[serde(default)]
    pub learning_threshold: Option<f32>,
    /// Explicit specificity gate overriding the profile.
    #[serde(default)]
    pub specificity_threshold: Option<f32>,
    /// Interrogative and domain keywords that make a query specific.
    #[serde(default = "default_specificity_keywords")]
    pub specificity_keywords: Vec<String>,
    /// Vocabulary that marks a response as informative.
    #[serde(default = "default_informative_keywords")]
    pub informative_keywords: Vec<String>,
    /// Words that signal in-character first-person voice.
    #[serde(default = "default_first_person_words")]
    pub first_person_words: Vec<String>,
    /// Phrases that raise the accuracy estimate.
    #[serde(default = "default_confidence_markers")]
    pub confidence_markers: Vec<String>,
    /// Phrases that lower the accuracy estimate.
    #[serde(default = "default_hedging_markers")]
    pub hedging_markers: Vec<String>,
    /// Response length (in words) that earns the full length score.
    #[serde(default = "default_50")]
    pub target_response_words: usize,
    /// Accuracy estimate before marker adjustments.
    #[serde(default = "default_0_7")]
    pub baseline_accuracy: f32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            profile: QualityProfile::default(),
            weights: None,
            learning_threshold: None,
            specificity_threshold: None,
            specificity_keywords: default_specificity_keywords(),
            informative_keywords: default_informative_keywords(),
            first_person_words: default_first_person_words(),
            confidence_markers: default_confidence_markers(),
            hedging_markers: default_hedging_markers(),
            target_response_words: 50,
            baseline_accuracy: 0.7,
        }
    }
}

impl QualityConfig {
    /// Weights after applying any explicit override.
    #[must_use]
    pub fn effective_weights(&self) -> QualityWeights {
        self.weights.unwrap_or_else(|| self.profile.weights())
    }

    /// Overall-score gate after applying any explicit override.
    #[must_use]
    pub fn effective_learning_threshold(&self) -> f32 {
        self.learning_threshold
            .unwrap_or_else(|| self.profile.learning_threshold())
    }

    /// Specificity gate after applying any explicit override.
    #[must_use]
    pub fn effective_specificity_threshold(&self) -> f32 {
        self.specificity_threshold
            .unwrap_or_else(|| self.profile.specificity_threshold())
    }
}

/// One row of the query→category table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Category assigned on match.
    pub category: String,
    /// Keywords, any of which selects this category.
    pub keywords: Vec<String>,
}

impl CategoryRule {
    fn new(category: &str, keywords: &[&str]) -> Self {
        Self {
            category: category.to_string(),
            keywords: strings(keywords),
        }
    }
}

/// Self-learning promotion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Whether turns are considered for learning at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Ordered category table; the first matching rule wins.
    #[serde(default = "default_category_rules")]
    pub categories: Vec<CategoryRule>,
    /// Category used when no rule matches.
    #[serde(default = "default_general")]
    pub default_category: String,
    /// Characters of the response kept in a learned fact.
    #[serde(default = "default_200")]
    pub response_excerpt_chars: usize,
    /// Pending learning jobs held before new ones are dropped.
    #[serde(default = "default_256")]
    pub queue_capacity: usize,
    /// Seconds a queued job stays eligible before it is discarded.
    #[serde(default = "default_300")]
    pub job_deadline_secs: u64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            categories: default_category_rules(),
            default_category: "general".to_string(),
            response_excerpt_chars: 200,
            queue_capacity: 256,
            job_deadline_secs: 300,
        }
    }
}

/// Prompt assembly settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Highest-ranked facts embedded in a prompt.
    #[serde(default = "default_3_usize")]
    pub max_prompt_facts: usize,
    /// Most recent exchanges embedded in a prompt.
    #[serde(default = "default_2_usize")]
    pub max_prompt_exchanges: usize,
    /// Sampling temperature on the retrieval path.
    #[serde(default = "default_0_7")]
    pub retrieval_temperature: f32,
    /// Token budget on the retrieval path.
    #[serde(default = "default_150")]
    pub retrieval_max_tokens: u32,
    /// Sampling temperature on the conversational path.
    #[serde(default = "default_0_8")]
    pub conversational_temperature: f32,
    /// Token budget on the conversational path.
    #[serde(default = "default_100")]
    pub conversational_max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_prompt_facts: 3,
            max_prompt_exchanges: 2,
            retrieval_temperature: 0.7,
            retrieval_max_tokens: 150,
            conversational_temperature: 0.8,
            conversational_max_tokens: 100,
        }
    }
}

/// LLM integration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "ollama", "openai", "none".
    #[serde(default = "default_ollama")]
    pub provider: String,
    /// Base URL for the LLM API.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for OpenAI-compatible providers.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Hard timeout for any LLM call in milliseconds.
    #[serde(default = "default_20000")]
    pub request_timeout_ms: u64,
    /// Retries before the gateway falls back to the persona greeting.
    #[serde(default = "default_1_u32")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            api_key: None,
            request_timeout_ms: 20_000,
            max_retries: 1,
        }
    }
}

/// Speech collaborator settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Synthesize audio for every turn unless the request says otherwise.
    #[serde(default)]
    pub synthesize_by_default: bool,
}

// ---------------------------------------------------------------------------
// Keyword tables
// ---------------------------------------------------------------------------

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

fn default_conversational_markers() -> Vec<String> {
    strings(&[
        "hello", "hi", "hey", "thanks", "thank you", "interesting", "nice", "cool",
        "good", "ok", "okay", "yes", "no", "who are you", "nice to meet",
        "how are you", "goodbye", "bye", "farewell",
    ])
}

fn default_topical_markers() -> Vec<String> {
    strings(&[
        "when", "where", "how", "why", "what", "built", "made", "during",
        "training", "weapon", "fight", "battle", "construction", "material",
        "technique", "year", "time", "happened", "did you", "were you",
        "tell me about", "explain", "describe", "history", "ancient",
        "combat", "arena", "gladiator", "architect", "scribe", "pharaoh",
    ])
}

fn default_specificity_keywords() -> Vec<String> {
    strings(&[
        "how", "why", "when", "where", "what", "which", "describe", "explain",
        "technique", "method", "process", "construction", "training", "weapon",
        "material", "design", "ceremony", "ritual", "battle", "combat",
    ])
}

fn default_informative_keywords() -> Vec<String> {
    strings(&[
        "specific", "detail", "technique", "method", "because", "reason",
        "example", "instance", "during", "period", "century", "ancient",
        "dynasty", "era", "material", "stone", "marble", "bronze", "iron",
    ])
}

fn default_first_person_words() -> Vec<String> {
    strings(&["i", "my", "me", "we", "our", "us", "myself"])
}

fn default_confidence_markers() -> Vec<String> {
    strings(&["precisely", "exactly", "specifically", "according to", "documented"])
}

fn default_hedging_markers() -> Vec<String> {
    strings(&["might", "perhaps", "possibly", "unclear", "uncertain"])
}

fn default_category_rules() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new(
            "combat_techniques",
            &["fight", "combat", "battle", "weapon", "sword", "stance", "technique"],
        ),
        CategoryRule::new(
            "training",
            &["train", "practice", "learn", "preparation", "exercise", "drill"],
        ),
        CategoryRule::new(
            "construction",
            &["build", "construct", "material", "stone", "marble", "foundation"],
        ),
        CategoryRule::new(
            "architecture",
            &["design", "structure", "dome", "minaret", "proportion", "geometry"],
        ),
        CategoryRule::new(
            "writing_systems",
            &["write", "script", "hieroglyph", "symbol", "text", "document"],
        ),
        CategoryRule::new(
            "daily_life",
            &["daily", "life", "food", "living", "routine", "society"],
        ),
        CategoryRule::new(
            "religion",
            &["god", "deity", "prayer", "ritual", "ceremony", "sacred"],
        ),
        CategoryRule::new("tools", &["tool", "equipment", "instrument", "implement"]),
    ]
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_general() -> String { "general".to_string() }
fn default_ollama() -> String { "ollama".to_string() }
fn default_ollama_url() -> String { "http://127.0.0.1:11434".to_string() }
fn default_model() -> String { "llama3.2:3b".to_string() }
fn default_0_3() -> f32 { 0.3 }
fn default_0_7() -> f32 { 0.7 }
fn default_0_8() -> f32 { 0.8 }
fn default_1_u32() -> u32 { 1 }
fn default_2_usize() -> usize { 2 }
fn default_3_usize() -> usize { 3 }
fn default_10() -> usize { 10 }
fn default_20() -> usize { 20 }
fn default_30() -> i64 { 30 }
fn default_50() -> usize { 50 }
fn default_60() -> u64 { 60 }
fn default_100() -> u32 { 100 }
fn default_150() -> u32 { 150 }
fn default_200() -> usize { 200 }
fn default_256() -> usize { 256 }
fn default_300() -> u64 { 300 }
fn default_20000() -> u64 { 20_000 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = ColloquyConfig::from_toml("").expect("parse");
        assert_eq!(config.session.max_history, 10);
        assert_eq!(config.session.timeout_minutes, 30);
        assert!((config.retrieval.relevance_floor - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.quality.profile, QualityProfile::SpecificityFirst);
    }

    #[test]
    fn both_profiles_have_unit_weights() {
        for profile in [QualityProfile::SpecificityFirst, QualityProfile::Balanced] {
            assert!((profile.weights().sum() - 1.0).abs() < 1e-6, "{profile:?}");
        }
    }

    #[test]
    fn balanced_profile_lowers_specificity_gate() {
        let config = ColloquyConfig::from_toml(
            r#"
            [quality]
            profile = "balanced"
            "#,
        )
        .expect("parse");
        assert!((config.quality.effective_specificity_threshold() - 0.1).abs() < 1e-6);
        assert!((config.quality.effective_weights().fact_relevance - 0.3).abs() < 1e-6);
    }

    #[test]
    fn explicit_overrides_win_over_profile() {
        let config = ColloquyConfig::from_toml(
            r#"
            [quality]
            specificity_threshold = 0.5
            learning_threshold = 0.6
            "#,
        )
        .expect("parse");
        assert!((config.quality.effective_specificity_threshold() - 0.5).abs() < 1e-6);
        assert!((config.quality.effective_learning_threshold() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn weights_not_summing_to_one_are_rejected() {
        let result = ColloquyConfig::from_toml(
            r#"
            [quality.weights]
            query_specificity = 0.5
            fact_relevance = 0.5
            response_informativeness = 0.5
            response_accuracy = 0.5
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn sweep_interval_comes_from_session_table() {
        let config = ColloquyConfig::from_toml("[session]\nsweep_interval_secs = 15\n").expect("parse");
        assert_eq!(config.session.sweep_interval(), std::time::Duration::from_secs(15));
        assert_eq!(SessionConfig::default().sweep_interval(), std::time::Duration::from_secs(60));
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let result = ColloquyConfig::from_toml("[session]\nsweep_interval_secs = 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn zero_history_is_rejected() {
        let result = ColloquyConfig::from_toml("[session]\nmax_history = 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn category_table_keeps_declaration_order() {
        let config = LearningConfig::default();
        assert_eq!(config.categories[0].category, "combat_techniques");
        assert_eq!(config.categories[1].category, "training");
    }
}
