//! Prompt templates for persona dialogue.
//!
//! Two templates: a retrieval-augmented one that embeds facts, and a short
//! conversational one with warmer sampling. Both embed the persona and the
//! most recent exchanges. Templates can be replaced from a TOML file with
//! `retrieval` and `conversational` keys.

use std::path::Path;

use colloquy_core::config::GenerationConfig;
use colloquy_core::persona::Persona;
use colloquy_core::types::{Exchange, RetrievedFact};
use serde::Deserialize;

/// Retrieval-augmented template.
pub const RETRIEVAL_TEMPLATE: &str = r#"You are {name}, {role}, speaking in ancient times.

CHARACTER BACKGROUND:
{persona}

HISTORICAL CONTEXT (use this information):
{facts}
{history}
USER: "{query}"

INSTRUCTIONS:
1. Respond as {name}, in character
2. Use the historical context provided
3. Keep the response to 2-3 sentences
4. Reference personal experience
5. Be engaging

{name}:"#;

/// Conversational template.
pub const CONVERSATIONAL_TEMPLATE: &str = r#"You are {name}, {role}.

Personality: {personality}
Speech style: {speech_style}
{history}
USER: "{query}"

Respond as {name} with a friendly, brief response (1-2 sentences).

{name}:"#;

/// Line used in place of facts when none were retrieved.
pub const NO_FACTS_LINE: &str = "Use your general historical knowledge.";

/// Stop sequences that keep the model from writing the user's next line.
pub const STOP_SEQUENCES: &[&str] = &["\n\nUser:", "\n\nUSER:", "\n\nHuman:", "\n\nQ:"];

/// Single-pass template interpolation.
///
/// Replaces `{key}` with the corresponding value. Substituted text is never
/// re-scanned, so user input containing `{...}` stays literal. Unknown keys
/// are left untouched.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() * 2);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = &after[..close];
        match vars.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => out.push_str(value),
            None => {
                out.push('{');
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

/// At most `max` facts, best first, as a bulleted list.
#[must_use]
pub fn format_facts(facts: &[RetrievedFact], max: usize) -> String {
    if facts.is_empty() || max == 0 {
        return NO_FACTS_LINE.to_string();
    }
    sort_by_relevance(facts)
        .into_iter()
        .take(max)
        .map(|f| format!("- {}", f.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The last `max` exchanges as alternating `User:` / `You:` lines, framed
/// by blank lines. Empty when there is no history.
#[must_use]
pub fn format_history(history: &[Exchange], max: usize) -> String {
    let skip = history.len().saturating_sub(max);
    let lines: Vec<String> = history
        .iter()
        .skip(skip)
        .map(|e| format!("User: {}\nYou: {}", e.user_text, e.character_text))
        .collect();
    if lines.is_empty() {
        String::new()
    } else {
        format!("\nRECENT CONVERSATION:\n{}\n", lines.join("\n"))
    }
}

/// The pair of templates used by the generation gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PromptTemplates {
    /// Retrieval-augmented template.
    #[serde(default = "default_retrieval")]
    pub retrieval: String,
    /// Conversational template.
    #[serde(default = "default_conversational")]
    pub conversational: String,
}

fn default_retrieval() -> String {
    RETRIEVAL_TEMPLATE.to_string()
}

fn default_conversational() -> String {
    CONVERSATIONAL_TEMPLATE.to_string()
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptTemplates {
    /// The compiled-in templates.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            retrieval: default_retrieval(),
            conversational: default_conversational(),
        }
    }

    /// Parse templates from TOML; missing keys keep the built-ins.
    ///
    /// # Errors
    /// Returns a message if the TOML is invalid or a template lacks `{query}`.
    pub fn from_toml(content: &str) -> Result<Self, String> {
        let templates: Self =
            toml::from_str(content).map_err(|e| format!("invalid prompt TOML: {e}"))?;
        for (name, body) in [
            ("retrieval", &templates.retrieval),
            ("conversational", &templates.conversational),
        ] {
            if !body.contains("{query}") {
                return Err(format!("{name} template must contain {{query}}"));
            }
        }
        Ok(templates)
    }

    /// Load templates from a TOML file.
    ///
    /// # Errors
    /// Returns a message if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Render the retrieval-augmented prompt.
    #[must_use]
    pub fn render_retrieval(
        &self,
        persona: &Persona,
        query: &str,
        facts: &[RetrievedFact],
        history: &[Exchange],
        config: &GenerationConfig,
    ) -> String {
        let description = persona.describe();
        let facts = format_facts(facts, config.max_prompt_facts);
        let history = format_history(history, config.max_prompt_exchanges);
        render_template(
            &self.retrieval,
            &[
                ("name", persona.name.as_str()),
                ("role", persona.role.as_str()),
                ("persona", description.as_str()),
                ("facts", facts.as_str()),
                ("history", history.as_str()),
                ("query", query),
            ],
        )
    }

    /// Render the conversational prompt.
    #[must_use]
    pub fn render_conversational(
        &self,
        persona: &Persona,
        query: &str,
        history: &[Exchange],
        config: &GenerationConfig,
    ) -> String {
        let history = format_history(history, config.max_prompt_exchanges);
        render_template(
            &self.conversational,
            &[
                ("name", persona.name.as_str()),
                ("role", persona.role.as_str()),
                ("personality", persona.personality.as_str()),
                ("speech_style", persona.speech_style.as_str()),
                ("history", history.as_str()),
                ("query", query),
            ],
        )
    }
}

/// Strip echoed speaker labels and wrapping quotes from a model response.
#[must_use]
pub fn clean_response(text: &str, persona: &Persona) -> String {
    let first_name = persona.name.split_whitespace().next().unwrap_or(&persona.name);
    let prefixes = [
        format!("{} responds:", persona.name),
        format!("Response as {}:", persona.name),
        format!("{}:", persona.name),
        format!("{first_name}:"),
        "I respond:".to_string(),
        "Response:".to_string(),
    ];

    let mut cleaned = text.trim();
    loop {
        let before = cleaned;
        for prefix in &prefixes {
            if let Some(rest) = cleaned.strip_prefix(prefix.as_str()) {
                cleaned = rest.trim_start();
            }
        }
        if cleaned == before {
            break;
        }
    }

    if cleaned.len() >= 2 && cleaned.starts_with('"') && cleaned.ends_with('"') {
        cleaned = cleaned[1..cleaned.len() - 1].trim();
    }
    cleaned.to_string()
}

/// Stable best-first ordering; NaN scores sort last.
fn sort_by_relevance(facts: &[RetrievedFact]) -> Vec<&RetrievedFact> {
    let mut sorted: Vec<&RetrievedFact> = facts.iter().collect();
    sorted.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::persona::PersonaRegistry;
    use colloquy_core::types::CharacterId;

    fn marcus() -> Persona {
        PersonaRegistry::builtin()
            .get(&CharacterId::new("roman_gladiator"))
            .cloned()
            .expect("builtin")
    }

    fn fact(text: &str, score: f32) -> RetrievedFact {
        RetrievedFact {
            text: text.to_string(),
            category: "training".to_string(),
            source: "test".to_string(),
            relevance_score: score,
            rank: 1,
        }
    }

    fn exchange(user: &str, character: &str, seq: u64) -> Exchange {
        Exchange {
            user_text: user.to_string(),
            character_text: character.to_string(),
            timestamp: chrono::Utc::now(),
            sequence_number: seq,
        }
    }

    #[test]
    fn template_rendering_works() {
        let result = render_template("Hello {name}, you are a {role}.", &[("name", "Marcus"), ("role", "gladiator")]);
        assert_eq!(result, "Hello Marcus, you are a gladiator.");
    }

    #[test]
    fn template_handles_missing_vars() {
        let result = render_template("Hello {name}, {unknown}", &[("name", "Marcus")]);
        assert_eq!(result, "Hello Marcus, {unknown}");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let result = render_template("{query} / {name}", &[("query", "{name}"), ("name", "Marcus")]);
        assert_eq!(result, "{name} / Marcus");
    }

    #[test]
    fn unterminated_brace_is_literal() {
        assert_eq!(render_template("a { b", &[]), "a { b");
    }

    #[test]
    fn facts_are_capped_and_best_first() {
        let facts = [fact("low", 0.4), fact("top", 0.9), fact("mid", 0.6), fact("extra", 0.35)];
        assert_eq!(format_facts(&facts, 3), "- top\n- mid\n- low");
    }

    #[test]
    fn no_facts_uses_general_knowledge_line() {
        assert_eq!(format_facts(&[], 3), NO_FACTS_LINE);
    }

    #[test]
    fn history_keeps_most_recent() {
        let history = [exchange("a", "1", 1), exchange("b", "2", 2), exchange("c", "3", 3)];
        let text = format_history(&history, 2);
        assert!(!text.contains("User: a"));
        assert!(text.contains("User: b\nYou: 2\nUser: c\nYou: 3"));
        assert_eq!(format_history(&[], 2), "");
    }

    #[test]
    fn retrieval_prompt_embeds_everything() {
        let prompt = PromptTemplates::builtin().render_retrieval(
            &marcus(),
            "How did you train?",
            &[fact("Gladiators trained with wooden swords", 0.8)],
            &[exchange("Salve", "Salve, citizen!", 1)],
            &GenerationConfig::default(),
        );
        assert!(prompt.contains("You are Marcus Quintus"));
        assert!(prompt.contains("- Gladiators trained with wooden swords"));
        assert!(prompt.contains("User: Salve\nYou: Salve, citizen!"));
        assert!(prompt.contains("USER: \"How did you train?\""));
        assert!(prompt.ends_with("Marcus Quintus:"));
    }

    #[test]
    fn conversational_prompt_is_short() {
        let templates = PromptTemplates::builtin();
        let config = GenerationConfig::default();
        let convo = templates.render_conversational(&marcus(), "hello", &[], &config);
        let rag = templates.render_retrieval(&marcus(), "hello", &[], &[], &config);
        assert!(convo.len() < rag.len());
        assert!(convo.contains("Personality: Confident"));
        assert!(!convo.contains("HISTORICAL CONTEXT"));
    }

    #[test]
    fn clean_response_strips_speaker_labels() {
        let persona = marcus();
        assert_eq!(clean_response("Marcus Quintus: Salve!", &persona), "Salve!");
        assert_eq!(clean_response("Response: Marcus: Salve!", &persona), "Salve!");
        assert_eq!(clean_response("  \"Salve, citizen.\"  ", &persona), "Salve, citizen.");
        assert_eq!(clean_response("I fought for 8 years.", &persona), "I fought for 8 years.");
    }

    #[test]
    fn templates_load_from_toml() {
        let templates = PromptTemplates::from_toml(
            r#"conversational = "Speak as {name}: {query}""#,
        )
        .expect("parse");
        assert_eq!(templates.retrieval, RETRIEVAL_TEMPLATE);
        assert_eq!(templates.conversational, "Speak as {name}: {query}");
    }

    #[test]
    fn template_without_query_is_rejected() {
        assert!(PromptTemplates::from_toml(r#"retrieval = "no placeholder""#).is_err());
    }
}
