//! Persona profiles and the registry of known characters.
//!
//! A persona conditions every generation call: who the character is, how they
//! speak, and the canonical greeting used both for empty turns and as the
//! fallback line when the model is unreachable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ColloquyError, Result};
use crate::types::CharacterId;

/// A fixed character profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Stable identifier used by callers.
    pub id: CharacterId,
    /// Display name.
    pub name: String,
    /// Short honorific title.
    pub title: String,
    /// What the character does.
    pub role: String,
    /// Personality summary.
    pub personality: String,
    /// How the character talks.
    pub speech_style: String,
    /// Biography used as grounding.
    pub background: String,
    /// Topics the character is an authority on.
    #[serde(default)]
    pub expertise: Vec<String>,
    /// Canonical greeting line.
    pub greeting: String,
}

impl Persona {
    /// One-paragraph description embedded in prompts.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut text = format!(
            "Personality: {}\nSpeech style: {}\nBackground: {}",
            self.personality, self.speech_style, self.background
        );
        if !self.expertise.is_empty() {
            text.push_str("\nExpertise: ");
            text.push_str(&self.expertise.join(", "));
        }
        text
    }
}

/// The set of characters the engine will talk as.
#[derive(Debug, Clone, Default)]
pub struct PersonaRegistry {
    personas: BTreeMap<CharacterId, Persona>,
}

impl PersonaRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in historical cast.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for persona in builtin_personas() {
            registry.insert(persona);
        }
        registry
    }

    /// Built-in cast plus any personas declared in configuration. Configured
    /// personas replace built-ins with the same id.
    #[must_use]
    pub fn with_extra(extra: &[Persona]) -> Self {
        let mut registry = Self::builtin();
        for persona in extra {
            registry.insert(persona.clone());
        }
        registry
    }

    /// Add or replace a persona.
    pub fn insert(&mut self, persona: Persona) {
        self.personas.insert(persona.id.clone(), persona);
    }

    /// Look up a persona.
    #[must_use]
    pub fn get(&self, id: &CharacterId) -> Option<&Persona> {
        self.personas.get(id)
    }

    /// Look up a persona, failing for unknown ids.
    ///
    /// # Errors
    /// Returns [`ColloquyError::UnknownCharacter`].
    pub fn require(&self, id: &CharacterId) -> Result<&Persona> {
        self.get(id)
            .ok_or_else(|| ColloquyError::UnknownCharacter(id.clone()))
    }

    /// Whether the id is registered.
    #[must_use]
    pub fn contains(&self, id: &CharacterId) -> bool {
        self.personas.contains_key(id)
    }

    /// All registered ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<CharacterId> {
        self.personas.keys().cloned().collect()
    }

    /// Iterate personas in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Persona> {
        self.personas.values()
    }

    /// Number of registered personas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.personas.len()
    }

    /// Whether no personas are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}

fn builtin_personas() -> Vec<Persona> {
    vec![
        Persona {
            id: CharacterId::new("roman_gladiator"),
            name: "Marcus Quintus".to_string(),
            title: "Gladiator of the Colosseum".to_string(),
            role: "Veteran gladiator of the Colosseum".to_string(),
            personality: "Confident, battle-hardened, speaks with authority about combat and honor"
                .to_string(),
            speech_style:
                "Direct, uses military terminology, occasional Latin phrases like 'Salve'"
                    .to_string(),
            background:
                "Fought for 8 years in the arena, trained hundreds of novices at the ludus"
                    .to_string(),
            expertise: vec![
                "combat techniques".to_string(),
                "arena politics".to_string(),
                "gladiator training".to_string(),
                "Roman society".to_string(),
            ],
            greeting:
                "Salve, citizen! I am Marcus, a gladiator who has fought in the great arena."
                    .to_string(),
        },
        Persona {
            id: CharacterId::new("mughal_architect"),
            name: "Ustad Ahmad Lahauri".to_string(),
            title: "Master Architect".to_string(),
            role: "Master architect of the Taj Mahal".to_string(),
            personality:
                "Wise, artistic, deeply spiritual, speaks of divine inspiration in architecture"
                    .to_string(),
            speech_style:
                "Eloquent, uses metaphors of light and geometry, references Islamic art principles"
                    .to_string(),
            background:
                "Chief architect under Shah Jahan, designed multiple imperial monuments"
                    .to_string(),
            expertise: vec![
                "Islamic architecture".to_string(),
                "mathematical proportions".to_string(),
                "construction techniques".to_string(),
                "Mughal court life".to_string(),
            ],
            greeting: "Peace be upon you. I am Ahmad, architect of magnificent monuments."
                .to_string(),
        },
        Persona {
            id: CharacterId::new("egyptian_scribe"),
            name: "Khaemwaset".to_string(),
            title: "Royal Scribe".to_string(),
            role: "Royal scribe in the House of Life".to_string(),
            personality:
                "Learned, formal, devoted to preserving knowledge and serving the gods".to_string(),
            speech_style:
                "Formal, references Egyptian deities like Thoth, uses scribal terminology"
                    .to_string(),
            background: "Served three pharaohs, keeper of sacred texts and royal records"
                .to_string(),
            expertise: vec![
                "hieroglyphic writing".to_string(),
                "religious ceremonies".to_string(),
                "Egyptian mathematics".to_string(),
                "afterlife beliefs".to_string(),
            ],
            greeting: "Greetings, traveler. I serve in the house of Pharaoh as keeper of sacred knowledge."
                .to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_cast_is_registered() {
        let registry = PersonaRegistry::builtin();
        assert_eq!(registry.len(), 3);
        assert!(registry.contains(&"roman_gladiator".into()));
        assert!(registry.contains(&"mughal_architect".into()));
        assert!(registry.contains(&"egyptian_scribe".into()));
    }

    #[test]
    fn require_rejects_unknown_character() {
        let registry = PersonaRegistry::builtin();
        let err = registry
            .require(&"unknown_character".into())
            .expect_err("should reject");
        assert!(matches!(err, ColloquyError::UnknownCharacter(_)));
    }

    #[test]
    fn configured_persona_overrides_builtin() {
        let mut custom = PersonaRegistry::builtin()
            .get(&"roman_gladiator".into())
            .cloned()
            .expect("builtin");
        custom.greeting = "Ave!".to_string();

        let registry = PersonaRegistry::with_extra(&[custom]);
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.get(&"roman_gladiator".into()).map(|p| p.greeting.as_str()),
            Some("Ave!")
        );
    }

    #[test]
    fn description_mentions_expertise() {
        let registry = PersonaRegistry::builtin();
        let persona = registry.get(&"egyptian_scribe".into()).expect("builtin");
        let text = persona.describe();
        assert!(text.contains("hieroglyphic writing"));
        assert!(text.contains("Thoth"));
    }
}
