//! Built-in historical facts for the default cast.
//!
//! Loaded into a fresh knowledge store so retrieval has something to work
//! with before any learning has happened.

use tracing::info;

use crate::error::KnowledgeError;
use crate::knowledge::KnowledgeStore;
use crate::types::{CharacterId, FactRecord};

type SeedRow = (&'static str, &'static str, &'static str);

const GLADIATOR: &[SeedRow] = &[
    (
        "Gladiators trained with wooden rudis swords that weighed twice as much as real weapons, \
         building strength and muscle memory before progressing to live steel in actual combat.",
        "training",
        "Archaeological evidence from Pompeii gladiator school and Roman military manuals",
    ),
    (
        "The Colosseum could be flooded for naval battle reenactments called naumachiae, with \
         elaborate pulley systems raising scenery and releasing wild animals from underground chambers.",
        "arena_spectacles",
        "Archaeological studies of Colosseum underground structure and historical accounts",
    ),
    (
        "Gladiators were classified into specific fighting styles: retiarius with net and trident, \
         murmillo with sword and large shield, thraex with curved sword, and secutor designed to \
         fight retiarii.",
        "combat_styles",
        "Gladiator mosaics, frescoes, and archaeological weapon finds",
    ),
    (
        "Gladiator schools (ludi) functioned like military barracks with strict discipline, medical \
         care, specialized diets, and professional trainers called magistri.",
        "training",
        "Excavations of gladiator quarters in Pompeii and Roman administrative records",
    ),
    (
        "The gladiator's diet was primarily barley, beans, and vegetables, earning them the \
         nickname hordearii (barley men).",
        "daily_life",
        "Roman medical writings and skeletal analysis from gladiator cemeteries",
    ),
];

const ARCHITECT: &[SeedRow] = &[
    (
        "The Taj Mahal's symmetry incorporates precise mathematical proportions, with the central \
         dome rising above a perfectly balanced square plinth.",
        "architecture",
        "Architectural surveys and mathematical analysis of Taj Mahal proportions",
    ),
    (
        "Islamic geometric patterns use tessellations and symmetry groups, representing the infinite \
         through non-representational art.",
        "art_mathematics",
        "Islamic art historical analysis and mathematical pattern studies",
    ),
    (
        "The Taj Mahal's main dome is supported by an inner structural dome, combining beauty with \
         engineering stability.",
        "engineering",
        "Architectural engineering analysis and Mughal construction techniques",
    ),
    (
        "The white Makrana marble of the Taj Mahal reflects light differently through the day, \
         appearing pink at dawn, white at noon, and golden at sunset.",
        "materials",
        "Geological studies of Makrana marble and architectural lighting analysis",
    ),
    (
        "Construction of the Taj Mahal required 20,000 workers and 1,000 elephants, with materials \
         transported from across the empire.",
        "construction",
        "Mughal court chronicles and construction records",
    ),
];

const SCRIBE: &[SeedRow] = &[
    (
        "Egyptian scribes underwent rigorous training for 12 years, learning hieroglyphs, hieratic \
         script, mathematics, and religious knowledge.",
        "training",
        "Educational papyri and scribal school archaeological evidence",
    ),
    (
        "The hieroglyphic writing system contained over 700 symbols including phonetic signs, \
         ideograms, and determinatives clarifying meaning.",
        "writing_systems",
        "Champollion's decipherment work and hieroglyphic corpus analysis",
    ),
    (
        "Egyptian scribes used reed pens, writing on papyrus with ink made from carbon black and \
         red ochre mixed with gum arabic and water.",
        "tools",
        "Archaeological finds of scribal palettes and writing implements",
    ),
    (
        "The House of Life combined library, university, and temple, where scribes copied sacred \
         texts and preserved religious knowledge.",
        "religion",
        "Papyrus documentation and archaeological remains of House of Life buildings",
    ),
    (
        "Egyptian mathematics used a decimal system with separate symbols for powers of 10, and \
         scribes calculated fractions and geometry.",
        "mathematics",
        "Mathematical papyri including Rhind and Moscow papyri",
    ),
];

/// Built-in facts for a character, empty for characters without a seed set.
#[must_use]
pub fn builtin_facts(character_id: &CharacterId) -> Vec<FactRecord> {
    let rows: &[SeedRow] = match character_id.as_str() {
        "roman_gladiator" => GLADIATOR,
        "mughal_architect" => ARCHITECT,
        "egyptian_scribe" => SCRIBE,
        _ => &[],
    };
    rows.iter()
        .map(|(text, category, source)| FactRecord::new(*text, *category, *source))
        .collect()
}

/// Load the built-in facts for every listed character. Returns how many
/// facts were written.
///
/// # Errors
/// Propagates the first store error.
pub async fn seed_knowledge(
    store: &dyn KnowledgeStore,
    characters: &[CharacterId],
) -> Result<usize, KnowledgeError> {
    let mut total = 0;
    for id in characters {
        let facts = builtin_facts(id);
        if facts.is_empty() {
            continue;
        }
        total += store.add(id, &facts).await?;
    }
    info!(facts = total, characters = characters.len(), "Seeded knowledge store");
    Ok(total)
}
