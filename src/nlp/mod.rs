//! Linguistic side of the engine: mention input types, entity resolution,
//! sense bookkeeping and contextual disambiguation.

pub mod custom;
pub mod entities;
pub mod fuzz;
pub mod senses;
pub mod wsd;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Labels treated as people.
pub const PERSON_LABELS: &[&str] = &["PERSON", "PER"];

/// Labels whose entities get structured-data facts (maps, inception).
pub const GEO_LABELS: &[&str] = &["GPE", "LOC", "FAC"];

/// Labels kept for X-Ray; everything else the tagger emits is ignored.
pub const XRAY_LABELS: &[&str] = &[
    "PERSON",
    "PER",
    "GPE",
    "LOC",
    "ORG",
    "NORP",
    "FAC",
    "PRODUCT",
    "EVENT",
    "WORK_OF_ART",
    "LAW",
    "LANGUAGE",
    "MISC",
];

static NAME_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s\u{00B7}\u{2027}\u{30FB}\u{FF65}]").expect("valid regex"));

pub fn is_person_label(label: &str) -> bool {
    PERSON_LABELS.contains(&label)
}

pub fn is_geo_label(label: &str) -> bool {
    GEO_LABELS.contains(&label)
}

pub fn is_xray_label(label: &str) -> bool {
    XRAY_LABELS.contains(&label)
}

/// Whether a name has a whitespace or interpunct separator between parts.
pub fn has_name_separator(name: &str) -> bool {
    NAME_SEPARATOR.is_match(name)
}

/// Named-entity mention with char offsets relative to the unit text.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntityMention {
    pub text: String,
    pub label: String,
    pub start: usize,
    pub end: usize,
    /// Sentence enclosing the mention, kept as the fallback quote.
    #[serde(default)]
    pub sentence: String,
}

/// Lemma mention with char offsets relative to the unit text and to its sentence.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LemmaMention {
    pub lemma: String,
    pub word: String,
    #[serde(default)]
    pub pos: String,
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub sentence: String,
    #[serde(default)]
    pub sentence_start: usize,
    #[serde(default)]
    pub sentence_end: usize,
}

/// One paragraph or text run as handed over by extraction and tagging.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TextUnit {
    /// First position of the unit in the book, in the output addressing.
    pub start: usize,
    /// Logical (unescaped) text the mention offsets refer to.
    pub text: String,
    /// Escaped raw text as stored in the book, when extraction provides it.
    #[serde(default)]
    pub escaped: Option<String>,
    #[serde(default)]
    pub entities: Vec<EntityMention>,
    #[serde(default)]
    pub lemmas: Vec<LemmaMention>,
}
