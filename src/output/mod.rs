//! Finalized annotation set and the adapters that serialize it.

pub mod inline;
pub mod positional;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{nlp::is_person_label, text::Addressing};

/// Where an entity's description text comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionSource {
    /// Sentence of the first mention in the book.
    Quote,
    Wikipedia,
    /// A MediaWiki site other than Wikipedia.
    OtherWiki,
    /// Written by the user.
    Custom,
}

impl DescriptionSource {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Quote => "Book",
            Self::Wikipedia => "Wikipedia",
            Self::OtherWiki => "Wiki",
            Self::Custom => "Custom",
        }
    }
}

/// X-Ray entity category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntityKind {
    Person,
    Term,
}

impl EntityKind {
    pub fn from_label(label: &str) -> Self {
        if is_person_label(label) {
            Self::Person
        } else {
            Self::Term
        }
    }

    /// Numeric type used by sidecar databases.
    pub fn code(&self) -> u8 {
        match self {
            Self::Person => 1,
            Self::Term => 2,
        }
    }
}

/// Canonical entity with its resolved description.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRecord {
    pub id: u32,
    pub name: String,
    pub label: String,
    pub kind: EntityKind,
    pub count: u32,
    pub description: String,
    pub source: DescriptionSource,
    pub map_image: Option<String>,
    pub inception: Option<String>,
}

/// Sentence around an ambiguous word; `start..end` is the word's char span in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentenceContext {
    pub sentence: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Annotation {
    Entity(u32),
    /// Candidate senses of a lemma and the group they form.
    Senses { group: u32, senses: Vec<u32> },
}

/// One located mention inside a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Occurrence {
    /// Logical char span inside the unit text.
    pub start: usize,
    pub end: usize,
    /// Absolute position and length in the output addressing.
    pub target_start: usize,
    pub target_length: usize,
    pub annotation: Annotation,
    pub context: Option<SentenceContext>,
}

/// Occurrences of one unit in scan order.
#[derive(Debug, Clone, Serialize)]
pub struct UnitAnnotations {
    pub index: usize,
    pub start: usize,
    pub text: String,
    pub occurrences: Vec<Occurrence>,
}

/// Everything the adapters need; they never touch caches or the network.
#[derive(Debug, Clone)]
pub struct AnnotationSet {
    pub addressing: Addressing,
    /// Retained entities in id order.
    pub entities: Vec<EntityRecord>,
    /// Ids pruned after scanning; their occurrences are dropped on output.
    pub removed: HashSet<u32>,
    pub units: Vec<UnitAnnotations>,
    /// Sense sets indexed by group id.
    pub sense_groups: Vec<Vec<u32>>,
    /// Disambiguated sense per (unit index, occurrence index).
    pub chosen: HashMap<(usize, usize), u32>,
}

impl AnnotationSet {
    /// Sense to show for a lemma occurrence; the first candidate unless
    /// disambiguation picked another.
    pub fn chosen_sense(&self, unit: usize, occurrence: usize, senses: &[u32]) -> Option<u32> {
        self.chosen
            .get(&(unit, occurrence))
            .copied()
            .or_else(|| senses.first().copied())
    }

    pub fn entity(&self, id: u32) -> Option<&EntityRecord> {
        self.entities
            .binary_search_by_key(&id, |entity| entity.id)
            .ok()
            .map(|idx| &self.entities[idx])
    }
}
