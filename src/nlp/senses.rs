//! Word Wise lexicon and sense-group registry.

use std::{collections::HashMap, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::EngineError;

/// Rarest difficulty level; 5 is the most common.
pub const MIN_DIFFICULTY: u8 = 1;

/// One dictionary sense of a lemma.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Sense {
    pub id: u32,
    pub gloss: String,
    #[serde(default)]
    pub short_gloss: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,
    /// L2-normalized sense embedding, when the lexicon ships one.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

fn default_difficulty() -> u8 {
    MIN_DIFFICULTY
}

impl Sense {
    /// Gloss short enough to sit above the word.
    pub fn hint(&self) -> &str {
        if self.short_gloss.is_empty() {
            &self.gloss
        } else {
            &self.short_gloss
        }
    }
}

/// Senses keyed by lemma and part of speech.
#[derive(Debug, Default)]
pub struct Lexicon {
    senses: Vec<Sense>,
    by_id: HashMap<u32, usize>,
    by_key: HashMap<(String, String), Vec<usize>>,
}

impl Lexicon {
    /// Load `{ lemma: { pos: [sense, ...] } }` JSON; an empty POS key matches any tag.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read lexicon {}", path.display()))?;
        let nested: HashMap<String, HashMap<String, Vec<Sense>>> = serde_json::from_str(&raw)
            .with_context(|| format!("parse lexicon {}", path.display()))?;
        let mut lexicon = Self::default();
        for (lemma, by_pos) in nested {
            for (pos, senses) in by_pos {
                lexicon.insert(&lemma, &pos, senses);
            }
        }
        info!(path = %path.display(), senses = lexicon.senses.len(), "loaded lexicon");
        Ok(lexicon)
    }

    pub fn insert(&mut self, lemma: &str, pos: &str, senses: Vec<Sense>) {
        let key = (lemma.to_string(), pos.to_string());
        for sense in senses {
            if let Some(&existing) = self.by_id.get(&sense.id) {
                if self.senses[existing] != sense {
                    warn!(id = sense.id, "conflicting sense definition ignored");
                }
                self.by_key.entry(key.clone()).or_default().push(existing);
                continue;
            }
            let idx = self.senses.len();
            self.by_id.insert(sense.id, idx);
            self.senses.push(sense);
            self.by_key.entry(key.clone()).or_default().push(idx);
        }
    }

    /// Senses for a lemma no harder than `max_difficulty` allows.
    pub fn senses(&self, lemma: &str, pos: &str, max_difficulty: u8) -> Vec<&Sense> {
        let indices = self
            .by_key
            .get(&(lemma.to_string(), pos.to_string()))
            .or_else(|| self.by_key.get(&(lemma.to_string(), String::new())));
        indices
            .into_iter()
            .flatten()
            .map(|&idx| &self.senses[idx])
            .filter(|sense| sense.difficulty <= max_difficulty)
            .collect()
    }

    pub fn sense(&self, id: u32) -> Option<&Sense> {
        self.by_id.get(&id).map(|&idx| &self.senses[idx])
    }

    pub fn len(&self) -> usize {
        self.senses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senses.is_empty()
    }
}

/// Compact ids for distinct candidate-sense sets.
///
/// Set to id is a bijection filled monotonically, and every lemma key keeps
/// the set it was first registered with. Sets compare without regard to
/// order; a group keeps the order it was first seen in.
#[derive(Debug, Default)]
pub struct SenseGroups {
    /// Keyed by the sorted ids.
    ids: HashMap<Vec<u32>, u32>,
    sets: Vec<Vec<u32>>,
    keys: HashMap<(String, String, String), u32>,
}

impl SenseGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group id for a sense set, assigning the next id on first sight.
    pub fn group_id(&mut self, senses: &[u32]) -> u32 {
        let key = set_key(senses);
        if let Some(&id) = self.ids.get(&key) {
            return id;
        }
        let id = self.sets.len() as u32;
        self.sets.push(senses.to_vec());
        self.ids.insert(key, id);
        id
    }

    /// Register the senses found for a lemma+word+POS key.
    pub fn register(
        &mut self,
        lemma: &str,
        word: &str,
        pos: &str,
        senses: &[u32],
    ) -> Result<u32, EngineError> {
        let key = (lemma.to_string(), word.to_string(), pos.to_string());
        if let Some(&group) = self.keys.get(&key) {
            let existing = &self.sets[group as usize];
            if set_key(existing) != set_key(senses) {
                return Err(EngineError::SenseGroupConflict {
                    key: format!("{lemma}/{word}/{pos}"),
                    existing: existing.clone(),
                    incoming: senses.to_vec(),
                });
            }
            return Ok(group);
        }
        let group = self.group_id(senses);
        self.keys.insert(key, group);
        Ok(group)
    }

    pub fn get(&self, group: u32) -> Option<&[u32]> {
        self.sets.get(group as usize).map(Vec::as_slice)
    }

    /// Sets in group-id order.
    pub fn sets(&self) -> &[Vec<u32>] {
        &self.sets
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

fn set_key(senses: &[u32]) -> Vec<u32> {
    let mut key = senses.to_vec();
    key.sort_unstable();
    key.dedup();
    key
}
