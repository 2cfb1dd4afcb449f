//! Folding entity mentions into canonical X-Ray entities.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::{
    error::EngineError,
    nlp::{
        fuzz::{extract_one, FUZZ_THRESHOLD},
        has_name_separator, is_person_label,
    },
};

/// Canonical entity. Its key in the resolver is the display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    pub id: u32,
    pub label: String,
    pub count: u32,
    /// Sentence of the first mention.
    pub quote: String,
}

/// Ordered map of canonical entities plus id allocation.
///
/// One resolver per book, owned by a single writer: name promotion and id
/// allocation assume nobody else mutates the map.
#[derive(Debug, Default)]
pub struct EntityResolver {
    entities: IndexMap<String, Entity>,
    overrides: HashSet<String>,
    removed: HashSet<u32>,
    next_id: u32,
}

impl EntityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names in `overrides` only ever match exactly and are never pruned.
    pub fn with_overrides<I>(overrides: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            overrides: overrides.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Resolve a mention to an entity id, creating or merging as needed.
    pub fn resolve(&mut self, name: &str, label: &str, sentence: &str) -> Result<u32, EngineError> {
        if let Some(entity) = self.entities.get_mut(name) {
            entity.count += 1;
            return Ok(entity.id);
        }

        if !self.overrides.contains(name) {
            if let Some(matched) = self.best_match(name, label) {
                if let Some(id) = self.merge(&matched, name, label) {
                    return Ok(id);
                }
            }
        }

        let id = self.allocate_id()?;
        self.entities.insert(
            name.to_string(),
            Entity {
                id,
                label: label.to_string(),
                count: 1,
                quote: sentence.to_string(),
            },
        );
        Ok(id)
    }

    /// Drop rarely mentioned entities nothing else can describe.
    pub fn prune<F>(&mut self, min_count: u32, has_description: F) -> Vec<u32>
    where
        F: Fn(&str) -> bool,
    {
        let mut dropped = Vec::new();
        let overrides = &self.overrides;
        self.entities.retain(|name, entity| {
            let keep = entity.count >= min_count
                || has_description(name.as_str())
                || overrides.contains(name.as_str());
            if !keep {
                dropped.push(entity.id);
            }
            keep
        });
        self.removed.extend(dropped.iter().copied());
        debug!(pruned = dropped.len(), min_count, "pruned entities");
        dropped
    }

    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    /// Entities in insertion order; a promoted entity moves to the end.
    pub fn entities(&self) -> impl Iterator<Item = (&str, &Entity)> {
        self.entities.iter().map(|(name, entity)| (name.as_str(), entity))
    }

    pub fn is_removed(&self, id: u32) -> bool {
        self.removed.contains(&id)
    }

    pub fn removed(&self) -> &HashSet<u32> {
        &self.removed
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn best_match(&self, name: &str, label: &str) -> Option<String> {
        let person = is_person_label(label);
        let candidates = self
            .entities
            .iter()
            .filter(|(_, entity)| is_person_label(&entity.label) == person)
            .map(|(key, _)| key.as_str());
        extract_one(name, candidates, FUZZ_THRESHOLD).map(|(key, _)| key.to_string())
    }

    fn merge(&mut self, matched: &str, name: &str, label: &str) -> Option<u32> {
        let entity = self.entities.get_mut(matched)?;
        entity.count += 1;
        let id = entity.id;

        let promote = !has_name_separator(matched)
            && has_name_separator(name)
            && is_person_label(&entity.label)
            && is_person_label(label);
        if promote {
            if let Some(entity) = self.entities.shift_remove(matched) {
                debug!(from = matched, to = name, id, "promoted entity name");
                self.entities.insert(name.to_string(), entity);
            }
        } else {
            debug!(mention = name, canonical = matched, id, "merged mention");
        }
        Some(id)
    }

    fn allocate_id(&mut self) -> Result<u32, EngineError> {
        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(EngineError::IdReuse(id))?;
        Ok(id)
    }
}
