//! User-curated X-Ray entries that override what the tagger finds.

use std::{
    collections::{HashMap, HashSet},
    path::Path,
};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::info;

use crate::output::DescriptionSource;

/// One curated entry as written in the custom entities file.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomEntity {
    pub name: String,
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source: Option<DescriptionSource>,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Drop every mention of this name and its aliases.
    #[serde(default)]
    pub omit: bool,
}

fn default_label() -> String {
    "MISC".to_string()
}

/// Lookup tables over the curated entries.
#[derive(Debug, Default)]
pub struct CustomEntities {
    entries: IndexMap<String, CustomEntity>,
    aliases: HashMap<String, String>,
    omitted: HashSet<String>,
}

impl CustomEntities {
    /// Load a JSON array of entries.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read custom entities {}", path.display()))?;
        let entries: Vec<CustomEntity> = serde_json::from_str(&raw)
            .with_context(|| format!("parse custom entities {}", path.display()))?;
        info!(path = %path.display(), count = entries.len(), "loaded custom entities");
        Ok(Self::from_entries(entries))
    }

    pub fn from_entries(entries: Vec<CustomEntity>) -> Self {
        let mut custom = Self::default();
        for entry in entries {
            let name = entry.name.trim().to_string();
            if name.is_empty() {
                continue;
            }
            if entry.omit {
                custom.omitted.insert(name.clone());
                custom
                    .omitted
                    .extend(entry.aliases.iter().map(|a| a.trim().to_string()));
                continue;
            }
            for alias in &entry.aliases {
                custom.aliases.insert(alias.trim().to_string(), name.clone());
            }
            custom.entries.insert(name, entry);
        }
        custom
    }

    /// Entry a mention stands for, through its name or one of its aliases.
    pub fn canonical(&self, mention: &str) -> Option<&CustomEntity> {
        let mention = mention.trim();
        self.entries.get(mention).or_else(|| {
            self.aliases
                .get(mention)
                .and_then(|name| self.entries.get(name))
        })
    }

    pub fn is_omitted(&self, mention: &str) -> bool {
        self.omitted.contains(mention.trim())
    }

    pub fn get(&self, name: &str) -> Option<&CustomEntity> {
        self.entries.get(name)
    }

    /// Curated description and its source, if the entry carries one.
    pub fn description(&self, name: &str) -> Option<(&str, DescriptionSource)> {
        let entry = self.entries.get(name)?;
        let text = entry.description.as_deref()?;
        Some((text, entry.source.unwrap_or(DescriptionSource::Custom)))
    }

    /// Names that form the resolver's manual-override set.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
