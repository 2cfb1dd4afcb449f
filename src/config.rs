//! Runtime configuration utilities for book-lens.

use std::{
    env,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::Context;
use serde::Deserialize;

/// Application configuration resolved from `.env` and defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Root folder for persisted caches.
    pub data_dir: PathBuf,
    /// Root folder for annotation outputs.
    pub outputs_dir: PathBuf,
    /// MediaWiki action API used as the knowledge source.
    pub wiki_api_url: String,
    pub wikidata_sparql_url: String,
    /// Contact address sent in the user agent.
    pub contact_email: String,
    /// Look up person entities remotely as well.
    pub search_people: bool,
    /// Entities mentioned fewer times than this are pruned unless described.
    pub min_entity_count: u32,
    /// Highest sense difficulty that still gets a gloss.
    pub word_wise_difficulty: u8,
    pub http_timeout_secs: u64,
    /// Token embedding service for sense disambiguation, if any.
    pub embedding_url: Option<String>,
}

impl Settings {
    /// Load configuration from environment with reasonable defaults.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        let outputs_dir = env::var("OUTPUTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./outputs"));
        let wiki_api_url = env::var("WIKI_API_URL")
            .unwrap_or_else(|_| "https://en.wikipedia.org/w/api.php".to_string());
        let wikidata_sparql_url = env::var("WIKIDATA_SPARQL_URL")
            .unwrap_or_else(|_| "https://query.wikidata.org/sparql".to_string());
        let contact_email =
            env::var("CONTACT_EMAIL").unwrap_or_else(|_| "annotator@example.com".to_string());
        let search_people = parsed_var("SEARCH_PEOPLE", false);
        let min_entity_count = parsed_var("MIN_ENTITY_COUNT", 2);
        let word_wise_difficulty = parsed_var("WORD_WISE_DIFFICULTY", 5);
        let http_timeout_secs = parsed_var("HTTP_TIMEOUT_SECS", 15);
        let embedding_url = env::var("EMBEDDING_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        std::fs::create_dir_all(&data_dir).context("creating data dir")?;
        std::fs::create_dir_all(&outputs_dir).context("creating outputs dir")?;

        Ok(Self {
            data_dir,
            outputs_dir,
            wiki_api_url,
            wikidata_sparql_url,
            contact_email,
            search_people,
            min_entity_count,
            word_wise_difficulty,
            http_timeout_secs,
            embedding_url,
        })
    }

    /// Convenience helper for derived path segments.
    pub fn join_data<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.data_dir.join(path)
    }

    /// Convenience helper for derived output path segments.
    pub fn join_output<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.outputs_dir.join(path)
    }

    /// Directory holding one SQLite file per remote source.
    pub fn cache_dir(&self) -> PathBuf {
        self.join_data("cache")
    }
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
