//! Remote knowledge sources and their persistent caches.

pub mod store;
pub mod wiki;
pub mod wikidata;

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Result;
use chrono::Utc;
use reqwest::{Client, Url};

use crate::config::Settings;

/// Shared HTTP client for every remote collaborator.
pub fn http_client(settings: &Settings) -> Result<Client> {
    Ok(Client::builder()
        .user_agent(format!(
            "book-lens/{} (+{})",
            env!("CARGO_PKG_VERSION"),
            settings.contact_email
        ))
        .gzip(true)
        .brotli(true)
        .timeout(Duration::from_secs(settings.http_timeout_secs))
        .build()?)
}

/// Cache identity for an endpoint URL: the lower-cased host and port, plus the
/// path when it is not the standard `/w/api.php`, so distinct sources never
/// share a file.
pub fn source_identity(url: &str) -> String {
    let raw = match Url::parse(url) {
        Ok(parsed) => {
            let mut raw = parsed.host_str().unwrap_or_default().to_lowercase();
            if let Some(port) = parsed.port() {
                raw.push_str(&format!("_{port}"));
            }
            let path = parsed.path().trim_matches('/');
            if !path.is_empty() && path != "w/api.php" {
                raw.push('_');
                raw.push_str(path);
            }
            raw
        }
        Err(_) => url.trim().to_lowercase(),
    };
    raw.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

/// Database file for a source identity under `dir`.
pub fn cache_path(dir: &Path, identity: &str) -> PathBuf {
    dir.join(format!("{identity}.sqlite"))
}

/// Stamp for cache rows.
pub fn utc_timestamp_string() -> String {
    Utc::now().to_rfc3339()
}
