//! MediaWiki-backed knowledge cache.
//!
//! Titles are looked up in the local store first; only titles with no row
//! reach the remote. Every remote answer ends in a row for each requested
//! title (content, absent, or a redirect pointing straight at its final
//! title), so a title is never asked for twice.

use std::{
    collections::{HashMap, HashSet},
    path::Path,
};

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    cancel::CancelFlag,
    data::{
        cache_path, source_identity,
        store::{CacheEntry, CacheStore},
    },
    error::{EngineError, RemoteError},
    nlp::fuzz::{extract_one, FUZZ_THRESHOLD},
    output::DescriptionSource,
};

/// Titles per bulk extracts request.
pub const MEDIAWIKI_BATCH: usize = 20;

const TEXT_EXTRACTS_KEY: &str = "text_extracts";

static PARAGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p>").expect("valid paragraph regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));
static CITATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(?:\d+|[a-z]|note \d+|citation needed)\]").expect("valid citation regex")
});
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<h[1-6]\b").expect("valid heading regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// A MediaWiki action API endpoint.
#[allow(async_fn_in_trait)]
pub trait WikiApi {
    /// Stable name used for the cache file.
    fn identity(&self) -> String;
    fn source(&self) -> DescriptionSource;
    /// GET with the given query parameters, returning the decoded JSON body.
    async fn get(&self, params: &[(&str, &str)]) -> Result<Value, RemoteError>;
}

#[derive(Debug, Clone)]
pub struct HttpWiki {
    client: Client,
    api_url: String,
}

impl HttpWiki {
    pub fn new(client: Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }
}

impl WikiApi for HttpWiki {
    fn identity(&self) -> String {
        source_identity(&self.api_url)
    }

    fn source(&self) -> DescriptionSource {
        if source_identity(&self.api_url).ends_with("wikipedia.org") {
            DescriptionSource::Wikipedia
        } else {
            DescriptionSource::OtherWiki
        }
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<Value, RemoteError> {
        let resp = self
            .client
            .get(&self.api_url)
            .query(&[("format", "json"), ("formatversion", "2")])
            .query(params)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                url: self.api_url.clone(),
            });
        }
        let body: Value = resp.json().await?;
        if let Some(error) = body.get("error") {
            let field = |name: &str| {
                error
                    .get(name)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            return Err(RemoteError::Api {
                code: field("code"),
                info: field("info"),
            });
        }
        Ok(body)
    }
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    query: QueryBody,
}

#[derive(Debug, Default, Deserialize)]
struct QueryBody {
    #[serde(default)]
    normalized: Vec<TitleMapping>,
    #[serde(default)]
    redirects: Vec<TitleMapping>,
    #[serde(default)]
    pages: Vec<QueryPage>,
    #[serde(default)]
    extensions: Vec<Extension>,
}

#[derive(Debug, Deserialize)]
struct TitleMapping {
    from: String,
    to: String,
    #[serde(default)]
    tofragment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryPage {
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    pageprops: PageProps,
}

#[derive(Debug, Default, Deserialize)]
struct PageProps {
    #[serde(default)]
    wikibase_item: Option<String>,
    #[serde(default)]
    disambiguation: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Extension {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    parse: ParseBody,
}

#[derive(Debug, Deserialize)]
struct ParseBody {
    title: String,
    #[serde(default)]
    redirects: Vec<TitleMapping>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    links: Vec<Link>,
    #[serde(default)]
    properties: PageProps,
}

#[derive(Debug, Deserialize)]
struct Link {
    #[serde(default)]
    ns: i64,
    title: String,
    #[serde(default = "default_exists")]
    exists: bool,
}

fn default_exists() -> bool {
    true
}

/// Persistent title to description cache in front of one wiki.
#[derive(Debug)]
pub struct KnowledgeCache<S> {
    store: CacheStore,
    source: S,
    bulk: Option<bool>,
    cancel: CancelFlag,
}

impl<S: WikiApi> KnowledgeCache<S> {
    /// Open the cache file for `source` under `dir`.
    pub fn open(dir: &Path, source: S) -> Result<Self, EngineError> {
        let store = CacheStore::open(&cache_path(dir, &source.identity()))?;
        Ok(Self::with_store(store, source))
    }

    pub fn with_store(store: CacheStore, source: S) -> Self {
        Self {
            store,
            source,
            bulk: None,
            cancel: CancelFlag::default(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn description_source(&self) -> DescriptionSource {
        self.source.source()
    }

    /// Cached entry for `title`, following a redirect row one hop.
    pub fn lookup(&self, title: &str) -> Result<Option<CacheEntry>, EngineError> {
        match self.store.title(title)? {
            Some(CacheEntry::Redirect { target }) => match self.store.title(&target)? {
                Some(CacheEntry::Redirect { .. }) | None => Ok(Some(CacheEntry::Redirect { target })),
                resolved => Ok(resolved),
            },
            other => Ok(other),
        }
    }

    /// Description and item id for `title`, if the source has content for it.
    pub fn description(&self, title: &str) -> Result<Option<(String, Option<String>)>, EngineError> {
        Ok(match self.lookup(title)? {
            Some(CacheEntry::Content {
                description,
                item_id,
            }) => Some((description, item_id)),
            _ => None,
        })
    }

    /// Fetch every uncached title. `is_person` titles are skipped unless
    /// `search_people` is set. Returns how many titles went to the remote.
    pub async fn query_batch<'t, I>(&mut self, titles: I, search_people: bool) -> Result<usize, EngineError>
    where
        I: IntoIterator<Item = (&'t str, bool)>,
    {
        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for (title, is_person) in titles {
            let title = title.trim();
            if title.is_empty() || (is_person && !search_people) {
                continue;
            }
            if !seen.insert(title.to_lowercase()) {
                continue;
            }
            if self.store.title(title)?.is_none() {
                pending.push(title.to_string());
            }
        }
        if pending.is_empty() {
            return Ok(0);
        }

        let Some(bulk) = self.bulk_supported().await? else {
            warn!(titles = pending.len(), "knowledge source unreachable, skipping batch");
            return Ok(0);
        };
        info!(titles = pending.len(), bulk, "querying knowledge source");
        for chunk in pending.chunks(MEDIAWIKI_BATCH) {
            self.cancel.check()?;
            if bulk {
                self.query_extracts(chunk).await?;
            } else {
                for title in chunk {
                    self.cancel.check()?;
                    self.query_parse(title, &[]).await?;
                }
            }
        }
        Ok(pending.len())
    }

    pub fn close(self) -> Result<(), EngineError> {
        self.store.close()
    }

    async fn fetch<T: DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T, RemoteError> {
        let body = self.source.get(params).await?;
        Ok(serde_json::from_value(body)?)
    }

    /// Whether the wiki has TextExtracts, asked once per cache file. `None`
    /// when the source could not be reached; nothing is remembered then.
    async fn bulk_supported(&mut self) -> Result<Option<bool>, EngineError> {
        if let Some(bulk) = self.bulk {
            return Ok(Some(bulk));
        }
        if let Some(stored) = self.store.meta(TEXT_EXTRACTS_KEY)? {
            let bulk = stored == "1";
            self.bulk = Some(bulk);
            return Ok(Some(bulk));
        }
        let params = [
            ("action", "query"),
            ("meta", "siteinfo"),
            ("siprop", "extensions"),
        ];
        let resp = match self.fetch::<QueryResponse>(&params).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(%err, "capability discovery failed");
                return Ok(None);
            }
        };
        let bulk = resp
            .query
            .extensions
            .iter()
            .any(|ext| ext.name == "TextExtracts");
        self.store
            .set_meta(TEXT_EXTRACTS_KEY, if bulk { "1" } else { "0" })?;
        self.bulk = Some(bulk);
        Ok(Some(bulk))
    }

    async fn query_extracts(&self, chunk: &[String]) -> Result<(), EngineError> {
        let joined = chunk.join("|");
        let params = [
            ("action", "query"),
            ("prop", "extracts|pageprops"),
            ("exintro", "1"),
            ("explaintext", "1"),
            ("exlimit", "max"),
            ("redirects", "1"),
            ("ppprop", "disambiguation|wikibase_item"),
            ("titles", joined.as_str()),
        ];
        let body = match self.fetch::<QueryResponse>(&params).await {
            Ok(resp) => resp.query,
            Err(err) => {
                warn!(%err, titles = chunk.len(), "extracts batch failed");
                return Ok(());
            }
        };

        let mut disambiguation = HashSet::new();
        for page in &body.pages {
            if page.missing || page.invalid {
                self.store.put_title(&page.title, &CacheEntry::Absent)?;
            } else if page.pageprops.disambiguation.is_some() {
                disambiguation.insert(page.title.as_str());
            } else {
                let entry = match page.extract.as_deref().and_then(first_paragraph) {
                    Some(description) => CacheEntry::Content {
                        description,
                        item_id: page.pageprops.wikibase_item.clone(),
                    },
                    None => CacheEntry::Absent,
                };
                self.store.put_title(&page.title, &entry)?;
            }
        }

        let normalized: HashMap<&str, &str> = body
            .normalized
            .iter()
            .map(|m| (m.from.as_str(), m.to.as_str()))
            .collect();
        let redirects: HashMap<&str, &TitleMapping> =
            body.redirects.iter().map(|m| (m.from.as_str(), m)).collect();

        for title in chunk {
            let mut hops = vec![title.clone()];
            let mut current = normalized
                .get(title.as_str())
                .copied()
                .unwrap_or(title.as_str());
            let mut fragment = None;
            let mut steps = 0;
            while let Some(mapping) = redirects.get(current) {
                if steps > redirects.len() {
                    break;
                }
                steps += 1;
                if !hops.iter().any(|hop| hop == current) {
                    hops.push(current.to_string());
                }
                current = mapping.to.as_str();
                fragment = mapping.tofragment.as_deref();
            }

            let resolved = if disambiguation.contains(current) && self.store.title(current)?.is_none() {
                self.query_parse(current, &hops).await?
            } else if let Some(fragment) = fragment {
                self.query_section(current, fragment, &hops).await?
            } else {
                true
            };
            if resolved {
                self.alias_to(&hops, current)?;
            }
        }
        Ok(())
    }

    /// Point every name in `aliases` directly at whatever `target` resolved to.
    fn alias_to(&self, aliases: &[String], target: &str) -> Result<(), EngineError> {
        let entry = match self.store.title(target)? {
            Some(CacheEntry::Redirect { target }) => CacheEntry::Redirect { target },
            Some(CacheEntry::Content { .. }) => CacheEntry::Redirect {
                target: target.to_string(),
            },
            Some(CacheEntry::Absent) | None => CacheEntry::Absent,
        };
        for alias in aliases {
            if matches!(&entry, CacheEntry::Redirect { target } if target.eq_ignore_ascii_case(alias)) {
                continue;
            }
            self.store.put_title(alias, &entry)?;
        }
        Ok(())
    }

    /// Resolve a redirect that lands on a section: the section's first
    /// paragraph describes every alias.
    async fn query_section(&self, page: &str, fragment: &str, aliases: &[String]) -> Result<bool, EngineError> {
        let mut known = true;
        for alias in aliases {
            known &= self.store.title(alias)?.is_some();
        }
        if known {
            return Ok(true);
        }
        let params = [
            ("action", "parse"),
            ("page", page),
            ("prop", "text"),
            ("redirects", "1"),
        ];
        let entry = match self.fetch::<ParseResponse>(&params).await {
            Ok(resp) => match section_paragraph(&resp.parse.text, fragment) {
                Some(description) => CacheEntry::Content {
                    description,
                    item_id: None,
                },
                None => CacheEntry::Absent,
            },
            Err(RemoteError::Api { code, .. }) if is_missing(&code) => CacheEntry::Absent,
            Err(err) => {
                warn!(%err, page, fragment, "section lookup failed");
                return Ok(false);
            }
        };
        for alias in aliases {
            self.store.put_title(alias, &entry)?;
        }
        Ok(true)
    }

    /// Per-title resolution through the parse API. A disambiguation page is
    /// followed once, to the linked article closest to the original title.
    /// Returns false when the remote failed and nothing was written.
    async fn query_parse(&self, title: &str, aliases: &[String]) -> Result<bool, EngineError> {
        let mut names: Vec<String> = aliases.to_vec();
        if !names.iter().any(|name| name.eq_ignore_ascii_case(title)) {
            names.push(title.to_string());
        }
        let original = aliases.first().map_or(title, String::as_str);
        let mut page = title.to_string();

        for attempt in 0..2 {
            let params = [
                ("action", "parse"),
                ("page", page.as_str()),
                ("prop", "text|links|properties"),
                ("redirects", "1"),
            ];
            let parsed = match self.fetch::<ParseResponse>(&params).await {
                Ok(resp) => resp.parse,
                Err(RemoteError::Api { code, .. }) if is_missing(&code) => break,
                Err(err) => {
                    warn!(%err, title, "parse lookup failed");
                    return Ok(false);
                }
            };
            names.extend(parsed.redirects.iter().map(|m| m.from.clone()));

            if parsed.properties.disambiguation.is_some() {
                if attempt > 0 {
                    break;
                }
                let links = parsed
                    .links
                    .iter()
                    .filter(|link| link.ns == 0 && link.exists)
                    .map(|link| link.title.as_str());
                let Some((target, score)) = extract_one(original, links, FUZZ_THRESHOLD) else {
                    debug!(title, "no close article on disambiguation page");
                    break;
                };
                debug!(title, target, score, "following disambiguation link");
                names.push(parsed.title.clone());
                page = target.to_string();
                continue;
            }

            if let Some(fragment) = parsed.redirects.last().and_then(|m| m.tofragment.as_deref()) {
                let entry = match section_paragraph(&parsed.text, fragment) {
                    Some(description) => CacheEntry::Content {
                        description,
                        item_id: None,
                    },
                    None => CacheEntry::Absent,
                };
                for name in &names {
                    self.store.put_title(name, &entry)?;
                }
                return Ok(true);
            }

            match lead_paragraph(&parsed.text) {
                Some(description) => {
                    self.store.put_title(
                        &parsed.title,
                        &CacheEntry::Content {
                            description,
                            item_id: parsed.properties.wikibase_item.clone(),
                        },
                    )?;
                    self.alias_to(&names, &parsed.title)?;
                }
                None => {
                    names.push(parsed.title);
                    for name in &names {
                        self.store.put_title(name, &CacheEntry::Absent)?;
                    }
                }
            }
            return Ok(true);
        }

        for name in &names {
            self.store.put_title(name, &CacheEntry::Absent)?;
        }
        Ok(true)
    }
}

fn is_missing(code: &str) -> bool {
    matches!(code, "missingtitle" | "invalidtitle")
}

fn first_paragraph(extract: &str) -> Option<String> {
    extract
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// First non-empty paragraph of rendered page HTML, as plain text.
pub fn lead_paragraph(html: &str) -> Option<String> {
    PARAGRAPH
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|inner| clean_fragment(inner.as_str()))
        .find(|text| !text.is_empty())
}

/// First paragraph after the heading whose anchor is `fragment`, stopping at
/// the next heading.
pub fn section_paragraph(html: &str, fragment: &str) -> Option<String> {
    let anchor = format!("id=\"{}\"", fragment.replace(' ', "_"));
    let at = html.find(&anchor)?;
    let rest = &html[at..];
    let body = rest.find("</h").map(|end| &rest[end + 3..])?;
    let until = HEADING.find(body).map_or(body.len(), |m| m.start());
    lead_paragraph(&body[..until])
}

fn clean_fragment(raw: &str) -> String {
    let stripped = TAG.replace_all(raw, "").replace("&nbsp;", " ");
    let text = match quick_xml::escape::unescape(&stripped) {
        Ok(text) => text.into_owned(),
        Err(_) => stripped.clone(),
    };
    let text = CITATION.replace_all(&text, "");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}
