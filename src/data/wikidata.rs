//! Wikidata SPARQL cache for map images and inception dates.

use std::{
    collections::{HashMap, HashSet},
    path::Path,
};

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{header::ACCEPT, Client};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    cancel::CancelFlag,
    data::{
        cache_path, source_identity,
        store::{CacheStore, ItemFacts},
    },
    error::{EngineError, RemoteError},
};

/// Items per SPARQL query.
pub const WIKIDATA_BATCH: usize = 50;

static ITEM_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Q\d+$").expect("valid item regex"));

/// A SPARQL endpoint answering SELECT queries as JSON result sets.
#[allow(async_fn_in_trait)]
pub trait SparqlApi {
    fn identity(&self) -> String;
    async fn select(&self, query: &str) -> Result<Value, RemoteError>;
}

#[derive(Debug, Clone)]
pub struct HttpSparql {
    client: Client,
    endpoint: String,
}

impl HttpSparql {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

impl SparqlApi for HttpSparql {
    fn identity(&self) -> String {
        source_identity(&self.endpoint)
    }

    async fn select(&self, query: &str) -> Result<Value, RemoteError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("query", query), ("format", "json")])
            .header(ACCEPT, "application/sparql-results+json")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                url: self.endpoint.clone(),
            });
        }
        Ok(resp.json().await?)
    }
}

#[derive(Debug, Default, Deserialize)]
struct SparqlResponse {
    #[serde(default)]
    results: SparqlResults,
}

#[derive(Debug, Default, Deserialize)]
struct SparqlResults {
    #[serde(default)]
    bindings: Vec<HashMap<String, Binding>>,
}

#[derive(Debug, Deserialize)]
struct Binding {
    value: String,
}

/// Whether `item` looks like a Wikidata item id (`Q` followed by digits).
pub fn is_item_id(item: &str) -> bool {
    ITEM_ID.is_match(item)
}

/// SELECT for the map image (P242) and inception (P571) of `items`.
pub fn items_query(items: &[String]) -> String {
    let values = items
        .iter()
        .map(|item| format!("wd:{item}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "SELECT ?item (SAMPLE(?map) AS ?map) (SAMPLE(?inception) AS ?inception) WHERE {{ \
         VALUES ?item {{ {values} }} \
         OPTIONAL {{ ?item wdt:P242 ?map. }} \
         OPTIONAL {{ ?item wdt:P571 ?inception. }} \
         }} GROUP BY ?item"
    )
}

/// File name from a Commons `Special:FilePath` URL.
pub fn commons_filename(url: &str) -> Option<String> {
    let last = url.rsplit('/').next().filter(|segment| !segment.is_empty())?;
    urlencoding::decode(last).ok().map(|name| name.into_owned())
}

#[derive(Debug)]
pub struct StructuredCache<S> {
    store: CacheStore,
    source: S,
    cancel: CancelFlag,
}

impl<S: SparqlApi> StructuredCache<S> {
    pub fn open(dir: &Path, source: S) -> Result<Self, EngineError> {
        let store = CacheStore::open(&cache_path(dir, &source.identity()))?;
        Ok(Self::with_store(store, source))
    }

    pub fn with_store(store: CacheStore, source: S) -> Self {
        Self {
            store,
            source,
            cancel: CancelFlag::default(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn lookup(&self, item: &str) -> Result<Option<ItemFacts>, EngineError> {
        self.store.item(item)
    }

    /// Fetch facts for every well-formed item id without a stored row.
    pub async fn query_batch<'i, I>(&mut self, items: I) -> Result<usize, EngineError>
    where
        I: IntoIterator<Item = &'i str>,
    {
        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for item in items {
            if !is_item_id(item) || !seen.insert(item) {
                continue;
            }
            if self.store.item(item)?.is_none() {
                pending.push(item.to_string());
            }
        }
        if pending.is_empty() {
            return Ok(0);
        }
        info!(items = pending.len(), "querying structured data");
        for chunk in pending.chunks(WIKIDATA_BATCH) {
            self.cancel.check()?;
            self.query_chunk(chunk).await?;
        }
        Ok(pending.len())
    }

    pub fn close(self) -> Result<(), EngineError> {
        self.store.close()
    }

    async fn query_chunk(&self, chunk: &[String]) -> Result<(), EngineError> {
        let resp = match self.select(&items_query(chunk)).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(%err, items = chunk.len(), "structured data batch failed");
                return Ok(());
            }
        };

        let mut found: HashMap<String, ItemFacts> = HashMap::new();
        for row in resp.results.bindings {
            let Some(item) = row.get("item").and_then(|b| b.value.rsplit('/').next()) else {
                continue;
            };
            let facts = ItemFacts {
                map_filename: row.get("map").and_then(|b| commons_filename(&b.value)),
                inception: row.get("inception").map(|b| b.value.clone()),
            };
            found.insert(item.to_string(), facts);
        }
        // Items the endpoint did not mention still get a row.
        for item in chunk {
            let facts = found.remove(item).unwrap_or_default();
            self.store.put_item(item, &facts)?;
        }
        Ok(())
    }

    async fn select(&self, query: &str) -> Result<SparqlResponse, RemoteError> {
        let body = self.source.select(query).await?;
        Ok(serde_json::from_value(body)?)
    }
}
