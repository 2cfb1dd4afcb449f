use std::{cell::RefCell, collections::HashMap};

use book_lens::{
    data::{
        source_identity,
        store::{CacheEntry, CacheStore, ItemFacts},
        wiki::{lead_paragraph, section_paragraph, KnowledgeCache, WikiApi},
        wikidata::{commons_filename, items_query, SparqlApi, StructuredCache},
    },
    error::RemoteError,
    output::DescriptionSource,
};
use serde_json::{json, Value};

type Params = HashMap<String, String>;

struct FakeWiki {
    calls: RefCell<Vec<Params>>,
    respond: Box<dyn Fn(&Params) -> Result<Value, RemoteError>>,
}

impl FakeWiki {
    fn new(respond: impl Fn(&Params) -> Result<Value, RemoteError> + 'static) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            respond: Box::new(respond),
        }
    }

    fn calls(&self) -> usize {
        self.calls.borrow().len()
    }

    fn count(&self, key: &str, value: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|params| params.get(key).map(String::as_str) == Some(value))
            .count()
    }
}

impl WikiApi for FakeWiki {
    fn identity(&self) -> String {
        "fake.wiki".to_string()
    }

    fn source(&self) -> DescriptionSource {
        DescriptionSource::Wikipedia
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<Value, RemoteError> {
        let params: Params = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.calls.borrow_mut().push(params.clone());
        (self.respond)(&params)
    }
}

fn siteinfo(bulk: bool) -> Value {
    let extensions = if bulk {
        json!([{ "name": "ParserFunctions" }, { "name": "TextExtracts" }])
    } else {
        json!([{ "name": "ParserFunctions" }])
    };
    json!({ "query": { "extensions": extensions } })
}

fn is_siteinfo(params: &Params) -> bool {
    params.get("meta").map(String::as_str) == Some("siteinfo")
}

fn param<'p>(params: &'p Params, key: &str) -> &'p str {
    params.get(key).map(String::as_str).unwrap_or_default()
}

fn content(description: &str, item_id: Option<&str>) -> Option<CacheEntry> {
    Some(CacheEntry::Content {
        description: description.to_string(),
        item_id: item_id.map(str::to_string),
    })
}

fn memory_cache(wiki: FakeWiki) -> KnowledgeCache<FakeWiki> {
    KnowledgeCache::with_store(CacheStore::open_in_memory().unwrap(), wiki)
}

fn hogwarts_wiki() -> FakeWiki {
    FakeWiki::new(|params| {
        if is_siteinfo(params) {
            return Ok(siteinfo(true));
        }
        Ok(json!({ "query": {
            "normalized": [{ "from": "hogwarts", "to": "Hogwarts" }],
            "redirects": [{ "from": "The Boy Who Lived", "to": "Harry Potter (character)" }],
            "pages": [
                { "title": "Hogwarts", "extract": "Hogwarts is a school.\nIt is in Scotland.",
                  "pageprops": { "wikibase_item": "Q1" } },
                { "title": "Harry Potter (character)", "extract": "Harry Potter is a wizard.",
                  "pageprops": { "wikibase_item": "Q2" } },
                { "title": "Diagon Alley", "extract": "Diagon Alley is a street." },
                { "title": "Nonexistent Place", "missing": true }
            ]
        }}))
    })
}

#[tokio::test]
async fn absent_title_is_never_requested_again() {
    let store = CacheStore::open_in_memory().unwrap();
    store.put_title("Nowhere", &CacheEntry::Absent).unwrap();
    let mut cache = KnowledgeCache::with_store(
        store,
        FakeWiki::new(|_| panic!("cached titles must not reach the remote")),
    );

    let queried = cache
        .query_batch([("Nowhere", false), ("NOWHERE", false)], false)
        .await
        .unwrap();
    assert_eq!(queried, 0);
    assert_eq!(cache.source().calls(), 0);
    assert_eq!(cache.lookup("nowhere").unwrap(), Some(CacheEntry::Absent));
}

#[tokio::test]
async fn bulk_extracts_cover_normalized_and_redirected_titles() {
    let mut cache = memory_cache(hogwarts_wiki());
    let titles = [
        ("hogwarts", false),
        ("The Boy Who Lived", false),
        ("Nonexistent Place", false),
    ];
    assert_eq!(cache.query_batch(titles, false).await.unwrap(), 3);

    assert_eq!(
        cache.lookup("hogwarts").unwrap(),
        content("Hogwarts is a school.", Some("Q1"))
    );
    assert_eq!(
        cache.lookup("The Boy Who Lived").unwrap(),
        content("Harry Potter is a wizard.", Some("Q2"))
    );
    assert_eq!(cache.lookup("Nonexistent Place").unwrap(), Some(CacheEntry::Absent));
    assert_eq!(cache.source().count("meta", "siteinfo"), 1);
    assert_eq!(cache.source().count("prop", "extracts|pageprops"), 1);

    assert_eq!(cache.query_batch(titles, false).await.unwrap(), 0);
    assert_eq!(cache.source().calls(), 2);
}

#[tokio::test]
async fn people_are_skipped_unless_requested() {
    let mut cache = memory_cache(hogwarts_wiki());
    let titles = [("The Boy Who Lived", true)];
    assert_eq!(cache.query_batch(titles, false).await.unwrap(), 0);
    assert_eq!(cache.source().calls(), 0);
    assert_eq!(cache.query_batch(titles, true).await.unwrap(), 1);
    assert!(cache.description("The Boy Who Lived").unwrap().is_some());
}

#[tokio::test]
async fn capability_flag_persists_with_the_cache_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = KnowledgeCache::open(dir.path(), hogwarts_wiki()).unwrap();
    cache.query_batch([("Hogwarts", false)], false).await.unwrap();
    assert_eq!(cache.source().count("meta", "siteinfo"), 1);
    cache.close().unwrap();
    assert!(dir.path().join("fake.wiki.sqlite").exists());

    let mut reopened = KnowledgeCache::open(dir.path(), hogwarts_wiki()).unwrap();
    assert_eq!(
        reopened.lookup("Hogwarts").unwrap(),
        content("Hogwarts is a school.", Some("Q1"))
    );
    reopened.query_batch([("Diagon Alley", false)], false).await.unwrap();
    assert_eq!(reopened.source().count("meta", "siteinfo"), 0);
    assert_eq!(reopened.source().calls(), 1);
    assert_eq!(
        reopened.lookup("Diagon Alley").unwrap(),
        content("Diagon Alley is a street.", None)
    );
}

#[tokio::test]
async fn disambiguation_page_follows_the_closest_link() {
    let wiki = FakeWiki::new(|params| {
        if is_siteinfo(params) {
            return Ok(siteinfo(true));
        }
        if param(params, "action") == "query" {
            return Ok(json!({ "query": { "pages": [{
                "title": "Mercury",
                "extract": "Mercury may refer to:",
                "pageprops": { "disambiguation": "" }
            }]}}));
        }
        match param(params, "page") {
            "Mercury" => Ok(json!({ "parse": {
                "title": "Mercury",
                "text": "<p>Mercury may refer to:</p>",
                "links": [
                    { "ns": 0, "title": "Mercury (planet)", "exists": true },
                    { "ns": 0, "title": "Freddie Mercury", "exists": true },
                    { "ns": 14, "title": "Category:Mercury", "exists": true }
                ],
                "properties": { "disambiguation": "" }
            }})),
            "Mercury (planet)" => Ok(json!({ "parse": {
                "title": "Mercury (planet)",
                "text": "<div><p class=\"mw-empty-elt\"></p><p><b>Mercury</b> is the first planet from the Sun.<sup>[1]</sup></p></div>",
                "links": [],
                "properties": { "wikibase_item": "Q308" }
            }})),
            other => panic!("unexpected page {other}"),
        }
    });
    let mut cache = memory_cache(wiki);
    cache.query_batch([("Mercury", false)], false).await.unwrap();

    assert_eq!(
        cache.lookup("Mercury").unwrap(),
        content("Mercury is the first planet from the Sun.", Some("Q308"))
    );
    assert_eq!(cache.source().count("action", "parse"), 2);
}

#[tokio::test]
async fn parse_mode_handles_redirects_misses_and_dead_ends() {
    let wiki = FakeWiki::new(|params| {
        if is_siteinfo(params) {
            return Ok(siteinfo(false));
        }
        match param(params, "page") {
            "Voldemort" => Ok(json!({ "parse": {
                "title": "Lord Voldemort",
                "redirects": [{ "from": "Voldemort", "to": "Lord Voldemort" }],
                "text": "<p>Lord Voldemort is a dark wizard.</p>",
                "properties": {}
            }})),
            "Saturn" => Ok(json!({ "parse": {
                "title": "Saturn",
                "text": "<p>Saturn may refer to:</p>",
                "links": [{ "ns": 0, "title": "Ringed gas giant", "exists": true }],
                "properties": { "disambiguation": "" }
            }})),
            _ => Err(RemoteError::Api {
                code: "missingtitle".to_string(),
                info: "The page you specified doesn't exist.".to_string(),
            }),
        }
    });
    let mut cache = memory_cache(wiki);
    cache
        .query_batch([("Voldemort", false), ("Saturn", false), ("Nobody", false)], false)
        .await
        .unwrap();

    assert_eq!(
        cache.lookup("Voldemort").unwrap(),
        content("Lord Voldemort is a dark wizard.", None)
    );
    assert_eq!(cache.lookup("Saturn").unwrap(), Some(CacheEntry::Absent));
    assert_eq!(cache.lookup("Nobody").unwrap(), Some(CacheEntry::Absent));
    assert_eq!(cache.source().count("prop", "extracts|pageprops"), 0);
}

const QUIDDITCH_HTML: &str = concat!(
    "<p>Quidditch is a sport.</p>",
    "<div class=\"mw-heading mw-heading2\"><h2 id=\"Rules\">Rules</h2></div>",
    "<p>Seven players.</p>",
    "<div class=\"mw-heading mw-heading2\"><h2 id=\"World_Cup\">World Cup</h2></div>",
    "<p>The World Cup is held every four years.</p>",
    "<h2 id=\"See_also\">See also</h2><p>Other things.</p>",
);

fn quidditch_wiki(fragment: &'static str) -> FakeWiki {
    FakeWiki::new(move |params| {
        if is_siteinfo(params) {
            return Ok(siteinfo(true));
        }
        if param(params, "action") == "query" {
            return Ok(json!({ "query": {
                "redirects": [{
                    "from": "Quidditch World Cup",
                    "to": "Quidditch",
                    "tofragment": fragment
                }],
                "pages": [{ "title": "Quidditch", "extract": "Quidditch is a sport." }]
            }}));
        }
        Ok(json!({ "parse": { "title": "Quidditch", "text": QUIDDITCH_HTML } }))
    })
}

#[tokio::test]
async fn section_redirect_uses_the_section_paragraph() {
    let mut cache = memory_cache(quidditch_wiki("World Cup"));
    cache
        .query_batch([("Quidditch World Cup", false)], false)
        .await
        .unwrap();
    assert_eq!(
        cache.lookup("Quidditch World Cup").unwrap(),
        content("The World Cup is held every four years.", None)
    );
    assert_eq!(
        cache.lookup("Quidditch").unwrap(),
        content("Quidditch is a sport.", None)
    );
}

#[tokio::test]
async fn missing_section_never_falls_back_to_the_lead() {
    let mut cache = memory_cache(quidditch_wiki("History"));
    cache
        .query_batch([("Quidditch World Cup", false)], false)
        .await
        .unwrap();
    assert_eq!(
        cache.lookup("Quidditch World Cup").unwrap(),
        Some(CacheEntry::Absent)
    );
}

#[tokio::test]
async fn failed_batch_writes_nothing_and_is_retried() {
    let wiki = FakeWiki::new(|params| {
        if is_siteinfo(params) {
            return Ok(siteinfo(true));
        }
        Err(RemoteError::Status {
            status: 503,
            url: "https://fake.wiki/w/api.php".to_string(),
        })
    });
    let mut cache = memory_cache(wiki);
    assert_eq!(cache.query_batch([("Hogwarts", false)], false).await.unwrap(), 1);
    assert_eq!(cache.lookup("Hogwarts").unwrap(), None);

    assert_eq!(cache.query_batch([("Hogwarts", false)], false).await.unwrap(), 1);
    assert_eq!(cache.source().count("prop", "extracts|pageprops"), 2);
}

#[tokio::test]
async fn unreachable_source_costs_one_request_per_batch() {
    let wiki = FakeWiki::new(|_| {
        Err(RemoteError::Status {
            status: 503,
            url: "https://fake.wiki/w/api.php".to_string(),
        })
    });
    let mut cache = memory_cache(wiki);
    let names: Vec<String> = (0..40).map(|n| format!("Place {n}")).collect();
    let titles = names.iter().map(|name| (name.as_str(), false));

    assert_eq!(cache.query_batch(titles.clone(), false).await.unwrap(), 0);
    assert_eq!(cache.source().calls(), 1);
    assert_eq!(cache.lookup("Place 0").unwrap(), None);

    // Nothing was remembered, so the next batch asks again.
    assert_eq!(cache.query_batch(titles, false).await.unwrap(), 0);
    assert_eq!(cache.source().count("meta", "siteinfo"), 2);
    assert_eq!(cache.source().calls(), 2);
}

#[test]
fn paragraphs_are_reduced_to_plain_text() {
    let html = "<table><tr><td>box</td></tr></table>\
                <p class=\"mw-empty-elt\">\n</p>\
                <p><b>Hermione&nbsp;Granger</b> is a <a href=\"/wiki/Witch\">witch</a>.<sup>[2]</sup> She &amp; Ron[citation needed] are friends.</p>";
    assert_eq!(
        lead_paragraph(html).as_deref(),
        Some("Hermione Granger is a witch. She & Ron are friends.")
    );
    assert_eq!(lead_paragraph("<div>no paragraphs</div>"), None);
    assert_eq!(
        section_paragraph(QUIDDITCH_HTML, "Rules").as_deref(),
        Some("Seven players.")
    );
    assert_eq!(section_paragraph(QUIDDITCH_HTML, "Nope"), None);
}

struct FakeSparql {
    queries: RefCell<Vec<String>>,
    answer: Value,
}

impl SparqlApi for FakeSparql {
    fn identity(&self) -> String {
        "fake.sparql".to_string()
    }

    async fn select(&self, query: &str) -> Result<Value, RemoteError> {
        self.queries.borrow_mut().push(query.to_string());
        Ok(self.answer.clone())
    }
}

#[tokio::test]
async fn structured_facts_are_cached_per_item() {
    let sparql = FakeSparql {
        queries: RefCell::new(Vec::new()),
        answer: json!({ "results": { "bindings": [{
            "item": { "type": "uri", "value": "http://www.wikidata.org/entity/Q84" },
            "map": { "type": "uri", "value": "http://commons.wikimedia.org/wiki/Special:FilePath/London%20map.svg" },
            "inception": { "type": "literal", "value": "0047-01-01T00:00:00Z" }
        }]}}),
    };
    let mut cache = StructuredCache::with_store(CacheStore::open_in_memory().unwrap(), sparql);

    let queried = cache
        .query_batch(["Q84", "Q90", "Q84", "not-an-item"])
        .await
        .unwrap();
    assert_eq!(queried, 2);
    assert_eq!(
        cache.lookup("Q84").unwrap(),
        Some(ItemFacts {
            map_filename: Some("London map.svg".to_string()),
            inception: Some("0047-01-01T00:00:00Z".to_string()),
        })
    );
    assert_eq!(cache.lookup("Q90").unwrap(), Some(ItemFacts::default()));
    assert_eq!(cache.lookup("not-an-item").unwrap(), None);

    assert_eq!(cache.query_batch(["Q84", "Q90"]).await.unwrap(), 0);
}

#[test]
fn sparql_query_lists_every_item() {
    let query = items_query(&["Q1".to_string(), "Q2".to_string()]);
    assert!(query.contains("VALUES ?item { wd:Q1 wd:Q2 }"));
    assert!(query.contains("wdt:P242"));
    assert!(query.contains("wdt:P571"));
    assert_eq!(
        commons_filename("http://commons.wikimedia.org/wiki/Special:FilePath/Paris%20%28map%29.png")
            .as_deref(),
        Some("Paris (map).png")
    );
}

#[test]
fn source_identity_ignores_host_case_and_query() {
    assert_eq!(source_identity("https://en.wikipedia.org/w/api.php"), "en.wikipedia.org");
    assert_eq!(
        source_identity("https://EN.Wikipedia.org/w/api.php?origin=*"),
        "en.wikipedia.org"
    );
    assert_eq!(
        source_identity("https://harrypotter.fandom.com/api.php"),
        "harrypotter.fandom.com_api.php"
    );
    assert_eq!(
        source_identity("https://query.wikidata.org/sparql#top"),
        "query.wikidata.org_sparql"
    );
    assert_eq!(source_identity("http://127.0.0.1:9/w/api.php"), "127.0.0.1_9");
}
