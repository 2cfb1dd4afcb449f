//! CLI entry-point for inspecting the knowledge cache.

use anyhow::Result;
use clap::Args as ClapArgs;
use serde_json::json;
use tracing::instrument;

use crate::{
    config::Settings,
    data::{
        http_client,
        wiki::{HttpWiki, KnowledgeCache},
    },
};

/// Args for the `lookup` sub-command.
#[derive(Debug, Clone, ClapArgs)]
pub struct Args {
    /// Comma separated titles.
    #[arg(long, value_delimiter = ',', required = true)]
    pub titles: Vec<String>,
    /// The titles name people.
    #[arg(long)]
    pub people: bool,
    /// Allow remote lookups for people.
    #[arg(long)]
    pub search_people: bool,
}

#[instrument(skip(settings))]
pub async fn run(args: Args, settings: Settings) -> Result<()> {
    let client = http_client(&settings)?;
    let mut cache = KnowledgeCache::open(
        &settings.cache_dir(),
        HttpWiki::new(client, &settings.wiki_api_url),
    )?;
    let search_people = args.search_people || settings.search_people;
    cache
        .query_batch(
            args.titles.iter().map(|title| (title.as_str(), args.people)),
            search_people,
        )
        .await?;

    for title in &args.titles {
        let entry = cache.lookup(title.trim())?;
        println!("{}", json!({ "title": title, "entry": entry }));
    }
    cache.close()?;
    Ok(())
}
