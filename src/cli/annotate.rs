//! CLI entry-point for annotating one book.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use clap::Args as ClapArgs;
use tracing::{info, instrument, warn};

use crate::{
    cancel::CancelFlag,
    cli::OutputFormat,
    config::Settings,
    data::{
        http_client,
        wiki::{HttpWiki, KnowledgeCache},
        wikidata::{HttpSparql, StructuredCache},
    },
    nlp::{
        custom::CustomEntities,
        senses::Lexicon,
        wsd::{HttpTokenEmbedder, SenseDisambiguator},
    },
    output::{inline, positional, AnnotationSet},
    pipeline::{self, Annotator, RunOptions},
    text::Addressing,
};

/// Args for the `annotate` sub-command.
#[derive(Debug, Clone, ClapArgs)]
pub struct Args {
    /// JSON lines file of tagged text units.
    #[arg(long)]
    pub input: PathBuf,
    #[arg(long, value_enum, default_value_t = OutputFormat::Positional)]
    pub format: OutputFormat,
    /// Codec of the book text for positional output (e.g. cp1252).
    #[arg(long, default_value = "utf-8")]
    pub codec: String,
    /// Word Wise lexicon JSON.
    #[arg(long)]
    pub lexicon: Option<PathBuf>,
    /// Custom X-Ray entities JSON.
    #[arg(long)]
    pub custom: Option<PathBuf>,
    /// Also look up people remotely.
    #[arg(long)]
    pub search_people: bool,
    /// Override the pruning threshold.
    #[arg(long)]
    pub min_count: Option<u32>,
    /// Override the Word Wise difficulty level.
    #[arg(long)]
    pub difficulty: Option<u8>,
    /// Output directory; defaults to a folder named after the input under OUTPUTS_DIR.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[instrument(skip(settings))]
pub async fn run(args: Args, settings: Settings) -> Result<()> {
    let addressing = match args.format {
        OutputFormat::Inline => Addressing::Chars,
        OutputFormat::Positional => Addressing::for_codec(&args.codec)
            .ok_or_else(|| anyhow!("unknown codec {:?}", args.codec))?,
    };
    let mut options = RunOptions::from_settings(&settings, addressing);
    options.search_people |= args.search_people;
    if let Some(min_count) = args.min_count {
        options.min_count = min_count;
    }
    if let Some(difficulty) = args.difficulty {
        options.max_difficulty = difficulty;
    }

    let lexicon = match &args.lexicon {
        Some(path) => Lexicon::load(path)?,
        None => Lexicon::default(),
    };
    let custom = match &args.custom {
        Some(path) => CustomEntities::load(path)?,
        None => CustomEntities::default(),
    };
    let units = pipeline::load_units(&args.input)?;

    let cancel = CancelFlag::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling run");
                cancel.cancel();
            }
        })
    };

    let result = annotate(&units, options, &lexicon, &custom, &settings, cancel).await;
    watcher.abort();
    let set = result?;

    let out_dir = args.out.clone().unwrap_or_else(|| {
        let stem = args
            .input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "book".to_string());
        settings.join_output(stem)
    });
    let written = match args.format {
        OutputFormat::Positional => {
            positional::write_csv(&positional::finalize(&set, &lexicon), &out_dir)?
        }
        OutputFormat::Inline => write_inline(&inline::finalize(&set, &lexicon), &out_dir)?,
    };
    info!(files = ?written, "annotation written");
    Ok(())
}

async fn annotate(
    units: &[crate::nlp::TextUnit],
    options: RunOptions,
    lexicon: &Lexicon,
    custom: &CustomEntities,
    settings: &Settings,
    cancel: CancelFlag,
) -> Result<AnnotationSet> {
    let mut annotator = Annotator::new(options, lexicon, custom).with_cancel(cancel.clone());
    annotator.process_units(units)?;

    let client = http_client(settings)?;
    let cache_dir = settings.cache_dir();

    let mut knowledge = KnowledgeCache::open(
        &cache_dir,
        HttpWiki::new(client.clone(), &settings.wiki_api_url),
    )?
    .with_cancel(cancel.clone());
    annotator.lookup_knowledge(&mut knowledge).await?;
    knowledge.close()?;

    let mut structured = StructuredCache::open(
        &cache_dir,
        HttpSparql::new(client.clone(), &settings.wikidata_sparql_url),
    )?
    .with_cancel(cancel.clone());
    annotator.lookup_structured(&mut structured).await?;
    structured.close()?;

    if let Some(url) = &settings.embedding_url {
        let mut disambiguator = SenseDisambiguator::new(HttpTokenEmbedder::new(client, url));
        annotator.disambiguate(&mut disambiguator).await?;
    }
    Ok(annotator.finish())
}

fn write_inline(output: &inline::InlineOutput, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;

    let units_path = dir.join("units.jsonl");
    let file = File::create(&units_path).with_context(|| format!("create {units_path:?}"))?;
    let mut writer = BufWriter::new(file);
    for unit in &output.units {
        serde_json::to_writer(&mut writer, unit)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    let x_ray_path = dir.join("x_ray.xhtml");
    std::fs::write(&x_ray_path, &output.x_ray_page)
        .with_context(|| format!("write {x_ray_path:?}"))?;
    let word_wise_path = dir.join("word_wise.xhtml");
    std::fs::write(&word_wise_path, &output.word_wise_page)
        .with_context(|| format!("write {word_wise_path:?}"))?;

    Ok(vec![units_path, x_ray_path, word_wise_path])
}
