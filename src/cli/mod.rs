//! Command-line interface wiring for book-lens.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use crate::config::Settings;

pub mod annotate;
pub mod lookup;

/// Top-level CLI definition.
#[derive(Debug, Parser)]
#[command(author, version, about = "X-Ray and Word Wise annotation for books", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Parse CLI arguments from the environment.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Dispatch the selected sub-command.
    pub async fn dispatch(self, settings: Settings) -> Result<()> {
        match self.command {
            Commands::Annotate(args) => annotate::run(args, settings).await,
            Commands::Lookup(args) => lookup::run(args, settings).await,
        }
    }
}

/// Supported sub-commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Annotate tagged text units and write X-Ray and Word Wise output.
    Annotate(annotate::Args),
    /// Fill the knowledge cache for some titles and print what it holds.
    Lookup(lookup::Args),
}

/// Shape of the annotation output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Byte-addressed rows for fixed-layout books.
    Positional,
    /// Markup rewritten into reflowable text.
    Inline,
}
