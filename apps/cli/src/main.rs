//! SchoolForge CLI — source-aware school record enrichment.
//!
//! Selects schools with missing profile fields, plans token-budgeted
//! batches, and fills the gaps by scraping the configured sources.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
