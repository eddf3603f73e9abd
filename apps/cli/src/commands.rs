//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use schoolforge_core::pipeline::{RunProgress, RunSummary};
use schoolforge_core::planner::HeuristicCounter;
use schoolforge_core::{ScrapingConsumer, run_enrichment};
use schoolforge_scrape::{Fetcher, SourceRegistry};
use schoolforge_shared::{AppConfig, SourceSummary, init_config, load_config};
use schoolforge_storage::{Filters, SchoolStore};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SchoolForge — fill the gaps in school profile records.
#[derive(Parser)]
#[command(
    name = "schoolforge",
    version,
    about = "Enrich school profile records by scraping registered data sources.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the enrichment pipeline over schools with missing fields.
    Run {
        /// Schools per batch.
        #[arg(long = "batch_size")]
        batch_size: Option<usize>,

        /// File to save a run report to.
        #[arg(long = "output_file")]
        output_file: Option<PathBuf>,
    },

    /// Check the record store connection, seeding it when empty.
    #[command(name = "test_db")]
    TestDb,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "schoolforge=info",
        1 => "schoolforge=debug",
        _ => "schoolforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            batch_size,
            output_file,
        } => cmd_run(batch_size, output_file.as_deref()).await,
        Command::TestDb => cmd_test_db().await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(batch_size: Option<usize>, output_file: Option<&Path>) -> Result<()> {
    let mut config = load_config()?;
    if let Some(size) = batch_size {
        if size == 0 {
            return Err(eyre!("--batch_size must be >= 1"));
        }
        config.batch.batch_size = size;
    }

    let store = SchoolStore::open(Path::new(&config.store.db_path)).await?;
    store.initialize().await?;

    let fetcher = Fetcher::new(&config.fetch)?;
    let registry = SourceRegistry::default();
    let sources: Vec<SourceSummary> =
        registry.sources().iter().map(SourceSummary::from).collect();
    let consumer = ScrapingConsumer::new(fetcher, registry, &store);

    info!(
        batch_size = config.batch.batch_size,
        budget = config.batch.max_tokens,
        "starting enrichment run"
    );

    let reporter = CliProgress::new();
    let summary = run_enrichment(
        &store,
        &config.batch,
        &HeuristicCounter,
        &sources,
        &consumer,
        &reporter,
    )
    .await?;

    println!();
    println!("  Enrichment run complete!");
    println!("  Schools considered: {}", summary.schools_considered);
    println!("  Batches planned:    {}", summary.batches_planned);
    println!("  Batches processed:  {}", summary.batches_processed);
    if summary.batches_failed > 0 {
        println!("  Batches failed:     {}", summary.batches_failed);
    }
    println!("  Fields filled:      {}", summary.fields_filled);
    println!("  Time:               {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    if let Some(path) = output_file {
        write_report(&store, &summary, path).await?;
        println!("  Report written to {}", path.display());
    }

    Ok(())
}

/// Write the run report: a one-line summary plus a small sample of records.
async fn write_report(store: &SchoolStore, summary: &RunSummary, path: &Path) -> Result<()> {
    let sample = store
        .select_schools(&Filters {
            limit: Some(20),
            ..Filters::default()
        })
        .await?;

    let report = serde_json::json!({
        "results_summary": format!("Processed {} batches", summary.batches_processed),
        "schools_sample": &sample[..sample.len().min(5)],
    });

    std::fs::write(path, serde_json::to_string_pretty(&report)?)
        .map_err(|e| eyre!("cannot write '{}': {e}", path.display()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl RunProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn batch_done(&self, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Processing batches [{current}/{total}]"));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// test_db
// ---------------------------------------------------------------------------

async fn cmd_test_db() -> Result<()> {
    let config = load_config()?;
    let store = SchoolStore::open(Path::new(&config.store.db_path)).await?;

    let count = store.test_connection().await?;
    println!("Store connection ok: {count} school(s)");

    if count == 0 {
        println!("No data found. Initializing database...");
        let seeded = store.initialize().await?;
        println!("Initialization complete: {seeded} school(s)");
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
