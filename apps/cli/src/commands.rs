//! CLI command definitions, routing, and tracing setup.

use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use arxivist_core::progress::ProgressReporter;
use arxivist_core::runner::{RunOptions, RunReport};
use arxivist_mcp::{ToolManager, catalog};
use arxivist_shared::{AppConfig, Phase, init_config, load_config, validate_credentials};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Arxivist — arXiv research agent over tool subprocesses.
#[derive(Parser)]
#[command(
    name = "arxivist",
    version,
    about = "Ingest arXiv papers into a vector index and answer questions over them.",
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
    /// Run the pipeline: ingestion, query, or both.
    Run {
        /// Phase selection: ingestion, query, or both.
        #[arg(long, env = "PHASE", default_value = "both")]
        phase: Phase,

        /// Search topic override.
        #[arg(long, env = "SEARCH_TOPIC")]
        topic: Option<String>,

        /// Maximum number of papers to ingest.
        #[arg(long, env = "MAX_PAPERS")]
        max_papers: Option<usize>,

        /// Question for the query phase (defaults to a canned question).
        #[arg(long, env = "USER_QUERY")]
        query: Option<String>,

        /// arXiv category filters (comma-separated, e.g. cs.CL,cs.LG).
        #[arg(long, env = "ARXIV_CATEGORIES", value_delimiter = ',')]
        categories: Option<Vec<String>>,
    },

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
        0 => "arxivist=info",
        1 => "arxivist=debug",
        _ => "arxivist=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
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
            phase,
            topic,
            max_papers,
            query,
            categories,
        } => cmd_run(phase, topic, max_papers, query, categories).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Run handler
// ---------------------------------------------------------------------------

async fn cmd_run(
    phase: Phase,
    topic: Option<String>,
    max_papers: Option<usize>,
    query: Option<String>,
    categories: Option<Vec<String>>,
) -> Result<()> {
    // Flag/env overrides win over the config file
    let mut config = load_config()?;
    if let Some(topic) = topic {
        config.search.topic = topic;
    }
    if let Some(max_papers) = max_papers {
        config.search.max_papers = max_papers;
    }
    if let Some(categories) = categories {
        config.search.categories = categories;
    }

    // Credentials are checked before any subprocess is spawned
    validate_credentials(&config)?;

    let servers = catalog::default_servers(&config)?;
    let tools = ToolManager::new(servers).with_timeouts(
        Duration::from_secs(config.timeouts.connect_secs),
        Duration::from_secs(config.timeouts.release_secs),
    );

    let options = RunOptions { phase, query };

    info!(
        phase = %options.phase,
        topic = %config.search.topic,
        max_papers = config.search.max_papers,
        "starting run"
    );

    let reporter = CliProgress::new();
    let result = arxivist_core::runner::run(tools, &config, &options, &reporter).await;
    reporter.finish();
    let report = result?;

    print_report(&report);
    Ok(())
}

/// Print the post-run summary.
fn print_report(report: &RunReport) {
    println!();
    println!("  Run complete!");
    println!("  Run ID: {}", report.run_id);

    if let Some(ingestion) = &report.ingestion {
        println!();
        println!("  Ingestion");
        println!("    Papers found:    {}", ingestion.papers_found);
        println!("    Papers ingested: {}", ingestion.papers_ingested);
        println!("    Papers skipped:  {}", ingestion.papers_skipped);
        println!("    Chunks upserted: {}", ingestion.chunk_count);
        if ingestion.index_created {
            println!("    Index:           created");
        }
        for (paper, error) in &ingestion.errors {
            println!("    Skipped {paper}: {error}");
        }
    }

    if let Some(query) = &report.query {
        println!();
        println!("  Query");
        println!("    Matches: {}", query.matches);
        println!("    Sources: {}", query.sources.len());
        for warning in &query.warnings {
            println!("    Warning: {warning}");
        }
        println!();
        println!("{}", query.answer);
    }

    println!();
    println!("  Time:   {:.1}s", report.elapsed.as_secs_f64());
    println!();
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

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn paper_processed(&self, title: &str, current: usize, total: usize) {
        // Long titles would wrap the spinner line
        let title: String = title.chars().take(60).collect();
        self.spinner
            .set_message(format!("Processing [{current}/{total}] {title}"));
    }
}

// ---------------------------------------------------------------------------
// Config handlers
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
