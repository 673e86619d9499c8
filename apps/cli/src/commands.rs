//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use seoforge_core::{ProgressReporter, RunConfig, RunResult, rescore_run, run_pipeline};
use seoforge_shared::{
    AppConfig, RunManifest, Strategy, init_config, load_config, validate_api_key,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Seoforge — turn a topic into a data-backed content strategy.
#[derive(Parser)]
#[command(
    name = "seoforge",
    version,
    about = "Expand a topic into scored queries, SERP gap analysis, and an article outline.",
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
    /// Run the full pipeline for a topic and write a strategy directory.
    Run {
        /// Topic seed to research.
        topic: String,

        /// Human-readable label for the run (defaults to the topic).
        #[arg(short, long)]
        name: Option<String>,

        /// Output root for run directories (defaults to var/runs).
        #[arg(short, long)]
        out: Option<String>,

        /// How many top queries to analyze (overrides config).
        #[arg(short, long)]
        limit: Option<usize>,

        /// Aggregation strategy: aggregate or single_query.
        #[arg(long)]
        strategy: Option<String>,
    },

    /// Re-score an existing run from its cached signals.
    Score {
        /// Path to the run directory.
        #[arg(long)]
        run: String,
    },

    /// List completed runs.
    List {
        /// Output root to scan (defaults to var/runs).
        #[arg(short, long)]
        out: Option<String>,
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
        0 => "seoforge=info",
        1 => "seoforge=debug",
        _ => "seoforge=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
            topic,
            name,
            out,
            limit,
            strategy,
        } => {
            cmd_run(
                &topic,
                name,
                out.as_deref(),
                limit,
                strategy.as_deref(),
            )
            .await
        }
        Command::Score { run } => cmd_score(&run).await,
        Command::List { out } => cmd_list(out.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    topic: &str,
    name: Option<String>,
    out: Option<&str>,
    limit: Option<usize>,
    strategy: Option<&str>,
) -> Result<()> {
    if topic.trim().is_empty() {
        return Err(eyre!("topic must not be empty"));
    }

    let mut config = load_config()?;
    if let Some(s) = strategy {
        config.selection.strategy = parse_strategy(s)?;
    }
    validate_api_key(&config)?;

    let output_root = resolve_output_root(out)?;

    let run_config = RunConfig {
        topic: topic.to_string(),
        name,
        output_root,
        limit,
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
    };

    info!(topic, limit, "starting pipeline run");

    let reporter = CliProgress::new();
    let result = run_pipeline(&config, &run_config, &reporter).await?;

    println!();
    println!("  Strategy directory written!");
    println!("  Run:          {}", result.run_id);
    println!("  Scored:       {}", result.scored_count);
    println!("  Analyzed:     {}", result.analyzed_count);
    println!("  Degradations: {}", result.degradations);
    println!("  Path:         {}", result.run_path.display());
    println!("  Time:         {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_score(run: &str) -> Result<()> {
    let run_path = PathBuf::from(run);
    if !run_path.join("manifest.json").exists() {
        return Err(eyre!(
            "no manifest.json found at '{run}' — is this a valid run directory?"
        ));
    }

    let config = load_config()?;

    info!(run, "re-scoring run");
    let scored = rescore_run(&run_path, &config).await?;

    println!();
    println!("  Re-scored {} queries:", scored.len());
    for (i, sq) in scored.iter().enumerate() {
        println!("  {:>3}. {:.4}  {}", i + 1, sq.final_score, sq.query.text);
    }
    println!();

    Ok(())
}

async fn cmd_list(out: Option<&str>) -> Result<()> {
    let root = resolve_output_root(out)?;

    let mut manifests: Vec<RunManifest> = Vec::new();
    if root.is_dir() {
        for entry in std::fs::read_dir(&root)? {
            let path = entry?.path();
            let manifest_path = path.join("manifest.json");
            if !manifest_path.is_file() {
                continue;
            }
            let content = std::fs::read_to_string(&manifest_path)?;
            match serde_json::from_str::<RunManifest>(&content) {
                Ok(m) => manifests.push(m),
                Err(e) => {
                    info!(path = %manifest_path.display(), error = %e, "skipping unreadable manifest");
                }
            }
        }
    }

    if manifests.is_empty() {
        println!("No runs found under {}", root.display());
        return Ok(());
    }

    manifests.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    println!();
    for m in &manifests {
        let label = m.name.as_deref().unwrap_or(&m.topic);
        let status = if m.completed_at.is_some() {
            "done"
        } else {
            "incomplete"
        };
        println!(
            "  {}  {}  [{}] scored={} analyzed={} degradations={}  {}",
            m.run_id,
            m.created_at.format("%Y-%m-%d %H:%M"),
            status,
            m.scored_count,
            m.analyzed_count,
            m.degradations.len(),
            label,
        );
    }
    println!();

    Ok(())
}

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

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_strategy(s: &str) -> Result<Strategy> {
    match s {
        "aggregate" => Ok(Strategy::Aggregate),
        "single_query" | "single-query" => Ok(Strategy::SingleQuery),
        _ => Err(eyre!(
            "unknown strategy '{s}': expected 'aggregate' or 'single_query'"
        )),
    }
}

fn resolve_output_root(out: Option<&str>) -> Result<PathBuf> {
    match out {
        Some(p) => Ok(PathBuf::from(p)),
        None => {
            let cwd = std::env::current_dir()
                .map_err(|e| eyre!("cannot determine working directory: {e}"))?;
            Ok(cwd.join("var").join("runs"))
        }
    }
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

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn query_analyzed(&self, query: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Analyzing [{current}/{total}] {query}"));
    }

    fn done(&self, _result: &RunResult) {
        self.spinner.finish_and_clear();
    }
}
