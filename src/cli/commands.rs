//! CLI command definitions for synthforge.
//!
//! Four subcommands map one-to-one onto driver/store operations:
//! `run` starts or resumes a pipeline run, `status` reports a run's
//! progress, `list` enumerates persisted runs, and `fetch` writes a
//! run's final dataset artifact.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;

use crate::checkpoint::CheckpointStore;
use crate::config::PipelineConfig;
use crate::export::FinalDataset;
use crate::llm::HttpTextGenerator;
use crate::pipeline::stage::assets;
use crate::pipeline::{self, PipelineDriver};
use crate::scrape::HttpPageFetcher;
use crate::search::TavilyClient;

/// Web-grounded synthetic dataset generator.
#[derive(Parser)]
#[command(name = "synthforge")]
#[command(about = "Generate target-sized synthetic datasets grounded in web content")]
#[command(version)]
#[command(
    long_about = "synthforge turns one free-form request into a synthetic dataset: it derives \
search queries, gathers and scrapes web content, extracts topics, and generates records per \
topic until the requested count is reached.\n\nRuns are checkpointed under the state \
directory; re-running the same request resumes instead of restarting.\n\nExample usage:\n  \
synthforge run \"I want 500 medical QA pairs in English\""
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Start or resume a pipeline run for a request.
    Run(RunArgs),

    /// Show the status and progress of a run.
    Status(StatusArgs),

    /// List all persisted runs.
    List(ListArgs),

    /// Write a run's final dataset artifact to a file (or stdout).
    Fetch(FetchArgs),
}

/// Arguments for `synthforge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// The dataset request, e.g. "500 medical QA pairs in English".
    pub request: String,

    /// Directory holding per-run checkpoint state.
    #[arg(long, default_value = "./state")]
    pub state_dir: PathBuf,

    /// Override the sample count parsed from the request.
    #[arg(long)]
    pub target: Option<usize>,

    /// Worker bound for the fan-out stages.
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Generation model identifier.
    #[arg(short, long)]
    pub model: Option<String>,

    /// Comma-separated pool of generation-service API keys. Rotated on
    /// quota and rate-limit responses.
    #[arg(long, env = "SYNTHFORGE_API_KEYS", hide_env_values = true)]
    pub api_keys: Option<String>,

    /// Web-search API key.
    #[arg(long, env = "TAVILY_API_KEY", hide_env_values = true)]
    pub search_api_key: Option<String>,

    /// Write the final dataset to this path as well.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for `synthforge status`.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Run identifier (as printed by `run` and `list`).
    pub run_id: String,

    #[arg(long, default_value = "./state")]
    pub state_dir: PathBuf,
}

/// Arguments for `synthforge list`.
#[derive(Parser, Debug)]
pub struct ListArgs {
    #[arg(long, default_value = "./state")]
    pub state_dir: PathBuf,
}

/// Arguments for `synthforge fetch`.
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Run identifier (as printed by `run` and `list`).
    pub run_id: String,

    #[arg(long, default_value = "./state")]
    pub state_dir: PathBuf,

    /// Output path; prints to stdout when omitted.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Parses CLI arguments from the process environment.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Dispatches the parsed CLI to its command handler.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Status(args) => cmd_status(args).await,
        Commands::List(args) => cmd_list(args).await,
        Commands::Fetch(args) => cmd_fetch(args).await,
    }
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = PipelineConfig::from_env().context("loading pipeline configuration")?;
    config.state_dir = args.state_dir.clone();
    if let Some(workers) = args.max_workers {
        config.max_workers = workers;
    }
    if let Some(model) = args.model {
        config.model = model;
    }
    config.validate()?;

    let api_keys: Vec<String> = args
        .api_keys
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();
    if api_keys.is_empty() {
        bail!("no generation-service API keys; set SYNTHFORGE_API_KEYS or pass --api-keys");
    }
    let Some(search_key) = args.search_api_key else {
        bail!("no web-search API key; set TAVILY_API_KEY or pass --search-api-key");
    };

    let llm = HttpTextGenerator::new(
        config.api_base.clone(),
        config.model.clone(),
        api_keys,
        config.request_timeout,
    )?
    .with_max_retries(config.max_retries);
    let search =
        TavilyClient::new(search_key, config.request_timeout)?.with_max_retries(config.max_retries);
    let fetcher = HttpPageFetcher::new(config.request_timeout)?;

    let store = CheckpointStore::new(&config.state_dir);
    let driver = PipelineDriver::new(
        config,
        store,
        Arc::new(llm),
        Arc::new(search),
        Arc::new(fetcher),
    );

    let dataset = driver.run(&args.request, args.target).await?;
    let run_id = crate::checkpoint::run_id_for_request(&args.request);

    info!(
        run_id = %run_id,
        delivered = dataset.metadata.actual_count,
        requested = dataset.metadata.requested_count,
        completion_rate = %dataset.metadata.completion_rate,
        "run finished"
    );

    if let Some(path) = args.output {
        write_dataset(&dataset, &path)?;
        println!("dataset written to {}", path.display());
    }
    println!(
        "run {} delivered {}/{} records ({})",
        run_id,
        dataset.metadata.actual_count,
        dataset.metadata.requested_count,
        dataset.metadata.completion_rate
    );
    Ok(())
}

async fn cmd_status(args: StatusArgs) -> anyhow::Result<()> {
    let store = CheckpointStore::new(&args.state_dir);
    let report = pipeline::report(&store, &args.run_id).await?;

    println!("run:        {}", report.run_id);
    println!("request:    {}", report.request);
    println!("status:     {}", report.status);
    println!("target:     {}", report.target_sample_count);
    println!("topics:     {}", report.unique_topics);
    println!("records:    {}", report.unique_records);
    println!("round:      {}", report.acquisition_round);
    println!("updated:    {}", report.updated_at.to_rfc3339());
    Ok(())
}

async fn cmd_list(args: ListArgs) -> anyhow::Result<()> {
    let store = CheckpointStore::new(&args.state_dir);
    let runs = store.list_runs().await?;

    if runs.is_empty() {
        println!("no runs found under {}", args.state_dir.display());
        return Ok(());
    }
    for run in runs {
        println!(
            "{}  {:<16}  target={:<6}  {}",
            run.run_id,
            run.status.to_string(),
            run.target_sample_count,
            truncate(&run.request, 60)
        );
    }
    Ok(())
}

async fn cmd_fetch(args: FetchArgs) -> anyhow::Result<()> {
    let store = CheckpointStore::new(&args.state_dir);
    let dataset: Option<FinalDataset> = store
        .load_asset(&args.run_id, assets::FINAL_DATASET)
        .await?;
    let Some(dataset) = dataset else {
        bail!("run '{}' has no final dataset yet", args.run_id);
    };

    match args.output {
        Some(path) => {
            write_dataset(&dataset, &path)?;
            println!("dataset written to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&dataset)?),
    }
    Ok(())
}

fn write_dataset(dataset: &FinalDataset, path: &PathBuf) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_vec_pretty(dataset)?)
        .with_context(|| format!("writing dataset to {}", path.display()))?;
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() <= max {
        normalized
    } else {
        let cut: String = normalized.chars().take(max).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_command() {
        let cli = Cli::try_parse_from([
            "synthforge",
            "run",
            "500 medical QA pairs",
            "--target",
            "500",
            "--max-workers",
            "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.request, "500 medical QA pairs");
                assert_eq!(args.target, Some(500));
                assert_eq!(args.max_workers, Some(3));
                assert_eq!(args.state_dir, PathBuf::from("./state"));
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_cli_parses_status_and_fetch() {
        let cli = Cli::try_parse_from(["synthforge", "status", "abc123"]).unwrap();
        assert!(matches!(cli.command, Commands::Status(_)));

        let cli =
            Cli::try_parse_from(["synthforge", "fetch", "abc123", "-o", "out.json"]).unwrap();
        match cli.command {
            Commands::Fetch(args) => {
                assert_eq!(args.run_id, "abc123");
                assert_eq!(args.output, Some(PathBuf::from("out.json")));
            }
            _ => panic!("expected fetch command"),
        }
    }

    #[test]
    fn test_cli_global_log_level() {
        let cli = Cli::try_parse_from(["synthforge", "list", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("one  two\nthree", 60), "one two three");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
