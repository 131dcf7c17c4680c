//! CLI command definitions for agent-bench.
//!
//! Configuration precedence: defaults < `--config` YAML < `HARNESS_*`
//! environment variables < command-line flags.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use crate::engine::{
    BenchmarkSpec, EvalRequest, EvaluationReport, Harness, HarnessConfig,
    RunRequest, RunSummary, SystemSpec,
};
use crate::registry::Registry;

/// Run id used when none is given.
const DEFAULT_RUN_ID: &str = "0";

/// Evaluation harness for AI agents on benchmark suites.
#[derive(Parser, Debug)]
#[command(name = "agent-bench")]
#[command(about = "Run agent systems against benchmarks, then score and aggregate the results")]
#[command(version)]
#[command(
    long_about = "agent-bench runs a system (an agent under test) over the tasks of a benchmark split,\ncaching every answer on disk so interrupted runs resume where they stopped, then scores the\nanswers and aggregates metrics per run and across runs.\n\nExample usage:\n  agent-bench run --benchmark jsonl_qa --system command --system-param command=./agent.sh --split validation\n  agent-bench evaluate --benchmark jsonl_qa --system command --split validation --run-ids 0,1,2"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// YAML configuration file.
    #[arg(short, long, global = true, env = "HARNESS_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// List registered benchmarks and systems.
    List,

    /// Download (or verify) a benchmark dataset.
    Download(SelectArgs),

    /// Execute a system over a benchmark split.
    Run(RunArgs),

    /// Score finished runs and write their metrics.
    #[command(alias = "eval")]
    Evaluate(EvaluateArgs),
}

/// Benchmark, system and directory selection shared by commands.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct SelectArgs {
    /// Benchmark kind (see `list`).
    #[arg(short, long)]
    pub benchmark: Option<String>,

    /// Benchmark name on disk; defaults to the kind.
    #[arg(long)]
    pub benchmark_name: Option<String>,

    /// Benchmark parameter as KEY=VALUE; VALUE is parsed as JSON when valid.
    #[arg(long = "benchmark-param", value_name = "KEY=VALUE")]
    pub benchmark_params: Vec<String>,

    /// System kind (see `list`).
    #[arg(short, long)]
    pub system: Option<String>,

    /// System name on disk; defaults to the kind.
    #[arg(long)]
    pub system_name: Option<String>,

    /// System parameter as KEY=VALUE; VALUE is parsed as JSON when valid.
    #[arg(long = "system-param", value_name = "KEY=VALUE")]
    pub system_params: Vec<String>,

    /// Root directory of the run outputs.
    #[arg(long)]
    pub runs_dir: Option<PathBuf>,

    /// Root directory of the dataset cache.
    #[arg(long)]
    pub benchmark_dir: Option<PathBuf>,
}

/// Arguments for `agent-bench run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Split to run; all tasks when omitted.
    #[arg(long)]
    pub split: Option<String>,

    /// Run identifier.
    #[arg(long, default_value = DEFAULT_RUN_ID)]
    pub run_id: String,

    /// Fraction of tasks to run, in (0, 1].
    #[arg(long)]
    pub subsample: Option<f64>,

    /// Subsampling seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of parallel workers (1 = sequential).
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Build a fresh system for every task.
    #[arg(long)]
    pub reload_system_per_task: bool,

    /// Build a fresh benchmark for every task (sequential mode only).
    #[arg(long)]
    pub reload_benchmark_per_task: bool,

    /// Print the summary as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `agent-bench evaluate`.
#[derive(Parser, Debug)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Split that was run; all tasks when omitted.
    #[arg(long)]
    pub split: Option<String>,

    /// Comma-separated run ids to evaluate.
    #[arg(long, value_delimiter = ',', default_value = DEFAULT_RUN_ID)]
    pub run_ids: Vec<String>,

    /// Number of parallel workers (1 = sequential).
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Recompute scores even when cached.
    #[arg(long)]
    pub redo_eval: bool,

    /// Build a fresh system for every task.
    #[arg(long)]
    pub reload_system_per_task: bool,

    /// Build a fresh benchmark for every task (sequential mode only).
    #[arg(long)]
    pub reload_benchmark_per_task: bool,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let registry = Arc::new(Registry::builtin());
    match cli.command {
        Commands::List => run_list_command(&registry),
        Commands::Download(args) => {
            let config = resolve_config(cli.config.as_ref(), &args)?;
            run_download_command(&registry, &config).await
        }
        Commands::Run(args) => {
            let mut config = resolve_config(cli.config.as_ref(), &args.select)?;
            if let Some(workers) = args.workers {
                config.num_workers = workers;
            }
            if let Some(seed) = args.seed {
                config.seed = seed;
            }
            config.validate()?;
            run_run_command(registry, &config, args).await
        }
        Commands::Evaluate(args) => {
            let mut config = resolve_config(cli.config.as_ref(), &args.select)?;
            if let Some(workers) = args.workers {
                config.num_workers = workers;
            }
            config.validate()?;
            run_evaluate_command(registry, &config, args).await
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Builds the effective configuration for a command.
fn resolve_config(path: Option<&PathBuf>, select: &SelectArgs) -> anyhow::Result<HarnessConfig> {
    let mut config = match path {
        Some(path) => HarnessConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?,
        None => HarnessConfig::default(),
    };
    config.apply_env()?;
    apply_select_args(&mut config, select)?;
    config.validate()?;
    Ok(config)
}

fn apply_select_args(config: &mut HarnessConfig, select: &SelectArgs) -> anyhow::Result<()> {
    if let Some(kind) = &select.benchmark {
        if *kind != config.benchmark.kind {
            config.benchmark = BenchmarkSpec::new(kind.clone());
        }
    }
    if let Some(name) = &select.benchmark_name {
        config.benchmark.name = Some(name.clone());
    }
    for raw in &select.benchmark_params {
        let (key, value) = parse_param(raw)?;
        config.benchmark = config.benchmark.clone().with_param(key, value);
    }

    if let Some(kind) = &select.system {
        if *kind != config.system.kind {
            config.system = SystemSpec::new(kind.clone());
        }
    }
    if let Some(name) = &select.system_name {
        config.system.name = Some(name.clone());
    }
    for raw in &select.system_params {
        let (key, value) = parse_param(raw)?;
        config.system = config.system.clone().with_param(key, value);
    }

    if let Some(dir) = &select.runs_dir {
        config.runs_dir = dir.clone();
    }
    if let Some(dir) = &select.benchmark_dir {
        config.benchmark_dir = dir.clone();
    }
    Ok(())
}

/// Parses `KEY=VALUE`; VALUE is JSON when it parses, a string otherwise.
fn parse_param(raw: &str) -> anyhow::Result<(String, serde_json::Value)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("Invalid parameter '{}': expected KEY=VALUE", raw))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("Invalid parameter '{}': empty key", raw);
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

// ============================================================================
// Commands
// ============================================================================

fn run_list_command(registry: &Registry) -> anyhow::Result<()> {
    println!("Benchmarks:");
    for name in registry.benchmark_names() {
        println!("  {}", name);
    }
    println!("Systems:");
    for name in registry.system_names() {
        println!("  {}", name);
    }
    Ok(())
}

async fn run_download_command(registry: &Registry, config: &HarnessConfig) -> anyhow::Result<()> {
    let benchmark = registry.create_benchmark(&config.benchmark, &config.benchmark_dir)?;
    benchmark
        .download_dataset()
        .await
        .with_context(|| format!("Failed to download dataset for {}", benchmark.name()))?;
    println!(
        "✓ Dataset for {} available at {}",
        benchmark.name(),
        benchmark.data_dir().display()
    );
    Ok(())
}

fn run_request(config: &HarnessConfig, args: &RunArgs) -> RunRequest {
    let mut request = RunRequest::new(args.run_id.clone())
        .with_mode(config.execution_mode())
        .with_reload_system(args.reload_system_per_task)
        .with_reload_benchmark(args.reload_benchmark_per_task);
    if let Some(split) = &args.split {
        request = request.with_split(split.clone());
    }
    request.seed = config.seed;
    request.subsample = args.subsample;
    request
}

fn eval_request(config: &HarnessConfig, args: &EvaluateArgs) -> EvalRequest {
    let mut request = EvalRequest::new(args.run_ids.iter().cloned())
        .with_mode(config.execution_mode())
        .with_redo_eval(args.redo_eval)
        .with_reload_system(args.reload_system_per_task)
        .with_reload_benchmark(args.reload_benchmark_per_task);
    if let Some(split) = &args.split {
        request = request.with_split(split.clone());
    }
    request
}

async fn run_run_command(
    registry: Arc<Registry>,
    config: &HarnessConfig,
    args: RunArgs,
) -> anyhow::Result<()> {
    let harness = Harness::from_config(registry, config).await?;
    let request = run_request(config, &args);

    let summary = harness.run(&request).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_run_summary(&summary);
    }
    Ok(())
}

async fn run_evaluate_command(
    registry: Arc<Registry>,
    config: &HarnessConfig,
    args: EvaluateArgs,
) -> anyhow::Result<()> {
    let harness = Harness::from_config(registry, config).await?;
    let request = eval_request(config, &args);

    info!(runs = ?request.run_ids, "Starting evaluation");
    let report = harness.evaluate(&request).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_evaluation_report(&report);
    }
    Ok(())
}

fn print_run_summary(summary: &RunSummary) {
    println!("\n=== Run {} ===", summary.run_id);
    println!("Output dir:     {}", summary.run_dir.display());
    println!("Total tasks:    {}", summary.total);
    println!("Succeeded:      {}", summary.succeeded);
    println!("Failed:         {}", summary.failed);
    println!("Mean duration:  {:.1}s", summary.mean_duration);

    let failed: Vec<&str> = summary
        .outcomes
        .iter()
        .filter(|o| !o.is_success())
        .map(|o| o.task_id.as_str())
        .collect();
    if !failed.is_empty() {
        println!("Failed tasks:   {}", failed.join(", "));
    }
}

fn print_evaluation_report(report: &EvaluationReport) {
    for run in &report.runs {
        println!("\n=== Run {} ===", run.run_id);
        println!("Scored:         {}", run.scored);
        println!("Failed:         {}", run.failed);
        for (key, value) in &run.metrics.metrics {
            println!("  {:<24} {:.4}", key, value);
        }
        println!("  {:<24} {:.2}s", "average_time", run.metrics.average_time);
    }

    if let Some(aggregate) = &report.aggregate {
        println!("\n=== Across {} runs ===", report.runs.len());
        for (key, value) in aggregate {
            println!("  {:<24} {:.4}", key, value);
        }
    }
}
