//! genobench - Pass@K benchmark harness for clinical genomics agents
//!
//! ## Commands
//!
//! - `run`: run every task of a domain K times, write reports, gate on Pass@1
//! - `validate`: resolve a domain and load its tasks without calling an agent
//! - `summarize`: recompute metrics and the gate from a stored `results.json`
//!
//! ## Exit codes
//!
//! | code | meaning |
//! |------|---------|
//! | 0 | gate passed |
//! | 1 | any other failure (I/O, bad arguments, agent setup) |
//! | 2 | gate failed: benchmark too easy |
//! | 3 | gate failed: benchmark too hard |
//! | 4 | harness error: configuration, task loading, no completed tasks |

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn, Level};

use genobench_agent::{ChatInvoker, CommandInvoker};
use genobench_core::gate::pct;
use genobench_core::reporting::{self, ReportPaths};
use genobench_core::{
    build_summary, resolve_domain, AgentInvoker, ConfigError, DomainConfig, EvaluatorRegistry,
    GateStatus, GateVerdict, HarnessError, LoadedTasks, MetricsError, ResultsArtifact,
    RunConfig, RunOrchestrator, SummaryArtifact, Task, TaskLoadError, TaskRepository,
};

const EXIT_PASS: u8 = 0;
const EXIT_OTHER: u8 = 1;
const EXIT_TOO_EASY: u8 = 2;
const EXIT_TOO_HARD: u8 = 3;
const EXIT_HARNESS: u8 = 4;

#[derive(Parser)]
#[command(name = "genobench")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Pass@K benchmark harness for clinical genomics agents", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a domain's benchmark K times and gate on Pass@1
    Run(RunArgs),

    /// Resolve a domain and load its tasks without invoking an agent
    Validate {
        /// Domain identifier (directory name under the domains root)
        #[arg(long, env = "GENOBENCH_DOMAIN")]
        domain: String,

        /// Directory holding one sub-directory per domain
        #[arg(long, env = "GENOBENCH_DOMAINS_ROOT", default_value = "domains")]
        domains_root: PathBuf,
    },

    /// Recompute metrics and the gate from a stored results.json
    Summarize {
        /// Path to a results.json written by `genobench run`
        #[arg(long)]
        results: PathBuf,

        /// Write summary.json and summary.md into this directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Domain identifier (directory name under the domains root)
    #[arg(long, env = "GENOBENCH_DOMAIN")]
    domain: String,

    /// Directory holding one sub-directory per domain
    #[arg(long, env = "GENOBENCH_DOMAINS_ROOT", default_value = "domains")]
    domains_root: PathBuf,

    /// Attempts per task (K)
    #[arg(short = 'k', long, env = "GENOBENCH_RUNS", default_value_t = 3)]
    runs: u32,

    /// Directory for results.json, summary.json and summary.md
    #[arg(short, long, env = "GENOBENCH_OUTPUT", default_value = "genobench-results")]
    output: PathBuf,

    /// Maximum attempts in flight
    #[arg(long, env = "GENOBENCH_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Per-attempt timeout in seconds, retries included
    #[arg(long, env = "GENOBENCH_ATTEMPT_TIMEOUT", default_value_t = 300)]
    attempt_timeout: u64,

    /// Retries after a transient agent failure
    #[arg(long, env = "GENOBENCH_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Base backoff between retries in milliseconds (doubles per retry)
    #[arg(long, env = "GENOBENCH_BACKOFF_MS", default_value_t = 500)]
    backoff_ms: u64,

    /// Stop issuing new attempts after this many seconds
    #[arg(long, env = "GENOBENCH_RUN_TIMEOUT")]
    run_timeout: Option<u64>,

    /// Agent command line; receives the request as JSON on stdin
    #[arg(long, env = "GENOBENCH_AGENT_COMMAND", conflicts_with = "chat")]
    agent_command: Option<String>,

    /// Ask the domain's LLM directly through an OpenAI-compatible endpoint
    #[arg(long)]
    chat: bool,
}

impl RunArgs {
    fn run_config(&self) -> RunConfig {
        RunConfig {
            runs: self.runs,
            concurrency: self.concurrency,
            attempt_timeout_secs: self.attempt_timeout,
            max_retries: self.max_retries,
            backoff_base_ms: self.backoff_ms,
            run_timeout_secs: self.run_timeout,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    genobench_core::init_tracing(cli.json, level);

    let outcome = match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Validate {
            domain,
            domains_root,
        } => cmd_validate(&domains_root, &domain),
        Commands::Summarize { results, output } => cmd_summarize(&results, output.as_deref()),
    };

    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(error_exit_code(&e))
        }
    }
}

/// Run the benchmark, write reports and map the verdict to an exit code.
async fn cmd_run(args: RunArgs) -> Result<u8> {
    if args.runs == 0 {
        return Err(HarnessError::from(MetricsError::ZeroRuns).into());
    }
    if args.attempt_timeout == 0 {
        anyhow::bail!("--attempt-timeout must be at least 1 second");
    }

    let domain = resolve_domain(&args.domains_root, &args.domain)?;
    let (tasks, failures) = TaskRepository::new().load_all(&domain.tasks);
    let registry = EvaluatorRegistry::with_builtins();
    for (task_id, evaluator) in registry.unknown_in(&tasks) {
        warn!(task_id = %task_id, evaluator = %evaluator, "task names an unregistered evaluator");
    }
    let invoker = build_invoker(&args, &domain)?;

    println!("Domain: {} ({})", domain.domain, domain.description);
    println!(
        "Agent: {} on {} | tasks: {} loaded, {} failed | K={}",
        domain.agent.name,
        domain.llm.model,
        tasks.len(),
        failures.len(),
        args.runs
    );
    println!();

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight attempts");
            let _ = cancel_tx.send(true);
        }
    });

    let orchestrator = RunOrchestrator::new(args.run_config(), Arc::new(registry), invoker);
    let record = orchestrator
        .run(&domain, LoadedTasks::from((tasks, failures)), cancel_rx)
        .await?;

    let summary = build_summary(&record);
    let results = ResultsArtifact::new(record);
    let paths = reporting::write_reports(&args.output, Some(&results), &summary)
        .context("Failed to write reports")?;

    print_summary(&summary);
    print_paths(&paths);
    info!(domain = %summary.domain, run_id = %summary.run_id, "run complete");
    Ok(verdict_exit_code(summary.verdict.as_ref()))
}

fn build_invoker(args: &RunArgs, domain: &DomainConfig) -> Result<Arc<dyn AgentInvoker>> {
    if args.chat {
        let invoker = ChatInvoker::from_domain(domain).context("Failed to set up chat invoker")?;
        return Ok(Arc::new(invoker));
    }
    let Some(command) = args.agent_command.as_deref() else {
        anyhow::bail!("No agent configured: pass --agent-command or --chat");
    };
    let invoker = CommandInvoker::new(command.split_whitespace().map(str::to_string).collect())?
        .with_env("GENOBENCH_DOMAIN", domain.domain.as_str())
        .with_env("GENOBENCH_MODEL", domain.llm.model.as_str());
    Ok(Arc::new(invoker))
}

/// Resolve and load without invoking anything.
fn cmd_validate(domains_root: &Path, domain: &str) -> Result<u8> {
    let config = resolve_domain(domains_root, domain)?;
    let (tasks, failures) = TaskRepository::new().load_all(&config.tasks);
    let registry = EvaluatorRegistry::with_builtins();
    let unknown = registry.unknown_in(&tasks);

    println!("Domain: {} ({})", config.domain, config.description);
    println!(
        "Agent: {} (llm {}, model {}, max {} steps)",
        config.agent.name, config.llm.name, config.llm.model, config.agent.max_iterations
    );
    println!(
        "Pass threshold: {} | acceptable Pass@1: [{}, {}]",
        config.scoring.pass_threshold,
        pct(config.scoring.band.low),
        pct(config.scoring.band.high)
    );
    println!();

    for task in &tasks {
        let status = if unknown.iter().any(|(id, _)| *id == task.id) {
            "✗"
        } else {
            "✓"
        };
        println!("  {} {}", status, describe_task(task));
    }
    for (task_id, evaluator) in &unknown {
        println!("  ✗ {}: unknown evaluator '{}'", task_id, evaluator);
    }
    for (task_ref, err) in &failures {
        println!("  ✗ {}: {}", task_ref.id, err);
    }

    println!();
    println!(
        "Summary: {}/{} tasks valid",
        tasks.len() - count_distinct_tasks(&unknown),
        config.tasks.len()
    );

    if failures.is_empty() && unknown.is_empty() {
        Ok(EXIT_PASS)
    } else {
        Ok(EXIT_HARNESS)
    }
}

fn describe_task(task: &Task) -> String {
    format!(
        "{} ({}, {} evaluator(s), {} tool(s))",
        task.id,
        task.category,
        task.evaluators.len(),
        task.tool_manifest.len()
    )
}

fn count_distinct_tasks(pairs: &[(&str, &str)]) -> usize {
    let mut ids: Vec<&str> = pairs.iter().map(|(id, _)| *id).collect();
    ids.sort_unstable();
    ids.dedup();
    ids.len()
}

/// Recompute the summary from a stored results document.
fn cmd_summarize(results: &Path, output: Option<&Path>) -> Result<u8> {
    let artifact = reporting::read_results_json(results)?;
    let summary = build_summary(&artifact.run);

    match output {
        Some(dir) => {
            let paths = reporting::write_reports(dir, None, &summary)
                .context("Failed to write reports")?;
            print_summary(&summary);
            print_paths(&paths);
        }
        None => {
            let json = serde_json::to_string_pretty(&summary).context("serialize summary")?;
            println!("{}", json);
        }
    }
    Ok(verdict_exit_code(summary.verdict.as_ref()))
}

fn print_summary(summary: &SummaryArtifact) {
    println!("Run ID: {}", summary.run_id);
    if summary.cancelled {
        println!("Run was cancelled before every attempt was issued");
    }

    match (&summary.metrics, &summary.verdict) {
        (Some(metrics), Some(verdict)) => {
            let domain = &metrics.domain;
            println!(
                "Pass@1: {} | Pass@{}: {} | zero-score: {} | mean score: {:.2} ({} task(s))",
                pct(domain.pass_at_1_rate),
                domain.runs,
                pct(domain.pass_at_k_rate),
                pct(domain.zero_score_rate),
                domain.mean_score,
                domain.tasks_evaluated
            );
            for category in &domain.categories {
                println!(
                    "  {:<26} Pass@1 {:>6}  Pass@K {:>6}  ({} task(s))",
                    category.category.as_str(),
                    pct(category.pass_at_1_rate),
                    pct(category.pass_at_k_rate),
                    category.tasks
                );
            }

            let failing: Vec<&str> = metrics
                .tasks
                .iter()
                .filter(|t| !t.pass_at_k)
                .map(|t| t.task_id.as_str())
                .collect();
            if !failing.is_empty() {
                println!();
                println!("Tasks failing every attempt:");
                for task_id in failing {
                    println!("  ✗ {}", task_id);
                }
            }
            if !domain.incomplete_tasks.is_empty() {
                println!();
                println!("Incomplete tasks (excluded from rates):");
                for task_id in &domain.incomplete_tasks {
                    println!("  - {}", task_id);
                }
            }

            println!();
            let mark = if verdict.passed() { "✓" } else { "✗" };
            println!("Gate: {} {}: {}", mark, verdict.status, verdict.reason);
        }
        _ => {
            println!(
                "Metrics unavailable: {}",
                summary.metrics_error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    if !summary.issues.is_empty() {
        println!();
        println!("Issues:");
        for issue in &summary.issues {
            println!(
                "  ✗ {} [{} x{}] {}",
                issue.task_id, issue.kind, issue.count, issue.detail
            );
        }
    }
}

fn print_paths(paths: &ReportPaths) {
    println!();
    if let Some(results) = &paths.results {
        println!("Results: {}", results.display());
    }
    println!("Summary: {}", paths.summary_json.display());
    println!("Report:  {}", paths.summary_md.display());
}

/// Exit code for a gate verdict; no verdict means metrics could not be computed.
fn verdict_exit_code(verdict: Option<&GateVerdict>) -> u8 {
    match verdict.map(|v| v.status) {
        Some(GateStatus::Pass) => EXIT_PASS,
        Some(GateStatus::FailTooEasy) => EXIT_TOO_EASY,
        Some(GateStatus::FailTooHard) => EXIT_TOO_HARD,
        None => EXIT_HARNESS,
    }
}

/// Harness-level errors anywhere in the chain exit with 4, the rest with 1.
fn error_exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(harness) = cause.downcast_ref::<HarnessError>() {
            if harness.is_harness_level() {
                return EXIT_HARNESS;
            }
        }
        if cause.is::<ConfigError>() || cause.is::<TaskLoadError>() || cause.is::<MetricsError>()
        {
            return EXIT_HARNESS;
        }
    }
    EXIT_OTHER
}
