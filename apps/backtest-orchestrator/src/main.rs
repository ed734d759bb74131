//! Backtest Orchestrator Binary
//!
//! Runs a YAML sweep plan through the external engine and prints a ranked
//! comparison.
//!
//! # Usage
//!
//! ```bash
//! backtest-orchestrator run --config orchestrator.yaml --plan sweep.yaml --sort sharpe_ratio --top 5
//! backtest-orchestrator run --config orchestrator.yaml --plan sweep.yaml --weighted
//! backtest-orchestrator validate --config orchestrator.yaml --plan sweep.yaml
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log filter (default: `observability.logging.level`)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`: span export
//! - Any `${VAR}` referenced from the config or plan files

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use backtest_orchestrator::comparator::{
    FilterSpec, MetricWeights, SortKey, build_matrix, filter, rank_weighted, risk_return, sort,
    summarize, top_n,
};
use backtest_orchestrator::observability::{MetricsConfig, init_metrics};
use backtest_orchestrator::parser::parse_numeric;
use backtest_orchestrator::{
    BacktestResult, Config, EngineExecutor, SweepPlan, TaskScheduler, load_config, load_plan,
    telemetry,
};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tokio::signal;

#[derive(Parser)]
#[command(name = "backtest-orchestrator")]
#[command(about = "Run strategy sweeps through an external backtesting engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sweep plan and print the comparison
    Run {
        /// Orchestrator config file
        #[arg(short, long, default_value = "orchestrator.yaml")]
        config: String,

        /// Sweep plan file
        #[arg(short, long)]
        plan: PathBuf,

        /// Ranking metric
        #[arg(short, long, default_value = "total_return")]
        sort: SortKey,

        /// Keep only the best N results
        #[arg(short, long)]
        top: Option<usize>,

        /// Rank lowest first
        #[arg(long)]
        ascending: bool,

        /// Rank by the weighted composite score instead of --sort
        #[arg(long, conflicts_with = "ascending")]
        weighted: bool,

        /// Filter constraint, e.g. min_win_rate=50 (repeatable)
        #[arg(short, long, value_parser = parse_constraint)]
        filter: Vec<(String, Decimal)>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Validate config and plan and check the engine runs, without running the plan
    Validate {
        /// Orchestrator config file
        #[arg(short, long, default_value = "orchestrator.yaml")]
        config: String,

        /// Sweep plan file
        #[arg(short, long)]
        plan: PathBuf,
    },
}

/// Ranking and output options for `run`.
struct Report {
    sort: SortKey,
    top: Option<usize>,
    descending: bool,
    weighted: bool,
    filter: FilterSpec,
    json: bool,
}

fn parse_constraint(arg: &str) -> Result<(String, Decimal), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got \"{arg}\""))?;
    let value = parse_numeric(value).ok_or_else(|| format!("not a number: \"{value}\""))?;
    Ok((key.trim().to_string(), value.value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            plan,
            sort,
            top,
            ascending,
            weighted,
            filter,
            json,
        } => {
            let report = Report {
                sort,
                top,
                descending: !ascending,
                weighted,
                filter: FilterSpec::from_pairs(filter)?,
                json,
            };
            run(&config, &plan, &report).await
        }
        Commands::Validate { config, plan } => {
            let (config, plan) = load_inputs(&config, &plan)?;
            let version = check_engine(&EngineExecutor::from_config(&config)).await?;
            println!(
                "OK: {} run(s), {} worker(s), engine \"{}\" ({version})",
                plan.runs.len(),
                config.scheduler.max_workers,
                config.engine.binary
            );
            Ok(())
        }
    }
}

async fn check_engine(executor: &EngineExecutor) -> anyhow::Result<String> {
    executor
        .check_engine()
        .await
        .with_context(|| format!("engine \"{}\" is not usable", executor.settings().binary))
}

fn load_inputs(config: &str, plan: &Path) -> anyhow::Result<(Config, SweepPlan)> {
    let config = load_config(Some(config)).context("loading orchestrator config")?;
    let plan = load_plan(plan).context("loading sweep plan")?;
    plan.validate().context("validating sweep plan")?;
    Ok((config, plan))
}

async fn run(config_path: &str, plan_path: &Path, report: &Report) -> anyhow::Result<()> {
    let (config, plan) = load_inputs(config_path, plan_path)?;

    let _telemetry = telemetry::init(&config.observability.logging);
    if config.observability.metrics.enabled {
        let addr: SocketAddr = config
            .observability
            .metrics
            .listen_addr
            .parse()
            .context("parsing metrics listen address")?;
        init_metrics(&MetricsConfig::with_addr(addr))?;
    }

    tracing::info!(
        runs = plan.runs.len(),
        workers = config.scheduler.max_workers,
        engine = %config.engine.binary,
        "Starting sweep"
    );

    let executor = EngineExecutor::from_config(&config);
    check_engine(&executor).await?;
    let executor = Arc::new(executor);
    let scheduler = TaskScheduler::start(&config.scheduler, executor)?;
    let task_ids = scheduler.submit_batch(plan.requests())?;

    tokio::select! {
        stats = scheduler.wait_idle() => {
            tracing::info!(
                completed = stats.completed,
                failed = stats.failed,
                cancelled = stats.cancelled,
                "Sweep finished"
            );
            scheduler.shutdown(true).await;
        }
        () = shutdown_signal() => {
            scheduler.shutdown(false).await;
            scheduler.wait_idle().await;
        }
    }

    let results: Vec<BacktestResult> = task_ids
        .iter()
        .filter_map(|id| scheduler.get_task(id).ok())
        .filter_map(|task| task.comparable_result())
        .collect();
    if results.is_empty() {
        bail!("no task produced a result");
    }

    print_report(&results, report)
}

fn print_report(results: &[BacktestResult], report: &Report) -> anyhow::Result<()> {
    let kept: Vec<BacktestResult> = filter(results, &report.filter).into_iter().cloned().collect();
    let weights = MetricWeights::default();
    let weighted = report.weighted.then(|| rank_weighted(&kept, &weights));
    let ranked: Vec<&BacktestResult> = match (&weighted, report.top) {
        (Some(ranking), top) => {
            if top == Some(0) {
                bail!("--top must be greater than 0");
            }
            ranking
                .iter()
                .take(top.unwrap_or(usize::MAX))
                .map(|entry| entry.result)
                .collect()
        }
        (None, Some(n)) => top_n(&kept, n, report.sort, report.descending)?,
        (None, None) => sort(&kept, report.sort, report.descending),
    };
    let ordering = if report.weighted {
        "weighted score".to_string()
    } else {
        report.sort.to_string()
    };
    let summary = summarize(results);
    let quadrants = risk_return(results);

    if report.json {
        let scores = weighted.as_ref().map(|ranking| {
            ranking
                .iter()
                .map(|entry| {
                    serde_json::json!({
                        "rank": entry.rank,
                        "strategy_id": entry.result.strategy_id,
                        "score": entry.score,
                    })
                })
                .collect::<Vec<_>>()
        });
        let document = serde_json::json!({
            "summary": summary,
            "sort": ordering,
            "filter": report.filter.constraints().iter().map(ToString::to_string).collect::<Vec<_>>(),
            "results": ranked,
            "scores": scores,
            "risk_return": quadrants,
            "matrix": build_matrix(ranked.iter().copied()),
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    print!("{}", build_matrix(ranked.iter().copied()));
    println!();
    println!(
        "{} run(s): {} completed, {} failed, {} shown (sorted by {ordering})",
        summary.count,
        summary.completed,
        summary.failed,
        ranked.len(),
    );
    if let Some(ranking) = &weighted {
        for entry in ranking.iter().take(ranked.len()) {
            let score = entry
                .score
                .map_or_else(|| "N/A".to_string(), |s| format!("{:.4}", s.round_dp(4)));
            println!("  #{} {} score {score}", entry.rank, entry.result.strategy_id);
        }
    }
    for (label, members) in [
        ("High return / low risk", &quadrants.high_return_low_risk),
        ("High return / high risk", &quadrants.high_return_high_risk),
        ("Low return / low risk", &quadrants.low_return_low_risk),
        ("Low return / high risk", &quadrants.low_return_high_risk),
    ] {
        if !members.is_empty() {
            println!("{label}: {}", members.join(", "));
        }
    }
    if let (Some(best), Some(ret)) = (&summary.best_strategy, summary.best_total_return_pct) {
        println!("Best total return: {best} ({:.2}%)", ret.round_dp(2));
    }
    for result in results.iter().filter(|r| !r.is_completed()) {
        println!(
            "  {} FAILED: {}",
            result.strategy_id,
            result.error_message().unwrap_or_default()
        );
    }
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, cancelling outstanding tasks");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, cancelling outstanding tasks");
        }
    }
}
