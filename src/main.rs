use analytics::{AnalysisReport, AnalysisRequest, AnalyticsEngine, BatchEntry, BatchOutcome, BatchRequest};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use core_types::{ForecastModel, TimeSeries};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// The main entry point for the chess analytics harness.
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from a .env file when one is present.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_deref())?;

    let config = configuration::load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    let engine = Arc::new(AnalyticsEngine::new(config).context("Failed to start the analytics engine")?);

    match cli.command {
        Commands::Run(args) => handle_run(args, engine).await,
        Commands::Batch(args) => handle_batch(args, engine).await,
        Commands::Forecast(args) => handle_forecast(args, engine).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Statistical analysis of rating histories and other chess statistics.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file (defaults to ./analytics.toml if present).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Also write logs to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single analysis request and print the report as JSON.
    Run(RunArgs),
    /// Run an array of requests in parallel and print one entry per request.
    Batch(BatchArgs),
    /// Forecast a series file with an explicit model set.
    Forecast(ForecastArgs),
}

#[derive(Parser)]
struct RunArgs {
    /// JSON file holding one analysis request.
    #[arg(long)]
    request: PathBuf,
}

#[derive(Parser)]
struct BatchArgs {
    /// JSON file holding an array of batch requests.
    #[arg(long)]
    requests: PathBuf,

    /// Print a summary table instead of JSON.
    #[arg(long)]
    table: bool,
}

#[derive(Parser)]
struct ForecastArgs {
    /// JSON file holding a series (`{"values": [...]}`).
    #[arg(long)]
    input: PathBuf,

    /// Models to include; defaults to the configured set.
    #[arg(long, value_enum, num_args = 1..)]
    model: Vec<ForecastModel>,

    /// Number of steps to forecast.
    #[arg(long)]
    horizon: Option<usize>,
}

// ==============================================================================
// Logging
// ==============================================================================

/// Logs go to stderr, filtered by `RUST_LOG` (default `info`), and optionally to a file.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file path {:?} has no file name", path))?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install the tracing subscriber")?;
    Ok(guard)
}

// ==============================================================================
// Command Handlers
// ==============================================================================

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {:?}", path))
}

async fn handle_run(args: RunArgs, engine: Arc<AnalyticsEngine>) -> Result<()> {
    let request: AnalysisRequest = read_json(&args.request)?;
    info!(analysis = ?request.kind(), "running analysis");
    let report = tokio::task::spawn_blocking(move || engine.analyze(&request)).await??;
    print_report(&report)
}

async fn handle_batch(args: BatchArgs, engine: Arc<AnalyticsEngine>) -> Result<()> {
    let mut requests: Vec<BatchRequest> = read_json(&args.requests)?;
    for request in requests.iter_mut().filter(|r| r.id.is_empty()) {
        request.id = Uuid::new_v4().to_string();
    }
    info!(requests = requests.len(), "running batch");

    let entries = tokio::task::spawn_blocking(move || engine.analyze_batch(requests)).await?;
    let failed = entries.iter().filter(|e| !e.is_ok()).count();
    info!(total = entries.len(), failed, "batch complete");

    if args.table {
        println!("{}", batch_table(&entries));
    } else {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    }
    Ok(())
}

async fn handle_forecast(args: ForecastArgs, engine: Arc<AnalyticsEngine>) -> Result<()> {
    let series: TimeSeries = read_json(&args.input)?;
    let mut options = engine.config().forecast.clone();
    if !args.model.is_empty() {
        options.models = args.model;
    }
    if let Some(horizon) = args.horizon {
        options.horizon = horizon;
    }
    let report = tokio::task::spawn_blocking(move || {
        engine
            .analyze(&AnalysisRequest::Forecast {
                series,
                options: Some(options),
            })
    })
    .await??;
    print_report(&report)
}

fn print_report(report: &AnalysisReport) -> Result<()> {
    info!(summary = %report.summary, "analysis complete");
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn batch_table(entries: &[BatchEntry]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Id", "Status", "Analysis", "Summary"]);
    for entry in entries {
        match &entry.outcome {
            BatchOutcome::Ok { report } => table.add_row(vec![
                entry.id.clone(),
                "ok".to_string(),
                serde_json::to_string(&report.analysis)
                    .unwrap_or_default()
                    .trim_matches('"')
                    .to_string(),
                report.summary.clone(),
            ]),
            BatchOutcome::Error { kind, message } => table.add_row(vec![
                entry.id.clone(),
                "error".to_string(),
                kind.clone(),
                message.clone(),
            ]),
        };
    }
    table
}
