use anyhow::Context;
use cbs_bronze::config::Config;
use cbs_bronze::constants::DEFAULT_CONFIG_FILE;
use cbs_bronze::logging::{cleanup_old_logs, init_logging};
use cbs_bronze::source::{CbsClient, TableSource};
use cbs_bronze::{BatchRunner, FailurePolicy, TableOutcome, TableProcessor};
use chrono::Local;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, Instrument};

#[derive(Parser)]
#[command(name = "cbs_bronze")]
#[command(about = "Download CBS open-data tables into the bronze layer")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Manifest of tables to ingest (overrides ingest.manifest)
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Output format: parquet or csv (overrides ingest.format)
    #[arg(long)]
    format: Option<String>,

    /// Maximum number of tables processed concurrently (overrides ingest.max_workers)
    #[arg(long)]
    workers: Option<usize>,

    /// Stop the batch at the first failed table
    #[arg(long)]
    abort_on_failure: bool,
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path, true),
        None => Config::load(Path::new(DEFAULT_CONFIG_FILE), false),
    }
    .context("loading configuration")?;

    if let Some(manifest) = &cli.manifest {
        config.ingest.manifest = Some(manifest.clone());
    }
    if let Some(format) = &cli.format {
        config.ingest.format = format.clone();
    }
    if let Some(workers) = cli.workers {
        config.ingest.max_workers = workers;
    }
    if cli.abort_on_failure {
        config.ingest.on_table_failure = FailurePolicy::Abort;
    }
    config.validate().context("validating configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    // Held until exit so the file sink is flushed
    let _log_handle = match init_logging(&config.paths.log_root) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("❌ Failed to initialize logging in {}: {}", config.paths.log_root.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let sweep = cleanup_old_logs(&config.paths.log_root, config.logging.retention_days);
    info!(
        "Log retention: removed {} file(s), {} failure(s)",
        sweep.removed.len(),
        sweep.failed
    );

    let recorder = cbs_bronze::metrics::init_metrics();

    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("run", run_id = %run_id);
    match run(&config, run_id, recorder).instrument(span).await {
        Ok(code) => code,
        Err(e) => {
            error!("Run failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(
    config: &Config,
    run_id: uuid::Uuid,
    recorder: Option<&PrometheusHandle>,
) -> anyhow::Result<ExitCode> {
    let started = Local::now();

    let source: Arc<dyn TableSource> = Arc::new(CbsClient::new(&config.source).context("building CBS client")?);
    let processor = TableProcessor::new(
        source,
        config.paths.data_root.clone(),
        &config.ingest.format,
        started.date_naive(),
    );
    let runner = BatchRunner::new(
        processor,
        config.ingest.max_workers,
        config.ingest.on_table_failure,
    );

    let manifest_path = config.manifest_path();
    println!("🔄 Ingesting tables from {}", manifest_path.display());
    let summary = runner.run(&manifest_path).await?;

    println!("\n📊 Batch results:");
    println!("   Written: {}", summary.written());
    println!("   Skipped: {}", summary.skipped());
    println!("   Failed: {}", summary.failed());
    for outcome in &summary.outcomes {
        if let TableOutcome::Failed { table, error } = outcome {
            println!("   - {}: {}", table, error);
        }
    }

    if let Some(url) = config.pushgateway_url() {
        cbs_bronze::metrics::push_summary(&url, &run_id.to_string(), &summary, recorder).await;
    }

    Ok(if summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
