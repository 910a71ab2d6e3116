//! CLI entry point for the tabular compute engine.

use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::info;

use tabular_engine::cache::InMemoryCache;
use tabular_engine::config::EngineConfig;
use tabular_engine::pipeline::{AnalysisPipeline, CleaningPipeline};
use tabular_engine::quality::QualityService;
use tabular_engine::store::LocalBlobStore;
use tabular_engine::types::{AnalysisRequest, CleaningRequest, PipelineStatus, QualityRequest};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Stateless tabular compute engine",
    long_about = "Staged pipelines over tabular datasets: cleaning (replay user edits,\n\
                  apply rules, export), analysis (select, validate, compute statistics),\n\
                  and quality inspection (missing/duplicate/outlier detection and score).\n\n\
                  Requests are JSON documents; pass a file path or '-' for stdin.\n\n\
                  EXAMPLES:\n  \
                  # Clean a dataset per a recorded request\n  \
                  tabular-engine clean --request clean_request.json\n\n  \
                  # Run a correlation analysis and export the result\n  \
                  tabular-engine analyze --request analyze_request.json --export\n\n  \
                  # Inspect data quality\n  \
                  tabular-engine quality --request quality_request.json"
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Output the full response as JSON instead of a human-readable summary
    ///
    /// Disables all progress logs; only the JSON document is written to stdout.
    #[arg(long, global = true)]
    json: bool,

    /// Override the export base directory
    #[arg(long, global = true)]
    export_dir: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the cleaning pipeline: load, replay edits, apply rules, export
    Clean {
        /// JSON request file, or '-' for stdin
        #[arg(short, long)]
        request: String,
    },
    /// Run the analysis pipeline: load, select, validate, compute
    Analyze {
        /// JSON request file, or '-' for stdin
        #[arg(short, long)]
        request: String,

        /// Also write the analysis result as a JSON artifact
        #[arg(long)]
        export: bool,
    },
    /// Run a quality inspection: missing/duplicate/outlier stats and score
    Quality {
        /// JSON request file, or '-' for stdin
        #[arg(short, long)]
        request: String,

        /// Task identifier for progress tracking
        #[arg(long, default_value = "cli")]
        task_id: String,
    },
    /// Poll the status of a tracked task
    TaskStatus {
        #[arg(long)]
        task_id: String,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled so stdout
/// only contains the JSON document.
fn init_logging(level: &str, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn read_request<T: serde::de::DeserializeOwned>(source: &str) -> Result<T> {
    let raw = if source == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read request from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("failed to read request file: {}", source))?
    };
    serde_json::from_str(&raw).context("request is not valid JSON for this command")
}

fn build_config(export_dir: Option<&str>) -> Result<EngineConfig> {
    let mut builder = EngineConfig::builder();
    if let Some(dir) = export_dir {
        builder = builder.export_dir(dir);
    }
    builder.build().map_err(|e| anyhow!(e.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level, args.json);
    dotenv().ok();

    let config = build_config(args.export_dir.as_deref())?;

    match args.command {
        Command::Clean { request } => {
            let request: CleaningRequest = read_request(&request)?;
            let pipeline = CleaningPipeline::new(config, Arc::new(LocalBlobStore));
            let response =
                tokio::task::spawn_blocking(move || pipeline.run(&request)).await?;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else if let Some(summary) = &response.summary {
                info!(
                    "Cleaned {} -> {} rows ({} removed, {} cells modified) in {}ms",
                    summary.rows_before,
                    summary.rows_after,
                    summary.removed_rows,
                    summary.cells_modified,
                    summary.duration_ms
                );
                if let Some(artifact) = &response.cleaned_asset_ref {
                    info!("Exported: {}", artifact.path);
                }
            }
            if response.status == PipelineStatus::Failed {
                let body = response.error.as_ref();
                return Err(anyhow!(
                    "cleaning failed at stage '{}': {}",
                    response.stage,
                    body.map(|e| e.message.as_str()).unwrap_or("unknown error")
                ));
            }
        }
        Command::Analyze { request, export } => {
            let request: AnalysisRequest = read_request(&request)?;
            let pipeline = AnalysisPipeline::new(config, Arc::new(LocalBlobStore));
            let response =
                tokio::task::spawn_blocking(move || pipeline.run(&request, export)).await?;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else if let Some(summary) = &response.summary {
                info!(
                    "Analysis '{}' over {} columns: {} charts, {} warnings",
                    summary.analysis_type,
                    summary.selected_columns.len(),
                    response.charts.len(),
                    response.warnings.len()
                );
                for warning in &response.warnings {
                    tracing::warn!("{}", warning);
                }
            }
            if response.status == PipelineStatus::Failed {
                let body = response.error.as_ref();
                return Err(anyhow!(
                    "analysis failed at stage '{}': {}",
                    response.stage,
                    body.map(|e| e.message.as_str()).unwrap_or("unknown error")
                ));
            }
        }
        Command::Quality { request, task_id } => {
            let request: QualityRequest = read_request(&request)?;
            let service = QualityService::new(config, Arc::new(InMemoryCache::new()));
            let report = service
                .inspect(&request, &task_id)
                .await
                .map_err(|e| anyhow!("quality inspection failed: {}", e))?;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                info!(
                    "Quality score {} for {} ({} rows x {} cols)",
                    report.quality_score, report.file_id, report.row_count, report.column_count
                );
                info!(
                    "missing: {} cells, duplicates: {} rows, anomalies: {}",
                    report.missing.total_missing_cells,
                    report.duplicates.duplicate_rows,
                    report.anomalies.total_anomalies
                );
            }
        }
        Command::TaskStatus { task_id } => {
            // the CLI process has no shared cache; this answers for tasks
            // tracked within the same process only
            let service = QualityService::new(config, Arc::new(InMemoryCache::new()));
            match service.task_status(&task_id).await {
                Some(status) => println!("{}", serde_json::to_string_pretty(&status)?),
                None => return Err(anyhow!("task '{}' not found", task_id)),
            }
        }
    }

    Ok(())
}
