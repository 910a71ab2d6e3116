//! Artifact export.
//!
//! Serializes the final frame or report and hands the bytes to the blob
//! store's atomic write. Output paths derive from a caller-controlled
//! identifier that is sanitized before it touches the filesystem.

use polars::prelude::*;
use serde_json::{Value, json};
use tracing::info;

use crate::config::EngineConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::stage::PipelineStage;
use crate::store::BlobStore;
use crate::types::{Artifact, DataFormat};
use crate::utils::{sanitize_file_id, sanitize_json};

fn export_error(message: impl Into<String>) -> PipelineError {
    PipelineError::stage_msg(PipelineStage::Export, message)
}

fn safe_id(file_id: &str) -> Result<String> {
    let safe = sanitize_file_id(file_id);
    if safe.is_empty() {
        return Err(export_error(format!(
            "file_id '{}' is empty after sanitization",
            file_id
        )));
    }
    Ok(safe)
}

/// Export a cleaned frame as csv or parquet under
/// `{export_dir}/{safe_id}/{timestamp_ms}.{ext}`.
pub fn export_cleaned(
    df: &mut DataFrame,
    file_id: &str,
    format: DataFormat,
    config: &EngineConfig,
    store: &dyn BlobStore,
) -> Result<Artifact> {
    let safe = safe_id(file_id)?;
    let ext = match format {
        DataFormat::Csv => "csv",
        DataFormat::Parquet => "parquet",
        other => {
            return Err(export_error(format!(
                "unsupported export format: {}",
                other.extension()
            )));
        }
    };

    let mut buffer: Vec<u8> = Vec::new();
    match format {
        DataFormat::Csv => {
            CsvWriter::new(&mut buffer)
                .include_header(true)
                .with_separator(b',')
                .finish(df)
                .map_err(|e| export_error(format!("csv serialization failed: {}", e)))?;
        }
        DataFormat::Parquet => {
            ParquetWriter::new(&mut buffer)
                .finish(df)
                .map_err(|e| export_error(format!("parquet serialization failed: {}", e)))?;
        }
        _ => unreachable!(),
    }

    let path = config
        .export_dir
        .join(&safe)
        .join(format!("{}.{}", chrono::Utc::now().timestamp_millis(), ext));
    store
        .write_atomic(&path, &buffer)
        .map_err(|e| export_error(format!("write failed for {}: {}", path.display(), e)))?;

    info!(path = %path.display(), bytes = buffer.len(), "cleaned dataset exported");
    Ok(Artifact {
        artifact_type: "cleaned_dataset".to_string(),
        path: path.display().to_string(),
        format: ext.to_string(),
        size_bytes: buffer.len() as u64,
    })
}

/// Export an analysis result as JSON under
/// `{export_dir}/{safe_id}/{version}/{timestamp_ms}.json`.
pub fn export_analysis_json(
    payload: &Value,
    file_id: &str,
    version: &str,
    config: &EngineConfig,
    store: &dyn BlobStore,
) -> Result<Artifact> {
    let safe = safe_id(file_id)?;
    let safe_version = sanitize_file_id(version);

    let mut sanitized = payload.clone();
    sanitize_json(&mut sanitized);
    let bytes = serde_json::to_vec(&json!(sanitized))?;

    let path = config
        .export_dir
        .join(&safe)
        .join(if safe_version.is_empty() { "v1".to_string() } else { safe_version })
        .join(format!("{}.json", chrono::Utc::now().timestamp_millis()));
    store
        .write_atomic(&path, &bytes)
        .map_err(|e| export_error(format!("write failed for {}: {}", path.display(), e)))?;

    info!(path = %path.display(), bytes = bytes.len(), "analysis result exported");
    Ok(Artifact {
        artifact_type: "analysis_result_json".to_string(),
        path: path.display().to_string(),
        format: "json".to_string(),
        size_bytes: bytes.len() as u64,
    })
}
