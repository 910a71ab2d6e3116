//! Quality inspection engine.
//!
//! Runs missing/duplicate/anomaly statistics over a full dataset and
//! folds them into a single weighted score. The service wrapper adds
//! result memoization and task-progress tracking.

pub mod metrics;
pub mod scoring;
pub mod service;

use std::collections::BTreeMap;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{Result, ResultExt};
use crate::pipeline::stage::PipelineStage;
use crate::utils::dtype_label;

pub use metrics::{AnomalyDetail, AnomalyStats, DuplicateStats, MissingStats};
pub use scoring::quality_score;
pub use service::QualityService;

/// Full quality-inspection result for one dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub file_id: String,
    pub row_count: usize,
    pub column_count: usize,
    pub quality_score: f64,
    pub missing: MissingStats,
    pub duplicates: DuplicateStats,
    pub anomalies: AnomalyStats,
    /// Column name to coarse dtype label.
    pub types: BTreeMap<String, String>,
}

/// Inspect a frame and assemble the report. Pure computation; caching
/// and progress tracking live in [`QualityService`].
pub fn build_report(df: &DataFrame, file_id: &str, config: &EngineConfig) -> Result<QualityReport> {
    let missing = metrics::missing_stats(df);
    let duplicates = metrics::duplicate_stats(df, config).stage(PipelineStage::Process)?;
    let anomalies = metrics::anomaly_stats(df, config).stage(PipelineStage::Process)?;

    let score = quality_score(
        missing.missing_rate,
        duplicates.duplicate_rate,
        anomalies.anomaly_rate,
        config,
    );

    let types: BTreeMap<String, String> = df
        .get_columns()
        .iter()
        .map(|c| (c.name().to_string(), dtype_label(c.dtype()).to_string()))
        .collect();

    Ok(QualityReport {
        file_id: file_id.to_string(),
        row_count: df.height(),
        column_count: df.width(),
        quality_score: score,
        missing,
        duplicates,
        anomalies,
        types,
    })
}
