//! Engine configuration.
//!
//! All tunables live here: loader limits, quality-score weights, anomaly
//! detection thresholds, export paths, and cache TTLs. Use
//! [`EngineConfig::builder()`] for fluent setup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the pipeline engine.
///
/// # Example
///
/// ```rust,ignore
/// use tabular_engine::config::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .max_file_size_bytes(10 * 1024 * 1024)
///     .iqr_multiplier(3.0)
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum input file size in bytes.
    /// Default: 50 MiB
    pub max_file_size_bytes: u64,

    /// Maximum number of rows a loaded dataset may have.
    /// Default: 200_000
    pub max_rows: usize,

    /// Maximum number of columns a loaded dataset may have.
    /// Default: 2_000
    pub max_cols: usize,

    /// Number of bytes sampled from a file for encoding and delimiter
    /// detection.
    /// Default: 8192
    pub sniff_bytes: usize,

    /// IQR multiplier for outlier detection (1.5 common, 3.0 extreme).
    /// Default: 1.5
    pub iqr_multiplier: f64,

    /// Numeric columns with fewer distinct values than this are treated
    /// as enumerated/ordinal and skipped by outlier detection.
    /// Default: 10
    pub categorical_distinct_threshold: usize,

    /// Maximum outlier detail entries reported per column, ranked by
    /// absolute deviation from the column median.
    /// Default: 100
    pub max_outlier_details_per_column: usize,

    /// Maximum 1-based duplicate row numbers reported.
    /// Default: 1000
    pub max_duplicate_row_numbers: usize,

    /// Quality score deduction weight for the missing-value rate.
    /// Default: 40.0
    pub score_weight_missing: f64,

    /// Quality score deduction weight for the duplicate-row rate.
    /// Default: 30.0
    pub score_weight_duplicates: f64,

    /// Quality score deduction cap for the anomaly rate.
    /// Default: 30.0
    pub score_weight_anomalies: f64,

    /// Amplification constant applied to the anomaly rate before
    /// weighting; anomaly rates are typically far smaller than
    /// missing/duplicate rates.
    /// Default: 10.0
    pub anomaly_amplification: f64,

    /// Base directory for exported artifacts.
    /// Default: "exports"
    pub export_dir: PathBuf,

    /// Number of preview rows included in cleaning responses.
    /// Default: 20
    pub preview_rows: usize,

    /// TTL in seconds for memoized quality results.
    /// Default: 3600
    pub result_cache_ttl_secs: u64,

    /// TTL in seconds for task-progress records; refreshed on every
    /// update (heartbeat).
    /// Default: 86_400
    pub task_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 50 * 1024 * 1024,
            max_rows: 200_000,
            max_cols: 2_000,
            sniff_bytes: 8192,
            iqr_multiplier: 1.5,
            categorical_distinct_threshold: 10,
            max_outlier_details_per_column: 100,
            max_duplicate_row_numbers: 1000,
            score_weight_missing: 40.0,
            score_weight_duplicates: 30.0,
            score_weight_anomalies: 30.0,
            anomaly_amplification: 10.0,
            export_dir: PathBuf::from("exports"),
            preview_rows: 20,
            result_cache_ttl_secs: 3600,
            task_ttl_secs: 86_400,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.max_file_size_bytes == 0 {
            return Err(ConfigValidationError::ZeroLimit("max_file_size_bytes"));
        }
        if self.max_rows == 0 {
            return Err(ConfigValidationError::ZeroLimit("max_rows"));
        }
        if self.max_cols == 0 {
            return Err(ConfigValidationError::ZeroLimit("max_cols"));
        }
        if self.iqr_multiplier <= 0.0 || !self.iqr_multiplier.is_finite() {
            return Err(ConfigValidationError::InvalidMultiplier(
                self.iqr_multiplier,
            ));
        }
        for (field, value) in [
            ("score_weight_missing", self.score_weight_missing),
            ("score_weight_duplicates", self.score_weight_duplicates),
            ("score_weight_anomalies", self.score_weight_anomalies),
            ("anomaly_amplification", self.anomaly_amplification),
        ] {
            if value < 0.0 || !value.is_finite() {
                return Err(ConfigValidationError::InvalidWeight { field, value });
            }
        }
        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("'{0}' must be greater than zero")]
    ZeroLimit(&'static str),

    #[error("Invalid IQR multiplier: {0} (must be a positive finite number)")]
    InvalidMultiplier(f64),

    #[error("Invalid weight for '{field}': {value} (must be a non-negative finite number)")]
    InvalidWeight { field: &'static str, value: f64 },
}

/// Builder for [`EngineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    max_file_size_bytes: Option<u64>,
    max_rows: Option<usize>,
    max_cols: Option<usize>,
    sniff_bytes: Option<usize>,
    iqr_multiplier: Option<f64>,
    categorical_distinct_threshold: Option<usize>,
    max_outlier_details_per_column: Option<usize>,
    max_duplicate_row_numbers: Option<usize>,
    score_weight_missing: Option<f64>,
    score_weight_duplicates: Option<f64>,
    score_weight_anomalies: Option<f64>,
    anomaly_amplification: Option<f64>,
    export_dir: Option<PathBuf>,
    preview_rows: Option<usize>,
    result_cache_ttl_secs: Option<u64>,
    task_ttl_secs: Option<u64>,
}

impl EngineConfigBuilder {
    /// Set the maximum input file size in bytes.
    pub fn max_file_size_bytes(mut self, bytes: u64) -> Self {
        self.max_file_size_bytes = Some(bytes);
        self
    }

    /// Set the maximum loaded row count.
    pub fn max_rows(mut self, rows: usize) -> Self {
        self.max_rows = Some(rows);
        self
    }

    /// Set the maximum loaded column count.
    pub fn max_cols(mut self, cols: usize) -> Self {
        self.max_cols = Some(cols);
        self
    }

    /// Set the byte count sampled for encoding/delimiter detection.
    pub fn sniff_bytes(mut self, bytes: usize) -> Self {
        self.sniff_bytes = Some(bytes);
        self
    }

    /// Set the IQR multiplier for outlier detection.
    ///
    /// # Arguments
    /// * `multiplier` - 1.5 flags common outliers, 3.0 only extreme ones.
    pub fn iqr_multiplier(mut self, multiplier: f64) -> Self {
        self.iqr_multiplier = Some(multiplier);
        self
    }

    /// Set the distinct-count threshold below which a numeric column is
    /// treated as enumerated and exempted from outlier detection.
    pub fn categorical_distinct_threshold(mut self, threshold: usize) -> Self {
        self.categorical_distinct_threshold = Some(threshold);
        self
    }

    /// Set the per-column cap on reported outlier details.
    pub fn max_outlier_details_per_column(mut self, cap: usize) -> Self {
        self.max_outlier_details_per_column = Some(cap);
        self
    }

    /// Set the cap on reported duplicate row numbers.
    pub fn max_duplicate_row_numbers(mut self, cap: usize) -> Self {
        self.max_duplicate_row_numbers = Some(cap);
        self
    }

    /// Set the quality-score deduction weights.
    pub fn score_weights(mut self, missing: f64, duplicates: f64, anomalies: f64) -> Self {
        self.score_weight_missing = Some(missing);
        self.score_weight_duplicates = Some(duplicates);
        self.score_weight_anomalies = Some(anomalies);
        self
    }

    /// Set the anomaly-rate amplification constant.
    pub fn anomaly_amplification(mut self, k: f64) -> Self {
        self.anomaly_amplification = Some(k);
        self
    }

    /// Set the base directory for exported artifacts.
    pub fn export_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_dir = Some(path.into());
        self
    }

    /// Set the number of preview rows in cleaning responses.
    pub fn preview_rows(mut self, rows: usize) -> Self {
        self.preview_rows = Some(rows);
        self
    }

    /// Set the TTL for memoized quality results.
    pub fn result_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.result_cache_ttl_secs = Some(secs);
        self
    }

    /// Set the TTL for task-progress records.
    pub fn task_ttl_secs(mut self, secs: u64) -> Self {
        self.task_ttl_secs = Some(secs);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `EngineConfig` or an error if validation fails.
    pub fn build(self) -> Result<EngineConfig, ConfigValidationError> {
        let defaults = EngineConfig::default();
        let config = EngineConfig {
            max_file_size_bytes: self
                .max_file_size_bytes
                .unwrap_or(defaults.max_file_size_bytes),
            max_rows: self.max_rows.unwrap_or(defaults.max_rows),
            max_cols: self.max_cols.unwrap_or(defaults.max_cols),
            sniff_bytes: self.sniff_bytes.unwrap_or(defaults.sniff_bytes),
            iqr_multiplier: self.iqr_multiplier.unwrap_or(defaults.iqr_multiplier),
            categorical_distinct_threshold: self
                .categorical_distinct_threshold
                .unwrap_or(defaults.categorical_distinct_threshold),
            max_outlier_details_per_column: self
                .max_outlier_details_per_column
                .unwrap_or(defaults.max_outlier_details_per_column),
            max_duplicate_row_numbers: self
                .max_duplicate_row_numbers
                .unwrap_or(defaults.max_duplicate_row_numbers),
            score_weight_missing: self
                .score_weight_missing
                .unwrap_or(defaults.score_weight_missing),
            score_weight_duplicates: self
                .score_weight_duplicates
                .unwrap_or(defaults.score_weight_duplicates),
            score_weight_anomalies: self
                .score_weight_anomalies
                .unwrap_or(defaults.score_weight_anomalies),
            anomaly_amplification: self
                .anomaly_amplification
                .unwrap_or(defaults.anomaly_amplification),
            export_dir: self.export_dir.unwrap_or(defaults.export_dir),
            preview_rows: self.preview_rows.unwrap_or(defaults.preview_rows),
            result_cache_ttl_secs: self
                .result_cache_ttl_secs
                .unwrap_or(defaults.result_cache_ttl_secs),
            task_ttl_secs: self.task_ttl_secs.unwrap_or(defaults.task_ttl_secs),
        };

        config.validate()?;
        Ok(config)
    }
}
