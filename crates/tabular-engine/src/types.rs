//! Shared wire types for requests, responses, and profiles.
//!
//! These structs define the contract between the engine and its
//! orchestrator. They are plain serde types; behavior lives in the
//! pipeline modules.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PipelineError;
use crate::rules::CleanRules;
use crate::validator::AnalysisConfig;

// ============================================================================
// Source descriptors
// ============================================================================

/// Where a dataset lives. Only local files are supported in this scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    LocalFile,
    ObjectStore,
}

/// On-disk format of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    Csv,
    Xlsx,
    Parquet,
    Json,
}

impl DataFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
            Self::Parquet => "parquet",
            Self::Json => "json",
        }
    }
}

/// Immutable source descriptor received from the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRef {
    pub storage: StorageKind,
    pub path: String,
    pub format: DataFormat,
    /// Declared text encoding; auto-detected from a sample when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// Declared CSV delimiter; candidates are tried when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<char>,
    /// Worksheet name for xlsx sources; first sheet when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
}

impl DataRef {
    /// Local CSV reference with defaults for the optional fields.
    pub fn local_csv(path: impl Into<String>) -> Self {
        Self {
            storage: StorageKind::LocalFile,
            path: path.into(),
            format: DataFormat::Csv,
            encoding: None,
            delimiter: None,
            sheet: None,
        }
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Half-open row range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

/// Optional row/column projection applied before analysis.
///
/// `columns = None` means all columns; an explicit empty list is rejected
/// during validation rather than treated as "no selection."
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<RowRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
}

/// Accounting for what a selection did to the frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionProfile {
    pub rows_before: usize,
    pub rows_after: usize,
    pub cols_before: usize,
    pub cols_after: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_range: Option<RowRange>,
    pub selected_columns: Vec<String>,
}

// ============================================================================
// User actions (replay)
// ============================================================================

/// One recorded user edit, replayed in order against the loaded snapshot.
///
/// `row_id` is the visual row number: a 0-based positional index valid at
/// the moment the action runs (deletions compact subsequent indices).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum UserAction {
    UpdateCell {
        row_id: String,
        column: String,
        /// Value the caller last observed; checked as an optimistic lock
        /// when present.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        before: Option<Value>,
        after: Value,
    },
    DeleteRow {
        row_id: String,
    },
    /// Accepted by the schema, unconditionally rejected at replay time.
    InsertRow {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        values: Option<Value>,
    },
}

impl UserAction {
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::UpdateCell { .. } => "update_cell",
            Self::DeleteRow { .. } => "delete_row",
            Self::InsertRow { .. } => "insert_row",
        }
    }
}

/// Replay accounting. The pipeline contract is all-or-nothing, so
/// `failed > 0` always coincides with a failed response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayStats {
    pub total: usize,
    pub applied: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_index: Option<usize>,
}

// ============================================================================
// Profiles
// ============================================================================

/// Lightweight before/after snapshot of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub rows: usize,
    pub cols: usize,
    pub missing_rate: f64,
    pub duplicate_rate: f64,
}

/// Loader output profile, richer than the transformation profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadProfile {
    pub rows: usize,
    pub cols: usize,
    pub dtypes: BTreeMap<String, String>,
    pub total_missing_cells: usize,
    pub missing_rate: f64,
}

/// Signed deltas between two profiles (after minus before).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProfileDelta {
    pub rows: i64,
    pub cols: i64,
    pub missing_rate: f64,
    pub duplicate_rate: f64,
}

impl ProfileDelta {
    pub fn between(before: &Profile, after: &Profile) -> Self {
        Self {
            rows: after.rows as i64 - before.rows as i64,
            cols: after.cols as i64 - before.cols as i64,
            missing_rate: after.missing_rate - before.missing_rate,
            duplicate_rate: after.duplicate_rate - before.duplicate_rate,
        }
    }
}

// ============================================================================
// Charts and artifacts
// ============================================================================

/// Chart-ready payload. `data` and `meta` shapes depend on `chart_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chart {
    #[serde(rename = "type")]
    pub chart_type: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,
}

impl Chart {
    pub fn new(chart_type: impl Into<String>, data: Value, meta: Value) -> Self {
        Self {
            chart_type: chart_type.into(),
            data,
            meta,
        }
    }
}

/// Exported artifact descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub path: String,
    pub format: String,
    pub size_bytes: u64,
}

// ============================================================================
// Requests
// ============================================================================

/// Cleaning pipeline request.
#[derive(Debug, Clone, Deserialize)]
pub struct CleaningRequest {
    pub file_id: String,
    pub data_ref: DataRef,
    #[serde(default)]
    pub user_actions: Vec<UserAction>,
    #[serde(default)]
    pub clean_rules: CleanRules,
    /// Opaque orchestrator metadata, echoed into logs only.
    #[serde(default)]
    pub meta: Option<Value>,
}

/// Analysis pipeline request.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisRequest {
    pub file_id: String,
    pub data_ref: DataRef,
    #[serde(default)]
    pub data_selection: Option<Selection>,
    pub analysis_config: AnalysisConfig,
    #[serde(default)]
    pub meta: Option<Value>,
}

/// Quality inspection request.
#[derive(Debug, Clone, Deserialize)]
pub struct QualityRequest {
    pub file_id: String,
    pub data_ref: DataRef,
    #[serde(default)]
    pub force_refresh: bool,
}

// ============================================================================
// Responses
// ============================================================================

/// Terminal pipeline outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Success,
    Failed,
}

/// Wire shape of a pipeline failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub stage: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl From<&PipelineError> for ErrorBody {
    fn from(err: &PipelineError) -> Self {
        Self {
            stage: err.stage().to_string(),
            message: err.to_string(),
            detail: err.detail().cloned(),
        }
    }
}

/// One entry in the ordered "what ran" report of the cleaning pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleAppliedDetail {
    pub name: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub effect: Value,
}

/// Headline numbers for a completed cleaning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningSummary {
    pub rows_before: usize,
    pub rows_after: usize,
    pub cols_before: usize,
    pub cols_after: usize,
    pub removed_rows: usize,
    pub cells_modified: usize,
    pub user_actions_applied: usize,
    pub rules_applied: Vec<String>,
    pub missing_rate_before: f64,
    pub missing_rate_after: f64,
    pub duplicate_rate_before: f64,
    pub duplicate_rate_after: f64,
    pub duration_ms: u64,
}

/// Per-rule effect metrics plus the overall profile delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffSummary {
    pub by_rule: Value,
    pub profile_delta: ProfileDelta,
}

/// Cleaning pipeline response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningResponse {
    pub status: PipelineStatus,
    pub stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleaned_asset_ref: Option<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<CleaningSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_summary: Option<DiffSummary>,
    #[serde(default)]
    pub rules_applied_detail: Vec<RuleAppliedDetail>,
    /// Up to `preview_rows` rows of the cleaned frame, non-finite values
    /// nulled.
    #[serde(default)]
    pub preview: Vec<Value>,
    #[serde(default)]
    pub log: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Headline numbers for a completed analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub analysis_type: String,
    pub input_shape: [usize; 2],
    pub selected_shape: [usize; 2],
    pub selected_columns: Vec<String>,
    pub key_metrics: Value,
}

/// Analysis pipeline response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub status: PipelineStatus,
    pub stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<AnalysisSummary>,
    #[serde(default)]
    pub charts: Vec<Chart>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub log: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}
