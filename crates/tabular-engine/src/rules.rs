//! Cleaning rules.
//!
//! Rules run in a fixed order: missing-value handling, deduplication,
//! type casting. Each rule is optional and independently configured, and
//! records enough effect data to drive the summary and diff report.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::pipeline::stage::PipelineStage;
use crate::types::Profile;
use crate::utils::{compute_profile, is_numeric_dtype, series_mode};

fn rules_error(message: impl Into<String>, detail: Value) -> PipelineError {
    PipelineError::stage_with_detail(PipelineStage::Rules, message, Some(detail))
}

fn validate_error(message: impl Into<String>) -> PipelineError {
    PipelineError::stage_msg(PipelineStage::Validate, message)
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Rule configuration
// ============================================================================

/// How missing values are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingStrategy {
    /// Remove rows with nulls in the target columns.
    DropRows,
    /// Replace nulls per column using `fill_method`.
    #[default]
    Fill,
}

/// Replacement computation for `MissingStrategy::Fill`.
///
/// Numeric-only methods (mean, median) downgrade to mode on non-numeric
/// columns rather than erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FillMethod {
    #[default]
    Mean,
    Median,
    Mode,
    Constant,
    Ffill,
    Bfill,
}

/// Survivor policy for deduplication, pandas-style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeepStrategy {
    #[default]
    First,
    Last,
    /// Drop every row of every duplicate group.
    False,
}

/// Target type for a per-column cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Int,
    Float,
    Str,
    Bool,
    Datetime,
    Category,
}

/// Missing-value rule parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingRule {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub strategy: MissingStrategy,
    /// Target columns; all columns when absent. Unknown names are skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub fill_method: FillMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant_value: Option<Value>,
}

/// Deduplication rule parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeduplicateRule {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset: Option<Vec<String>>,
    #[serde(default)]
    pub keep: KeepStrategy,
}

/// One per-column cast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnCast {
    pub column: String,
    #[serde(rename = "to")]
    pub target: TargetType,
    /// Datetime parse format; common formats are tried when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Type-cast rule parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeCastRule {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub casts: Vec<ColumnCast>,
}

/// The full cleaning rule set. `outliers` and `filter` are accepted by
/// the schema but reserved; enabling them is a validation error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<MissingRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deduplicate: Option<DeduplicateRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_cast: Option<TypeCastRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outliers: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
}

impl CleanRules {
    /// Schema-level validation, run before any computation.
    pub fn validate(&self) -> Result<()> {
        if let Some(missing) = &self.missing {
            if missing.enabled
                && missing.strategy == MissingStrategy::Fill
                && missing.fill_method == FillMethod::Constant
                && missing
                    .constant_value
                    .as_ref()
                    .map(|v| v.is_null())
                    .unwrap_or(true)
            {
                return Err(validate_error(
                    "missing rule: fill_method 'constant' requires a constant_value",
                ));
            }
        }
        for (name, reserved) in [("outliers", &self.outliers), ("filter", &self.filter)] {
            if let Some(value) = reserved {
                let enabled = value
                    .get("enabled")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                if enabled {
                    return Err(validate_error(format!(
                        "rule '{}' is reserved and not yet supported",
                        name
                    )));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Effect record for one executed rule.
#[derive(Debug, Clone, Serialize)]
pub struct RuleMetric {
    pub name: String,
    pub params: Value,
    pub effect: Value,
}

/// Output of a rule-engine run.
#[derive(Debug)]
pub struct RulesOutcome {
    pub df: DataFrame,
    pub logs: Vec<String>,
    pub metrics: Vec<RuleMetric>,
    pub after_profile: Profile,
}

/// Apply all enabled rules in fixed order.
pub fn apply_rules(df: DataFrame, rules: &CleanRules) -> Result<RulesOutcome> {
    rules.validate()?;

    let mut working = df;
    let mut logs = Vec::new();
    let mut metrics = Vec::new();

    if let Some(rule) = rules.missing.as_ref().filter(|r| r.enabled) {
        let (next, effect, log) = apply_missing(working, rule)?;
        working = next;
        logs.push(log);
        metrics.push(RuleMetric {
            name: "missing".to_string(),
            params: serde_json::to_value(rule)?,
            effect,
        });
    }

    if let Some(rule) = rules.deduplicate.as_ref().filter(|r| r.enabled) {
        let (next, effect, log) = apply_deduplicate(working, rule)?;
        working = next;
        logs.push(log);
        metrics.push(RuleMetric {
            name: "deduplicate".to_string(),
            params: serde_json::to_value(rule)?,
            effect,
        });
    }

    if let Some(rule) = rules.type_cast.as_ref().filter(|r| r.enabled) {
        let (next, effect, log) = apply_type_cast(working, rule)?;
        working = next;
        logs.push(log);
        metrics.push(RuleMetric {
            name: "type_cast".to_string(),
            params: serde_json::to_value(rule)?,
            effect,
        });
    }

    let after_profile = compute_profile(&working)?;
    Ok(RulesOutcome {
        df: working,
        logs,
        metrics,
        after_profile,
    })
}

/// Target columns of a rule, restricted to ones actually present.
fn existing_columns(df: &DataFrame, requested: Option<&Vec<String>>) -> Vec<String> {
    let available = df.get_column_names();
    match requested {
        Some(cols) => cols
            .iter()
            .filter(|c| available.iter().any(|a| a.as_str() == c.as_str()))
            .cloned()
            .collect(),
        None => available.iter().map(|n| n.to_string()).collect(),
    }
}

// ----------------------------------------------------------------------------
// Missing values
// ----------------------------------------------------------------------------

fn apply_missing(df: DataFrame, rule: &MissingRule) -> Result<(DataFrame, Value, String)> {
    let targets = existing_columns(&df, rule.columns.as_ref());

    match rule.strategy {
        MissingStrategy::DropRows => {
            let rows_before = df.height();
            let mut mask: Option<BooleanChunked> = None;
            for col in &targets {
                let not_null = df.column(col)?.as_materialized_series().is_not_null();
                mask = Some(match mask {
                    Some(m) => &m & &not_null,
                    None => not_null,
                });
            }
            let filtered = match mask {
                Some(m) => df.filter(&m)?,
                None => df,
            };
            let removed = rows_before - filtered.height();
            let log = format!("Rule missing: dropped {} rows with null values", removed);
            debug!(removed, "missing rule: drop_rows");
            Ok((
                filtered,
                json!({"strategy": "drop_rows", "removed_rows": removed, "filled_cells": 0}),
                log,
            ))
        }
        MissingStrategy::Fill => {
            let mut working = df;
            let mut filled_cells = 0usize;
            for col in &targets {
                let series = working.column(col)?.as_materialized_series().clone();
                let nulls = series.null_count();
                if nulls == 0 {
                    continue;
                }
                match fill_series(&series, rule)? {
                    Some(filled) => {
                        working.replace(col, filled)?;
                        filled_cells += nulls;
                    }
                    None => {
                        warn!(column = %col, "missing rule: no replacement value available, column skipped");
                    }
                }
            }
            let log = format!(
                "Rule missing: filled {} cells using {:?}",
                filled_cells, rule.fill_method
            );
            Ok((
                working,
                json!({
                    "strategy": "fill",
                    "fill_method": rule.fill_method,
                    "filled_cells": filled_cells,
                    "removed_rows": 0,
                }),
                log,
            ))
        }
    }
}

/// Compute the filled series, or None when no replacement can be derived
/// (e.g. mode of an all-null column).
fn fill_series(series: &Series, rule: &MissingRule) -> Result<Option<Series>> {
    let numeric = is_numeric_dtype(series.dtype());

    // mean/median downgrade to mode for non-numeric columns
    let method = match rule.fill_method {
        FillMethod::Mean | FillMethod::Median if !numeric => FillMethod::Mode,
        m => m,
    };

    let filled = match method {
        FillMethod::Ffill => Some(series.fill_null(FillNullStrategy::Forward(None))?),
        FillMethod::Bfill => Some(series.fill_null(FillNullStrategy::Backward(None))?),
        FillMethod::Mean => series
            .mean()
            .map(|v| fill_numeric(series, v))
            .transpose()?,
        FillMethod::Median => series
            .median()
            .map(|v| fill_numeric(series, v))
            .transpose()?,
        FillMethod::Mode => match series_mode(series) {
            Some(mode) => {
                if numeric {
                    match mode.parse::<f64>() {
                        Ok(v) => Some(fill_numeric(series, v)?),
                        Err(_) => Some(fill_string(series, &mode)?),
                    }
                } else {
                    Some(fill_string(series, &mode)?)
                }
            }
            None => None,
        },
        FillMethod::Constant => {
            // presence is guaranteed by CleanRules::validate
            let value = rule.constant_value.as_ref().ok_or_else(|| {
                validate_error("missing rule: fill_method 'constant' requires a constant_value")
            })?;
            let numeric_value = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            match (numeric, numeric_value) {
                (true, Some(v)) => Some(fill_numeric(series, v)?),
                _ => {
                    let text = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    Some(fill_string(series, &text)?)
                }
            }
        }
    };
    Ok(filled)
}

fn fill_numeric(series: &Series, value: f64) -> Result<Series> {
    let casted = series.cast(&DataType::Float64)?;
    let ca = casted.f64()?;
    let values: Vec<f64> = ca.into_iter().map(|v| v.unwrap_or(value)).collect();
    Ok(Series::new(series.name().clone(), values))
}

fn fill_string(series: &Series, value: &str) -> Result<Series> {
    let casted = series.cast(&DataType::String)?;
    let ca = casted.str()?;
    let values: Vec<String> = ca
        .into_iter()
        .map(|v| v.unwrap_or(value).to_string())
        .collect();
    Ok(Series::new(series.name().clone(), values))
}

// ----------------------------------------------------------------------------
// Deduplication
// ----------------------------------------------------------------------------

fn apply_deduplicate(df: DataFrame, rule: &DeduplicateRule) -> Result<(DataFrame, Value, String)> {
    let rows_before = df.height();
    let keep = match rule.keep {
        KeepStrategy::First => UniqueKeepStrategy::First,
        KeepStrategy::Last => UniqueKeepStrategy::Last,
        KeepStrategy::False => UniqueKeepStrategy::None,
    };

    let subset = rule
        .subset
        .as_ref()
        .map(|cols| existing_columns(&df, Some(cols)));
    let deduped = match subset {
        Some(cols) if !cols.is_empty() => df.unique_stable(Some(&cols), keep, None)?,
        _ => df.unique_stable(None, keep, None)?,
    };

    let removed = rows_before - deduped.height();
    let log = format!("Rule deduplicate: removed {} duplicate rows", removed);
    debug!(removed, keep = ?rule.keep, "deduplicate rule");
    Ok((
        deduped,
        json!({"removed_rows": removed, "keep": rule.keep}),
        log,
    ))
}

// ----------------------------------------------------------------------------
// Type casting
// ----------------------------------------------------------------------------

fn apply_type_cast(df: DataFrame, rule: &TypeCastRule) -> Result<(DataFrame, Value, String)> {
    let mut working = df;
    let mut converted: Vec<Value> = Vec::new();

    for cast in &rule.casts {
        if working.column(&cast.column).is_err() {
            return Err(rules_error(
                format!("type_cast: column '{}' not found", cast.column),
                json!({"column": cast.column}),
            ));
        }
        let series = working
            .column(&cast.column)?
            .as_materialized_series()
            .clone();

        let result = cast_series(&series, cast).map_err(|e| {
            rules_error(
                format!("type_cast: failed to cast '{}': {}", cast.column, e),
                json!({"column": cast.column, "to": cast.target}),
            )
        })?;

        let result_dtype = result.dtype().to_string();
        working.replace(&cast.column, result)?;
        converted.push(json!({
            "column": cast.column,
            "to": cast.target,
            "dtype": result_dtype,
        }));
    }

    let log = format!("Rule type_cast: converted {} columns", converted.len());
    Ok((
        working,
        json!({"converted_columns": converted}),
        log,
    ))
}

fn cast_series(series: &Series, cast: &ColumnCast) -> Result<Series> {
    match cast.target {
        TargetType::Float => coerce_numeric(series),
        TargetType::Int => {
            // parse-or-null, then Int64 only when nothing is null; a lossy
            // integer column would silently invent values otherwise
            let floats = coerce_numeric(series)?;
            if floats.null_count() == 0 && all_integral(&floats)? {
                Ok(floats.cast(&DataType::Int64)?)
            } else {
                Ok(floats)
            }
        }
        TargetType::Str => {
            let casted = series.cast(&DataType::String)?;
            let ca = casted.str()?;
            let values: Vec<Option<String>> = ca
                .into_iter()
                .map(|v| match v {
                    Some("nan") | Some("NaN") | None => None,
                    Some(s) => Some(s.to_string()),
                })
                .collect();
            Ok(Series::new(series.name().clone(), values))
        }
        TargetType::Bool => {
            let casted = series.cast(&DataType::String)?;
            let ca = casted.str()?;
            let values: Vec<Option<bool>> = ca
                .into_iter()
                .map(|v| v.and_then(parse_bool))
                .collect();
            Ok(Series::new(series.name().clone(), values))
        }
        TargetType::Datetime => cast_datetime(series, cast.format.as_deref()),
        // categoricals are carried as strings; the engine has no
        // dictionary-encoded consumers downstream
        TargetType::Category => Ok(series.cast(&DataType::String)?),
    }
}

/// Parse-or-null numeric coercion to Float64.
fn coerce_numeric(series: &Series) -> Result<Series> {
    if is_numeric_dtype(series.dtype()) {
        return Ok(series.cast(&DataType::Float64)?);
    }
    let casted = series.cast(&DataType::String)?;
    let ca = casted.str()?;
    let values: Vec<Option<f64>> = ca
        .into_iter()
        .map(|v| v.and_then(|s| s.trim().parse::<f64>().ok()))
        .collect();
    Ok(Series::new(series.name().clone(), values))
}

fn all_integral(series: &Series) -> Result<bool> {
    let ca = series.f64()?;
    Ok(ca.into_iter().flatten().all(|v| v.fract() == 0.0))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "t" => Some(true),
        "false" | "0" | "no" | "n" | "f" => Some(false),
        _ => None,
    }
}

/// Parse-or-null datetime coercion to Datetime(ms).
fn cast_datetime(series: &Series, format: Option<&str>) -> Result<Series> {
    let casted = series.cast(&DataType::String)?;
    let ca = casted.str()?;
    let timestamps: Vec<Option<i64>> = ca
        .into_iter()
        .map(|v| v.and_then(|s| parse_datetime_ms(s, format)))
        .collect();
    let int_series = Series::new(series.name().clone(), timestamps);
    Ok(int_series.cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?)
}

fn parse_datetime_ms(s: &str, format: Option<&str>) -> Option<i64> {
    use chrono::{NaiveDate, NaiveDateTime};

    let trimmed = s.trim();
    if let Some(fmt) = format {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(d.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis());
        }
        return None;
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(d.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis());
        }
    }
    None
}
