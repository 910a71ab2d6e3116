//! User edit replay.
//!
//! Applies an ordered list of recorded edits (cell updates, row deletes)
//! to a dataset snapshot. Replay is fail-fast and all-or-nothing: the
//! first failing action aborts the run and the caller never sees a
//! partially edited frame.
//!
//! Cell updates carry an optional `before` value acting as an optimistic
//! lock: the write only proceeds when the current cell still matches what
//! the caller last observed. Comparison is NaN-aware and float-tolerant.

use polars::prelude::*;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::pipeline::stage::PipelineStage;
use crate::types::{Profile, ReplayStats, UserAction};
use crate::utils::{any_value_to_json, compute_profile, floats_close, is_numeric_dtype};

fn replay_error(message: impl Into<String>, detail: Value) -> PipelineError {
    PipelineError::stage_with_detail(PipelineStage::Replay, message, Some(detail))
}

/// Replay all actions against a private copy of the frame.
///
/// Returns the mutated frame, replay accounting, and the profile of the
/// pristine frame captured before any action ran.
pub fn replay_actions(
    df: &DataFrame,
    actions: &[UserAction],
) -> Result<(DataFrame, ReplayStats, Profile)> {
    let before_profile = compute_profile(df)?;
    let mut working = df.clone();

    for (index, action) in actions.iter().enumerate() {
        apply_action(&mut working, action).map_err(|e| {
            // enrich with the failing position so the caller can point at it
            let detail = json!({
                "action_index": index,
                "op": action.op_name(),
                "inner_detail": e.detail(),
            });
            replay_error(
                format!("Action {} ({}) failed: {}", index, action.op_name(), e),
                detail,
            )
        })?;
    }

    let stats = ReplayStats {
        total: actions.len(),
        applied: actions.len(),
        failed: 0,
        failed_index: None,
    };
    debug!(applied = stats.applied, "user actions replayed");
    Ok((working, stats, before_profile))
}

fn apply_action(df: &mut DataFrame, action: &UserAction) -> Result<()> {
    match action {
        UserAction::UpdateCell {
            row_id,
            column,
            before,
            after,
        } => update_cell(df, row_id, column, before.as_ref(), after),
        UserAction::DeleteRow { row_id } => delete_row(df, row_id),
        UserAction::InsertRow { .. } => Err(replay_error(
            "insert_row is not supported",
            json!({"op": "insert_row"}),
        )),
    }
}

/// Resolve a visual row number to a positional index valid right now.
fn resolve_row_index(row_id: &str, height: usize) -> Result<usize> {
    let index: usize = row_id.trim().parse().map_err(|_| {
        replay_error(
            format!("Invalid row_id '{}': expected a non-negative integer", row_id),
            json!({"row_id": row_id}),
        )
    })?;
    if index >= height {
        return Err(replay_error(
            format!("Row {} is out of range for {} rows", index, height),
            json!({"row_id": row_id, "rows": height}),
        ));
    }
    Ok(index)
}

fn update_cell(
    df: &mut DataFrame,
    row_id: &str,
    column: &str,
    before: Option<&Value>,
    after: &Value,
) -> Result<()> {
    let index = resolve_row_index(row_id, df.height())?;
    let series = df
        .column(column)
        .map_err(|_| {
            replay_error(
                format!("Column '{}' not found", column),
                json!({"column": column}),
            )
        })?
        .as_materialized_series()
        .clone();

    if let Some(expected) = before {
        let current = series.get(index)?;
        if !values_equal(&current, expected) {
            return Err(replay_error(
                format!(
                    "Optimistic lock failed at row {}, column '{}': expected {}, found {}",
                    index,
                    column,
                    expected,
                    any_value_to_json(&current)
                ),
                json!({
                    "row": index,
                    "column": column,
                    "expected": expected,
                    "actual": any_value_to_json(&current),
                }),
            ));
        }
    }

    let new_series = set_cell(&series, index, after)?;
    df.replace(column, new_series)?;
    Ok(())
}

fn delete_row(df: &mut DataFrame, row_id: &str) -> Result<()> {
    let index = resolve_row_index(row_id, df.height())?;
    let head = df.slice(0, index);
    let tail = df.slice(index as i64 + 1, df.height() - index - 1);
    // subsequent positional row ids address the compacted frame
    *df = head.vstack(&tail)?;
    Ok(())
}

/// NaN-aware, float-tolerant value comparison for the optimistic lock.
fn values_equal(current: &AnyValue, expected: &Value) -> bool {
    // both missing: null cell vs null expectation, NaN counts as missing
    let current_missing = matches!(current, AnyValue::Null)
        || matches!(current, AnyValue::Float32(f) if f.is_nan())
        || matches!(current, AnyValue::Float64(f) if f.is_nan());
    if current_missing && expected.is_null() {
        return true;
    }
    if current_missing || expected.is_null() {
        return false;
    }

    if let (Some(a), Some(b)) = (any_value_as_f64(current), json_as_f64(expected)) {
        return floats_close(a, b);
    }

    let current_str = match current {
        AnyValue::String(s) => (*s).to_string(),
        AnyValue::StringOwned(s) => s.to_string(),
        other => format!("{}", other),
    };
    let expected_str = match expected {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    current_str == expected_str
}

fn any_value_as_f64(av: &AnyValue) -> Option<f64> {
    match av {
        AnyValue::Int8(v) => Some(*v as f64),
        AnyValue::Int16(v) => Some(*v as f64),
        AnyValue::Int32(v) => Some(*v as f64),
        AnyValue::Int64(v) => Some(*v as f64),
        AnyValue::UInt8(v) => Some(*v as f64),
        AnyValue::UInt16(v) => Some(*v as f64),
        AnyValue::UInt32(v) => Some(*v as f64),
        AnyValue::UInt64(v) => Some(*v as f64),
        AnyValue::Float32(v) => Some(*v as f64),
        AnyValue::Float64(v) => Some(*v),
        AnyValue::String(s) => s.trim().parse().ok(),
        AnyValue::StringOwned(s) => s.as_str().trim().parse().ok(),
        _ => None,
    }
}

fn json_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Write one cell by rebuilding the column, coercing the new value to the
/// column dtype when possible and falling back to a string column.
fn set_cell(series: &Series, index: usize, after: &Value) -> Result<Series> {
    let dtype = series.dtype().clone();

    if dtype.is_integer() {
        let as_int = match after {
            Value::Null => Some(None),
            Value::Number(n) => n.as_i64().map(Some),
            Value::String(s) => s.trim().parse::<i64>().ok().map(Some),
            _ => None,
        };
        if let Some(new_val) = as_int {
            let casted = series.cast(&DataType::Int64)?;
            let ca = casted.i64()?;
            let mut values: Vec<Option<i64>> = ca.into_iter().collect();
            values[index] = new_val;
            return Ok(Series::new(series.name().clone(), values));
        }
    }

    if is_numeric_dtype(series.dtype()) {
        let as_float = match after {
            Value::Null => Some(None),
            Value::Number(n) => n.as_f64().map(Some),
            Value::String(s) => s.trim().parse::<f64>().ok().map(Some),
            _ => None,
        };
        if let Some(new_val) = as_float {
            let casted = series.cast(&DataType::Float64)?;
            let ca = casted.f64()?;
            let mut values: Vec<Option<f64>> = ca.into_iter().collect();
            values[index] = new_val;
            return Ok(Series::new(series.name().clone(), values));
        }
    }

    if matches!(dtype, DataType::Boolean) {
        if let Value::Bool(b) = after {
            let ca = series.bool()?;
            let mut values: Vec<Option<bool>> = ca.into_iter().collect();
            values[index] = Some(*b);
            return Ok(Series::new(series.name().clone(), values));
        }
    }

    // fallback: stringly column
    let casted = series.cast(&DataType::String)?;
    let ca = casted.str()?;
    let mut values: Vec<Option<String>> = ca
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect();
    values[index] = match after {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    };
    Ok(Series::new(series.name().clone(), values))
}
