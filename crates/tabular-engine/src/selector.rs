//! Row-range and column-subset selection.
//!
//! The policy is fail, not truncate: out-of-range rows, unknown columns,
//! and empty results are validation errors rather than silently clamped.

use polars::prelude::*;
use serde_json::json;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::pipeline::stage::PipelineStage;
use crate::types::{Selection, SelectionProfile};

fn validate_error(message: impl Into<String>, detail: serde_json::Value) -> PipelineError {
    PipelineError::stage_with_detail(PipelineStage::Validate, message, Some(detail))
}

/// Apply an optional selection: row range first (half-open `[start, end)`),
/// then column projection in the caller's requested order.
pub fn apply_selection(
    df: &DataFrame,
    selection: Option<&Selection>,
) -> Result<(DataFrame, SelectionProfile)> {
    let rows_before = df.height();
    let cols_before = df.width();

    if rows_before == 0 {
        return Err(validate_error(
            "Dataset is empty before selection",
            json!({"rows": 0}),
        ));
    }

    let selection = selection.cloned().unwrap_or_default();

    let mut selected = match selection.rows {
        Some(range) => {
            if range.end <= range.start {
                return Err(validate_error(
                    format!(
                        "Invalid row range [{}, {}): end must be greater than start",
                        range.start, range.end
                    ),
                    json!({"start": range.start, "end": range.end}),
                ));
            }
            if range.start >= rows_before || range.end > rows_before {
                return Err(validate_error(
                    format!(
                        "Row range [{}, {}) is out of bounds for {} rows",
                        range.start, range.end, rows_before
                    ),
                    json!({"start": range.start, "end": range.end, "rows": rows_before}),
                ));
            }
            df.slice(range.start as i64, range.end - range.start)
        }
        None => df.clone(),
    };

    let selected_columns = match &selection.columns {
        None => selected
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>(),
        Some(cols) if cols.is_empty() => {
            return Err(validate_error(
                "columns cannot be an empty array; use null to select all columns",
                json!({"columns": []}),
            ));
        }
        Some(cols) => {
            let available = selected.get_column_names();
            let missing: Vec<&String> = cols
                .iter()
                .filter(|c| !available.iter().any(|a| a.as_str() == c.as_str()))
                .collect();
            if !missing.is_empty() {
                return Err(validate_error(
                    format!("Columns not found in dataset: {:?}", missing),
                    json!({"missing_columns": missing}),
                ));
            }
            // projection preserves the caller's order
            selected = selected.select(cols.iter().map(|c| PlSmallStr::from(c.as_str())))?;
            cols.clone()
        }
    };

    if selected.height() == 0 {
        return Err(validate_error(
            "Selection produced an empty dataset",
            json!({"rows_after": 0}),
        ));
    }

    let profile = SelectionProfile {
        rows_before,
        rows_after: selected.height(),
        cols_before,
        cols_after: selected.width(),
        row_range: selection.rows,
        selected_columns,
    };
    debug!(
        rows_before,
        rows_after = profile.rows_after,
        cols_after = profile.cols_after,
        "selection applied"
    );
    Ok((selected, profile))
}
