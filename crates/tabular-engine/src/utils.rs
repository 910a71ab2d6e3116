//! Shared utilities for the pipeline engine.
//!
//! Dtype classification, numeric parsing, JSON sanitization, quantile math,
//! profile computation, and cache-key hashing used across the pipeline
//! modules.

use std::collections::HashMap;

use polars::prelude::*;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::types::Profile;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Check if a DataType is a datetime type.
#[inline]
pub fn is_datetime_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Datetime(_, _) | DataType::Date | DataType::Time
    )
}

/// Dtype label used in load profiles and quality reports.
pub fn dtype_label(dtype: &DataType) -> &'static str {
    if is_numeric_dtype(dtype) {
        "numeric"
    } else if is_datetime_dtype(dtype) {
        "datetime"
    } else if matches!(dtype, DataType::Boolean) {
        "boolean"
    } else if matches!(dtype, DataType::String | DataType::Categorical(_, _)) {
        "string"
    } else {
        "other"
    }
}

// =============================================================================
// String Parsing Utilities
// =============================================================================

/// Try to parse a string as an f64 after trimming.
pub fn parse_numeric_string(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Float comparison with relative tolerance, used by the replay
/// optimistic lock.
pub fn floats_close(a: f64, b: f64) -> bool {
    if a == b {
        return true;
    }
    if a.is_nan() && b.is_nan() {
        return true;
    }
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

// =============================================================================
// Series Statistics Utilities
// =============================================================================

/// Most frequent non-null value of a Series, rendered as a string.
/// Ties break toward the first-seen value.
pub fn series_mode(series: &Series) -> Option<String> {
    let non_null = series.drop_nulls();
    if non_null.is_empty() {
        return None;
    }

    let str_series = non_null.cast(&DataType::String).ok()?;
    let str_chunked = str_series.str().ok()?;

    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for val in str_chunked.into_iter().flatten() {
        let entry = counts.entry(val.to_string()).or_insert(0);
        if *entry == 0 {
            order.push(val.to_string());
        }
        *entry += 1;
    }

    let mut best: Option<(String, usize)> = None;
    for value in order {
        let count = counts[&value];
        if best.as_ref().map(|(_, c)| count > *c).unwrap_or(true) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value)
}

/// Non-null values of a numeric Series as f64, in row order.
pub fn numeric_values(series: &Series) -> PolarsResult<Vec<f64>> {
    let casted = series.cast(&DataType::Float64)?;
    let ca = casted.f64()?;
    Ok(ca.into_iter().flatten().filter(|v| v.is_finite()).collect())
}

/// Quantile of a pre-sorted slice using linear interpolation.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = pos - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

/// Sample standard deviation (ddof = 1); 0.0 when fewer than two values.
pub fn sample_stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

// =============================================================================
// Profiles
// =============================================================================

/// Compute a before/after profile of a frame: shape plus missing and
/// duplicate rates.
pub fn compute_profile(df: &DataFrame) -> PolarsResult<Profile> {
    let rows = df.height();
    let cols = df.width();
    let total_cells = rows * cols;

    let missing_cells = total_missing_cells(df);
    let missing_rate = if total_cells == 0 {
        0.0
    } else {
        missing_cells as f64 / total_cells as f64
    };

    let duplicate_rate = if rows == 0 {
        0.0
    } else {
        let unique = df.unique_stable(None, UniqueKeepStrategy::First, None)?;
        (rows - unique.height()) as f64 / rows as f64
    };

    Ok(Profile {
        rows,
        cols,
        missing_rate,
        duplicate_rate,
    })
}

/// Total null cells across all columns.
pub fn total_missing_cells(df: &DataFrame) -> usize {
    df.get_columns()
        .iter()
        .map(|c| c.as_materialized_series().null_count())
        .sum()
}

// =============================================================================
// JSON Sanitization
// =============================================================================

/// Convert a polars cell value to JSON. Non-finite floats become null;
/// standard JSON has no NaN/Infinity representation.
pub fn any_value_to_json(av: &AnyValue) -> Value {
    match av {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(*b),
        AnyValue::String(s) => Value::String((*s).to_string()),
        AnyValue::StringOwned(s) => Value::String(s.to_string()),
        AnyValue::Int8(v) => json!(*v),
        AnyValue::Int16(v) => json!(*v),
        AnyValue::Int32(v) => json!(*v),
        AnyValue::Int64(v) => json!(*v),
        AnyValue::UInt8(v) => json!(*v),
        AnyValue::UInt16(v) => json!(*v),
        AnyValue::UInt32(v) => json!(*v),
        AnyValue::UInt64(v) => json!(*v),
        AnyValue::Float32(v) => finite_json(*v as f64),
        AnyValue::Float64(v) => finite_json(*v),
        other => Value::String(format!("{}", other)),
    }
}

/// f64 to JSON number, or null when non-finite.
pub fn finite_json(v: f64) -> Value {
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

/// Recursively replace any non-finite number in a JSON tree with null.
/// Applied to every payload before it reaches the cache or an artifact.
pub fn sanitize_json(value: &mut Value) {
    match value {
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    *value = Value::Null;
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(sanitize_json),
        Value::Object(map) => map.values_mut().for_each(sanitize_json),
        _ => {}
    }
}

/// First `max_rows` rows of a frame as JSON objects, sanitized.
pub fn preview_rows(df: &DataFrame, max_rows: usize) -> Vec<Value> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    let take = max_rows.min(df.height());
    let mut rows = Vec::with_capacity(take);
    for i in 0..take {
        let mut obj = serde_json::Map::new();
        for (name, column) in names.iter().zip(df.get_columns()) {
            let av = column
                .as_materialized_series()
                .get(i)
                .unwrap_or(AnyValue::Null);
            obj.insert(name.clone(), any_value_to_json(&av));
        }
        rows.push(Value::Object(obj));
    }
    rows
}

// =============================================================================
// Identifiers and Cache Keys
// =============================================================================

/// Strip a caller-controlled identifier down to `[A-Za-z0-9_-]` so it can
/// never traverse out of the export directory.
pub fn sanitize_file_id(file_id: &str) -> String {
    file_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Cache key: `{prefix}:{identifier}:{sha256(params)[..16]}`.
///
/// Params are serialized with sorted object keys, so the key is stable
/// under map ordering.
pub fn cache_key(prefix: &str, identifier: &str, params: &Value) -> String {
    let canonical = serde_json::to_string(params).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{}:{}:{}", prefix, identifier, &hex::encode(digest)[..16])
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_numeric_dtype() {
        assert!(is_numeric_dtype(&DataType::Int64));
        assert!(is_numeric_dtype(&DataType::Float32));
        assert!(!is_numeric_dtype(&DataType::String));
        assert!(!is_numeric_dtype(&DataType::Boolean));
    }

    #[test]
    fn test_dtype_label() {
        assert_eq!(dtype_label(&DataType::Float64), "numeric");
        assert_eq!(dtype_label(&DataType::String), "string");
        assert_eq!(dtype_label(&DataType::Boolean), "boolean");
        assert_eq!(dtype_label(&DataType::Date), "datetime");
    }

    #[test]
    fn test_parse_numeric_string() {
        assert_eq!(parse_numeric_string(" 42 "), Some(42.0));
        assert_eq!(parse_numeric_string("-3.5"), Some(-3.5));
        assert_eq!(parse_numeric_string(""), None);
        assert_eq!(parse_numeric_string("hello"), None);
    }

    #[test]
    fn test_floats_close() {
        assert!(floats_close(1.0, 1.0));
        assert!(floats_close(f64::NAN, f64::NAN));
        assert!(floats_close(1.0, 1.0 + 1e-12));
        assert!(!floats_close(1.0, 1.1));
    }

    #[test]
    fn test_series_mode_tie_breaks_first_seen() {
        let series = Series::new("test".into(), &["b", "a", "b", "a", "c"]);
        assert_eq!(series_mode(&series), Some("b".to_string()));
    }

    #[test]
    fn test_quantile_sorted() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile_sorted(&values, 0.0), 1.0);
        assert_eq!(quantile_sorted(&values, 1.0), 4.0);
        assert_eq!(quantile_sorted(&values, 0.5), 2.5);
    }

    #[test]
    fn test_sample_stddev() {
        assert_eq!(sample_stddev(&[5.0]), 0.0);
        let s = sample_stddev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((s - 2.138).abs() < 0.01);
    }

    #[test]
    fn test_compute_profile() {
        let df = df! {
            "a" => [Some(1), Some(1), None, Some(1)],
            "b" => ["x", "x", "y", "x"],
        }
        .unwrap();
        let profile = compute_profile(&df).unwrap();
        assert_eq!(profile.rows, 4);
        assert_eq!(profile.cols, 2);
        assert!((profile.missing_rate - 1.0 / 8.0).abs() < 1e-12);
        // rows 0 and 3 are identical, one duplicate
        assert!((profile.duplicate_rate - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_sanitize_json_nulls_non_finite() {
        let mut value = json!({
            "ok": 1.5,
            "nested": {"values": [1.0]},
        });
        // inject a NaN through the Number API
        if let Value::Object(map) = &mut value {
            map.insert(
                "bad".into(),
                Value::Number(serde_json::Number::from_f64(1.0).unwrap()),
            );
        }
        sanitize_json(&mut value);
        assert_eq!(value["ok"], 1.5);
        assert_eq!(finite_json(f64::NAN), Value::Null);
        assert_eq!(finite_json(f64::INFINITY), Value::Null);
    }

    #[test]
    fn test_preview_rows_shapes() {
        let df = df! {
            "a" => [1i64, 2, 3],
            "b" => ["x", "y", "z"],
        }
        .unwrap();
        let rows = preview_rows(&df, 2);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["a"], 1);
        assert_eq!(rows[1]["b"], "y");
    }

    #[test]
    fn test_sanitize_file_id() {
        assert_eq!(sanitize_file_id("abc-123_X"), "abc-123_X");
        assert_eq!(sanitize_file_id("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_file_id("a b/c"), "abc");
    }

    #[test]
    fn test_cache_key_stable_under_ordering() {
        let a = json!({"x": 1, "y": 2});
        let b = json!({"y": 2, "x": 1});
        assert_eq!(cache_key("q", "f1", &a), cache_key("q", "f1", &b));
        assert!(cache_key("q", "f1", &a).starts_with("q:f1:"));
    }
}
