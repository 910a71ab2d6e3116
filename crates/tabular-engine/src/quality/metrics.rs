//! Missing-value, duplicate-row, and outlier statistics.
//!
//! All three run over the full frame, independent of any selection. Rates
//! are rounded to 4 decimal places for the wire; row numbers are 1-based
//! because they address what the caller sees in a table view.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::utils::{is_numeric_dtype, quantile_sorted};

/// Missing-value statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingStats {
    pub total_missing_cells: usize,
    pub missing_rate: f64,
    /// Only columns with at least one missing cell.
    pub by_column: BTreeMap<String, usize>,
    pub columns_with_missing: usize,
}

/// Duplicate-row statistics via full-row equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateStats {
    /// Rows that repeat an earlier row.
    pub duplicate_rows: usize,
    pub duplicate_rate: f64,
    /// Distinct row values that occur more than once.
    pub unique_duplicate_groups: usize,
    /// 1-based row numbers of the repeats, capped.
    pub duplicate_row_numbers: Vec<usize>,
}

/// One flagged outlier cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyDetail {
    /// 1-based row number.
    pub row: usize,
    pub column: String,
    pub value: f64,
    pub kind: String,
    pub reason: String,
}

/// Outlier statistics over numeric columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyStats {
    pub total_anomalies: usize,
    pub anomaly_rate: f64,
    /// Per-column outlier counts, only columns with at least one.
    pub by_column: BTreeMap<String, usize>,
    /// Numeric columns exempted by the enumerated-value heuristic.
    pub skipped_columns: Vec<String>,
    pub details: Vec<AnomalyDetail>,
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// Per-column and overall missing-cell counts.
pub fn missing_stats(df: &DataFrame) -> MissingStats {
    let mut by_column = BTreeMap::new();
    let mut total = 0usize;
    for column in df.get_columns() {
        let nulls = column.as_materialized_series().null_count();
        total += nulls;
        if nulls > 0 {
            by_column.insert(column.name().to_string(), nulls);
        }
    }
    let cells = df.height() * df.width();
    MissingStats {
        total_missing_cells: total,
        missing_rate: if cells == 0 {
            0.0
        } else {
            round4(total as f64 / cells as f64)
        },
        columns_with_missing: by_column.len(),
        by_column,
    }
}

/// Duplicate rows under full-row equality, keeping the first occurrence
/// out of the count (a row's first appearance is not a duplicate).
pub fn duplicate_stats(df: &DataFrame, config: &EngineConfig) -> Result<DuplicateStats> {
    let rows = df.height();
    let series: Vec<Series> = df
        .get_columns()
        .iter()
        .map(|c| c.as_materialized_series().clone())
        .collect();

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut group_sizes: HashMap<String, usize> = HashMap::new();
    let mut duplicate_row_numbers = Vec::new();
    let mut duplicate_rows = 0usize;

    for i in 0..rows {
        let mut key = String::new();
        for s in &series {
            let av = s.get(i)?;
            // Debug form keeps null distinct from the string "null"
            write!(key, "{:?}\u{1f}", av).ok();
        }
        let count = group_sizes.entry(key.clone()).or_insert(0);
        *count += 1;
        if seen.insert(key, i).is_some() {
            duplicate_rows += 1;
            if duplicate_row_numbers.len() < config.max_duplicate_row_numbers {
                duplicate_row_numbers.push(i + 1);
            }
        }
    }

    Ok(DuplicateStats {
        duplicate_rows,
        duplicate_rate: if rows == 0 {
            0.0
        } else {
            round4(duplicate_rows as f64 / rows as f64)
        },
        unique_duplicate_groups: group_sizes.values().filter(|&&c| c > 1).count(),
        duplicate_row_numbers,
    })
}

/// IQR outlier detection per numeric column.
///
/// Columns whose distinct-value count falls below the configured
/// threshold are treated as enumerated (ratings, coded fields) and
/// skipped. Reported details are capped per column, ranked by absolute
/// deviation from the column median, then re-sorted by row number.
pub fn anomaly_stats(df: &DataFrame, config: &EngineConfig) -> Result<AnomalyStats> {
    let mut by_column = BTreeMap::new();
    let mut skipped_columns = Vec::new();
    let mut details = Vec::new();
    let mut total = 0usize;

    for column in df.get_columns() {
        let series = column.as_materialized_series();
        if !is_numeric_dtype(series.dtype()) {
            continue;
        }
        let name = series.name().to_string();

        let casted = series.cast(&DataType::Float64)?;
        let ca = casted.f64()?;
        let mut observed: Vec<(usize, f64)> = Vec::new();
        for (i, v) in ca.into_iter().enumerate() {
            if let Some(v) = v {
                if v.is_finite() {
                    observed.push((i, v));
                }
            }
        }
        if observed.len() < 4 {
            continue;
        }

        let distinct: HashSet<u64> = observed.iter().map(|(_, v)| v.to_bits()).collect();
        if distinct.len() < config.categorical_distinct_threshold {
            skipped_columns.push(name);
            continue;
        }

        let mut sorted: Vec<f64> = observed.iter().map(|(_, v)| *v).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let q1 = quantile_sorted(&sorted, 0.25);
        let q3 = quantile_sorted(&sorted, 0.75);
        let median = quantile_sorted(&sorted, 0.5);
        let iqr = q3 - q1;
        let lower = q1 - config.iqr_multiplier * iqr;
        let upper = q3 + config.iqr_multiplier * iqr;

        let mut outliers: Vec<(usize, f64)> = observed
            .into_iter()
            .filter(|(_, v)| *v < lower || *v > upper)
            .collect();
        if outliers.is_empty() {
            continue;
        }
        total += outliers.len();
        by_column.insert(name.clone(), outliers.len());

        outliers.sort_by(|a, b| (b.1 - median).abs().total_cmp(&(a.1 - median).abs()));
        outliers.truncate(config.max_outlier_details_per_column);
        outliers.sort_by_key(|(i, _)| *i);
        for (i, v) in outliers {
            details.push(AnomalyDetail {
                row: i + 1,
                column: name.clone(),
                value: v,
                kind: "outlier_iqr".to_string(),
                reason: format!("outside IQR bounds [{:.4}, {:.4}]", lower, upper),
            });
        }
    }

    let cells = df.height() * df.width();
    Ok(AnomalyStats {
        total_anomalies: total,
        anomaly_rate: if cells == 0 {
            0.0
        } else {
            round4(total as f64 / cells as f64)
        },
        by_column,
        skipped_columns,
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_stats_counts_and_rate() {
        let df = df! {
            "a" => [Some(1i64), None, Some(3), None],
            "b" => [Some("x"), Some("y"), Some("z"), Some("w")],
        }
        .unwrap();
        let stats = missing_stats(&df);
        assert_eq!(stats.total_missing_cells, 2);
        assert_eq!(stats.missing_rate, 0.25);
        assert_eq!(stats.columns_with_missing, 1);
        assert_eq!(stats.by_column.get("a"), Some(&2));
        assert!(!stats.by_column.contains_key("b"));
    }

    #[test]
    fn test_duplicate_stats_first_occurrence_exempt() {
        let df = df! {
            "a" => [1i64, 2, 1, 1, 3],
            "b" => ["x", "y", "x", "x", "z"],
        }
        .unwrap();
        let stats = duplicate_stats(&df, &EngineConfig::default()).unwrap();
        // rows 3 and 4 repeat row 1
        assert_eq!(stats.duplicate_rows, 2);
        assert_eq!(stats.duplicate_rate, 0.4);
        assert_eq!(stats.unique_duplicate_groups, 1);
        assert_eq!(stats.duplicate_row_numbers, vec![3, 4]);
    }

    #[test]
    fn test_duplicate_row_numbers_capped() {
        let df = df! { "a" => vec![7i64; 10] }.unwrap();
        let config = EngineConfig::builder()
            .max_duplicate_row_numbers(3)
            .build()
            .unwrap();
        let stats = duplicate_stats(&df, &config).unwrap();
        assert_eq!(stats.duplicate_rows, 9);
        assert_eq!(stats.duplicate_row_numbers, vec![2, 3, 4]);
    }

    #[test]
    fn test_null_is_not_the_string_null() {
        let df = df! {
            "a" => [None::<&str>, Some("null")],
        }
        .unwrap();
        let stats = duplicate_stats(&df, &EngineConfig::default()).unwrap();
        assert_eq!(stats.duplicate_rows, 0);
    }

    #[test]
    fn test_anomaly_detects_iqr_outlier() {
        let mut values: Vec<f64> = (1..=20).map(|v| v as f64).collect();
        values.push(1000.0);
        let df = df! { "v" => values }.unwrap();
        let stats = anomaly_stats(&df, &EngineConfig::default()).unwrap();
        assert_eq!(stats.total_anomalies, 1);
        assert_eq!(stats.details.len(), 1);
        assert_eq!(stats.details[0].row, 21);
        assert_eq!(stats.details[0].column, "v");
        assert_eq!(stats.details[0].value, 1000.0);
        assert_eq!(stats.details[0].kind, "outlier_iqr");
    }

    #[test]
    fn test_enumerated_column_skipped() {
        // 3 distinct values over 30 rows, below the default threshold of 10
        let values: Vec<i64> = (0..30).map(|v| v % 3).collect();
        let df = df! { "rating" => values }.unwrap();
        let stats = anomaly_stats(&df, &EngineConfig::default()).unwrap();
        assert_eq!(stats.total_anomalies, 0);
        assert_eq!(stats.skipped_columns, vec!["rating".to_string()]);
    }

    #[test]
    fn test_detail_cap_keeps_most_extreme() {
        let mut values: Vec<f64> = (1..=50).map(|v| v as f64).collect();
        values.extend([900.0, 500.0, 700.0]);
        let df = df! { "v" => values }.unwrap();
        let config = EngineConfig::builder()
            .max_outlier_details_per_column(2)
            .build()
            .unwrap();
        let stats = anomaly_stats(&df, &config).unwrap();
        assert_eq!(stats.total_anomalies, 3);
        assert_eq!(stats.by_column.get("v"), Some(&3));
        // 900 and 700 are farther from the median than 500; rows re-sorted
        let reported: Vec<f64> = stats.details.iter().map(|d| d.value).collect();
        assert_eq!(reported, vec![900.0, 700.0]);
        assert!(stats.details[0].row < stats.details[1].row);
    }

    #[test]
    fn test_non_numeric_columns_ignored() {
        let df = df! {
            "name" => ["a", "b", "c", "d", "e"],
        }
        .unwrap();
        let stats = anomaly_stats(&df, &EngineConfig::default()).unwrap();
        assert_eq!(stats.total_anomalies, 0);
        assert!(stats.skipped_columns.is_empty());
    }
}
