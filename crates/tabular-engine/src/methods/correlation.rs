//! Correlation analysis.
//!
//! Computes a pairwise correlation matrix (pearson or spearman) over the
//! validated numeric columns, using complete observations per pair.
//! Constant columns yield NaN correlations; they are excluded from the
//! strong-pair ranking and reported as warnings.

use polars::prelude::*;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::Result;
use crate::methods::MethodOutput;
use crate::types::Chart;
use crate::utils::finite_json;
use crate::validator::CorrelationMethod;

/// Number of strongest pairs reported.
const TOP_PAIRS: usize = 10;

pub fn run(df: &DataFrame, columns: &[String], method: CorrelationMethod) -> Result<MethodOutput> {
    let mut warnings = Vec::new();
    let mut logs = Vec::new();

    // column values with nulls kept in place for pairwise alignment
    let mut series_values: Vec<Vec<Option<f64>>> = Vec::with_capacity(columns.len());
    for name in columns {
        let casted = df
            .column(name)?
            .as_materialized_series()
            .cast(&DataType::Float64)?;
        let values: Vec<Option<f64>> = casted
            .f64()?
            .into_iter()
            .map(|v| v.filter(|x| x.is_finite()))
            .collect();

        let distinct: std::collections::HashSet<u64> = values
            .iter()
            .flatten()
            .map(|v| v.to_bits())
            .collect();
        if !distinct.is_empty() && distinct.len() <= 1 {
            warnings.push(format!(
                "correlation: column '{}' is constant; its correlations are undefined",
                name
            ));
        }
        series_values.push(values);
    }

    let n = columns.len();
    let mut matrix = vec![vec![f64::NAN; n]; n];
    for i in 0..n {
        matrix[i][i] = 1.0;
        for j in (i + 1)..n {
            let corr = pairwise_correlation(&series_values[i], &series_values[j], method);
            matrix[i][j] = corr;
            matrix[j][i] = corr;
        }
    }

    // strongest pairs by |corr|, NaN pairs excluded
    let mut pairs: Vec<(usize, usize, f64)> = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            if matrix[i][j].is_finite() {
                pairs.push((i, j, matrix[i][j]));
            }
        }
    }
    pairs.sort_by(|a, b| {
        b.2.abs()
            .partial_cmp(&a.2.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let strong_pairs: Vec<Value> = pairs
        .iter()
        .take(TOP_PAIRS)
        .map(|(i, j, corr)| {
            json!({
                "a": columns[*i],
                "b": columns[*j],
                "corr": finite_json(*corr),
            })
        })
        .collect();

    let matrix_json: Vec<Vec<Value>> = matrix
        .iter()
        .map(|row| row.iter().map(|v| finite_json(*v)).collect())
        .collect();
    let charts = vec![Chart::new(
        "heatmap",
        json!({"labels": columns, "matrix": matrix_json}),
        json!({"method": method}),
    )];

    logs.push(format!(
        "correlation: computed {:?} matrix over {} columns, {} valid pairs",
        method,
        n,
        pairs.len()
    ));
    debug!(columns = n, pairs = pairs.len(), "correlation analysis done");

    Ok(MethodOutput {
        key_metrics: json!({
            "method": method,
            "columns": columns,
            "strong_pairs": strong_pairs,
        }),
        charts,
        warnings,
        logs,
    })
}

/// Correlation over rows where both columns have a value. NaN when fewer
/// than two complete observations or a side is constant.
fn pairwise_correlation(
    a: &[Option<f64>],
    b: &[Option<f64>],
    method: CorrelationMethod,
) -> f64 {
    let (xs, ys): (Vec<f64>, Vec<f64>) = a
        .iter()
        .zip(b.iter())
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .unzip();
    if xs.len() < 2 {
        return f64::NAN;
    }
    match method {
        CorrelationMethod::Pearson => pearson(&xs, &ys),
        CorrelationMethod::Spearman => pearson(&ranks(&xs), &ranks(&ys)),
    }
}

fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return f64::NAN;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

/// Fractional ranks with ties averaged, matching the usual spearman
/// definition.
fn ranks(values: &[f64]) -> Vec<f64> {
    let mut indexed: Vec<(usize, f64)> = values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut result = vec![0.0; values.len()];
    let mut i = 0;
    while i < indexed.len() {
        let mut j = i;
        while j + 1 < indexed.len() && indexed[j + 1].1 == indexed[i].1 {
            j += 1;
        }
        // average rank for the tie run [i, j]
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for item in &indexed[i..=j] {
            result[item.0] = avg_rank;
        }
        i = j + 1;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_perfect_positive_correlation() {
        let df = df! {
            "a" => [1.0f64, 2.0, 3.0, 4.0],
            "b" => [2.0f64, 4.0, 6.0, 8.0],
        }
        .unwrap();
        let cols = vec!["a".to_string(), "b".to_string()];
        let out = run(&df, &cols, CorrelationMethod::Pearson).unwrap();
        let pairs = out.key_metrics["strong_pairs"].as_array().unwrap();
        assert_eq!(pairs.len(), 1);
        assert!((pairs[0]["corr"].as_f64().unwrap() - 1.0).abs() < 1e-12);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_constant_column_warns_and_pair_excluded() {
        let df = df! {
            "a" => [1.0f64, 2.0, 3.0],
            "b" => [5.0f64, 5.0, 5.0],
            "c" => [3.0f64, 2.0, 1.0],
        }
        .unwrap();
        let cols = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let out = run(&df, &cols, CorrelationMethod::Pearson).unwrap();
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("'b'"));
        // only the (a, c) pair is finite
        let pairs = out.key_metrics["strong_pairs"].as_array().unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0]["a"], "a");
        assert_eq!(pairs[0]["b"], "c");
    }

    #[test]
    fn test_spearman_monotonic_nonlinear() {
        // monotonic but nonlinear: spearman should be exactly 1
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = [1.0, 4.0, 9.0, 16.0, 25.0];
        let a: Vec<Option<f64>> = xs.iter().map(|v| Some(*v)).collect();
        let b: Vec<Option<f64>> = ys.iter().map(|v| Some(*v)).collect();
        let corr = pairwise_correlation(&a, &b, CorrelationMethod::Spearman);
        assert!((corr - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ranks_average_ties() {
        let r = ranks(&[10.0, 20.0, 20.0, 30.0]);
        assert_eq!(r, vec![1.0, 2.5, 2.5, 4.0]);
    }

    #[test]
    fn test_pairwise_alignment_skips_nulls() {
        let a = vec![Some(1.0), None, Some(3.0), Some(4.0)];
        let b = vec![Some(1.0), Some(2.0), None, Some(4.0)];
        // only rows 0 and 3 are complete
        let corr = pairwise_correlation(&a, &b, CorrelationMethod::Pearson);
        assert!((corr - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_heatmap_chart_shape() {
        let df = df! {
            "a" => [1.0f64, 2.0],
            "b" => [2.0f64, 1.0],
        }
        .unwrap();
        let cols = vec!["a".to_string(), "b".to_string()];
        let out = run(&df, &cols, CorrelationMethod::Pearson).unwrap();
        assert_eq!(out.charts.len(), 1);
        assert_eq!(out.charts[0].chart_type, "heatmap");
        let matrix = out.charts[0].data["matrix"].as_array().unwrap();
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix[0].as_array().unwrap().len(), 2);
    }
}
