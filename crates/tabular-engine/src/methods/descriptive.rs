//! Descriptive statistics.
//!
//! Numeric columns get count, mean, sample stddev, min/max, quartiles,
//! and a histogram. Non-numeric columns get cardinality and top-K value
//! counts. Columns with zero non-null values are skipped with a warning.

use std::collections::HashMap;

use polars::prelude::*;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::Result;
use crate::methods::MethodOutput;
use crate::types::Chart;
use crate::utils::{finite_json, is_numeric_dtype, numeric_values, quantile_sorted, sample_stddev};

pub fn run(df: &DataFrame, columns: &[String], bins: usize, top_k: usize) -> Result<MethodOutput> {
    let mut numeric_metrics = Map::new();
    let mut categorical_metrics = Map::new();
    let mut charts = Vec::new();
    let mut warnings = Vec::new();
    let mut logs = Vec::new();

    for name in columns {
        let series = df.column(name)?.as_materialized_series().clone();
        let missing = series.null_count();

        if is_numeric_dtype(series.dtype()) {
            let mut values = numeric_values(&series)?;
            if values.is_empty() {
                warnings.push(format!(
                    "descriptive: column '{}' has no non-null values, skipped",
                    name
                ));
                continue;
            }
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

            let count = values.len();
            let mean = values.iter().sum::<f64>() / count as f64;
            let stats = json!({
                "count": count,
                "mean": finite_json(mean),
                "std": finite_json(sample_stddev(&values)),
                "min": finite_json(values[0]),
                "max": finite_json(values[count - 1]),
                "q25": finite_json(quantile_sorted(&values, 0.25)),
                "median": finite_json(quantile_sorted(&values, 0.5)),
                "q75": finite_json(quantile_sorted(&values, 0.75)),
                "missing": missing,
            });
            numeric_metrics.insert(name.clone(), stats);

            let (edges, counts) = histogram(&values, bins);
            charts.push(Chart::new(
                "histogram",
                json!({"bins": edges, "counts": counts}),
                json!({"column": name, "bins_count": bins, "missing_count": missing}),
            ));
        } else {
            let non_null = series.drop_nulls();
            if non_null.is_empty() {
                warnings.push(format!(
                    "descriptive: column '{}' has no non-null values, skipped",
                    name
                ));
                continue;
            }
            let top = top_values(&non_null, top_k)?;
            let labels: Vec<Value> = top.iter().map(|(v, _)| json!(v)).collect();
            let counts: Vec<Value> = top.iter().map(|(_, c)| json!(c)).collect();
            categorical_metrics.insert(
                name.clone(),
                json!({
                    "count": non_null.len(),
                    "unique": non_null.n_unique()?,
                    "top_values": top,
                    "missing": missing,
                }),
            );
            charts.push(Chart::new(
                "bar",
                json!({"labels": labels, "counts": counts}),
                json!({"column": name, "top_k": top_k, "missing_count": missing}),
            ));
        }
    }

    logs.push(format!(
        "descriptive: profiled {} numeric and {} categorical columns",
        numeric_metrics.len(),
        categorical_metrics.len()
    ));
    debug!(
        numeric = numeric_metrics.len(),
        categorical = categorical_metrics.len(),
        "descriptive analysis done"
    );

    Ok(MethodOutput {
        key_metrics: json!({
            "numeric": numeric_metrics,
            "categorical": categorical_metrics,
            "defaults": {"bins": bins, "top_k": top_k},
        }),
        charts,
        warnings,
        logs,
    })
}

/// Equal-width histogram over sorted values. Returns `bins + 1` edges and
/// `bins` counts; the last bin is right-inclusive.
fn histogram(sorted: &[f64], bins: usize) -> (Vec<f64>, Vec<usize>) {
    let mut min = sorted[0];
    let mut max = sorted[sorted.len() - 1];
    if min == max {
        // degenerate range, widen around the constant value
        min -= 0.5;
        max += 0.5;
    }
    let width = (max - min) / bins as f64;
    let edges: Vec<f64> = (0..=bins).map(|i| min + width * i as f64).collect();

    let mut counts = vec![0usize; bins];
    for &v in sorted {
        let mut idx = ((v - min) / width) as usize;
        if idx >= bins {
            idx = bins - 1;
        }
        counts[idx] += 1;
    }
    (edges, counts)
}

/// Top-K value counts, count descending, ties broken by first appearance.
fn top_values(series: &Series, top_k: usize) -> PolarsResult<Vec<(String, usize)>> {
    let casted = series.cast(&DataType::String)?;
    let ca = casted.str()?;

    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for value in ca.into_iter().flatten() {
        let entry = counts.entry(value.to_string()).or_insert(0);
        if *entry == 0 {
            order.push(value.to_string());
        }
        *entry += 1;
    }

    let mut ranked: Vec<(usize, String)> = order
        .into_iter()
        .enumerate()
        .map(|(seen, v)| (seen, v))
        .collect();
    ranked.sort_by(|(seen_a, a), (seen_b, b)| {
        counts[b].cmp(&counts[a]).then(seen_a.cmp(seen_b)).then(a.cmp(b))
    });

    Ok(ranked
        .into_iter()
        .take(top_k)
        .map(|(_, v)| {
            let count = counts[&v];
            (v, count)
        })
        .collect())
}
