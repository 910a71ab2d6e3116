//! Analysis configuration and structural validation.
//!
//! `AnalysisConfig` is a closed sum type: one variant per analysis method,
//! each carrying exactly the options that method understands. Validation
//! checks structure only (column existence, dtype class, sample size);
//! data-quality edge cases degrade to warnings inside the methods.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{PipelineError, Result};
use crate::pipeline::stage::PipelineStage;
use crate::utils::is_numeric_dtype;

fn validate_error(message: impl Into<String>, detail: serde_json::Value) -> PipelineError {
    PipelineError::stage_with_detail(PipelineStage::Validate, message, Some(detail))
}

fn default_bins() -> usize {
    10
}

fn default_top_k() -> usize {
    10
}

/// Correlation matrix method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationMethod {
    #[default]
    Pearson,
    Spearman,
}

/// Headline aggregation for group comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    #[default]
    Mean,
    Median,
}

/// Analysis request configuration, tagged by analysis type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisConfig {
    Descriptive {
        /// Columns to describe; all selected columns when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        columns: Option<Vec<String>>,
        #[serde(default = "default_bins")]
        bins: usize,
        #[serde(default = "default_top_k")]
        top_k: usize,
    },
    Correlation {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        columns: Option<Vec<String>>,
        #[serde(default)]
        method: CorrelationMethod,
    },
    GroupCompare {
        group_by: String,
        target: String,
        #[serde(default)]
        aggregation: Aggregation,
    },
}

impl AnalysisConfig {
    pub fn analysis_type(&self) -> &'static str {
        match self {
            Self::Descriptive { .. } => "descriptive",
            Self::Correlation { .. } => "correlation",
            Self::GroupCompare { .. } => "group_compare",
        }
    }
}

/// Validated and resolved analysis input: the concrete column list the
/// method will consume, in request order.
#[derive(Debug, Clone)]
pub struct ValidatedAnalysis {
    pub columns: Vec<String>,
}

/// Validate an analysis config against the selected frame.
pub fn validate_analysis(df: &DataFrame, config: &AnalysisConfig) -> Result<ValidatedAnalysis> {
    match config {
        AnalysisConfig::Descriptive { columns, bins, top_k } => {
            if *bins < 2 {
                return Err(validate_error(
                    format!("descriptive: bins must be at least 2, got {}", bins),
                    json!({"bins": bins}),
                ));
            }
            if *top_k < 1 {
                return Err(validate_error(
                    format!("descriptive: top_k must be at least 1, got {}", top_k),
                    json!({"top_k": top_k}),
                ));
            }
            let resolved = resolve_columns(df, columns.as_ref())?;
            Ok(ValidatedAnalysis { columns: resolved })
        }
        AnalysisConfig::Correlation { columns, .. } => {
            let resolved = resolve_columns(df, columns.as_ref())?;

            let (numeric, non_numeric): (Vec<&String>, Vec<&String>) = resolved
                .iter()
                .partition(|c| column_is_numeric(df, c));
            // strict: non-numeric columns fail instead of being dropped
            if !non_numeric.is_empty() {
                return Err(validate_error(
                    format!(
                        "correlation only supports numeric columns, non-numeric: {:?}",
                        non_numeric
                    ),
                    json!({"non_numeric": non_numeric}),
                ));
            }
            if numeric.len() < 2 {
                return Err(validate_error(
                    "correlation requires at least 2 numeric columns",
                    json!({"numeric_columns": numeric}),
                ));
            }
            if df.height() < 2 {
                return Err(validate_error(
                    "correlation requires at least 2 rows",
                    json!({"rows": df.height()}),
                ));
            }
            Ok(ValidatedAnalysis { columns: resolved })
        }
        AnalysisConfig::GroupCompare { group_by, target, .. } => {
            for col in [group_by, target] {
                if df.column(col).is_err() {
                    return Err(validate_error(
                        format!("group_compare: column '{}' not found", col),
                        json!({"column": col}),
                    ));
                }
            }
            if group_by == target {
                return Err(validate_error(
                    "group_compare: group_by and target must be different columns",
                    json!({"group_by": group_by}),
                ));
            }
            if column_is_numeric(df, group_by) {
                return Err(validate_error(
                    format!("group_compare: group_by column '{}' must be categorical", group_by),
                    json!({"group_by": group_by}),
                ));
            }
            if !column_is_numeric(df, target) {
                return Err(validate_error(
                    format!("group_compare: target column '{}' must be numeric", target),
                    json!({"target": target}),
                ));
            }
            let target_series = df.column(target)?.as_materialized_series();
            if target_series.null_count() == target_series.len() {
                return Err(validate_error(
                    format!("group_compare: target column '{}' has no values", target),
                    json!({"target": target}),
                ));
            }
            let groups = df
                .column(group_by)?
                .as_materialized_series()
                .drop_nulls()
                .n_unique()?;
            if groups == 0 {
                return Err(validate_error(
                    format!("group_compare: group_by column '{}' has no groups", group_by),
                    json!({"group_by": group_by}),
                ));
            }
            Ok(ValidatedAnalysis {
                columns: vec![group_by.clone(), target.clone()],
            })
        }
    }
}

/// Resolve the requested column list: dedup preserving order, verify
/// existence. `None` means all columns; `[]` is an error.
fn resolve_columns(df: &DataFrame, requested: Option<&Vec<String>>) -> Result<Vec<String>> {
    let available = df.get_column_names();
    match requested {
        None => Ok(available.iter().map(|n| n.to_string()).collect()),
        Some(cols) if cols.is_empty() => Err(validate_error(
            "columns cannot be an empty array; use null to select all columns",
            json!({"columns": []}),
        )),
        Some(cols) => {
            let mut resolved: Vec<String> = Vec::new();
            for col in cols {
                if !resolved.contains(col) {
                    resolved.push(col.clone());
                }
            }
            let missing: Vec<&String> = resolved
                .iter()
                .filter(|c| !available.iter().any(|a| a.as_str() == c.as_str()))
                .collect();
            if !missing.is_empty() {
                return Err(validate_error(
                    format!("Columns not found in dataset: {:?}", missing),
                    json!({"missing_columns": missing}),
                ));
            }
            Ok(resolved)
        }
    }
}

fn column_is_numeric(df: &DataFrame, name: &str) -> bool {
    df.column(name)
        .map(|c| is_numeric_dtype(c.dtype()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame() -> DataFrame {
        df! {
            "num_a" => [1.0f64, 2.0, 3.0],
            "num_b" => [4.0f64, 5.0, 6.0],
            "cat" => ["x", "y", "x"],
        }
        .unwrap()
    }

    #[test]
    fn test_tagged_deserialization() {
        let config: AnalysisConfig = serde_json::from_value(json!({
            "type": "correlation",
            "columns": ["num_a", "num_b"],
            "method": "spearman"
        }))
        .unwrap();
        assert_eq!(config.analysis_type(), "correlation");
        assert!(matches!(
            config,
            AnalysisConfig::Correlation {
                method: CorrelationMethod::Spearman,
                ..
            }
        ));
    }

    #[test]
    fn test_descriptive_defaults() {
        let config: AnalysisConfig =
            serde_json::from_value(json!({"type": "descriptive"})).unwrap();
        if let AnalysisConfig::Descriptive { bins, top_k, .. } = config {
            assert_eq!(bins, 10);
            assert_eq!(top_k, 10);
        } else {
            panic!("wrong variant");
        }
    }

    #[test]
    fn test_descriptive_bins_floor() {
        let df = frame();
        let config = AnalysisConfig::Descriptive {
            columns: None,
            bins: 1,
            top_k: 10,
        };
        let err = validate_analysis(&df, &config).unwrap_err();
        assert_eq!(err.stage(), "validate");
    }

    #[test]
    fn test_correlation_strict_about_non_numeric() {
        let df = frame();
        let config = AnalysisConfig::Correlation {
            columns: Some(vec!["num_a".to_string(), "cat".to_string()]),
            method: CorrelationMethod::Pearson,
        };
        let err = validate_analysis(&df, &config).unwrap_err();
        assert_eq!(err.stage(), "validate");
        assert!(err.to_string().contains("non-numeric"));
    }

    #[test]
    fn test_correlation_needs_two_numeric_columns() {
        let df = frame();
        let config = AnalysisConfig::Correlation {
            columns: Some(vec!["num_a".to_string()]),
            method: CorrelationMethod::Pearson,
        };
        let err = validate_analysis(&df, &config).unwrap_err();
        assert!(err.to_string().contains("at least 2 numeric"));
    }

    #[test]
    fn test_correlation_needs_two_rows() {
        let df = df! { "a" => [1.0f64], "b" => [2.0f64] }.unwrap();
        let config = AnalysisConfig::Correlation {
            columns: None,
            method: CorrelationMethod::Pearson,
        };
        let err = validate_analysis(&df, &config).unwrap_err();
        assert!(err.to_string().contains("at least 2 rows"));
    }

    #[test]
    fn test_empty_columns_rejected() {
        let df = frame();
        let config = AnalysisConfig::Descriptive {
            columns: Some(vec![]),
            bins: 10,
            top_k: 10,
        };
        let err = validate_analysis(&df, &config).unwrap_err();
        assert!(err.to_string().contains("null"));
    }

    #[test]
    fn test_columns_deduped_preserving_order() {
        let df = frame();
        let config = AnalysisConfig::Descriptive {
            columns: Some(vec![
                "cat".to_string(),
                "num_a".to_string(),
                "cat".to_string(),
            ]),
            bins: 10,
            top_k: 10,
        };
        let validated = validate_analysis(&df, &config).unwrap();
        assert_eq!(validated.columns, vec!["cat", "num_a"]);
    }

    #[test]
    fn test_group_compare_dtype_checks() {
        let df = frame();
        let bad_group = AnalysisConfig::GroupCompare {
            group_by: "num_a".to_string(),
            target: "num_b".to_string(),
            aggregation: Aggregation::Mean,
        };
        assert!(validate_analysis(&df, &bad_group).is_err());

        let bad_target = AnalysisConfig::GroupCompare {
            group_by: "cat".to_string(),
            target: "cat".to_string(),
            aggregation: Aggregation::Mean,
        };
        assert!(validate_analysis(&df, &bad_target).is_err());

        let ok = AnalysisConfig::GroupCompare {
            group_by: "cat".to_string(),
            target: "num_a".to_string(),
            aggregation: Aggregation::Mean,
        };
        let validated = validate_analysis(&df, &ok).unwrap();
        assert_eq!(validated.columns, vec!["cat", "num_a"]);
    }
}
