//! Statistical analysis methods.
//!
//! Three interchangeable computations over a validated dataset slice.
//! Methods never fail on data-quality edge cases that passed validation;
//! they degrade to warnings. Charts are always an array, even when empty.

pub mod correlation;
pub mod descriptive;
pub mod group_compare;

use polars::prelude::DataFrame;
use serde_json::Value;

use crate::error::Result;
use crate::types::Chart;
use crate::validator::{AnalysisConfig, ValidatedAnalysis};

/// Common output shape of every analysis method.
#[derive(Debug)]
pub struct MethodOutput {
    pub key_metrics: Value,
    pub charts: Vec<Chart>,
    pub warnings: Vec<String>,
    pub logs: Vec<String>,
}

/// Dispatch to the method selected by the config variant.
pub fn run_method(
    df: &DataFrame,
    config: &AnalysisConfig,
    validated: &ValidatedAnalysis,
) -> Result<MethodOutput> {
    match config {
        AnalysisConfig::Descriptive { bins, top_k, .. } => {
            descriptive::run(df, &validated.columns, *bins, *top_k)
        }
        AnalysisConfig::Correlation { method, .. } => {
            correlation::run(df, &validated.columns, *method)
        }
        AnalysisConfig::GroupCompare {
            group_by,
            target,
            aggregation,
        } => group_compare::run(df, group_by, target, *aggregation),
    }
}
