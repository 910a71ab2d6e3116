//! Weighted quality score.

use crate::config::EngineConfig;

/// Score a dataset from its missing, duplicate, and anomaly rates.
///
/// `100 − (missing_rate×W_m + duplicate_rate×W_d + min(W_a, anomaly_rate×K×W_a))`,
/// clamped to `[0, 100]` and rounded to one decimal place. The anomaly
/// rate is amplified by `K` before weighting because it is typically far
/// smaller than the other two rates.
pub fn quality_score(
    missing_rate: f64,
    duplicate_rate: f64,
    anomaly_rate: f64,
    config: &EngineConfig,
) -> f64 {
    let missing_penalty = missing_rate * config.score_weight_missing;
    let duplicate_penalty = duplicate_rate * config.score_weight_duplicates;
    let anomaly_penalty = (anomaly_rate * config.anomaly_amplification
        * config.score_weight_anomalies)
        .min(config.score_weight_anomalies);

    let score = (100.0 - missing_penalty - duplicate_penalty - anomaly_penalty).clamp(0.0, 100.0);
    (score * 10.0).round() / 10.0
}
