//! Quality-inspection service.
//!
//! Wraps the pure report computation with result memoization and task
//! progress. Collaborators are injected so tests can run against the
//! in-memory cache.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{info, instrument};

use crate::cache::{CacheStore, ResultCache, TaskStatus, TaskTracker};
use crate::config::EngineConfig;
use crate::error::{PipelineError, Result};
use crate::loader;
use crate::types::QualityRequest;
use crate::utils::cache_key;

use super::{QualityReport, build_report};

/// Cache key for a memoized quality report: file identity plus a hash of
/// the detection and scoring parameters, so a config change never serves
/// a report computed under the old knobs.
pub fn result_key(file_id: &str, config: &EngineConfig) -> String {
    let params = json!({
        "iqr_multiplier": config.iqr_multiplier,
        "categorical_distinct_threshold": config.categorical_distinct_threshold,
        "max_outlier_details_per_column": config.max_outlier_details_per_column,
        "max_duplicate_row_numbers": config.max_duplicate_row_numbers,
        "score_weight_missing": config.score_weight_missing,
        "score_weight_duplicates": config.score_weight_duplicates,
        "score_weight_anomalies": config.score_weight_anomalies,
        "anomaly_amplification": config.anomaly_amplification,
    });
    cache_key("quality:analysis", file_id, &params)
}

pub struct QualityService {
    config: EngineConfig,
    cache: ResultCache,
    tasks: TaskTracker,
}

impl QualityService {
    pub fn new(config: EngineConfig, store: Arc<dyn CacheStore>) -> Self {
        let tasks = TaskTracker::new(store.clone(), Duration::from_secs(config.task_ttl_secs));
        Self {
            config,
            cache: ResultCache::new(store),
            tasks,
        }
    }

    /// Run (or replay from cache) a quality inspection, tracking progress
    /// under `task_id`.
    #[instrument(skip(self, request), fields(file_id = %request.file_id))]
    pub async fn inspect(&self, request: &QualityRequest, task_id: &str) -> Result<QualityReport> {
        self.tasks.init(task_id).await;
        let key = result_key(&request.file_id, &self.config);

        if !request.force_refresh {
            if let Some(report) = self.cache.get_json::<QualityReport>(&key).await {
                info!(file_id = %request.file_id, "quality report served from cache");
                self.tasks.mark_completed(task_id, &request.file_id).await;
                return Ok(report);
            }
        }

        self.tasks.update_progress(task_id, 10, "loading dataset").await;

        let config = self.config.clone();
        let data_ref = request.data_ref.clone();
        let file_id = request.file_id.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let (df, _profile) = loader::load_dataset(&data_ref, &config)?;
            build_report(&df, &file_id, &config)
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("quality worker failed: {}", e)))
        .and_then(|r| r);

        match outcome {
            Ok(report) => {
                self.tasks.update_progress(task_id, 90, "caching result").await;
                self.cache
                    .set_json(
                        &key,
                        &report,
                        Duration::from_secs(self.config.result_cache_ttl_secs),
                    )
                    .await;
                self.tasks.mark_completed(task_id, &request.file_id).await;
                Ok(report)
            }
            Err(e) => {
                self.tasks.mark_failed(task_id, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Poll a tracked task.
    pub async fn task_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.tasks.get(task_id).await
    }

    /// Drop every memoized report for a file across parameterizations,
    /// e.g. after re-cleaning.
    pub async fn invalidate(&self, file_id: &str) -> usize {
        self.cache
            .delete_matching(&format!("quality:analysis:{}:*", file_id))
            .await
    }
}
