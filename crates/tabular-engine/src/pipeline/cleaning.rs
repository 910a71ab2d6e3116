//! Cleaning pipeline: load → replay → rules → export.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Value, json};
use tracing::{error, info, instrument};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::exporter;
use crate::loader;
use crate::replay;
use crate::rules;
use crate::store::BlobStore;
use crate::types::{
    Artifact, CleaningRequest, CleaningResponse, CleaningSummary, DataFormat, DiffSummary,
    ErrorBody, PipelineStatus, ProfileDelta, RuleAppliedDetail, UserAction,
};
use crate::utils::preview_rows;

use super::finished_log;
use super::stage::PipelineStage;

pub struct CleaningPipeline {
    config: EngineConfig,
    store: Arc<dyn BlobStore>,
}

struct CleaningOutcome {
    artifact: Artifact,
    summary: CleaningSummary,
    diff_summary: DiffSummary,
    rules_applied_detail: Vec<RuleAppliedDetail>,
    preview: Vec<Value>,
}

impl CleaningPipeline {
    pub fn new(config: EngineConfig, store: Arc<dyn BlobStore>) -> Self {
        Self { config, store }
    }

    /// Run the full cleaning pipeline. Never panics outward; every failure
    /// lands in a `failed` response tagged with its stage.
    #[instrument(skip(self, request), fields(file_id = %request.file_id))]
    pub fn run(&self, request: &CleaningRequest) -> CleaningResponse {
        let started = Instant::now();
        let mut log = Vec::new();

        match self.execute(request, &mut log) {
            Ok(outcome) => {
                let elapsed = started.elapsed().as_millis() as u64;
                log.insert(0, finished_log(elapsed));
                info!(
                    rows_after = outcome.summary.rows_after,
                    elapsed_ms = elapsed,
                    "cleaning pipeline finished"
                );
                let mut summary = outcome.summary;
                summary.duration_ms = elapsed;
                CleaningResponse {
                    status: PipelineStatus::Success,
                    stage: PipelineStage::Done.wire_name().to_string(),
                    cleaned_asset_ref: Some(outcome.artifact),
                    summary: Some(summary),
                    diff_summary: Some(outcome.diff_summary),
                    rules_applied_detail: outcome.rules_applied_detail,
                    preview: outcome.preview,
                    log,
                    error: None,
                }
            }
            Err(err) => {
                let elapsed = started.elapsed().as_millis() as u64;
                log.insert(0, finished_log(elapsed));
                error!(stage = err.stage(), error = %err, "cleaning pipeline failed");
                CleaningResponse {
                    status: PipelineStatus::Failed,
                    stage: err.stage().to_string(),
                    cleaned_asset_ref: None,
                    summary: None,
                    diff_summary: None,
                    rules_applied_detail: Vec::new(),
                    preview: Vec::new(),
                    log,
                    error: Some(ErrorBody::from(&err)),
                }
            }
        }
    }

    fn execute(&self, request: &CleaningRequest, log: &mut Vec<String>) -> Result<CleaningOutcome> {
        // schema-level rule problems fail before any data is read
        request.clean_rules.validate()?;

        let (df, load_profile) = loader::load_dataset(&request.data_ref, &self.config)?;
        log.push(format!(
            "Load: {} rows x {} cols from {}",
            load_profile.rows, load_profile.cols, request.data_ref.path
        ));

        let (df, replay_stats, before_profile) =
            replay::replay_actions(&df, &request.user_actions)?;
        log.push(format!(
            "Replay: applied {} of {} user actions",
            replay_stats.applied, replay_stats.total
        ));

        let outcome = rules::apply_rules(df, &request.clean_rules)?;
        log.extend(outcome.logs.iter().cloned());
        let mut cleaned = outcome.df;
        let after_profile = outcome.after_profile;

        let export_format = match request.data_ref.format {
            DataFormat::Parquet => DataFormat::Parquet,
            _ => DataFormat::Csv,
        };
        let artifact = exporter::export_cleaned(
            &mut cleaned,
            &request.file_id,
            export_format,
            &self.config,
            self.store.as_ref(),
        )?;
        log.push(format!("Export: wrote {}", artifact.path));

        // cells touched by user edits, fills, and whole-column casts
        let update_cells = request
            .user_actions
            .iter()
            .filter(|a| matches!(a, UserAction::UpdateCell { .. }))
            .count();
        let mut cells_modified = update_cells;
        let mut by_rule = serde_json::Map::new();
        let mut rules_applied = Vec::new();
        let mut rules_applied_detail = vec![RuleAppliedDetail {
            name: "user_actions".to_string(),
            enabled: !request.user_actions.is_empty(),
            params: json!({"count": replay_stats.total}),
            effect: serde_json::to_value(&replay_stats)?,
        }];

        for metric in &outcome.metrics {
            cells_modified += metric
                .effect
                .get("filled_cells")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize;
            if let Some(converted) = metric.effect.get("converted_columns").and_then(Value::as_array)
            {
                cells_modified += converted.len() * cleaned.height();
            }
            rules_applied.push(metric.name.clone());
            by_rule.insert(metric.name.clone(), metric.effect.clone());
            rules_applied_detail.push(RuleAppliedDetail {
                name: metric.name.clone(),
                enabled: true,
                params: metric.params.clone(),
                effect: metric.effect.clone(),
            });
        }

        let summary = CleaningSummary {
            rows_before: before_profile.rows,
            rows_after: after_profile.rows,
            cols_before: before_profile.cols,
            cols_after: after_profile.cols,
            removed_rows: before_profile.rows.saturating_sub(after_profile.rows),
            cells_modified,
            user_actions_applied: replay_stats.applied,
            rules_applied,
            missing_rate_before: before_profile.missing_rate,
            missing_rate_after: after_profile.missing_rate,
            duplicate_rate_before: before_profile.duplicate_rate,
            duplicate_rate_after: after_profile.duplicate_rate,
            duration_ms: 0,
        };

        let diff_summary = DiffSummary {
            by_rule: Value::Object(by_rule),
            profile_delta: ProfileDelta::between(&before_profile, &after_profile),
        };

        let preview = preview_rows(&cleaned, self.config.preview_rows);

        Ok(CleaningOutcome {
            artifact,
            summary,
            diff_summary,
            rules_applied_detail,
            preview,
        })
    }
}
