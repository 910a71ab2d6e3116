//! Analysis pipeline: load → select → validate → compute → optional export.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::{error, info, instrument};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::exporter;
use crate::loader;
use crate::methods;
use crate::selector;
use crate::store::BlobStore;
use crate::types::{
    AnalysisRequest, AnalysisResponse, AnalysisSummary, Artifact, Chart, ErrorBody, PipelineStatus,
};
use crate::validator;

use super::finished_log;
use super::stage::PipelineStage;

pub struct AnalysisPipeline {
    config: EngineConfig,
    store: Arc<dyn BlobStore>,
}

struct AnalysisOutcome {
    summary: AnalysisSummary,
    charts: Vec<Chart>,
    artifacts: Vec<Artifact>,
}

impl AnalysisPipeline {
    pub fn new(config: EngineConfig, store: Arc<dyn BlobStore>) -> Self {
        Self { config, store }
    }

    /// Run the full analysis pipeline. When `export_result` is set, the
    /// summary and charts are also written out as a JSON artifact.
    ///
    /// Warnings gathered before a failure survive into the failed
    /// response; charts and artifacts never do.
    #[instrument(skip(self, request), fields(file_id = %request.file_id))]
    pub fn run(&self, request: &AnalysisRequest, export_result: bool) -> AnalysisResponse {
        let started = Instant::now();
        let mut log = Vec::new();
        let mut warnings = Vec::new();

        match self.execute(request, export_result, &mut log, &mut warnings) {
            Ok(outcome) => {
                let elapsed = started.elapsed().as_millis() as u64;
                log.insert(0, finished_log(elapsed));
                info!(
                    analysis_type = outcome.summary.analysis_type,
                    elapsed_ms = elapsed,
                    "analysis pipeline finished"
                );
                AnalysisResponse {
                    status: PipelineStatus::Success,
                    stage: PipelineStage::Done.wire_name().to_string(),
                    summary: Some(outcome.summary),
                    charts: outcome.charts,
                    artifacts: outcome.artifacts,
                    warnings,
                    log,
                    error: None,
                }
            }
            Err(err) => {
                let elapsed = started.elapsed().as_millis() as u64;
                log.insert(0, finished_log(elapsed));
                error!(stage = err.stage(), error = %err, "analysis pipeline failed");
                AnalysisResponse {
                    status: PipelineStatus::Failed,
                    stage: err.stage().to_string(),
                    summary: None,
                    charts: Vec::new(),
                    artifacts: Vec::new(),
                    warnings,
                    log,
                    error: Some(ErrorBody::from(&err)),
                }
            }
        }
    }

    fn execute(
        &self,
        request: &AnalysisRequest,
        export_result: bool,
        log: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) -> Result<AnalysisOutcome> {
        let (df, load_profile) = loader::load_dataset(&request.data_ref, &self.config)?;
        log.push(format!(
            "Load: {} rows x {} cols from {}",
            load_profile.rows, load_profile.cols, request.data_ref.path
        ));

        let (selected, selection_profile) =
            selector::apply_selection(&df, request.data_selection.as_ref())?;
        log.push(format!(
            "Select: {} rows x {} cols",
            selection_profile.rows_after, selection_profile.cols_after
        ));

        let validated = validator::validate_analysis(&selected, &request.analysis_config)?;

        let output = methods::run_method(&selected, &request.analysis_config, &validated)?;
        warnings.extend(output.warnings);
        log.extend(output.logs);

        let summary = AnalysisSummary {
            analysis_type: request.analysis_config.analysis_type().to_string(),
            input_shape: [load_profile.rows, load_profile.cols],
            selected_shape: [selected.height(), selected.width()],
            selected_columns: validated.columns.clone(),
            key_metrics: output.key_metrics,
        };

        let mut artifacts = Vec::new();
        if export_result {
            let payload = json!({
                "summary": summary,
                "charts": output.charts,
                "warnings": warnings,
            });
            let version = request
                .meta
                .as_ref()
                .and_then(|m| m.get("version"))
                .and_then(|v| v.as_str())
                .unwrap_or("v1");
            let artifact = exporter::export_analysis_json(
                &payload,
                &request.file_id,
                version,
                &self.config,
                self.store.as_ref(),
            )?;
            log.push(format!("Export: wrote {}", artifact.path));
            artifacts.push(artifact);
        }

        Ok(AnalysisOutcome {
            summary,
            charts: output.charts,
            artifacts,
        })
    }
}
