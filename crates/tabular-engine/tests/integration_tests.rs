//! Integration tests for the tabular compute engine.
//!
//! These tests verify end-to-end behavior of the cleaning, analysis, and
//! quality pipelines against temporary CSV fixtures.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;

use tabular_engine::cache::InMemoryCache;
use tabular_engine::config::EngineConfig;
use tabular_engine::pipeline::{AnalysisPipeline, CleaningPipeline};
use tabular_engine::quality::QualityService;
use tabular_engine::rules::{
    CleanRules, ColumnCast, DeduplicateRule, KeepStrategy, MissingRule, MissingStrategy,
    TargetType, TypeCastRule,
};
use tabular_engine::store::LocalBlobStore;
use tabular_engine::types::{
    AnalysisRequest, CleaningRequest, DataRef, PipelineStatus, QualityRequest, RowRange, Selection,
    UserAction,
};
use tabular_engine::validator::{AnalysisConfig, CorrelationMethod};

// ============================================================================
// Helper Functions
// ============================================================================

fn write_csv(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).expect("Failed to create fixture");
    file.write_all(body.as_bytes())
        .expect("Failed to write fixture");
    path
}

fn engine_config(dir: &Path) -> EngineConfig {
    EngineConfig::builder()
        .export_dir(dir.join("exports"))
        .build()
        .expect("Failed to build config")
}

fn cleaning_request(path: &Path) -> CleaningRequest {
    CleaningRequest {
        file_id: "it-file".to_string(),
        data_ref: DataRef::local_csv(path.to_str().unwrap()),
        user_actions: Vec::new(),
        clean_rules: CleanRules::default(),
        meta: None,
    }
}

fn analysis_request(path: &Path, config: AnalysisConfig) -> AnalysisRequest {
    AnalysisRequest {
        file_id: "it-file".to_string(),
        data_ref: DataRef::local_csv(path.to_str().unwrap()),
        data_selection: None,
        analysis_config: config,
        meta: None,
    }
}

// ============================================================================
// Cleaning Pipeline
// ============================================================================

#[test]
fn test_full_cleaning_run_with_edits_and_rules() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(
        dir.path(),
        "data.csv",
        "age,city\n30,berlin\n30,berlin\n,paris\nfifty,rome\n",
    );
    let pipeline = CleaningPipeline::new(engine_config(dir.path()), Arc::new(LocalBlobStore));

    let mut request = cleaning_request(&path);
    request.user_actions = vec![UserAction::UpdateCell {
        row_id: "3".to_string(),
        column: "age".to_string(),
        before: None,
        after: json!(50),
    }];
    request.clean_rules = CleanRules {
        missing: Some(MissingRule {
            enabled: true,
            strategy: MissingStrategy::Fill,
            columns: None,
            fill_method: tabular_engine::rules::FillMethod::Mean,
            constant_value: None,
        }),
        deduplicate: Some(DeduplicateRule {
            enabled: true,
            subset: None,
            keep: KeepStrategy::First,
        }),
        ..CleanRules::default()
    };

    let response = pipeline.run(&request);
    assert_eq!(response.status, PipelineStatus::Success);
    assert_eq!(response.stage, "done");
    assert!(response.log[0].starts_with("Meta: Pipeline finished in"));

    let summary = response.summary.expect("success carries a summary");
    assert_eq!(summary.rows_before, 4);
    assert_eq!(summary.rows_after, 3);
    assert_eq!(summary.user_actions_applied, 1);
    assert_eq!(
        summary.rules_applied,
        vec!["missing".to_string(), "deduplicate".to_string()]
    );
    assert!(summary.missing_rate_after <= summary.missing_rate_before);

    let artifact = response.cleaned_asset_ref.expect("exported artifact");
    assert!(Path::new(&artifact.path).is_file());
    assert!(artifact.path.contains("it-file"));
}

#[test]
fn test_replay_is_all_or_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "data.csv", "a\n1\n2\n3\n");
    let pipeline = CleaningPipeline::new(engine_config(dir.path()), Arc::new(LocalBlobStore));

    let mut request = cleaning_request(&path);
    request.user_actions = vec![
        UserAction::UpdateCell {
            row_id: "0".to_string(),
            column: "a".to_string(),
            before: None,
            after: json!(10),
        },
        // optimistic lock mismatch: actual value is 2
        UserAction::UpdateCell {
            row_id: "1".to_string(),
            column: "a".to_string(),
            before: Some(json!(99)),
            after: json!(20),
        },
    ];

    let response = pipeline.run(&request);
    assert_eq!(response.status, PipelineStatus::Failed);
    assert_eq!(response.stage, "replay");
    assert!(response.summary.is_none());
    assert!(response.cleaned_asset_ref.is_none());
    let error = response.error.expect("failed response carries an error");
    assert_eq!(error.stage, "replay");
    assert_eq!(error.detail.unwrap()["action_index"], 1);
    // nothing was exported
    assert!(!dir.path().join("exports").exists());
}

#[test]
fn test_insert_row_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "data.csv", "a\n1\n");
    let pipeline = CleaningPipeline::new(engine_config(dir.path()), Arc::new(LocalBlobStore));

    let mut request = cleaning_request(&path);
    request.user_actions = vec![UserAction::InsertRow { values: None }];

    let response = pipeline.run(&request);
    assert_eq!(response.status, PipelineStatus::Failed);
    assert_eq!(response.stage, "replay");
}

#[test]
fn test_dedup_keep_false_drops_whole_groups() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "data.csv", "a\n1\n1\n2\n3\n3\n3\n");
    let pipeline = CleaningPipeline::new(engine_config(dir.path()), Arc::new(LocalBlobStore));

    let mut request = cleaning_request(&path);
    request.clean_rules.deduplicate = Some(DeduplicateRule {
        enabled: true,
        subset: None,
        keep: KeepStrategy::False,
    });

    let response = pipeline.run(&request);
    assert_eq!(response.status, PipelineStatus::Success);
    // only the singleton row 2 survives
    assert_eq!(response.summary.unwrap().rows_after, 1);
}

#[test]
fn test_constant_fill_without_value_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "data.csv", "a,b\n1,x\n,y\n");
    let pipeline = CleaningPipeline::new(engine_config(dir.path()), Arc::new(LocalBlobStore));

    let mut request = cleaning_request(&path);
    request.clean_rules.missing = Some(MissingRule {
        enabled: true,
        strategy: MissingStrategy::Fill,
        columns: None,
        fill_method: tabular_engine::rules::FillMethod::Constant,
        constant_value: None,
    });

    let response = pipeline.run(&request);
    assert_eq!(response.status, PipelineStatus::Failed);
    assert_eq!(response.stage, "validate");
}

#[test]
fn test_type_cast_int_with_stragglers_stays_float() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "data.csv", "n\n1\n2\noops\n");
    let pipeline = CleaningPipeline::new(engine_config(dir.path()), Arc::new(LocalBlobStore));

    let mut request = cleaning_request(&path);
    request.clean_rules.type_cast = Some(TypeCastRule {
        enabled: true,
        casts: vec![ColumnCast {
            column: "n".to_string(),
            target: TargetType::Int,
            format: None,
        }],
    });

    let response = pipeline.run(&request);
    assert_eq!(response.status, PipelineStatus::Success);
    let detail = &response.rules_applied_detail;
    let cast_entry = detail.iter().find(|d| d.name == "type_cast").unwrap();
    let converted = cast_entry.effect["converted_columns"].as_array().unwrap();
    // unparsable value nulled, so the column cannot be Int64
    assert_eq!(converted[0]["dtype"], "f64");
}

// ============================================================================
// Analysis Pipeline
// ============================================================================

#[test]
fn test_analysis_round_trip_export_preserves_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "data.csv", "x,y\n1,2\n3,4\n5,6\n7,8\n");
    let config = engine_config(dir.path());
    let pipeline = CleaningPipeline::new(config.clone(), Arc::new(LocalBlobStore));

    let response = pipeline.run(&cleaning_request(&path));
    assert_eq!(response.status, PipelineStatus::Success);
    let summary = response.summary.unwrap();
    let artifact = response.cleaned_asset_ref.unwrap();

    // load the exported artifact back through the analysis pipeline
    let request = analysis_request(
        Path::new(&artifact.path),
        AnalysisConfig::Descriptive {
            columns: None,
            bins: 10,
            top_k: 10,
        },
    );
    let analysis = AnalysisPipeline::new(config, Arc::new(LocalBlobStore));
    let response = analysis.run(&request, false);
    assert_eq!(response.status, PipelineStatus::Success);
    let shape = response.summary.unwrap().input_shape;
    assert_eq!(shape, [summary.rows_after, summary.cols_after]);
}

#[test]
fn test_empty_column_list_is_distinct_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "data.csv", "a,b\n1,2\n3,4\n");
    let pipeline = AnalysisPipeline::new(engine_config(dir.path()), Arc::new(LocalBlobStore));

    let mut request = analysis_request(
        &path,
        AnalysisConfig::Descriptive {
            columns: None,
            bins: 10,
            top_k: 10,
        },
    );
    request.data_selection = Some(Selection {
        rows: None,
        columns: Some(vec![]),
    });

    let response = pipeline.run(&request, false);
    assert_eq!(response.status, PipelineStatus::Failed);
    assert_eq!(response.stage, "validate");
    let message = response.error.unwrap().message;
    assert!(message.contains("null"), "message was: {}", message);
}

#[test]
fn test_row_range_out_of_bounds_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(dir.path(), "data.csv", "a\n1\n2\n");
    let pipeline = AnalysisPipeline::new(engine_config(dir.path()), Arc::new(LocalBlobStore));

    let mut request = analysis_request(
        &path,
        AnalysisConfig::Descriptive {
            columns: None,
            bins: 10,
            top_k: 10,
        },
    );
    request.data_selection = Some(Selection {
        rows: Some(RowRange { start: 0, end: 10 }),
        columns: None,
    });

    let response = pipeline.run(&request, false);
    assert_eq!(response.status, PipelineStatus::Failed);
    assert_eq!(response.stage, "validate");
}

#[test]
fn test_correlation_constant_column_scenario() {
    let dir = tempfile::tempdir().unwrap();
    // 10 rows, 3 numeric columns, one constant
    let mut body = String::from("a,b,c\n");
    for i in 1..=10 {
        body.push_str(&format!("{},{},5\n", i, i * i));
    }
    let path = write_csv(dir.path(), "data.csv", &body);
    let pipeline = AnalysisPipeline::new(engine_config(dir.path()), Arc::new(LocalBlobStore));

    // all three columns: succeeds with a constant-column warning
    let request = analysis_request(
        &path,
        AnalysisConfig::Correlation {
            columns: None,
            method: CorrelationMethod::Pearson,
        },
    );
    let response = pipeline.run(&request, false);
    assert_eq!(response.status, PipelineStatus::Success);
    assert!(response.warnings.iter().any(|w| w.contains("constant")));

    // restricted to the two varying columns: one pair, no warning
    let request = analysis_request(
        &path,
        AnalysisConfig::Correlation {
            columns: Some(vec!["a".to_string(), "b".to_string()]),
            method: CorrelationMethod::Pearson,
        },
    );
    let response = pipeline.run(&request, false);
    assert_eq!(response.status, PipelineStatus::Success);
    assert!(response.warnings.is_empty());
    let metrics = response.summary.unwrap().key_metrics;
    assert_eq!(metrics["strong_pairs"].as_array().unwrap().len(), 1);
}

#[test]
fn test_group_compare_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_csv(
        dir.path(),
        "data.csv",
        "city,price\nberlin,10\nberlin,20\nparis,30\nparis,50\n",
    );
    let pipeline = AnalysisPipeline::new(engine_config(dir.path()), Arc::new(LocalBlobStore));

    let request = analysis_request(
        &path,
        AnalysisConfig::GroupCompare {
            group_by: "city".to_string(),
            target: "price".to_string(),
            aggregation: tabular_engine::validator::Aggregation::Mean,
        },
    );
    let response = pipeline.run(&request, false);
    assert_eq!(response.status, PipelineStatus::Success);
    let metrics = response.summary.unwrap().key_metrics;
    // berlin mean 15, paris mean 40
    assert_eq!(metrics["delta"]["max_mean_gap"], 25.0);
}

// ============================================================================
// Quality Service
// ============================================================================

#[tokio::test]
async fn test_quality_end_to_end_with_cache() {
    let dir = tempfile::tempdir().unwrap();
    let mut body = String::from("v,label\n");
    for i in 1..=20 {
        body.push_str(&format!("{},x{}\n", i, i));
    }
    body.push_str("1000,x21\n"); // outlier
    body.push_str(",x22\n"); // missing cell
    let path = write_csv(dir.path(), "data.csv", &body);

    let service = QualityService::new(engine_config(dir.path()), Arc::new(InMemoryCache::new()));
    let request = QualityRequest {
        file_id: "q1".to_string(),
        data_ref: DataRef::local_csv(path.to_str().unwrap()),
        force_refresh: false,
    };

    let report = service.inspect(&request, "task-1").await.unwrap();
    assert_eq!(report.row_count, 22);
    assert_eq!(report.missing.total_missing_cells, 1);
    assert_eq!(report.anomalies.total_anomalies, 1);
    assert_eq!(report.anomalies.details[0].row, 21);
    assert!(report.quality_score < 100.0);

    // second call is served from cache even after the file disappears
    std::fs::remove_file(&path).unwrap();
    let cached = service.inspect(&request, "task-2").await.unwrap();
    assert_eq!(cached.quality_score, report.quality_score);

    let status = service.task_status("task-2").await.unwrap();
    assert_eq!(status.status, tabular_engine::cache::TaskState::Completed);
}

#[tokio::test]
async fn test_quality_score_components_reflected() {
    let dir = tempfile::tempdir().unwrap();
    // half the cells missing in one of two columns
    let path = write_csv(dir.path(), "data.csv", "a,b\n1,\n2,\n3,x\n4,y\n");
    let service = QualityService::new(engine_config(dir.path()), Arc::new(InMemoryCache::new()));
    let request = QualityRequest {
        file_id: "q2".to_string(),
        data_ref: DataRef::local_csv(path.to_str().unwrap()),
        force_refresh: false,
    };
    let report = service.inspect(&request, "t").await.unwrap();
    // missing_rate 2/8 = 0.25 -> deduction 10
    assert_eq!(report.missing.missing_rate, 0.25);
    assert_eq!(report.quality_score, 90.0);
}
