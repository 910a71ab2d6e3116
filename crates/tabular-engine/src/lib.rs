//! Tabular Compute Engine Library
//!
//! A stateless, high-performance tabular compute service built with Rust and Polars.
//!
//! # Overview
//!
//! This library provides three staged pipelines over tabular datasets:
//!
//! - **Cleaning Pipeline**: load → replay user edits → cleaning rules → export
//! - **Analysis Pipeline**: load → select → validate → compute statistics → optional export
//! - **Quality Inspection**: missing/duplicate/outlier detection and a weighted score,
//!   with result memoization and task-progress tracking
//!
//! Every pipeline run either fully succeeds (stage `done`, full summary) or fully
//! fails with a stage-tagged error — there are no partial results. Collaborators
//! (cache, blob store) are injected through constructors so tests can run against
//! in-memory fakes.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tabular_engine::cache::InMemoryCache;
//! use tabular_engine::config::EngineConfig;
//! use tabular_engine::pipeline::CleaningPipeline;
//! use tabular_engine::quality::QualityService;
//! use tabular_engine::store::LocalBlobStore;
//! use tabular_engine::types::{CleaningRequest, DataRef, QualityRequest};
//!
//! let config = EngineConfig::builder()
//!     .export_dir("./exports")
//!     .iqr_multiplier(1.5)
//!     .build()?;
//!
//! // Cleaning: replay recorded edits, apply rules, export the result
//! let pipeline = CleaningPipeline::new(config.clone(), Arc::new(LocalBlobStore));
//! let request: CleaningRequest = serde_json::from_str(&request_json)?;
//! let response = pipeline.run(&request);
//! println!("{}", serde_json::to_string_pretty(&response)?);
//!
//! // Quality: memoized inspection with task progress
//! let service = QualityService::new(config, Arc::new(InMemoryCache::new()));
//! let request = QualityRequest {
//!     file_id: "f1".into(),
//!     data_ref: DataRef::local_csv("data.csv"),
//!     force_refresh: false,
//! };
//! let report = service.inspect(&request, "task-1").await?;
//! println!("score: {}", report.quality_score);
//! ```
//!
//! # Configuration
//!
//! Use [`config::EngineConfig`] to customize loader limits, anomaly thresholds,
//! score weights, export paths, and cache TTLs:
//!
//! ```rust,ignore
//! use tabular_engine::config::EngineConfig;
//!
//! let config = EngineConfig::builder()
//!     .max_file_size_bytes(10 * 1024 * 1024)
//!     .iqr_multiplier(3.0)            // only flag extreme outliers
//!     .categorical_distinct_threshold(10)
//!     .score_weights(40.0, 30.0, 30.0)
//!     .build()?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod exporter;
pub mod loader;
pub mod methods;
pub mod pipeline;
pub mod quality;
pub mod replay;
pub mod rules;
pub mod selector;
pub mod store;
pub mod types;
pub mod utils;
pub mod validator;

pub use cache::{CacheStore, InMemoryCache, ResultCache, TaskState, TaskStatus, TaskTracker};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use error::{PipelineError, Result};
pub use pipeline::stage::PipelineStage;
pub use pipeline::{AnalysisPipeline, CleaningPipeline};
pub use quality::{QualityReport, QualityService};
pub use store::{BlobStore, LocalBlobStore};
pub use types::{
    AnalysisRequest, AnalysisResponse, CleaningRequest, CleaningResponse, DataRef, PipelineStatus,
    QualityRequest,
};
