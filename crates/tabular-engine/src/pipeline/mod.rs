//! Pipeline orchestration.
//!
//! The cleaning and analysis runners tie the stage modules together and
//! enforce the response contract: a run either fully succeeds (stage
//! `done`, full summary) or fully fails (stage of the failing step, no
//! partial artifacts). Runners are synchronous; callers dispatch them to
//! a blocking worker when running inside an async runtime.

pub mod analysis;
pub mod cleaning;
pub mod stage;

pub use analysis::AnalysisPipeline;
pub use cleaning::CleaningPipeline;

/// Leading log line every pipeline emits, success or failure.
fn finished_log(elapsed_ms: u64) -> String {
    format!("Meta: Pipeline finished in {}ms", elapsed_ms)
}
