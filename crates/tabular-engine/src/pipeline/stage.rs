//! Pipeline stage definitions.
//!
//! Stages serve two purposes: they describe where a running pipeline is,
//! and they tag errors returned to the caller. `done` and `failed` are the
//! only terminal outcomes; everything else is transient within one request.

use serde::{Deserialize, Serialize};

/// A named phase of pipeline execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Request accepted, nothing executed yet.
    Received,
    /// Reading the dataset from its source.
    Load,
    /// Structural precondition checks (selection, analysis config).
    Validate,
    /// Replaying user edit actions.
    Replay,
    /// Applying cleaning rules.
    Rules,
    /// Running statistical computation.
    Process,
    /// Writing the result artifact.
    Export,
    /// Pipeline finished successfully.
    Done,
    /// Catch-all for errors with no attributable stage.
    Unknown,
}

impl PipelineStage {
    /// The string used on the wire (responses and error payloads).
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Load => "load",
            Self::Validate => "validate",
            Self::Replay => "replay",
            Self::Rules => "rules",
            Self::Process => "process",
            Self::Export => "export",
            Self::Done => "done",
            Self::Unknown => "unknown",
        }
    }

    /// Human-readable name for logs and progress messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Received => "Request received",
            Self::Load => "Loading dataset",
            Self::Validate => "Validating input",
            Self::Replay => "Replaying user edits",
            Self::Rules => "Applying cleaning rules",
            Self::Process => "Computing statistics",
            Self::Export => "Exporting artifact",
            Self::Done => "Completed",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}
