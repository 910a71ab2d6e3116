//! Stage-scoped error types for the pipeline engine.
//!
//! Every failure that escapes a pipeline carries the stage it occurred in,
//! a human-readable message, and an optional structured detail payload.
//! Errors serialize to the wire shape `{stage, message, detail}` so the
//! orchestrator can surface them without parsing free text.

use serde::Serialize;
use serde::ser::SerializeStruct;
use serde_json::Value;
use thiserror::Error;

use crate::pipeline::stage::PipelineStage;

/// The main error type for pipeline execution.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Dataset could not be loaded (missing file, bad format, size limit).
    #[error("{message}")]
    Load {
        message: String,
        detail: Option<Value>,
    },

    /// Structural precondition failed (selection, analysis config, schema).
    #[error("{message}")]
    Validate {
        message: String,
        detail: Option<Value>,
    },

    /// A user edit action could not be replayed.
    #[error("{message}")]
    Replay {
        message: String,
        detail: Option<Value>,
    },

    /// A cleaning rule failed to apply.
    #[error("{message}")]
    Rules {
        message: String,
        detail: Option<Value>,
    },

    /// Statistical computation failed.
    #[error("{message}")]
    Process {
        message: String,
        detail: Option<Value>,
    },

    /// Artifact export failed.
    #[error("{message}")]
    Export {
        message: String,
        detail: Option<Value>,
    },

    /// Engine configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("DataFrame error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error (e.g. worker join failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Build a stage-tagged error with just a message.
    pub fn stage_msg(stage: PipelineStage, message: impl Into<String>) -> Self {
        Self::stage_with_detail(stage, message, None)
    }

    /// Build a stage-tagged error carrying a structured detail payload.
    pub fn stage_with_detail(
        stage: PipelineStage,
        message: impl Into<String>,
        detail: Option<Value>,
    ) -> Self {
        let message = message.into();
        match stage {
            PipelineStage::Load => Self::Load { message, detail },
            PipelineStage::Validate => Self::Validate { message, detail },
            PipelineStage::Replay => Self::Replay { message, detail },
            PipelineStage::Rules => Self::Rules { message, detail },
            PipelineStage::Process => Self::Process { message, detail },
            PipelineStage::Export => Self::Export { message, detail },
            // received/done/unknown are not error-raising stages
            _ => Self::Internal(message),
        }
    }

    /// The wire stage string the orchestrator keys on.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Load { .. } => PipelineStage::Load.wire_name(),
            Self::Validate { .. } => PipelineStage::Validate.wire_name(),
            Self::Replay { .. } => PipelineStage::Replay.wire_name(),
            Self::Rules { .. } => PipelineStage::Rules.wire_name(),
            Self::Process { .. } => PipelineStage::Process.wire_name(),
            Self::Export { .. } => PipelineStage::Export.wire_name(),
            Self::Config(_)
            | Self::Io(_)
            | Self::Polars(_)
            | Self::Json(_)
            | Self::Internal(_) => PipelineStage::Unknown.wire_name(),
        }
    }

    /// Structured detail payload, if the error carries one.
    pub fn detail(&self) -> Option<&Value> {
        match self {
            Self::Load { detail, .. }
            | Self::Validate { detail, .. }
            | Self::Replay { detail, .. }
            | Self::Rules { detail, .. }
            | Self::Process { detail, .. }
            | Self::Export { detail, .. } => detail.as_ref(),
            _ => None,
        }
    }
}

/// Errors serialize as `{stage, message, detail}` for the failure response.
impl Serialize for PipelineError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("PipelineError", 3)?;
        state.serialize_field("stage", &self.stage())?;
        state.serialize_field("message", &self.to_string())?;
        state.serialize_field("detail", &self.detail())?;
        state.end()
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for retagging untyped errors with a pipeline stage.
pub trait ResultExt<T> {
    /// Tag the error with a stage, keeping the original message.
    fn stage(self, stage: PipelineStage) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn stage(self, stage: PipelineStage) -> Result<T> {
        self.map_err(|e| match e {
            // already stage-tagged errors keep their tag
            e @ (PipelineError::Load { .. }
            | PipelineError::Validate { .. }
            | PipelineError::Replay { .. }
            | PipelineError::Rules { .. }
            | PipelineError::Process { .. }
            | PipelineError::Export { .. }) => e,
            other => PipelineError::stage_msg(stage, other.to_string()),
        })
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn stage(self, stage: PipelineStage) -> Result<T> {
        self.map_err(|e| PipelineError::stage_msg(stage, e.to_string()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn stage(self, stage: PipelineStage) -> Result<T> {
        self.map_err(|e| PipelineError::stage_msg(stage, e.to_string()))
    }
}
