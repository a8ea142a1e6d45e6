//! Pipeline-internal errors.
//!
//! None of these escape the pipeline: each becomes a single `custom`
//! finding on the validation result.

use std::path::Path;

use serde_json::json;
use specforge_core::{ToolError, ValidationFinding};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Workspace I/O failed at {path}: {reason}")]
    Workspace { path: String, reason: String },

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Exported document is not valid JSON: {reason}")]
    Json { reason: String },

    #[error("Project has no fragments to validate")]
    NoFragments,
}

impl PipelineError {
    pub(crate) fn workspace(path: &Path, err: std::io::Error) -> Self {
        Self::Workspace {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }

    /// Stable machine-readable tag for the failure.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Workspace { .. } => "workspace_io",
            Self::Tool(ToolError::SpawnFailed { .. }) => "tool_spawn",
            Self::Tool(ToolError::TimedOut { .. }) => "tool_timeout",
            Self::Tool(ToolError::Io { .. }) => "tool_io",
            Self::Json { .. } => "invalid_json",
            Self::NoFragments => "no_fragments",
        }
    }

    pub fn into_finding(self) -> ValidationFinding {
        let code = self.code();
        ValidationFinding::custom(self.to_string()).with_details(json!({ "code": code }))
    }
}
