//! Validation findings and the structured result of a validation run.

use crate::SpecHash;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Category of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum FindingKind {
    /// The schema checker rejected the merged spec.
    #[serde(rename = "schema")]
    Schema,
    /// A declared invariant over the resolved data failed.
    #[serde(rename = "assertion")]
    Assertion,
    /// A structural rule failed, or the pipeline itself broke.
    #[serde(rename = "custom")]
    Custom,
    /// Two capability ids overlap by dot-prefix.
    #[serde(rename = "warning:duplicate")]
    DuplicateWarning,
    /// Reserved for coverage checks.
    #[serde(rename = "warning:coverage")]
    CoverageWarning,
}

impl FindingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::Schema => "schema",
            FindingKind::Assertion => "assertion",
            FindingKind::Custom => "custom",
            FindingKind::DuplicateWarning => "warning:duplicate",
            FindingKind::CoverageWarning => "warning:coverage",
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            FindingKind::DuplicateWarning | FindingKind::CoverageWarning
        )
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a diagnostic inside a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SourceLocation {
    pub file: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

/// One error or warning produced by a validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ValidationFinding {
    #[serde(rename = "type")]
    pub kind: FindingKind,
    pub message: String,
    pub location: Option<SourceLocation>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<Value>,
}

impl ValidationFinding {
    pub fn new(kind: FindingKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            details: None,
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::new(FindingKind::Schema, message)
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(FindingKind::Assertion, message)
    }

    pub fn custom(message: impl Into<String>) -> Self {
        Self::new(FindingKind::Custom, message)
    }

    pub fn duplicate_warning(message: impl Into<String>) -> Self {
        Self::new(FindingKind::DuplicateWarning, message)
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Structured outcome of validating a project.
///
/// `spec_hash` is only set when `success` is true; callers persist a version
/// only in that case. `resolved` is present whenever export succeeded, even
/// if a later step failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ValidationResult {
    pub success: bool,
    pub spec_hash: Option<SpecHash>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub resolved: Option<Value>,
    pub errors: Vec<ValidationFinding>,
    pub warnings: Vec<ValidationFinding>,
}

impl ValidationResult {
    /// Split findings into errors and warnings and decide success.
    ///
    /// A run without a resolved document never succeeds.
    pub fn from_findings(resolved: Option<Value>, findings: Vec<ValidationFinding>) -> Self {
        let (warnings, errors): (Vec<_>, Vec<_>) =
            findings.into_iter().partition(|f| f.kind.is_warning());
        let success = errors.is_empty() && resolved.is_some();
        let spec_hash = if success {
            resolved.as_ref().map(SpecHash::of)
        } else {
            None
        };
        Self {
            success,
            spec_hash,
            resolved,
            errors,
            warnings,
        }
    }

    /// A run that broke before producing findings of its own.
    pub fn infrastructure_failure(finding: ValidationFinding) -> Self {
        Self::from_findings(None, vec![finding])
    }

    /// Compact summary suitable for a `validation_failed` event.
    pub fn error_summary(&self) -> Value {
        let errors: Vec<Value> = self
            .errors
            .iter()
            .map(|e| json!({ "type": e.kind.as_str(), "message": e.message }))
            .collect();
        json!({
            "error_count": self.errors.len(),
            "warning_count": self.warnings.len(),
            "errors": errors,
        })
    }
}
