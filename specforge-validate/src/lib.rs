//! SPECFORGE Validate - Spec Validation Pipeline
//!
//! Merges a project's fragments, checks them with an external schema
//! checker, exports and hashes the resolved document, runs assertions and
//! structural checks, and records every mutation as an event.
//!
//! # Components
//!
//! - `ToolRunner` / `ProcessToolRunner`: bounded external process calls
//! - `SchemaChecker` / `QueryTool`: command lines for the two tools
//! - `AssertionEngine` / `AssertionPlan`: threshold and existence queries
//! - `validate_structure`: capability declarations and overlaps
//! - `SpecPipeline`: the validation run itself
//! - `SpecRecorder`: mutation → validation → version → event, one writer
//!   per project

pub mod assertions;
pub mod checker;
pub mod diagnostics;
pub mod error;
pub mod pipeline;
pub mod recorder;
pub mod structural;
pub mod tool;
pub mod workspace;

pub use assertions::{
    is_truthy, Assertion, AssertionEngine, AssertionPlan, Comparator, ExistenceAssertion,
    ThresholdAssertion, UNRESOLVED_TOKEN_QUERY,
};
pub use checker::{QueryTool, SchemaChecker};
pub use diagnostics::{parse_diagnostics, parse_position};
pub use error::PipelineError;
pub use pipeline::SpecPipeline;
pub use recorder::{FragmentMutation, RecordOutcome, SpecRecorder};
pub use structural::{capability_ids, prefix_overlaps, validate_structure, StructuralRules};
pub use tool::{ProcessToolRunner, ToolInvocation, ToolOutput, ToolRunner};
pub use workspace::{MaterializedProject, Workspace};
