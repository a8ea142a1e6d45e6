//! Assertion engine.
//!
//! Assertions are filter queries run by the query tool against the resolved
//! document. The document is written once per run to a scratch file that
//! every query reads; the file is removed when the run ends, whatever the
//! outcome.

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use specforge_core::{canonical_json, AssertionStrategyKind, ToolError, ValidationFinding};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::checker::QueryTool;
use crate::error::PipelineError;
use crate::tool::{ToolInvocation, ToolOutput, ToolRunner};

/// Query counting string leaves that still contain a `${...}` token.
pub const UNRESOLVED_TOKEN_QUERY: &str =
    r#"[.. | strings | select(test("\\$\\{[^}]*\\}"))] | length"#;

// ============================================================================
// ASSERTIONS
// ============================================================================

/// Comparison applied by a threshold assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "<=")]
    AtMost,
    #[serde(rename = ">=")]
    AtLeast,
    #[serde(rename = "==")]
    Equal,
}

impl Comparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AtMost => "<=",
            Self::AtLeast => ">=",
            Self::Equal => "==",
        }
    }

    pub fn holds(&self, actual: f64, threshold: f64) -> bool {
        match self {
            Self::AtMost => actual <= threshold,
            Self::AtLeast => actual >= threshold,
            Self::Equal => actual == threshold,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The query must print a number that satisfies the comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdAssertion {
    pub query: String,
    pub comparator: Comparator,
    pub threshold: f64,
    pub description: String,
}

/// The query must print something truthy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistenceAssertion {
    pub query: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Assertion {
    Threshold(ThresholdAssertion),
    Existence(ExistenceAssertion),
}

impl Assertion {
    pub fn threshold(
        query: impl Into<String>,
        comparator: Comparator,
        threshold: f64,
        description: impl Into<String>,
    ) -> Self {
        Self::Threshold(ThresholdAssertion {
            query: query.into(),
            comparator,
            threshold,
            description: description.into(),
        })
    }

    pub fn existence(query: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Existence(ExistenceAssertion {
            query: query.into(),
            description: description.into(),
        })
    }

    /// No string in the document may contain an unresolved `${...}` token.
    pub fn no_unresolved_tokens() -> Self {
        Self::threshold(
            UNRESOLVED_TOKEN_QUERY,
            Comparator::Equal,
            0.0,
            "No unresolved template tokens remain",
        )
    }

    pub fn query(&self) -> &str {
        match self {
            Self::Threshold(a) => &a.query,
            Self::Existence(a) => &a.query,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Threshold(a) => &a.description,
            Self::Existence(a) => &a.description,
        }
    }

    /// Judge a finished query. Returns a finding when the assertion fails.
    pub fn evaluate(&self, output: &ToolOutput) -> Option<ValidationFinding> {
        if !output.success() {
            return Some(
                ValidationFinding::assertion(format!(
                    "{}: query failed",
                    self.description()
                ))
                .with_details(json!({
                    "query": self.query(),
                    "exit_code": output.exit_code,
                    "stderr": output.stderr.trim(),
                })),
            );
        }

        match self {
            Self::Threshold(a) => {
                let Some(actual) = parse_number(&output.stdout) else {
                    return Some(
                        ValidationFinding::assertion(format!(
                            "{}: query did not produce a number",
                            a.description
                        ))
                        .with_details(json!({
                            "query": a.query,
                            "output": output.stdout.trim(),
                            "stderr": output.stderr.trim(),
                        })),
                    );
                };
                if a.comparator.holds(actual, a.threshold) {
                    None
                } else {
                    Some(
                        ValidationFinding::assertion(format!(
                            "{}: expected {} {}, got {}",
                            a.description, a.comparator, a.threshold, actual
                        ))
                        .with_details(json!({
                            "query": a.query,
                            "actual": actual,
                            "comparator": a.comparator.as_str(),
                            "threshold": a.threshold,
                        })),
                    )
                }
            }
            Self::Existence(a) => {
                if is_truthy(&output.stdout) {
                    None
                } else {
                    Some(
                        ValidationFinding::assertion(format!(
                            "{}: query returned no result",
                            a.description
                        ))
                        .with_details(json!({
                            "query": a.query,
                            "output": output.stdout.trim(),
                        })),
                    )
                }
            }
        }
    }
}

fn parse_number(stdout: &str) -> Option<f64> {
    let text = stdout.trim();
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.as_f64())
        .or_else(|| text.parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

/// Empty output and `null`, `false`, `[]`, `{}`, `""` are falsy.
pub fn is_truthy(stdout: &str) -> bool {
    let text = stdout.trim();
    if text.is_empty() {
        return false;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Null) | Ok(Value::Bool(false)) => false,
        Ok(Value::Array(items)) => !items.is_empty(),
        Ok(Value::Object(map)) => !map.is_empty(),
        Ok(Value::String(s)) => !s.is_empty(),
        // Numbers, `true` and multi-value output all count.
        _ => true,
    }
}

// ============================================================================
// PLANS
// ============================================================================

/// Ordered list of assertions to run against a resolved document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionPlan {
    assertions: Vec<Assertion>,
}

impl Default for AssertionPlan {
    fn default() -> Self {
        Self {
            assertions: vec![Assertion::no_unresolved_tokens()],
        }
    }
}

impl AssertionPlan {
    /// A plan with no assertions at all.
    pub fn empty() -> Self {
        Self {
            assertions: Vec::new(),
        }
    }

    pub fn with(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    pub fn push(&mut self, assertion: Assertion) {
        self.assertions.push(assertion);
    }

    pub fn assertions(&self) -> &[Assertion] {
        &self.assertions
    }

    pub fn len(&self) -> usize {
        self.assertions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assertions.is_empty()
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Runs an assertion plan with the configured strategy.
#[derive(Clone)]
pub struct AssertionEngine {
    runner: Arc<dyn ToolRunner>,
    query_tool: QueryTool,
    strategy: AssertionStrategyKind,
}

impl fmt::Debug for AssertionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssertionEngine")
            .field("query_tool", &self.query_tool)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl AssertionEngine {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        query_tool: QueryTool,
        strategy: AssertionStrategyKind,
    ) -> Self {
        Self {
            runner,
            query_tool,
            strategy,
        }
    }

    pub fn strategy(&self) -> AssertionStrategyKind {
        self.strategy
    }

    pub fn with_strategy(mut self, strategy: AssertionStrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// Run every assertion of the plan. Findings come back in plan order
    /// regardless of strategy.
    ///
    /// A query that cannot be run at all (spawn failure, timeout) fails the
    /// whole run; under the parallel strategy the remaining queries still
    /// finish first.
    #[instrument(skip(self, plan, resolved), fields(assertions = plan.len(), strategy = ?self.strategy))]
    pub async fn run(
        &self,
        plan: &AssertionPlan,
        resolved: &Value,
    ) -> Result<Vec<ValidationFinding>, PipelineError> {
        if plan.is_empty() {
            return Ok(Vec::new());
        }

        let scratch = write_scratch(resolved)?;
        let invocations: Vec<ToolInvocation> = plan
            .assertions()
            .iter()
            .map(|a| self.query_tool.invocation(a.query(), scratch.path()))
            .collect();

        let outputs = match self.strategy {
            AssertionStrategyKind::Parallel => self.run_parallel(&invocations).await,
            AssertionStrategyKind::Sequential => self.run_sequential(&invocations).await,
        };
        drop(scratch);

        let mut findings = Vec::new();
        let mut first_error: Option<ToolError> = None;
        for (assertion, output) in plan.assertions().iter().zip(outputs) {
            match output {
                Ok(output) => findings.extend(assertion.evaluate(&output)),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e.into());
        }

        debug!(failed = findings.len(), "assertions evaluated");
        Ok(findings)
    }

    async fn run_parallel(
        &self,
        invocations: &[ToolInvocation],
    ) -> Vec<Result<ToolOutput, ToolError>> {
        join_all(invocations.iter().map(|inv| self.runner.run(inv))).await
    }

    async fn run_sequential(
        &self,
        invocations: &[ToolInvocation],
    ) -> Vec<Result<ToolOutput, ToolError>> {
        let mut outputs = Vec::with_capacity(invocations.len());
        for inv in invocations {
            outputs.push(self.runner.run(inv).await);
        }
        outputs
    }
}

fn write_scratch(resolved: &Value) -> Result<NamedTempFile, PipelineError> {
    let mut scratch = tempfile::Builder::new()
        .prefix("specforge-resolved-")
        .suffix(".json")
        .tempfile()
        .map_err(|e| PipelineError::workspace(&std::env::temp_dir(), e))?;
    scratch
        .write_all(canonical_json(resolved).as_bytes())
        .and_then(|()| scratch.flush())
        .map_err(|e| PipelineError::workspace(scratch.path(), e))?;
    Ok(scratch)
}
