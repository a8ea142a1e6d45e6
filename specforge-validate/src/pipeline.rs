//! Spec validation pipeline.
//!
//! materialize → vet → export → hash → assertions → structural checks.
//! The pipeline always produces a [`ValidationResult`]; infrastructure
//! failures are folded into a single `custom` finding.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use specforge_core::{ForgeConfig, Fragment, ProjectId, ValidationFinding, ValidationResult};
use tracing::{debug, info, instrument, warn};

use crate::assertions::{AssertionEngine, AssertionPlan};
use crate::checker::{QueryTool, SchemaChecker};
use crate::diagnostics::parse_diagnostics;
use crate::error::PipelineError;
use crate::structural::{validate_structure, StructuralRules};
use crate::tool::ToolRunner;
use crate::workspace::Workspace;

pub struct SpecPipeline {
    runner: Arc<dyn ToolRunner>,
    workspace: Workspace,
    checker: SchemaChecker,
    assertions: AssertionEngine,
    plan: AssertionPlan,
    rules: StructuralRules,
}

impl fmt::Debug for SpecPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecPipeline")
            .field("workspace", &self.workspace)
            .field("checker", &self.checker)
            .field("assertions", &self.assertions)
            .field("plan", &self.plan)
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

impl SpecPipeline {
    /// Build a pipeline from configuration, with the default assertion plan.
    pub fn new(config: &ForgeConfig, runner: Arc<dyn ToolRunner>) -> Self {
        let assertions = AssertionEngine::new(
            Arc::clone(&runner),
            QueryTool::from_config(config),
            config.assertion_strategy,
        );
        Self {
            runner,
            workspace: Workspace::new(config.workspace_root.clone()),
            checker: SchemaChecker::from_config(config),
            assertions,
            plan: AssertionPlan::default(),
            rules: StructuralRules {
                require_capabilities: config.require_capabilities,
            },
        }
    }

    pub fn with_plan(mut self, plan: AssertionPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_checker(mut self, checker: SchemaChecker) -> Self {
        self.checker = checker;
        self
    }

    pub fn with_assertion_engine(mut self, engine: AssertionEngine) -> Self {
        self.assertions = engine;
        self
    }

    pub fn plan(&self) -> &AssertionPlan {
        &self.plan
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Validate the given fragments of a project. Never fails.
    #[instrument(skip(self, fragments), fields(project_id = %project_id, fragments = fragments.len()))]
    pub async fn validate_project(
        &self,
        project_id: ProjectId,
        fragments: &[Fragment],
    ) -> ValidationResult {
        let result = match self.run(project_id, fragments).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, code = e.code(), "validation aborted");
                ValidationResult::infrastructure_failure(e.into_finding())
            }
        };
        info!(
            success = result.success,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            spec_hash = result.spec_hash.as_ref().map(|h| h.as_str()).unwrap_or(""),
            "validation finished"
        );
        result
    }

    async fn run(
        &self,
        project_id: ProjectId,
        fragments: &[Fragment],
    ) -> Result<ValidationResult, PipelineError> {
        if fragments.is_empty() {
            return Err(PipelineError::NoFragments);
        }
        let project = self.workspace.materialize(project_id, fragments).await?;
        let runner = self.runner.as_ref();

        let vet = self.checker.vet(runner, &project).await?;
        let mut findings: Vec<ValidationFinding> = if vet.success() {
            Vec::new()
        } else {
            parse_diagnostics(&self.checker.program, &vet)
        };
        debug!(schema_errors = findings.len(), "vet finished");

        let export = self.checker.export(runner, &project).await?;
        if !export.success() {
            findings.extend(parse_diagnostics(&self.checker.program, &export));
            return Ok(ValidationResult::from_findings(None, findings));
        }
        let resolved: Value =
            serde_json::from_str(export.stdout.trim()).map_err(|e| PipelineError::Json {
                reason: e.to_string(),
            })?;

        match self.assertions.run(&self.plan, &resolved).await {
            Ok(failed) => findings.extend(failed),
            Err(e) => {
                warn!(error = %e, "assertion run aborted");
                findings.push(e.into_finding());
            }
        }
        findings.extend(validate_structure(&resolved, self.rules));

        Ok(ValidationResult::from_findings(Some(resolved), findings))
    }
}
