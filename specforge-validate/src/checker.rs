//! Schema checker and query tool command lines.

use std::path::Path;
use std::time::Duration;

use specforge_core::{ForgeConfig, ToolError};

use crate::tool::{ToolInvocation, ToolOutput, ToolRunner};
use crate::workspace::MaterializedProject;

/// How to invoke the schema checker in vet and export mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaChecker {
    pub program: String,
    /// Arguments placed before the file list in vet mode.
    pub vet_args: Vec<String>,
    /// Arguments placed before the file list in export mode.
    pub export_args: Vec<String>,
    /// Arguments placed after the file list in export mode.
    pub export_suffix: Vec<String>,
    pub timeout: Duration,
}

impl SchemaChecker {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            vet_args: vec!["vet".to_string()],
            export_args: vec!["export".to_string()],
            export_suffix: vec!["--out".to_string(), "json".to_string()],
            timeout,
        }
    }

    pub fn from_config(config: &ForgeConfig) -> Self {
        Self::new(config.checker_program.clone(), config.tool_timeout())
    }

    pub fn vet_invocation(&self, project: &MaterializedProject) -> ToolInvocation {
        ToolInvocation::new(self.program.clone(), self.timeout)
            .args(self.vet_args.iter().cloned())
            .args(project.files.iter().cloned())
            .current_dir(project.dir.clone())
    }

    pub fn export_invocation(&self, project: &MaterializedProject) -> ToolInvocation {
        ToolInvocation::new(self.program.clone(), self.timeout)
            .args(self.export_args.iter().cloned())
            .args(project.files.iter().cloned())
            .args(self.export_suffix.iter().cloned())
            .current_dir(project.dir.clone())
    }

    pub async fn vet(
        &self,
        runner: &dyn ToolRunner,
        project: &MaterializedProject,
    ) -> Result<ToolOutput, ToolError> {
        runner.run(&self.vet_invocation(project)).await
    }

    pub async fn export(
        &self,
        runner: &dyn ToolRunner,
        project: &MaterializedProject,
    ) -> Result<ToolOutput, ToolError> {
        runner.run(&self.export_invocation(project)).await
    }
}

/// How to run a filter query against a JSON file: `<program> <args> <query> <file>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTool {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl QueryTool {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: vec!["-c".to_string()],
            timeout,
        }
    }

    pub fn from_config(config: &ForgeConfig) -> Self {
        Self::new(config.query_program.clone(), config.tool_timeout())
    }

    pub fn invocation(&self, query: &str, document: &Path) -> ToolInvocation {
        ToolInvocation::new(self.program.clone(), self.timeout)
            .args(self.args.iter().cloned())
            .arg(query)
            .arg(document.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn project() -> MaterializedProject {
        MaterializedProject {
            dir: PathBuf::from("/tmp/p"),
            files: vec!["a.cue".to_string(), "b.cue".to_string()],
        }
    }

    #[test]
    fn test_vet_and_export_command_lines() {
        let checker = SchemaChecker::new("cue", Duration::from_secs(1));
        assert_eq!(checker.vet_invocation(&project()).display(), "cue vet a.cue b.cue");
        let export = checker.export_invocation(&project());
        assert_eq!(export.display(), "cue export a.cue b.cue --out json");
        assert_eq!(export.cwd, Some(PathBuf::from("/tmp/p")));
    }

    #[test]
    fn test_query_command_line() {
        let tool = QueryTool::from_config(&ForgeConfig::default());
        let invocation = tool.invocation(".a", Path::new("/tmp/doc.json"));
        assert_eq!(invocation.display(), "jq -c .a /tmp/doc.json");
    }
}
