//! On-disk working directories for schema checker runs.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use specforge_core::{normalize_fragment_path, Fragment, ProjectId};
use tokio::fs;
use tracing::debug;

use crate::error::PipelineError;

/// Root under which each project gets its own directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

/// A project directory holding exactly the project's current fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedProject {
    pub dir: PathBuf,
    /// Fragment paths relative to `dir`, sorted.
    pub files: Vec<String>,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_dir(&self, project_id: ProjectId) -> PathBuf {
        self.root.join(project_id.to_string())
    }

    /// Write all fragments under the project directory, removing whatever
    /// was there before.
    pub async fn materialize(
        &self,
        project_id: ProjectId,
        fragments: &[Fragment],
    ) -> Result<MaterializedProject, PipelineError> {
        let dir = self.project_dir(project_id);
        reset_dir(&dir).await?;

        let mut files = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            let relative = normalize_fragment_path(&fragment.path);
            let target = dir.join(&relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| PipelineError::workspace(parent, e))?;
            }
            fs::write(&target, fragment.content.as_bytes())
                .await
                .map_err(|e| PipelineError::workspace(&target, e))?;
            files.push(relative);
        }
        files.sort();
        files.dedup();

        debug!(project_id = %project_id, files = files.len(), "workspace materialized");
        Ok(MaterializedProject { dir, files })
    }
}

async fn reset_dir(dir: &Path) -> Result<(), PipelineError> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(PipelineError::workspace(dir, e)),
    }
    fs::create_dir_all(dir)
        .await
        .map_err(|e| PipelineError::workspace(dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use specforge_core::FragmentId;

    fn fragment(project_id: ProjectId, path: &str, content: &str) -> Fragment {
        let now = Utc::now();
        Fragment {
            fragment_id: FragmentId::now_v7(),
            project_id,
            path: path.to_string(),
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_materialize_writes_nested_files() {
        let tmp = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(tmp.path());
        let project_id = ProjectId::now_v7();
        let fragments = vec![
            fragment(project_id, "b.cue", "b: 1"),
            fragment(project_id, "nested/a.cue", "a: 1"),
        ];

        let project = workspace.materialize(project_id, &fragments).await.unwrap();
        assert_eq!(project.files, vec!["b.cue", "nested/a.cue"]);
        let content = std::fs::read_to_string(project.dir.join("nested/a.cue")).unwrap();
        assert_eq!(content, "a: 1");
    }

    #[tokio::test]
    async fn test_materialize_drops_stale_files() {
        let tmp = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(tmp.path());
        let project_id = ProjectId::now_v7();

        workspace
            .materialize(project_id, &[fragment(project_id, "old.cue", "x: 1")])
            .await
            .unwrap();
        let project = workspace
            .materialize(project_id, &[fragment(project_id, "new.cue", "x: 2")])
            .await
            .unwrap();

        assert!(!project.dir.join("old.cue").exists());
        assert!(project.dir.join("new.cue").exists());
    }
}
