//! External tool runner.
//!
//! The schema checker and the query tool are separate processes. Every call
//! is bounded by a timeout; a child that outlives it is killed when its
//! handle is dropped.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use specforge_core::ToolError;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// One process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Program and arguments joined for log lines.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Text to mine for diagnostics: stderr, or stdout when stderr is empty.
    pub fn diagnostics(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Capability to run an external program.
///
/// A non-zero exit is a normal `ToolOutput`; `Err` is reserved for spawn
/// failures, timeouts and I/O errors.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError>;
}

/// Runs tools as OS processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessToolRunner;

impl ProcessToolRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRunner for ProcessToolRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        debug!(command = %invocation.display(), "running tool");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &invocation.cwd {
            cmd.current_dir(cwd);
        }

        let started = Instant::now();
        let child = cmd.spawn().map_err(|e| ToolError::SpawnFailed {
            program: invocation.program.clone(),
            reason: e.to_string(),
        })?;

        // On timeout the future is dropped together with the child, which
        // kills it.
        match timeout(invocation.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let result = ToolOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    exit_code: output.status.code(),
                    duration: started.elapsed(),
                };
                debug!(
                    program = %invocation.program,
                    exit_code = ?result.exit_code,
                    elapsed_ms = result.duration.as_millis() as u64,
                    "tool finished"
                );
                Ok(result)
            }
            Ok(Err(e)) => Err(ToolError::Io {
                program: invocation.program.clone(),
                reason: e.to_string(),
            }),
            Err(_) => {
                warn!(command = %invocation.display(), "tool timed out");
                Err(ToolError::TimedOut {
                    program: invocation.program.clone(),
                    timeout_ms: invocation.timeout.as_millis() as u64,
                })
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> ToolInvocation {
        ToolInvocation::new("sh", timeout).arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let output = ProcessToolRunner::new()
            .run(&sh("echo out; echo err >&2; exit 3", Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
        assert_eq!(output.diagnostics().trim(), "err");
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let invocation = ToolInvocation::new("cat", Duration::from_secs(5))
            .arg("marker.txt")
            .current_dir(dir.path());
        let output = ProcessToolRunner::new().run(&invocation).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "here");
    }

    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let result = ProcessToolRunner::new()
            .run(&sh("sleep 5", Duration::from_millis(100)))
            .await;
        assert!(matches!(
            result,
            Err(ToolError::TimedOut { timeout_ms: 100, .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_failure() {
        let invocation =
            ToolInvocation::new("specforge-no-such-program", Duration::from_secs(1));
        let result = ProcessToolRunner::new().run(&invocation).await;
        assert!(matches!(result, Err(ToolError::SpawnFailed { .. })));
    }

    #[test]
    fn test_display_joins_args() {
        let invocation = ToolInvocation::new("jq", Duration::from_secs(1))
            .args(["-c", "."])
            .arg("doc.json");
        assert_eq!(invocation.display(), "jq -c . doc.json");
    }
}
