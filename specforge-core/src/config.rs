//! Configuration types

use crate::{ConfigError, ForgeResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How the assertion plan is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionStrategyKind {
    /// Fire all assertion subprocesses concurrently
    #[default]
    Parallel,
    /// Run one assertion at a time
    Sequential,
}

impl FromStr for AssertionStrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parallel" => Ok(Self::Parallel),
            "sequential" => Ok(Self::Sequential),
            other => Err(ConfigError::InvalidValue {
                field: "assertion_strategy".to_string(),
                value: other.to_string(),
                reason: "expected 'parallel' or 'sequential'".to_string(),
            }),
        }
    }
}

/// Master configuration for the validation pipeline and recorder.
///
/// Passed explicitly into each component's constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// Directory under which per-project workspaces are materialized.
    pub workspace_root: PathBuf,
    /// Schema checker executable (vet/export).
    pub checker_program: String,
    /// Query-filter executable used by assertions.
    pub query_program: String,
    /// Timeout applied to every external tool invocation, in milliseconds.
    pub tool_timeout_ms: u64,
    pub assertion_strategy: AssertionStrategyKind,
    /// Treat a document without a `capabilities` field as an error.
    pub require_capabilities: bool,
    /// Append a `validation_failed` event when a mutation does not validate.
    pub record_failures: bool,
    /// Capacity of the in-memory version cache.
    pub version_cache_entries: usize,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir().join("specforge"),
            checker_program: "cue".to_string(),
            query_program: "jq".to_string(),
            tool_timeout_ms: 10_000,
            assertion_strategy: AssertionStrategyKind::Parallel,
            require_capabilities: false,
            record_failures: true,
            version_cache_entries: 1024,
        }
    }
}

impl ForgeConfig {
    /// Create ForgeConfig from environment variables.
    ///
    /// Environment variables:
    /// - `SPECFORGE_WORKSPACE_ROOT`: Workspace directory (default: `<tmp>/specforge`)
    /// - `SPECFORGE_CHECKER`: Schema checker program (default: cue)
    /// - `SPECFORGE_QUERY_TOOL`: Query-filter program (default: jq)
    /// - `SPECFORGE_TOOL_TIMEOUT_MS`: Tool timeout in ms (default: 10000)
    /// - `SPECFORGE_ASSERTION_STRATEGY`: "parallel" or "sequential" (default: parallel)
    /// - `SPECFORGE_REQUIRE_CAPABILITIES`: "true" or "false" (default: false)
    /// - `SPECFORGE_RECORD_FAILURES`: "true" or "false" (default: true)
    /// - `SPECFORGE_VERSION_CACHE_ENTRIES`: Cache capacity (default: 1024)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let workspace_root = std::env::var("SPECFORGE_WORKSPACE_ROOT")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.workspace_root);

        let checker_program =
            std::env::var("SPECFORGE_CHECKER").unwrap_or(defaults.checker_program);

        let query_program =
            std::env::var("SPECFORGE_QUERY_TOOL").unwrap_or(defaults.query_program);

        let tool_timeout_ms = std::env::var("SPECFORGE_TOOL_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.tool_timeout_ms);

        let assertion_strategy = std::env::var("SPECFORGE_ASSERTION_STRATEGY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.assertion_strategy);

        let require_capabilities = std::env::var("SPECFORGE_REQUIRE_CAPABILITIES")
            .ok()
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(defaults.require_capabilities);

        let record_failures = std::env::var("SPECFORGE_RECORD_FAILURES")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(defaults.record_failures);

        let version_cache_entries = std::env::var("SPECFORGE_VERSION_CACHE_ENTRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.version_cache_entries);

        Self {
            workspace_root,
            checker_program,
            query_program,
            tool_timeout_ms,
            assertion_strategy,
            require_capabilities,
            record_failures,
            version_cache_entries,
        }
    }

    /// Parse a TOML document. Missing keys take their default values.
    pub fn from_toml_str(source: &str) -> ForgeResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - tool_timeout_ms > 0
    /// - checker_program and query_program are non-empty
    /// - version_cache_entries > 0
    pub fn validate(&self) -> ForgeResult<()> {
        if self.tool_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tool_timeout_ms".to_string(),
                value: self.tool_timeout_ms.to_string(),
                reason: "tool_timeout_ms must be greater than 0".to_string(),
            }
            .into());
        }

        for (field, value) in [
            ("checker_program", &self.checker_program),
            ("query_program", &self.query_program),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.clone(),
                    reason: format!("{} must not be empty", field),
                }
                .into());
            }
        }

        if self.version_cache_entries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "version_cache_entries".to_string(),
                value: "0".to_string(),
                reason: "version_cache_entries must be greater than 0".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ForgeError;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ForgeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ForgeConfig {
            tool_timeout_ms: 0,
            ..ForgeConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ForgeError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "tool_timeout_ms"
        ));
    }

    #[test]
    fn test_empty_program_rejected() {
        let config = ForgeConfig {
            query_program: "  ".to_string(),
            ..ForgeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_partial_document() {
        let config = ForgeConfig::from_toml_str(
            r#"
            checker_program = "/opt/cue/bin/cue"
            tool_timeout_ms = 2500
            assertion_strategy = "sequential"
            "#,
        )
        .unwrap();
        assert_eq!(config.checker_program, "/opt/cue/bin/cue");
        assert_eq!(config.tool_timeout(), Duration::from_millis(2500));
        assert_eq!(config.assertion_strategy, AssertionStrategyKind::Sequential);
        assert_eq!(config.query_program, "jq");
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let err = ForgeConfig::from_toml_str("tool_timeout_ms = [").unwrap_err();
        assert!(matches!(err, ForgeError::Config(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!(
            "Parallel".parse::<AssertionStrategyKind>().unwrap(),
            AssertionStrategyKind::Parallel
        );
        assert!("random".parse::<AssertionStrategyKind>().is_err());
    }
}
