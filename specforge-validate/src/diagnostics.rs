//! Turning schema checker output into findings.
//!
//! A non-indented line starts a finding. Indented lines either carry a
//! `path:line:column` position or extra context for the current finding.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use specforge_core::{SourceLocation, ValidationFinding};

use crate::tool::ToolOutput;

static POSITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<file>[^\s:][^:]*?):(?P<line>\d+)(?::(?P<col>\d+))?:?$")
        .expect("Invalid position regex")
});

#[derive(Debug, Default)]
struct Pending {
    message: String,
    location: Option<SourceLocation>,
    locations: Vec<Value>,
    context: Vec<String>,
}

impl Pending {
    fn finish(self) -> ValidationFinding {
        let mut finding = ValidationFinding::schema(self.message);
        if let Some(location) = self.location {
            finding = finding.with_location(location);
        }
        if !self.locations.is_empty() || !self.context.is_empty() {
            let mut details = serde_json::Map::new();
            if !self.locations.is_empty() {
                details.insert("locations".to_string(), Value::Array(self.locations));
            }
            if !self.context.is_empty() {
                details.insert("context".to_string(), json!(self.context));
            }
            finding = finding.with_details(Value::Object(details));
        }
        finding
    }
}

/// Parse one position line. Paths are reported relative to the project
/// workspace, so a leading `./` is dropped.
pub fn parse_position(line: &str) -> Option<SourceLocation> {
    let caps = POSITION.captures(line.trim())?;
    let file = caps.name("file")?.as_str();
    let file = file.strip_prefix("./").unwrap_or(file);
    Some(SourceLocation {
        file: file.to_string(),
        line: caps.name("line").and_then(|m| m.as_str().parse().ok()),
        column: caps.name("col").and_then(|m| m.as_str().parse().ok()),
    })
}

/// Split checker output into schema findings.
///
/// Returns at least one finding: when nothing parsable is found, a single
/// finding names the tool and its exit code.
pub fn parse_diagnostics(tool: &str, output: &ToolOutput) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();
    let mut current: Option<Pending> = None;

    for line in output.diagnostics().lines() {
        if line.trim().is_empty() {
            continue;
        }
        let indented = line.starts_with(char::is_whitespace);
        if !indented {
            if let Some(done) = current.take() {
                findings.push(done.finish());
            }
            current = Some(Pending {
                message: line.trim_end().to_string(),
                ..Pending::default()
            });
            continue;
        }

        let Some(pending) = current.as_mut() else {
            // Indented text before any message line starts its own finding.
            current = Some(Pending {
                message: line.trim().to_string(),
                ..Pending::default()
            });
            continue;
        };
        match parse_position(line) {
            Some(location) => {
                pending.locations.push(json!({
                    "file": location.file,
                    "line": location.line,
                    "column": location.column,
                }));
                if pending.location.is_none() {
                    pending.location = Some(location);
                }
            }
            None => pending.context.push(line.trim().to_string()),
        }
    }
    if let Some(done) = current.take() {
        findings.push(done.finish());
    }

    if findings.is_empty() {
        let code = output
            .exit_code
            .map_or_else(|| "a signal".to_string(), |c| format!("code {c}"));
        findings.push(
            ValidationFinding::schema(format!("{tool} failed with {code} and no diagnostics"))
                .with_details(json!({ "exit_code": output.exit_code })),
        );
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use specforge_core::FindingKind;
    use std::time::Duration;

    fn failed(stderr: &str) -> ToolOutput {
        ToolOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code: Some(1),
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_conflict_with_positions() {
        let stderr = "x: conflicting values 2 and 1:\n    ./a.cue:1:4\n    ./b.cue:1:4\n";
        let findings = parse_diagnostics("cue", &failed(stderr));
        assert_eq!(findings.len(), 1);

        let finding = &findings[0];
        assert_eq!(finding.kind, FindingKind::Schema);
        assert_eq!(finding.message, "x: conflicting values 2 and 1:");
        let location = finding.location.as_ref().unwrap();
        assert_eq!(location.file, "a.cue");
        assert_eq!(location.line, Some(1));
        assert_eq!(location.column, Some(4));
        let details = finding.details.as_ref().unwrap();
        assert_eq!(details["locations"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_multiple_findings_and_context() {
        let stderr = "a: incomplete value\n    some context\nb: bad\n    b.cue:3:1\n";
        let findings = parse_diagnostics("cue", &failed(stderr));
        assert_eq!(findings.len(), 2);
        assert!(findings[0].location.is_none());
        assert_eq!(
            findings[0].details.as_ref().unwrap()["context"][0],
            "some context"
        );
        assert_eq!(findings[1].location.as_ref().unwrap().line, Some(3));
    }

    #[test]
    fn test_empty_output_falls_back_to_exit_code() {
        let findings = parse_diagnostics("cue", &failed("  \n"));
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("code 1"));
        assert_eq!(findings[0].details.as_ref().unwrap()["exit_code"], 1);
    }

    #[test]
    fn test_parse_position_variants() {
        let loc = parse_position("  spec.cue:12").unwrap();
        assert_eq!(loc.file, "spec.cue");
        assert_eq!(loc.line, Some(12));
        assert_eq!(loc.column, None);
        assert!(parse_position("  not a position").is_none());
    }
}
