//! Structural validators over the resolved document.

use std::collections::BTreeSet;

use serde_json::{json, Value};
use specforge_core::ValidationFinding;

/// Top-level field holding the declared capabilities.
pub const CAPABILITIES_FIELD: &str = "capabilities";

/// Options for the structural checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StructuralRules {
    /// Treat a missing capabilities field as an error.
    pub require_capabilities: bool,
}

/// Capability ids declared by the document, or `None` when the field is
/// absent.
///
/// The field may be an object keyed by id or an array of objects carrying
/// an `id` (bare strings are accepted too).
pub fn capability_ids(resolved: &Value) -> Option<Vec<String>> {
    let field = resolved.get(CAPABILITIES_FIELD)?;
    let ids = match field {
        Value::Object(map) => map.keys().cloned().collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(obj) => obj.get("id").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    Some(ids)
}

/// Run every structural check and return its findings.
pub fn validate_structure(resolved: &Value, rules: StructuralRules) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();
    match capability_ids(resolved) {
        None if rules.require_capabilities => {
            findings.push(
                ValidationFinding::custom("At least one capability must be declared")
                    .with_details(json!({ "field": CAPABILITIES_FIELD })),
            );
        }
        None => {}
        Some(ids) if ids.is_empty() => {
            findings.push(
                ValidationFinding::custom("At least one capability must be declared")
                    .with_details(json!({ "field": CAPABILITIES_FIELD })),
            );
        }
        Some(ids) => findings.extend(prefix_overlaps(&ids)),
    }
    findings
}

/// Warn when one capability id is a dot-prefix of another, e.g. `billing`
/// and `billing.refunds`. Each unordered pair is reported once.
pub fn prefix_overlaps(ids: &[String]) -> Vec<ValidationFinding> {
    let unique: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
    let mut pairs: BTreeSet<(&str, &str)> = BTreeSet::new();
    for parent in &unique {
        for child in &unique {
            if parent != child && is_dot_prefix(parent, child) {
                pairs.insert((parent, child));
            }
        }
    }

    pairs
        .into_iter()
        .map(|(parent, child)| {
            ValidationFinding::duplicate_warning(format!(
                "Capability '{parent}' overlaps with '{child}'"
            ))
            .with_details(json!({ "capabilities": [parent, child] }))
        })
        .collect()
}

fn is_dot_prefix(parent: &str, child: &str) -> bool {
    child
        .strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with('.'))
}
