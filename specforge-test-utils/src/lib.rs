//! SPECFORGE Test Utilities
//!
//! Centralized test infrastructure for the SPECFORGE workspace:
//! - Proptest generators for entity types, paths and documents
//! - A scripted tool runner standing in for the schema checker and query tool
//! - Test fixtures for common scenarios
//! - Custom assertions for SPECFORGE-specific errors

pub mod scripted;

// Re-export mock storage from its source crate
pub use specforge_storage::MockStorage;

// Re-export core types for convenience
pub use specforge_core::{
    EntityIdType, EntityType, Event, EventId, EventLogError, ForgeConfig, ForgeError,
    ForgeResult, Fragment, FragmentId, Project, ProjectId, SpecHash, StorageError, Timestamp,
    Version,
};

pub use scripted::{count_unresolved_tokens, ScriptedToolRunner};

use tracing_subscriber::EnvFilter;

// ============================================================================
// TRACING
// ============================================================================

/// Install a test-friendly subscriber once. `RUST_LOG` controls verbosity;
/// later calls are no-ops.
pub fn init_test_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating SPECFORGE types.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;
    use uuid::Uuid;

    /// Generate a random UUID (for generic ID generation).
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate a random ProjectId.
    pub fn arb_project_id() -> impl Strategy<Value = ProjectId> {
        arb_uuid().prop_map(ProjectId::new)
    }

    /// Generate a random FragmentId.
    pub fn arb_fragment_id() -> impl Strategy<Value = FragmentId> {
        arb_uuid().prop_map(FragmentId::new)
    }

    /// Generate a Timestamp (DateTime<Utc>).
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // Generate timestamps within a reasonable range (2020-2030)
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
        })
    }

    /// Raw, possibly hostile fragment paths: mixed separators, `.`/`..`
    /// segments and empty segments.
    pub fn arb_raw_path() -> impl Strategy<Value = String> {
        let segment = prop_oneof![
            3 => "[a-z][a-z0-9_]{0,6}(\\.cue)?",
            1 => Just(".".to_string()),
            1 => Just("..".to_string()),
            1 => Just(String::new()),
        ];
        (
            prop::collection::vec(segment, 0..5),
            prop::collection::vec(prop_oneof![Just('/'), Just('\\')], 5),
            any::<bool>(),
        )
            .prop_map(|(segments, seps, leading)| {
                let mut path = String::new();
                if leading {
                    path.push('/');
                }
                for (i, segment) in segments.iter().enumerate() {
                    if i > 0 {
                        path.push(seps[i % seps.len()]);
                    }
                    path.push_str(segment);
                }
                path
            })
    }

    /// A well-known or custom event type.
    pub fn arb_event_type() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(specforge_core::event::FRAGMENT_CREATED.to_string()),
            Just(specforge_core::event::FRAGMENT_UPDATED.to_string()),
            Just(specforge_core::event::FRAGMENT_DELETED.to_string()),
            Just(specforge_core::event::SPEC_VALIDATED.to_string()),
            "[a-z][a-z_]{2,12}",
        ]
    }

    /// Arbitrary JSON documents with nested objects and arrays.
    pub fn arb_json_document() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,8}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    /// A set of toy fragments with distinct keys, one field each.
    pub fn arb_fragment_set() -> impl Strategy<Value = Vec<(String, String)>> {
        prop::collection::btree_map("[a-z]{1,6}", any::<i32>(), 1..5).prop_map(|fields| {
            fields
                .into_iter()
                .map(|(key, value)| (format!("{key}.cue"), format!("{key}: {value}")))
                .collect()
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use chrono::Utc;
    use serde_json::Value;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    /// Config pointing at a scratch workspace, with a short tool timeout.
    pub fn test_config(workspace_root: &Path) -> ForgeConfig {
        ForgeConfig {
            workspace_root: workspace_root.to_path_buf(),
            tool_timeout_ms: 2_000,
            ..ForgeConfig::default()
        }
    }

    /// A project already stored in a fresh mock storage.
    pub fn storage_with_project() -> (Arc<MockStorage>, Project) {
        use specforge_storage::StorageTrait;

        let storage = Arc::new(MockStorage::new());
        let project = Project::new("test-project");
        if let Err(e) = storage.project_insert(&project) {
            panic!("fresh storage rejected a project: {e}");
        }
        (storage, project)
    }

    /// An unsaved fragment.
    pub fn test_fragment(project_id: ProjectId, path: &str, content: &str) -> Fragment {
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

    /// An unsaved active event.
    pub fn test_event(project_id: ProjectId, event_type: &str, data: Value) -> Event {
        Event {
            event_id: EventId::now_v7(),
            project_id,
            event_type: event_type.to_string(),
            data,
            is_active: true,
            reverted_at: None,
            created_at: Utc::now(),
            sequence: 0,
        }
    }

    /// Scripted runner with a small delay on queries, so parallel runs
    /// overlap.
    pub fn slow_query_runner() -> ScriptedToolRunner {
        ScriptedToolRunner::default().with_delay("jq", Duration::from_millis(20))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for SPECFORGE-specific errors.

    use super::*;

    /// Assert that a ForgeResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &ForgeResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a ForgeResult is a NotFound storage error.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &ForgeResult<T>, entity_type: EntityType) {
        match result {
            Err(ForgeError::Storage(StorageError::NotFound { entity_type: et, .. })) => {
                assert_eq!(*et, entity_type, "Wrong entity type in NotFound error");
            }
            other => panic!("Expected NotFound error for {:?}, got: {:?}", entity_type, other),
        }
    }

    /// Assert that a ForgeResult is a ForeignEntity storage error.
    #[track_caller]
    pub fn assert_foreign<T: std::fmt::Debug>(result: &ForgeResult<T>) {
        match result {
            Err(ForgeError::Storage(StorageError::ForeignEntity { .. })) => {}
            other => panic!("Expected ForeignEntity error, got: {:?}", other),
        }
    }

    /// Assert that a ForgeResult is an event log error.
    #[track_caller]
    pub fn assert_event_log_error<T: std::fmt::Debug>(result: &ForgeResult<T>) {
        match result {
            Err(ForgeError::EventLog(_)) => {}
            other => panic!("Expected EventLog error, got: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;
    use specforge_core::normalize_fragment_path;

    proptest! {
        #[test]
        fn prop_raw_paths_normalize_safely(path in arb_raw_path()) {
            let normalized = normalize_fragment_path(&path);
            prop_assert!(!normalized.is_empty());
            prop_assert!(!normalized.starts_with('/'));
            prop_assert!(!normalized.contains('\\'));
            prop_assert!(!normalized.split('/').any(|s| s == ".." || s == "." || s.is_empty()));
        }
    }
}
