//! Core entity structures

use crate::{EventId, FragmentId, ProjectId, SpecHash, Timestamp, VersionId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Project - owner of fragments, versions and the revision log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Project {
    pub project_id: ProjectId,
    pub name: String,
    /// Event the project's history is positioned at. `None` means "latest".
    pub event_head_id: Option<EventId>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            project_id: ProjectId::now_v7(),
            name: name.into(),
            event_head_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fragment - a named, user-edited unit of specification text.
/// Unique per (project, normalized path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Fragment {
    pub fragment_id: FragmentId,
    pub project_id: ProjectId,
    pub path: String,
    pub content: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

/// One entry in a fragment's revision history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct FragmentRevision {
    pub fragment_id: FragmentId,
    /// Starts at 1 and increases by one per create/update.
    pub revision: u32,
    pub content: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

/// Version - immutable, deduplicated snapshot of a resolved document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Version {
    pub version_id: VersionId,
    pub project_id: ProjectId,
    pub spec_hash: SpecHash,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub resolved: Value,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

impl Version {
    /// Build a version for a resolved document, hashing it.
    pub fn new(project_id: ProjectId, resolved: Value) -> Self {
        Self {
            version_id: VersionId::now_v7(),
            project_id,
            spec_hash: SpecHash::of(&resolved),
            resolved,
            created_at: Utc::now(),
        }
    }
}

/// Event - an immutable record of one mutation or pipeline outcome.
///
/// Only `is_active` and `reverted_at` ever change after the event is
/// appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Event {
    pub event_id: EventId,
    pub project_id: ProjectId,
    pub event_type: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub data: Value,
    pub is_active: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub reverted_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    /// Insertion counter; breaks ties between equal timestamps.
    pub sequence: u64,
}

impl Event {
    /// Key that orders a project's history.
    pub fn ordering_key(&self) -> (Timestamp, u64) {
        (self.created_at, self.sequence)
    }

    /// Spec hash recorded in the event's data, if any.
    pub fn spec_hash(&self) -> Option<SpecHash> {
        spec_hash_in(&self.data)
    }
}

/// Read the `spec_hash` key out of event data.
pub fn spec_hash_in(data: &Value) -> Option<SpecHash> {
    data.get(crate::event::SPEC_HASH_KEY)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(SpecHash::from_hex)
}
