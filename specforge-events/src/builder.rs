//! Builder for event rows.

use chrono::Utc;
use serde_json::{Map, Value};
use specforge_core::event::SPEC_HASH_KEY;
use specforge_core::{Event, EventId, FragmentId, ProjectId, SpecHash};

/// Builder for creating events with structured data.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    project_id: ProjectId,
    event_type: String,
    data: Map<String, Value>,
}

impl EventBuilder {
    /// Create a new event builder for a project.
    pub fn new(project_id: ProjectId, event_type: impl Into<String>) -> Self {
        Self {
            project_id,
            event_type: event_type.into(),
            data: Map::new(),
        }
    }

    /// Set an arbitrary data field.
    pub fn field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Merge an object into the data. Non-object values are ignored.
    pub fn merge(mut self, value: Value) -> Self {
        if let Value::Object(map) = value {
            self.data.extend(map);
        }
        self
    }

    /// Record the fragment path the event concerns.
    pub fn path(self, path: impl Into<String>) -> Self {
        self.field("path", Value::String(path.into()))
    }

    /// Record the fragment the event concerns.
    pub fn fragment(self, fragment_id: FragmentId) -> Self {
        self.field("fragment_id", Value::String(fragment_id.to_string()))
    }

    /// Reference a persisted version.
    pub fn spec_hash(self, spec_hash: &SpecHash) -> Self {
        self.field(SPEC_HASH_KEY, Value::String(spec_hash.as_str().to_string()))
    }

    /// Consume the builder and return an active, unsequenced event.
    pub fn build(self) -> Event {
        Event {
            event_id: EventId::now_v7(),
            project_id: self.project_id,
            event_type: self.event_type,
            data: Value::Object(self.data),
            is_active: true,
            reverted_at: None,
            created_at: Utc::now(),
            sequence: 0,
        }
    }
}
