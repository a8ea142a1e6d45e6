//! Event log trait and its storage-backed implementation.
//!
//! Each project has a flat, append-only history ordered by
//! `(created_at, sequence)` and a movable head pointer. Moving the head
//! deactivates everything after it and reactivates everything at or before
//! it; reverting marks chosen events inactive without touching the head.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use specforge_core::{
    EntityIdType, EntityType, Event, EventId, EventLogError, EventQuery, ForgeResult, HeadChange,
    Project, ProjectId, StorageError,
};
use specforge_storage::StorageTrait;
use tracing::{debug, info, instrument};

use crate::builder::EventBuilder;
use crate::head::plan_head_move;

/// Trait for event log operations.
///
/// Errors are caller-input errors (unknown or foreign ids, orphan spec
/// hashes, reverting the head) or storage failures.
pub trait EventLog: Send + Sync {
    /// Append a new active event. Prior events are never mutated and the
    /// head does not move. Storage assigns the sequence number.
    ///
    /// # Errors
    ///
    /// - `OrphanSpecHash` when the data references a spec hash with no
    ///   version in the project.
    /// - `InvalidEventType` for a blank event type.
    fn append(&self, event: Event) -> ForgeResult<Event>;

    /// List a project's events.
    fn list_events(&self, project_id: ProjectId, query: &EventQuery) -> ForgeResult<Vec<Event>>;

    /// Move (or clear) the head. Commits the pointer and every flag change
    /// together.
    fn set_head(&self, project_id: ProjectId, head: Option<EventId>) -> ForgeResult<HeadChange>;

    /// Mark events inactive. Already-inactive events are left as they are.
    /// Returns the ids that changed.
    ///
    /// # Errors
    ///
    /// `HeadEventRevert` if one of the ids is the current head.
    fn revert_events(&self, project_id: ProjectId, ids: &[EventId]) -> ForgeResult<Vec<EventId>>;

    /// The event the head currently points at.
    fn head(&self, project_id: ProjectId) -> ForgeResult<Option<Event>>;
}

/// Extension trait for EventLog with convenience methods.
pub trait EventLogExt: EventLog {
    /// Append an event built from a type and a data object.
    fn append_new(
        &self,
        project_id: ProjectId,
        event_type: &str,
        data: Value,
    ) -> ForgeResult<Event> {
        self.append(EventBuilder::new(project_id, event_type).merge(data).build())
    }

    /// Only the active events, oldest first.
    fn active_events(&self, project_id: ProjectId) -> ForgeResult<Vec<Event>> {
        self.list_events(project_id, &EventQuery::new().active_only())
    }
}

impl<T: EventLog + ?Sized> EventLogExt for T {}

/// Event log over any [`StorageTrait`] implementation.
///
/// Assumes a single writer per project; the recorder serializes writers.
#[derive(Debug)]
pub struct ProjectEventLog<S: StorageTrait> {
    storage: Arc<S>,
}

impl<S: StorageTrait> Clone for ProjectEventLog<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S: StorageTrait> ProjectEventLog<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Get a reference to the underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn project(&self, project_id: ProjectId) -> ForgeResult<Project> {
        self.storage.project_get(project_id)?.ok_or_else(|| {
            StorageError::NotFound {
                entity_type: EntityType::Project,
                id: project_id.as_uuid(),
            }
            .into()
        })
    }

    /// Fetch an event and check that it belongs to the project.
    fn owned_event(&self, project_id: ProjectId, event_id: EventId) -> ForgeResult<Event> {
        let event = self
            .storage
            .event_get(event_id)?
            .ok_or(StorageError::NotFound {
                entity_type: EntityType::Event,
                id: event_id.as_uuid(),
            })?;
        if event.project_id != project_id {
            return Err(StorageError::ForeignEntity {
                entity_type: EntityType::Event,
                id: event_id.as_uuid(),
                project_id,
            }
            .into());
        }
        Ok(event)
    }
}

impl<S: StorageTrait> EventLog for ProjectEventLog<S> {
    #[instrument(skip(self, event), fields(project_id = %event.project_id, event_type = %event.event_type))]
    fn append(&self, event: Event) -> ForgeResult<Event> {
        if event.event_type.trim().is_empty() {
            return Err(EventLogError::InvalidEventType {
                reason: "event type must not be blank".to_string(),
            }
            .into());
        }
        if let Some(spec_hash) = event.spec_hash() {
            let exists = self
                .storage
                .version_get_by_hash(event.project_id, &spec_hash)?
                .is_some();
            if !exists {
                return Err(EventLogError::OrphanSpecHash {
                    event_id: event.event_id,
                    project_id: event.project_id,
                    spec_hash,
                }
                .into());
            }
        }

        let mut fresh = event;
        fresh.is_active = true;
        fresh.reverted_at = None;
        let stored = self.storage.event_insert(&fresh)?;
        debug!(event_id = %stored.event_id, sequence = stored.sequence, "event appended");
        Ok(stored)
    }

    fn list_events(&self, project_id: ProjectId, query: &EventQuery) -> ForgeResult<Vec<Event>> {
        self.project(project_id)?;
        Ok(query.apply(self.storage.event_list(project_id)?))
    }

    #[instrument(skip(self))]
    fn set_head(&self, project_id: ProjectId, head: Option<EventId>) -> ForgeResult<HeadChange> {
        self.project(project_id)?;
        if let Some(event_id) = head {
            self.owned_event(project_id, event_id)?;
        }

        let events = self.storage.event_list(project_id)?;
        let plan = plan_head_move(&events, head).ok_or_else(|| StorageError::TransactionFailed {
            reason: "head event missing from project history".to_string(),
        })?;
        self.storage
            .event_commit_head(project_id, head, &plan.reactivate, &plan.deactivate)?;

        let head_event = match head {
            Some(event_id) => self.storage.event_get(event_id)?,
            None => None,
        };
        info!(
            reactivated = plan.reactivate.len(),
            deactivated = plan.deactivate.len(),
            "head moved"
        );
        Ok(HeadChange {
            head: head_event,
            reactivated_event_ids: plan.reactivate,
            deactivated_event_ids: plan.deactivate,
        })
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    fn revert_events(&self, project_id: ProjectId, ids: &[EventId]) -> ForgeResult<Vec<EventId>> {
        let project = self.project(project_id)?;
        if let Some(head_id) = project.event_head_id {
            if ids.contains(&head_id) {
                return Err(EventLogError::HeadEventRevert {
                    event_id: head_id,
                    project_id,
                }
                .into());
            }
        }

        let changed = self.storage.event_revert(project_id, ids, Utc::now())?;
        debug!(changed = changed.len(), "events reverted");
        Ok(changed)
    }

    fn head(&self, project_id: ProjectId) -> ForgeResult<Option<Event>> {
        match self.project(project_id)?.event_head_id {
            Some(event_id) => self.storage.event_get(event_id),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use specforge_core::event::{FRAGMENT_CREATED, FRAGMENT_UPDATED};
    use specforge_core::{ForgeError, SpecHash, Version};
    use specforge_storage::MockStorage;

    fn setup() -> (ProjectEventLog<MockStorage>, ProjectId) {
        let storage = Arc::new(MockStorage::new());
        let project = Project::new("events");
        storage.project_insert(&project).unwrap();
        (ProjectEventLog::new(storage), project.project_id)
    }

    #[test]
    fn test_append_does_not_move_head() {
        let (log, project_id) = setup();
        log.append_new(project_id, FRAGMENT_CREATED, json!({"path": "a.cue"}))
            .unwrap();
        assert!(log.head(project_id).unwrap().is_none());
    }

    #[test]
    fn test_append_rejects_orphan_spec_hash() {
        let (log, project_id) = setup();
        let hash = SpecHash::of(&json!({"x": 1}));
        let event = EventBuilder::new(project_id, FRAGMENT_UPDATED)
            .spec_hash(&hash)
            .build();
        let result = log.append(event);
        assert!(matches!(
            result,
            Err(ForgeError::EventLog(EventLogError::OrphanSpecHash { .. }))
        ));
        assert_eq!(log.storage().event_count(), 0);
    }

    #[test]
    fn test_append_accepts_known_spec_hash() {
        let (log, project_id) = setup();
        let version = Version::new(project_id, json!({"x": 1}));
        log.storage().version_insert_if_absent(&version).unwrap();
        let event = EventBuilder::new(project_id, FRAGMENT_UPDATED)
            .spec_hash(&version.spec_hash)
            .build();
        let stored = log.append(event).unwrap();
        assert_eq!(stored.spec_hash(), Some(version.spec_hash));
    }

    #[test]
    fn test_append_rejects_blank_type() {
        let (log, project_id) = setup();
        let result = log.append_new(project_id, "  ", json!({}));
        assert!(matches!(
            result,
            Err(ForgeError::EventLog(EventLogError::InvalidEventType { .. }))
        ));
    }

    #[test]
    fn test_set_head_unknown_event() {
        let (log, project_id) = setup();
        let result = log.set_head(project_id, Some(EventId::now_v7()));
        assert!(matches!(
            result,
            Err(ForgeError::Storage(StorageError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_set_head_foreign_event() {
        let (log, project_id) = setup();
        let other = Project::new("other");
        log.storage().project_insert(&other).unwrap();
        let foreign = log
            .append_new(other.project_id, FRAGMENT_CREATED, json!({}))
            .unwrap();
        let result = log.set_head(project_id, Some(foreign.event_id));
        assert!(matches!(
            result,
            Err(ForgeError::Storage(StorageError::ForeignEntity { .. }))
        ));
    }

    #[test]
    fn test_clear_head_keeps_flags() {
        let (log, project_id) = setup();
        let e1 = log.append_new(project_id, FRAGMENT_CREATED, json!({})).unwrap();
        log.append_new(project_id, FRAGMENT_UPDATED, json!({})).unwrap();
        log.set_head(project_id, Some(e1.event_id)).unwrap();

        let change = log.set_head(project_id, None).unwrap();
        assert!(change.head.is_none());
        assert!(change.is_noop());
        let active = log.active_events(project_id).unwrap();
        assert_eq!(active.len(), 1);
    }

    #[test]
    fn test_revert_head_is_rejected() {
        let (log, project_id) = setup();
        let e1 = log.append_new(project_id, FRAGMENT_CREATED, json!({})).unwrap();
        log.set_head(project_id, Some(e1.event_id)).unwrap();
        let result = log.revert_events(project_id, &[e1.event_id]);
        assert!(matches!(
            result,
            Err(ForgeError::EventLog(EventLogError::HeadEventRevert { .. }))
        ));
        assert!(log.storage().event_get(e1.event_id).unwrap().unwrap().is_active);
    }

    #[test]
    fn test_list_events_unknown_project() {
        let (log, _) = setup();
        assert!(log
            .list_events(ProjectId::now_v7(), &EventQuery::new())
            .is_err());
    }
}
