//! Mutation recording: fragment change → validation → version → event.
//!
//! All writes for one project go through a per-project async mutex, so a
//! project has a single writer while different projects proceed
//! concurrently. Lock entries live as long as the recorder; there is no
//! pruning for projects that go idle.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use specforge_core::{
    EntityIdType, EntityType, Event, EventId, EventQuery, ForgeConfig, ForgeResult, Fragment,
    HeadChange, Project, ProjectId, StorageError, ValidationResult, Version,
};
use specforge_events::{
    EventBuilder, EventLog, ProjectEventLog, FRAGMENT_CREATED, FRAGMENT_DELETED, FRAGMENT_UPDATED,
    SPEC_VALIDATED, VALIDATION_FAILED,
};
use specforge_storage::{StorageTrait, VersionCache};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::pipeline::SpecPipeline;

/// A change to one fragment of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FragmentMutation {
    Upsert { path: String, content: String },
    Delete { path: String },
}

impl FragmentMutation {
    pub fn upsert(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Upsert {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::Delete { path: path.into() }
    }
}

/// Everything a recorded mutation produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordOutcome {
    /// The fragment touched; `None` when a delete found nothing.
    pub fragment: Option<Fragment>,
    /// The mutation event; `None` when nothing changed (unknown delete or
    /// identical content).
    pub event: Option<Event>,
    /// The `validation_failed` event, when failures are recorded.
    pub failure_event: Option<Event>,
    pub validation: ValidationResult,
    /// The version the resolved document maps to, on success.
    pub version: Option<Version>,
}

pub struct SpecRecorder<S: StorageTrait> {
    storage: Arc<S>,
    versions: VersionCache<S>,
    events: ProjectEventLog<S>,
    pipeline: SpecPipeline,
    record_failures: bool,
    locks: DashMap<ProjectId, Arc<Mutex<()>>>,
}

impl<S: StorageTrait> SpecRecorder<S> {
    pub fn new(storage: Arc<S>, pipeline: SpecPipeline, config: &ForgeConfig) -> Self {
        Self {
            versions: VersionCache::new(Arc::clone(&storage), config.version_cache_entries),
            events: ProjectEventLog::new(Arc::clone(&storage)),
            storage,
            pipeline,
            record_failures: config.record_failures,
            locks: DashMap::new(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn event_log(&self) -> &ProjectEventLog<S> {
        &self.events
    }

    pub fn version_cache(&self) -> &VersionCache<S> {
        &self.versions
    }

    pub fn pipeline(&self) -> &SpecPipeline {
        &self.pipeline
    }

    fn project_lock(&self, project_id: ProjectId) -> Arc<Mutex<()>> {
        self.locks.entry(project_id).or_default().clone()
    }

    fn ensure_project(&self, project_id: ProjectId) -> ForgeResult<()> {
        match self.storage.project_get(project_id)? {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound {
                entity_type: EntityType::Project,
                id: project_id.as_uuid(),
            }
            .into()),
        }
    }

    /// Create and store a new project.
    pub fn create_project(&self, name: impl Into<String>) -> ForgeResult<Project> {
        let project = Project::new(name);
        self.storage.project_insert(&project)?;
        Ok(project)
    }

    /// Apply a fragment mutation, revalidate the project and record the
    /// outcome.
    ///
    /// On success the version is persisted before the event that references
    /// it. A failed validation writes no version.
    #[instrument(skip(self, mutation), fields(project_id = %project_id))]
    pub async fn apply(
        &self,
        project_id: ProjectId,
        mutation: FragmentMutation,
    ) -> ForgeResult<RecordOutcome> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;
        self.ensure_project(project_id)?;

        let (fragment, event_type) = match &mutation {
            FragmentMutation::Upsert { path, content } => {
                match self.storage.fragment_get(project_id, path)? {
                    Some(existing) if existing.content == *content => (Some(existing), None),
                    _ => {
                        let (fragment, created) =
                            self.storage.fragment_upsert(project_id, path, content)?;
                        let event_type = if created { FRAGMENT_CREATED } else { FRAGMENT_UPDATED };
                        (Some(fragment), Some(event_type))
                    }
                }
            }
            FragmentMutation::Delete { path } => {
                let deleted = self.storage.fragment_delete(project_id, path)?;
                let event_type = deleted.as_ref().map(|_| FRAGMENT_DELETED);
                (deleted, event_type)
            }
        };

        let (validation, version) = self.validate_and_persist(project_id).await?;

        let event = match (&fragment, event_type) {
            (Some(fragment), Some(event_type)) => {
                let mut builder = EventBuilder::new(project_id, event_type)
                    .path(fragment.path.clone())
                    .fragment(fragment.fragment_id);
                if let Some(version) = &version {
                    builder = builder.spec_hash(&version.spec_hash);
                }
                Some(self.events.append(builder.build())?)
            }
            _ => {
                debug!("mutation changed no fragment");
                None
            }
        };
        let failure_event = self.record_failure(project_id, fragment.as_ref(), &validation)?;

        Ok(RecordOutcome {
            fragment,
            event,
            failure_event,
            validation,
            version,
        })
    }

    /// Revalidate the project as it stands and record a `spec_validated` or
    /// `validation_failed` event.
    #[instrument(skip(self), fields(project_id = %project_id))]
    pub async fn validate(&self, project_id: ProjectId) -> ForgeResult<RecordOutcome> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;
        self.ensure_project(project_id)?;

        let (validation, version) = self.validate_and_persist(project_id).await?;
        let event = match &version {
            Some(version) => Some(
                self.events.append(
                    EventBuilder::new(project_id, SPEC_VALIDATED)
                        .spec_hash(&version.spec_hash)
                        .build(),
                )?,
            ),
            None => None,
        };
        let failure_event = self.record_failure(project_id, None, &validation)?;

        Ok(RecordOutcome {
            fragment: None,
            event,
            failure_event,
            validation,
            version,
        })
    }

    /// The version referenced by the newest active event that carries a
    /// spec hash. Follows head moves and reverts; `None` until something
    /// has validated.
    pub fn resolved(&self, project_id: ProjectId) -> ForgeResult<Option<Version>> {
        let query = EventQuery::new().active_only().newest_first();
        let current = self
            .events
            .list_events(project_id, &query)?
            .into_iter()
            .find_map(|event| event.spec_hash());
        match current {
            Some(spec_hash) => self.versions.get(project_id, &spec_hash),
            None => Ok(None),
        }
    }

    /// Move the project's head under the project's writer lock.
    pub async fn set_head(
        &self,
        project_id: ProjectId,
        head: Option<EventId>,
    ) -> ForgeResult<HeadChange> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;
        self.events.set_head(project_id, head)
    }

    /// Revert events under the project's writer lock.
    pub async fn revert_events(
        &self,
        project_id: ProjectId,
        ids: &[EventId],
    ) -> ForgeResult<Vec<EventId>> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;
        self.events.revert_events(project_id, ids)
    }

    async fn validate_and_persist(
        &self,
        project_id: ProjectId,
    ) -> ForgeResult<(ValidationResult, Option<Version>)> {
        let fragments = self.storage.fragment_list(project_id)?;
        let validation = self.pipeline.validate_project(project_id, &fragments).await;

        let version = match (&validation.resolved, validation.success) {
            (Some(resolved), true) => {
                let (version, created) =
                    self.versions.get_or_insert(project_id, resolved.clone())?;
                debug!(spec_hash = %version.spec_hash, created, "version resolved");
                Some(version)
            }
            _ => None,
        };
        Ok((validation, version))
    }

    fn record_failure(
        &self,
        project_id: ProjectId,
        fragment: Option<&Fragment>,
        validation: &ValidationResult,
    ) -> ForgeResult<Option<Event>> {
        if validation.success || !self.record_failures {
            return Ok(None);
        }
        let mut builder =
            EventBuilder::new(project_id, VALIDATION_FAILED).merge(validation.error_summary());
        if let Some(fragment) = fragment {
            builder = builder
                .path(fragment.path.clone())
                .fragment(fragment.fragment_id);
        }
        Ok(Some(self.events.append(builder.build())?))
    }
}
