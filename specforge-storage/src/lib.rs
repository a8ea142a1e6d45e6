//! SPECFORGE Storage - Storage Trait and Mock Implementation
//!
//! Defines the storage abstraction for projects, fragments (with revision
//! history), versions and events, plus the content-hash keyed version cache.
//! Fragments, versions and events are three independent append-oriented
//! tables keyed by project id.

pub mod cache;

pub use cache::{CacheStats, VersionCache};

use chrono::Utc;
use specforge_core::{
    normalize_fragment_path, EntityIdType, EntityType, Event, EventId, ForgeResult, Fragment,
    FragmentId, FragmentRevision, Project, ProjectId, SpecHash, StorageError, Timestamp, Version,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

// ============================================================================
// STORAGE TRAIT
// ============================================================================

/// Storage trait for SPECFORGE entities.
///
/// Every method is atomic with respect to the rows it touches.
/// `event_commit_head` is the one multi-row operation: the head pointer and
/// all flag changes commit together or not at all.
pub trait StorageTrait: Send + Sync {
    // === Project Operations ===

    /// Insert a new project.
    fn project_insert(&self, p: &Project) -> ForgeResult<()>;

    /// Get a project by ID.
    fn project_get(&self, id: ProjectId) -> ForgeResult<Option<Project>>;

    // === Fragment Operations ===

    /// Create or update the fragment at `path` (normalized first).
    /// Returns the stored fragment and whether it was created.
    fn fragment_upsert(
        &self,
        project_id: ProjectId,
        path: &str,
        content: &str,
    ) -> ForgeResult<(Fragment, bool)>;

    /// Get a fragment by project and path.
    fn fragment_get(&self, project_id: ProjectId, path: &str) -> ForgeResult<Option<Fragment>>;

    /// List a project's fragments, sorted by path.
    fn fragment_list(&self, project_id: ProjectId) -> ForgeResult<Vec<Fragment>>;

    /// Delete a fragment. Its revisions are kept.
    fn fragment_delete(&self, project_id: ProjectId, path: &str)
        -> ForgeResult<Option<Fragment>>;

    /// Revision history of a fragment, oldest first.
    fn fragment_revisions(&self, fragment_id: FragmentId) -> ForgeResult<Vec<FragmentRevision>>;

    // === Version Operations ===

    /// Insert a version unless one with the same (project, hash) exists.
    /// Returns the stored version and whether it was created.
    fn version_insert_if_absent(&self, v: &Version) -> ForgeResult<(Version, bool)>;

    /// Get a version by its spec hash.
    fn version_get_by_hash(
        &self,
        project_id: ProjectId,
        spec_hash: &SpecHash,
    ) -> ForgeResult<Option<Version>>;

    /// List a project's versions, oldest first.
    fn version_list(&self, project_id: ProjectId) -> ForgeResult<Vec<Version>>;

    // === Event Operations ===

    /// Append an event. Storage assigns the sequence number and keeps
    /// per-project timestamps strictly increasing. Returns the stored row.
    fn event_insert(&self, e: &Event) -> ForgeResult<Event>;

    /// Get an event by ID.
    fn event_get(&self, id: EventId) -> ForgeResult<Option<Event>>;

    /// A project's events ordered by (created_at, sequence).
    fn event_list(&self, project_id: ProjectId) -> ForgeResult<Vec<Event>>;

    /// Move the head and flip flags in one transaction.
    fn event_commit_head(
        &self,
        project_id: ProjectId,
        head: Option<EventId>,
        reactivate: &[EventId],
        deactivate: &[EventId],
    ) -> ForgeResult<()>;

    /// Mark events inactive with `reverted_at`. Already-inactive events are
    /// left untouched. Returns the ids that changed.
    fn event_revert(
        &self,
        project_id: ProjectId,
        ids: &[EventId],
        reverted_at: Timestamp,
    ) -> ForgeResult<Vec<EventId>>;
}

// ============================================================================
// MOCK STORAGE
// ============================================================================

#[derive(Debug, Default)]
struct FragmentTable {
    rows: HashMap<FragmentId, Fragment>,
    by_path: HashMap<(ProjectId, String), FragmentId>,
    revisions: HashMap<FragmentId, Vec<FragmentRevision>>,
}

#[derive(Debug, Default)]
struct EventTable {
    rows: HashMap<EventId, Event>,
    /// Per-project index in (created_at, sequence) order.
    by_project: HashMap<ProjectId, Vec<EventId>>,
    next_sequence: u64,
}

/// In-memory storage for tests and single-process hosts.
///
/// Locks are always taken in the order projects → fragments → versions →
/// events.
#[derive(Debug, Default, Clone)]
pub struct MockStorage {
    projects: Arc<RwLock<HashMap<ProjectId, Project>>>,
    fragments: Arc<RwLock<FragmentTable>>,
    versions: Arc<RwLock<HashMap<(ProjectId, SpecHash), Version>>>,
    events: Arc<RwLock<EventTable>>,
}

fn read<T>(lock: &RwLock<T>) -> ForgeResult<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| StorageError::LockPoisoned.into())
}

fn write<T>(lock: &RwLock<T>) -> ForgeResult<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| StorageError::LockPoisoned.into())
}

fn project_not_found(id: ProjectId) -> StorageError {
    StorageError::NotFound {
        entity_type: EntityType::Project,
        id: id.as_uuid(),
    }
}

impl MockStorage {
    /// Create a new mock storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get count of stored versions across all projects.
    pub fn version_count(&self) -> usize {
        self.versions.read().map(|v| v.len()).unwrap_or(0)
    }

    /// Get count of stored events across all projects.
    pub fn event_count(&self) -> usize {
        self.events.read().map(|e| e.rows.len()).unwrap_or(0)
    }

    fn ensure_project(&self, project_id: ProjectId) -> ForgeResult<()> {
        if read(&self.projects)?.contains_key(&project_id) {
            Ok(())
        } else {
            Err(project_not_found(project_id).into())
        }
    }
}

/// Check that every id exists and belongs to the project.
fn check_owned(events: &EventTable, project_id: ProjectId, ids: &[EventId]) -> ForgeResult<()> {
    for id in ids {
        match events.rows.get(id) {
            None => {
                return Err(StorageError::NotFound {
                    entity_type: EntityType::Event,
                    id: id.as_uuid(),
                }
                .into())
            }
            Some(e) if e.project_id != project_id => {
                return Err(StorageError::ForeignEntity {
                    entity_type: EntityType::Event,
                    id: id.as_uuid(),
                    project_id,
                }
                .into())
            }
            Some(_) => {}
        }
    }
    Ok(())
}

impl StorageTrait for MockStorage {
    // === Project Operations ===

    fn project_insert(&self, p: &Project) -> ForgeResult<()> {
        let mut projects = write(&self.projects)?;
        if projects.contains_key(&p.project_id) {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::Project,
                reason: "already exists".to_string(),
            }
            .into());
        }
        projects.insert(p.project_id, p.clone());
        Ok(())
    }

    fn project_get(&self, id: ProjectId) -> ForgeResult<Option<Project>> {
        Ok(read(&self.projects)?.get(&id).cloned())
    }

    // === Fragment Operations ===

    fn fragment_upsert(
        &self,
        project_id: ProjectId,
        path: &str,
        content: &str,
    ) -> ForgeResult<(Fragment, bool)> {
        self.ensure_project(project_id)?;
        let path = normalize_fragment_path(path);
        let now = Utc::now();
        let mut table = write(&self.fragments)?;

        let existing = table.by_path.get(&(project_id, path.clone())).copied();
        let (fragment, created) = match existing {
            Some(fragment_id) => {
                let row = table.rows.get_mut(&fragment_id).ok_or(StorageError::NotFound {
                    entity_type: EntityType::Fragment,
                    id: fragment_id.as_uuid(),
                })?;
                if row.content == content {
                    return Ok((row.clone(), false));
                }
                row.content = content.to_string();
                row.updated_at = now;
                (row.clone(), false)
            }
            None => {
                let fragment = Fragment {
                    fragment_id: FragmentId::now_v7(),
                    project_id,
                    path: path.clone(),
                    content: content.to_string(),
                    created_at: now,
                    updated_at: now,
                };
                table
                    .by_path
                    .insert((project_id, path), fragment.fragment_id);
                table.rows.insert(fragment.fragment_id, fragment.clone());
                (fragment, true)
            }
        };

        let revisions = table.revisions.entry(fragment.fragment_id).or_default();
        let revision = revisions.last().map_or(1, |r| r.revision + 1);
        revisions.push(FragmentRevision {
            fragment_id: fragment.fragment_id,
            revision,
            content: fragment.content.clone(),
            created_at: now,
        });

        Ok((fragment, created))
    }

    fn fragment_get(&self, project_id: ProjectId, path: &str) -> ForgeResult<Option<Fragment>> {
        let table = read(&self.fragments)?;
        let key = (project_id, normalize_fragment_path(path));
        Ok(table
            .by_path
            .get(&key)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    fn fragment_list(&self, project_id: ProjectId) -> ForgeResult<Vec<Fragment>> {
        let table = read(&self.fragments)?;
        let mut fragments: Vec<Fragment> = table
            .rows
            .values()
            .filter(|f| f.project_id == project_id)
            .cloned()
            .collect();
        fragments.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(fragments)
    }

    fn fragment_delete(
        &self,
        project_id: ProjectId,
        path: &str,
    ) -> ForgeResult<Option<Fragment>> {
        let mut table = write(&self.fragments)?;
        let key = (project_id, normalize_fragment_path(path));
        let removed = table.by_path.remove(&key);
        Ok(match removed {
            Some(id) => table.rows.remove(&id),
            None => None,
        })
    }

    fn fragment_revisions(&self, fragment_id: FragmentId) -> ForgeResult<Vec<FragmentRevision>> {
        let table = read(&self.fragments)?;
        Ok(table.revisions.get(&fragment_id).cloned().unwrap_or_default())
    }

    // === Version Operations ===

    fn version_insert_if_absent(&self, v: &Version) -> ForgeResult<(Version, bool)> {
        self.ensure_project(v.project_id)?;
        let mut versions = write(&self.versions)?;
        let key = (v.project_id, v.spec_hash.clone());
        if let Some(existing) = versions.get(&key) {
            return Ok((existing.clone(), false));
        }
        versions.insert(key, v.clone());
        Ok((v.clone(), true))
    }

    fn version_get_by_hash(
        &self,
        project_id: ProjectId,
        spec_hash: &SpecHash,
    ) -> ForgeResult<Option<Version>> {
        let versions = read(&self.versions)?;
        Ok(versions.get(&(project_id, spec_hash.clone())).cloned())
    }

    fn version_list(&self, project_id: ProjectId) -> ForgeResult<Vec<Version>> {
        let versions = read(&self.versions)?;
        let mut list: Vec<Version> = versions
            .values()
            .filter(|v| v.project_id == project_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.version_id.cmp(&b.version_id))
        });
        Ok(list)
    }

    // === Event Operations ===

    fn event_insert(&self, e: &Event) -> ForgeResult<Event> {
        self.ensure_project(e.project_id)?;
        let mut table = write(&self.events)?;
        if table.rows.contains_key(&e.event_id) {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::Event,
                reason: "already exists".to_string(),
            }
            .into());
        }

        let last_created_at = table
            .by_project
            .get(&e.project_id)
            .and_then(|ids| ids.last())
            .and_then(|id| table.rows.get(id))
            .map(|last| last.created_at);

        let mut stored = e.clone();
        if let Some(last) = last_created_at {
            if stored.created_at <= last {
                stored.created_at = last + chrono::Duration::nanoseconds(1);
            }
        }
        stored.sequence = table.next_sequence;
        table.next_sequence += 1;

        table
            .by_project
            .entry(stored.project_id)
            .or_default()
            .push(stored.event_id);
        table.rows.insert(stored.event_id, stored.clone());
        Ok(stored)
    }

    fn event_get(&self, id: EventId) -> ForgeResult<Option<Event>> {
        Ok(read(&self.events)?.rows.get(&id).cloned())
    }

    fn event_list(&self, project_id: ProjectId) -> ForgeResult<Vec<Event>> {
        let table = read(&self.events)?;
        Ok(table
            .by_project
            .get(&project_id)
            .map(|ids| ids.iter().filter_map(|id| table.rows.get(id)).cloned().collect())
            .unwrap_or_default())
    }

    fn event_commit_head(
        &self,
        project_id: ProjectId,
        head: Option<EventId>,
        reactivate: &[EventId],
        deactivate: &[EventId],
    ) -> ForgeResult<()> {
        let mut projects = write(&self.projects)?;
        let mut table = write(&self.events)?;

        // Validate everything before the first write.
        if !projects.contains_key(&project_id) {
            return Err(project_not_found(project_id).into());
        }
        if let Some(head_id) = head {
            check_owned(&table, project_id, &[head_id])?;
            if deactivate.contains(&head_id) {
                return Err(StorageError::TransactionFailed {
                    reason: format!("head {} cannot be deactivated", head_id),
                }
                .into());
            }
            let head_active = table.rows.get(&head_id).map_or(false, |e| e.is_active);
            if !head_active && !reactivate.contains(&head_id) {
                return Err(StorageError::TransactionFailed {
                    reason: format!("head {} would be inactive", head_id),
                }
                .into());
            }
        }
        check_owned(&table, project_id, reactivate)?;
        check_owned(&table, project_id, deactivate)?;

        for id in reactivate {
            if let Some(event) = table.rows.get_mut(id) {
                event.is_active = true;
                event.reverted_at = None;
            }
        }
        for id in deactivate {
            if let Some(event) = table.rows.get_mut(id) {
                event.is_active = false;
            }
        }
        if let Some(project) = projects.get_mut(&project_id) {
            project.event_head_id = head;
            project.updated_at = Utc::now();
        }
        Ok(())
    }

    fn event_revert(
        &self,
        project_id: ProjectId,
        ids: &[EventId],
        reverted_at: Timestamp,
    ) -> ForgeResult<Vec<EventId>> {
        self.ensure_project(project_id)?;
        let mut table = write(&self.events)?;
        check_owned(&table, project_id, ids)?;

        let mut changed = Vec::new();
        for id in ids {
            if let Some(event) = table.rows.get_mut(id) {
                if event.is_active {
                    event.is_active = false;
                    event.reverted_at = Some(reverted_at);
                    changed.push(*id);
                }
            }
        }
        Ok(changed)
    }
}

// ============================================================================
// TESTS
// ============================================================================
