//! Read-through version cache.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use specforge_core::{ForgeResult, ProjectId, SpecHash, StorageError, Version};
use tracing::debug;

use super::traits::CacheStats;
use crate::StorageTrait;

type VersionKey = (ProjectId, SpecHash);

#[derive(Debug, Default)]
struct HotMap {
    entries: HashMap<VersionKey, Version>,
    /// Insertion order, oldest first, for FIFO eviction.
    order: VecDeque<VersionKey>,
}

/// Read-through cache of versions keyed by `(project_id, spec_hash)`.
///
/// The hot map is bounded; storage remains the source of truth, so an
/// evicted entry is simply fetched again.
pub struct VersionCache<S: StorageTrait> {
    storage: Arc<S>,
    hot: RwLock<HotMap>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<S: StorageTrait> VersionCache<S> {
    /// Create a cache holding at most `max_entries` versions in memory.
    pub fn new(storage: Arc<S>, max_entries: usize) -> Self {
        Self {
            storage,
            hot: RwLock::new(HotMap::default()),
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Get a reference to the underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Look up a version, falling back to storage on a miss.
    pub fn get(&self, project_id: ProjectId, spec_hash: &SpecHash) -> ForgeResult<Option<Version>> {
        let key = (project_id, spec_hash.clone());
        if let Some(version) = self.hot_get(&key)? {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(version));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let fetched = self.storage.version_get_by_hash(project_id, spec_hash)?;
        if let Some(version) = &fetched {
            self.hot_put(key, version.clone())?;
        }
        Ok(fetched)
    }

    /// Persist the resolved document as a version unless one with the same
    /// hash already exists. Returns the stored version and whether it was
    /// created by this call.
    pub fn get_or_insert(
        &self,
        project_id: ProjectId,
        resolved: Value,
    ) -> ForgeResult<(Version, bool)> {
        let candidate = Version::new(project_id, resolved);
        if let Some(existing) = self.get(project_id, &candidate.spec_hash)? {
            return Ok((existing, false));
        }

        let (version, created) = self.storage.version_insert_if_absent(&candidate)?;
        debug!(
            project_id = %project_id,
            spec_hash = %version.spec_hash,
            created,
            "version persisted"
        );
        self.hot_put((project_id, version.spec_hash.clone()), version.clone())?;
        Ok((version, created))
    }

    /// Most recently created version of a project.
    pub fn latest(&self, project_id: ProjectId) -> ForgeResult<Option<Version>> {
        Ok(self.storage.version_list(project_id)?.pop())
    }

    /// Drop every cached entry of a project. Returns the number removed.
    pub fn invalidate_project(&self, project_id: ProjectId) -> ForgeResult<u64> {
        let mut hot = self.hot.write().map_err(|_| StorageError::LockPoisoned)?;
        let before = hot.entries.len();
        hot.entries.retain(|(pid, _), _| *pid != project_id);
        hot.order.retain(|(pid, _)| *pid != project_id);
        Ok((before - hot.entries.len()) as u64)
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let entry_count = self
            .hot
            .read()
            .map(|hot| hot.entries.len() as u64)
            .unwrap_or(0);
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn hot_get(&self, key: &VersionKey) -> ForgeResult<Option<Version>> {
        let hot = self.hot.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(hot.entries.get(key).cloned())
    }

    fn hot_put(&self, key: VersionKey, version: Version) -> ForgeResult<()> {
        let mut hot = self.hot.write().map_err(|_| StorageError::LockPoisoned)?;
        if hot.entries.insert(key.clone(), version).is_none() {
            hot.order.push_back(key);
        }
        while hot.entries.len() > self.max_entries {
            match hot.order.pop_front() {
                Some(oldest) => {
                    hot.entries.remove(&oldest);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }
        Ok(())
    }
}
