//! Version cache keyed by content hash.
//!
//! Maps `(project_id, spec_hash)` to the persisted [`Version`] so repeated
//! validations of unchanged content resolve to the same row instead of
//! creating a duplicate. Reads go through a bounded in-memory map and fall
//! back to storage on a miss; writes are idempotent.
//!
//! [`Version`]: specforge_core::Version

pub mod traits;
pub mod version_cache;

pub use traits::CacheStats;
pub use version_cache::VersionCache;
