//! SPECFORGE Core - Entity Types
//!
//! Pure data structures shared by the storage, event log and validation
//! crates: typed identifiers, fragments, versions, events, projects,
//! validation findings, configuration and the error taxonomy.

pub mod config;
pub mod entities;
pub mod error;
pub mod event;
pub mod findings;
pub mod identity;
pub mod path;

pub use config::{AssertionStrategyKind, ForgeConfig};
pub use entities::{spec_hash_in, Event, Fragment, FragmentRevision, Project, Version};
pub use error::{
    ConfigError, EntityType, EventLogError, ForgeError, ForgeResult, StorageError, ToolError,
};
pub use event::{EventOrder, EventQuery, HeadChange};
pub use findings::{FindingKind, SourceLocation, ValidationFinding, ValidationResult};
pub use identity::{
    canonical_json, compute_content_hash, ContentHash, EntityIdType, EventId, FragmentId,
    ProjectId, SpecHash, Timestamp, VersionId,
};
pub use path::{normalize_fragment_path, DEFAULT_FRAGMENT_PATH};
