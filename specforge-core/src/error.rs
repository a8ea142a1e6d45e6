//! Error types for SPECFORGE operations

use crate::{EventId, ProjectId, SpecHash};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Entity type discriminator used in storage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Project,
    Fragment,
    Version,
    Event,
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: Uuid },

    #[error("Insert failed for {entity_type:?}: {reason}")]
    InsertFailed { entity_type: EntityType, reason: String },

    #[error("{entity_type:?} {id} does not belong to project {project_id}")]
    ForeignEntity {
        entity_type: EntityType,
        id: Uuid,
        project_id: ProjectId,
    },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Event log errors. These are caller-input errors, not validation findings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventLogError {
    #[error("Event {event_id} references spec hash {spec_hash} with no version in project {project_id}")]
    OrphanSpecHash {
        event_id: EventId,
        project_id: ProjectId,
        spec_hash: SpecHash,
    },

    #[error("Event {event_id} is the current head of project {project_id} and cannot be reverted")]
    HeadEventRevert {
        event_id: EventId,
        project_id: ProjectId,
    },

    #[error("Invalid event type: {reason}")]
    InvalidEventType { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// External tool invocation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("Failed to spawn {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("{program} timed out after {timeout_ms}ms")]
    TimedOut { program: String, timeout_ms: u64 },

    #[error("I/O error while running {program}: {reason}")]
    Io { program: String, reason: String },
}

/// Master error type for all SPECFORGE errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ForgeError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Event log error: {0}")]
    EventLog(#[from] EventLogError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for SPECFORGE operations.
pub type ForgeResult<T> = Result<T, ForgeError>;

// =============================================================================
// TESTS
// =============================================================================
