//! SPECFORGE Events - Event Log Trait and Operations
//!
//! This crate defines the `EventLog` trait over a project's revision
//! history and provides `ProjectEventLog`, its implementation on top of any
//! storage backend.
//!
//! # Architecture
//!
//! History is a flat list of events per project, ordered by
//! `(created_at, sequence)`. A head pointer selects a prefix of that list:
//!
//! ```text
//! Events:   e1 → e2 → e3 → e4
//!                     ↑
//!                    head       e1..e3 active, e4 inactive (dangling)
//! ```
//!
//! Moving the head backwards is undo, forwards is redo. Reverting marks
//! individual events inactive without moving the head.
//!
//! # Traits
//!
//! - `EventLog`: append, list, set head, revert, resolve head
//! - `EventLogExt`: convenience methods

mod builder;
mod head;
mod log;

pub use builder::EventBuilder;
pub use head::{plan_head_move, HeadPlan};
pub use log::{EventLog, EventLogExt, ProjectEventLog};

// Re-export core types for convenience
pub use specforge_core::event::{
    FRAGMENT_CREATED, FRAGMENT_DELETED, FRAGMENT_UPDATED, SPEC_HASH_KEY, SPEC_VALIDATED,
    VALIDATION_FAILED,
};
pub use specforge_core::{Event, EventId, EventOrder, EventQuery, HeadChange};
