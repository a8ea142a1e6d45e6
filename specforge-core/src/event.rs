//! Event log vocabulary: well-known event types, query options and the
//! result of moving a project's head.

use crate::{Event, EventId, Timestamp};
use serde::{Deserialize, Serialize};

// ============================================================================
// EVENT TYPES
// ============================================================================

/// A fragment was created.
pub const FRAGMENT_CREATED: &str = "fragment_created";
/// A fragment's content changed.
pub const FRAGMENT_UPDATED: &str = "fragment_updated";
/// A fragment was explicitly deleted.
pub const FRAGMENT_DELETED: &str = "fragment_deleted";
/// A validation run succeeded and produced a version.
pub const SPEC_VALIDATED: &str = "spec_validated";
/// A validation run failed; data carries the error summary.
pub const VALIDATION_FAILED: &str = "validation_failed";

/// Key under which event data references a version's spec hash.
pub const SPEC_HASH_KEY: &str = "spec_hash";

// ============================================================================
// QUERIES
// ============================================================================

/// Order of events returned by a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

/// Options for listing a project's events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventQuery {
    /// Maximum number of events, applied after ordering.
    pub limit: Option<usize>,
    /// Keep only events created strictly after this instant.
    pub since: Option<Timestamp>,
    /// When false, inactive events are left out.
    pub include_dangling: bool,
    pub order: EventOrder,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            limit: None,
            since: None,
            include_dangling: true,
            order: EventOrder::OldestFirst,
        }
    }
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn since(mut self, since: Timestamp) -> Self {
        self.since = Some(since);
        self
    }

    /// Only active events.
    pub fn active_only(mut self) -> Self {
        self.include_dangling = false;
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.order = EventOrder::NewestFirst;
        self
    }

    /// Apply the query to a project's events, which must already be sorted
    /// oldest first.
    pub fn apply(&self, events: Vec<Event>) -> Vec<Event> {
        let filtered = events.into_iter().filter(|e| {
            (self.include_dangling || e.is_active)
                && self.since.map_or(true, |since| e.created_at > since)
        });
        let ordered: Vec<Event> = match self.order {
            EventOrder::OldestFirst => filtered.collect(),
            EventOrder::NewestFirst => {
                let mut v: Vec<Event> = filtered.collect();
                v.reverse();
                v
            }
        };
        match self.limit {
            Some(limit) => ordered.into_iter().take(limit).collect(),
            None => ordered,
        }
    }
}

// ============================================================================
// HEAD CHANGES
// ============================================================================

/// Outcome of moving a project's head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadChange {
    /// The resolved head event, or `None` when the head was cleared.
    pub head: Option<Event>,
    /// Events that went from inactive to active, oldest first.
    pub reactivated_event_ids: Vec<EventId>,
    /// Events that went from active to inactive, oldest first.
    pub deactivated_event_ids: Vec<EventId>,
}

impl HeadChange {
    /// True when no event changed state.
    pub fn is_noop(&self) -> bool {
        self.reactivated_event_ids.is_empty() && self.deactivated_event_ids.is_empty()
    }
}
