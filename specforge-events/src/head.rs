//! Head-move planning.
//!
//! Moving the head is a diff over a project's ordered history: everything at
//! or before the target must be active, everything after it inactive. The
//! plan lists only the events whose flag actually flips.

use specforge_core::{Event, EventId};

/// Flag changes needed to move a project's head.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadPlan {
    /// Inactive events at or before the target, oldest first.
    pub reactivate: Vec<EventId>,
    /// Active events after the target, oldest first.
    pub deactivate: Vec<EventId>,
}

impl HeadPlan {
    pub fn is_empty(&self) -> bool {
        self.reactivate.is_empty() && self.deactivate.is_empty()
    }
}

/// Plan a head move over `events`, which must be ordered oldest first.
///
/// Returns `None` when `target` is not among `events`. Clearing the head
/// (`target = None`) never changes any flag.
pub fn plan_head_move(events: &[Event], target: Option<EventId>) -> Option<HeadPlan> {
    let Some(target) = target else {
        return Some(HeadPlan::default());
    };
    let cut = events.iter().position(|e| e.event_id == target)?;

    let mut plan = HeadPlan::default();
    for (idx, event) in events.iter().enumerate() {
        if idx <= cut && !event.is_active {
            plan.reactivate.push(event.event_id);
        } else if idx > cut && event.is_active {
            plan.deactivate.push(event.event_id);
        }
    }
    Some(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use proptest::prelude::*;
    use serde_json::json;
    use specforge_core::ProjectId;

    fn history(flags: &[bool]) -> Vec<Event> {
        let project_id = ProjectId::now_v7();
        let base = Utc::now();
        flags
            .iter()
            .enumerate()
            .map(|(i, active)| Event {
                event_id: EventId::now_v7(),
                project_id,
                event_type: "fragment_updated".to_string(),
                data: json!({}),
                is_active: *active,
                reverted_at: None,
                created_at: base + Duration::milliseconds(i as i64),
                sequence: i as u64,
            })
            .collect()
    }

    #[test]
    fn test_clear_head_is_noop() {
        let events = history(&[true, false, true]);
        assert!(plan_head_move(&events, None).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_target() {
        let events = history(&[true]);
        assert!(plan_head_move(&events, Some(EventId::now_v7())).is_none());
    }

    #[test]
    fn test_move_back_then_forward() {
        let mut events = history(&[true, true, true]);
        let ids: Vec<EventId> = events.iter().map(|e| e.event_id).collect();

        let plan = plan_head_move(&events, Some(ids[0])).unwrap();
        assert!(plan.reactivate.is_empty());
        assert_eq!(plan.deactivate, vec![ids[1], ids[2]]);

        for e in events.iter_mut().skip(1) {
            e.is_active = false;
        }
        let plan = plan_head_move(&events, Some(ids[2])).unwrap();
        assert_eq!(plan.reactivate, vec![ids[1], ids[2]]);
        assert!(plan.deactivate.is_empty());
    }

    proptest! {
        #[test]
        fn prop_plan_enforces_head_invariant(
            flags in prop::collection::vec(any::<bool>(), 1..20),
            pick in any::<prop::sample::Index>(),
        ) {
            let mut events = history(&flags);
            let cut = pick.index(events.len());
            let target = events[cut].event_id;

            let plan = plan_head_move(&events, Some(target)).unwrap();
            for e in events.iter_mut() {
                if plan.reactivate.contains(&e.event_id) {
                    prop_assert!(!e.is_active);
                    e.is_active = true;
                }
                if plan.deactivate.contains(&e.event_id) {
                    prop_assert!(e.is_active);
                    e.is_active = false;
                }
            }
            for (idx, e) in events.iter().enumerate() {
                prop_assert_eq!(e.is_active, idx <= cut);
            }

            // Planning again from the resulting state changes nothing.
            prop_assert!(plan_head_move(&events, Some(target)).unwrap().is_empty());
        }
    }
}
