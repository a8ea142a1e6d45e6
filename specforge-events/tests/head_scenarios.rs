//! Undo, redo and revert over a project's history.

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;
use specforge_core::{EventId, Project, ProjectId};
use specforge_events::{
    EventBuilder, EventLog, EventLogExt, EventQuery, ProjectEventLog, FRAGMENT_CREATED,
    FRAGMENT_UPDATED,
};
use specforge_storage::{MockStorage, StorageTrait};

fn log_with_events(n: usize) -> (ProjectEventLog<MockStorage>, ProjectId, Vec<EventId>) {
    let storage = Arc::new(MockStorage::new());
    let project = Project::new("history");
    storage.project_insert(&project).unwrap();
    let log = ProjectEventLog::new(storage);

    let ids = (0..n)
        .map(|i| {
            let event_type = if i == 0 { FRAGMENT_CREATED } else { FRAGMENT_UPDATED };
            log.append_new(project.project_id, event_type, json!({"path": "a.cue", "n": i}))
                .unwrap()
                .event_id
        })
        .collect();
    (log, project.project_id, ids)
}

fn active_ids(log: &ProjectEventLog<MockStorage>, project_id: ProjectId) -> Vec<EventId> {
    log.active_events(project_id)
        .unwrap()
        .into_iter()
        .map(|e| e.event_id)
        .collect()
}

#[test]
fn undo_then_redo() {
    let (log, project_id, ids) = log_with_events(3);
    let (e1, e2, e3) = (ids[0], ids[1], ids[2]);

    let change = log.set_head(project_id, Some(e1)).unwrap();
    assert_eq!(change.head.map(|e| e.event_id), Some(e1));
    assert!(change.reactivated_event_ids.is_empty());
    assert_eq!(change.deactivated_event_ids, vec![e2, e3]);
    assert_eq!(active_ids(&log, project_id), vec![e1]);

    let change = log.set_head(project_id, Some(e3)).unwrap();
    assert_eq!(change.reactivated_event_ids, vec![e2, e3]);
    assert!(change.deactivated_event_ids.is_empty());
    assert_eq!(active_ids(&log, project_id), vec![e1, e2, e3]);
}

#[test]
fn revert_leaves_head_alone() {
    let (log, project_id, ids) = log_with_events(3);
    let (e1, e2, e3) = (ids[0], ids[1], ids[2]);
    log.set_head(project_id, Some(e1)).unwrap();
    log.set_head(project_id, Some(e3)).unwrap();

    let changed = log.revert_events(project_id, &[e2]).unwrap();
    assert_eq!(changed, vec![e2]);
    assert_eq!(active_ids(&log, project_id), vec![e1, e3]);
    assert_eq!(log.head(project_id).unwrap().map(|e| e.event_id), Some(e3));

    let all = log.list_events(project_id, &EventQuery::new()).unwrap();
    let reverted = all.iter().find(|e| e.event_id == e2).unwrap();
    assert!(!reverted.is_active);
    assert!(reverted.reverted_at.is_some());

    // Moving the head over a reverted event brings it back.
    log.set_head(project_id, Some(e3)).unwrap();
    let restored = log.storage().event_get(e2).unwrap().unwrap();
    assert!(restored.is_active);
    assert!(restored.reverted_at.is_none());
}

#[test]
fn backdated_event_stays_after_head() {
    let (log, project_id, ids) = log_with_events(1);
    let e1 = log.storage().event_get(ids[0]).unwrap().unwrap();

    let mut late = EventBuilder::new(project_id, FRAGMENT_UPDATED).build();
    late.created_at = e1.created_at - chrono::Duration::seconds(5);
    let e2 = log.append(late).unwrap();
    assert!(e2.created_at > e1.created_at);

    let change = log.set_head(project_id, Some(e1.event_id)).unwrap();
    assert_eq!(change.deactivated_event_ids, vec![e2.event_id]);
    for event in log.list_events(project_id, &EventQuery::new()).unwrap() {
        assert_eq!(event.is_active, event.created_at <= e1.created_at);
    }
}

#[test]
fn revert_with_foreign_id_changes_nothing() {
    let (log, project_id, ids) = log_with_events(2);
    let other = Project::new("other");
    log.storage().project_insert(&other).unwrap();
    let foreign = log
        .append_new(other.project_id, FRAGMENT_CREATED, json!({}))
        .unwrap();

    assert!(log
        .revert_events(project_id, &[ids[0], foreign.event_id])
        .is_err());
    assert_eq!(active_ids(&log, project_id), ids);
}

#[test]
fn list_events_query_options() {
    let (log, project_id, ids) = log_with_events(4);
    log.set_head(project_id, Some(ids[1])).unwrap();

    let newest = log
        .list_events(project_id, &EventQuery::new().newest_first().with_limit(2))
        .unwrap();
    let newest: Vec<EventId> = newest.into_iter().map(|e| e.event_id).collect();
    assert_eq!(newest, vec![ids[3], ids[2]]);

    let active = log
        .list_events(project_id, &EventQuery::new().active_only())
        .unwrap();
    assert_eq!(active.len(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn head_invariant_holds_after_any_move(
        n in 1usize..12,
        moves in prop::collection::vec(any::<prop::sample::Index>(), 1..6),
    ) {
        let (log, project_id, ids) = log_with_events(n);
        for pick in moves {
            let cut = pick.index(ids.len());
            log.set_head(project_id, Some(ids[cut])).unwrap();

            let events = log.list_events(project_id, &EventQuery::new()).unwrap();
            for (idx, event) in events.iter().enumerate() {
                prop_assert_eq!(event.is_active, idx <= cut);
            }
        }
    }

    #[test]
    fn revert_is_idempotent(
        n in 2usize..10,
        picks in prop::collection::vec(any::<prop::sample::Index>(), 1..5),
    ) {
        let (log, project_id, ids) = log_with_events(n);
        let head = ids[n - 1];
        log.set_head(project_id, Some(head)).unwrap();

        let chosen: Vec<EventId> = picks
            .iter()
            .map(|p| ids[p.index(n - 1)])
            .collect();
        log.revert_events(project_id, &chosen).unwrap();
        let first = log.list_events(project_id, &EventQuery::new()).unwrap();

        let changed = log.revert_events(project_id, &chosen).unwrap();
        prop_assert!(changed.is_empty());
        let second = log.list_events(project_id, &EventQuery::new()).unwrap();
        prop_assert_eq!(first, second);
        prop_assert_eq!(log.head(project_id).unwrap().map(|e| e.event_id), Some(head));
    }
}
