//! Mutation recording end to end: fragments, versions and events.

use std::sync::Arc;

use serde_json::json;
use specforge_core::{EntityType, ForgeConfig, ProjectId, SpecHash};
use specforge_events::{
    EventLog, EventLogExt, EventQuery, FRAGMENT_CREATED, FRAGMENT_DELETED, FRAGMENT_UPDATED,
    SPEC_VALIDATED, VALIDATION_FAILED,
};
use specforge_storage::StorageTrait;
use specforge_test_utils::assertions::{assert_event_log_error, assert_not_found};
use specforge_test_utils::fixtures::test_config;
use specforge_test_utils::{init_test_tracing, MockStorage, ScriptedToolRunner};
use specforge_validate::{FragmentMutation, SpecPipeline, SpecRecorder};

struct Harness {
    recorder: SpecRecorder<MockStorage>,
    storage: Arc<MockStorage>,
    _tmp: tempfile::TempDir,
}

fn harness_with(configure: impl FnOnce(&mut ForgeConfig)) -> Harness {
    init_test_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let mut config = test_config(tmp.path());
    configure(&mut config);
    let storage = Arc::new(MockStorage::new());
    let pipeline = SpecPipeline::new(&config, Arc::new(ScriptedToolRunner::default()));
    Harness {
        recorder: SpecRecorder::new(storage.clone(), pipeline, &config),
        storage,
        _tmp: tmp,
    }
}

fn harness() -> Harness {
    harness_with(|_| {})
}

#[tokio::test]
async fn resubmitting_same_content_reuses_version() {
    let h = harness();
    let project = h.recorder.create_project("scenario-a").unwrap();

    let first = h
        .recorder
        .apply(project.project_id, FragmentMutation::upsert("a.cue", "x: 1"))
        .await
        .unwrap();
    assert!(first.validation.success);
    let version = first.version.clone().unwrap();
    assert_eq!(version.spec_hash, SpecHash::of(&json!({"x": 1})));
    let event = first.event.unwrap();
    assert_eq!(event.event_type, FRAGMENT_CREATED);
    assert_eq!(event.spec_hash(), Some(version.spec_hash.clone()));
    assert!(first.failure_event.is_none());

    let second = h
        .recorder
        .apply(project.project_id, FragmentMutation::upsert("a.cue", "x: 1"))
        .await
        .unwrap();
    assert!(second.event.is_none());
    assert_eq!(second.version.unwrap().version_id, version.version_id);
    assert_eq!(h.storage.version_count(), 1);
    assert_eq!(h.storage.event_count(), 1);

    let third = h
        .recorder
        .apply(project.project_id, FragmentMutation::upsert("a.cue", "x: 2"))
        .await
        .unwrap();
    assert_eq!(third.event.unwrap().event_type, FRAGMENT_UPDATED);

    let resolved = h.recorder.resolved(project.project_id).unwrap().unwrap();
    assert_eq!(resolved.resolved, json!({"x": 2}));
}

#[tokio::test]
async fn failed_validation_writes_no_version() {
    let h = harness();
    let project = h.recorder.create_project("scenario-b").unwrap();

    let outcome = h
        .recorder
        .apply(
            project.project_id,
            FragmentMutation::upsert("a.cue", "x: \"${TODO}\""),
        )
        .await
        .unwrap();
    assert!(!outcome.validation.success);
    assert!(outcome.version.is_none());
    assert_eq!(h.storage.version_count(), 0);

    let event = outcome.event.unwrap();
    assert!(event.spec_hash().is_none());
    let failure = outcome.failure_event.unwrap();
    assert_eq!(failure.event_type, VALIDATION_FAILED);
    assert_eq!(failure.data["error_count"], 1);
    assert_eq!(failure.data["errors"][0]["type"], "assertion");
    assert_eq!(failure.data["path"], "a.cue");
}

#[tokio::test]
async fn failures_can_go_unrecorded() {
    let h = harness_with(|c| c.record_failures = false);
    let project = h.recorder.create_project("quiet").unwrap();

    let outcome = h
        .recorder
        .apply(project.project_id, FragmentMutation::upsert("a.cue", "x: y"))
        .await
        .unwrap();
    assert!(!outcome.validation.success);
    assert!(outcome.failure_event.is_none());
    assert_eq!(h.storage.event_count(), 1);
}

#[tokio::test]
async fn every_recorded_hash_has_a_version() {
    let h = harness();
    let project = h.recorder.create_project("no-orphans").unwrap();
    let mutations = [
        FragmentMutation::upsert("a.cue", "x: 1"),
        FragmentMutation::upsert("b.cue", "y: 2"),
        FragmentMutation::upsert("b.cue", "y: \"${T}\""),
        FragmentMutation::upsert("b.cue", "x: 3"),
        FragmentMutation::delete("b.cue"),
    ];
    for mutation in mutations {
        h.recorder.apply(project.project_id, mutation).await.unwrap();
    }

    let events = h
        .recorder
        .event_log()
        .list_events(project.project_id, &EventQuery::new())
        .unwrap();
    assert_eq!(events.last().unwrap().event_type, FRAGMENT_DELETED);
    for event in events {
        if let Some(hash) = event.spec_hash() {
            assert!(h
                .storage
                .version_get_by_hash(project.project_id, &hash)
                .unwrap()
                .is_some());
        }
    }
    let latest = h.recorder.resolved(project.project_id).unwrap().unwrap();
    assert_eq!(latest.resolved, json!({"x": 1}));
}

#[tokio::test]
async fn deleting_unknown_fragment_records_nothing() {
    let h = harness();
    let project = h.recorder.create_project("delete").unwrap();
    h.recorder
        .apply(project.project_id, FragmentMutation::upsert("a.cue", "x: 1"))
        .await
        .unwrap();

    let outcome = h
        .recorder
        .apply(project.project_id, FragmentMutation::delete("missing.cue"))
        .await
        .unwrap();
    assert!(outcome.fragment.is_none());
    assert!(outcome.event.is_none());
    assert!(outcome.validation.success);
    assert_eq!(h.storage.event_count(), 1);
}

#[tokio::test]
async fn explicit_validate_records_spec_validated() {
    let h = harness();
    let project = h.recorder.create_project("validate").unwrap();
    h.recorder
        .apply(project.project_id, FragmentMutation::upsert("a.cue", "x: 1"))
        .await
        .unwrap();

    let outcome = h.recorder.validate(project.project_id).await.unwrap();
    let event = outcome.event.unwrap();
    assert_eq!(event.event_type, SPEC_VALIDATED);
    assert_eq!(event.spec_hash(), outcome.validation.spec_hash);
}

#[tokio::test]
async fn undo_through_the_recorder() {
    let h = harness();
    let project = h.recorder.create_project("undo").unwrap();
    let mut ids = Vec::new();
    for content in ["x: 1", "x: 2", "x: 3"] {
        let outcome = h
            .recorder
            .apply(project.project_id, FragmentMutation::upsert("a.cue", content))
            .await
            .unwrap();
        ids.push(outcome.event.unwrap().event_id);
    }

    let change = h
        .recorder
        .set_head(project.project_id, Some(ids[0]))
        .await
        .unwrap();
    assert_eq!(change.deactivated_event_ids, vec![ids[1], ids[2]]);

    let result = h.recorder.revert_events(project.project_id, &[ids[0]]).await;
    assert_event_log_error(&result);

    let active = h.recorder.event_log().active_events(project.project_id).unwrap();
    assert_eq!(active.len(), 1);
    let resolved = h.recorder.resolved(project.project_id).unwrap().unwrap();
    assert_eq!(resolved.resolved, json!({"x": 1}));

    h.recorder
        .set_head(project.project_id, Some(ids[2]))
        .await
        .unwrap();
    let resolved = h.recorder.resolved(project.project_id).unwrap().unwrap();
    assert_eq!(resolved.resolved, json!({"x": 3}));
}

#[tokio::test]
async fn unknown_project_is_rejected() {
    let h = harness();
    let result = h
        .recorder
        .apply(ProjectId::now_v7(), FragmentMutation::upsert("a.cue", "x: 1"))
        .await;
    assert_not_found(&result, EntityType::Project);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn projects_record_concurrently() {
    let h = Arc::new(harness());
    let mut tasks = Vec::new();
    for i in 0..4 {
        let h = Arc::clone(&h);
        tasks.push(tokio::spawn(async move {
            let project = h.recorder.create_project(format!("p{i}")).unwrap();
            for n in 0..3 {
                h.recorder
                    .apply(
                        project.project_id,
                        FragmentMutation::upsert(format!("f{n}.cue"), format!("k{n}: {i}")),
                    )
                    .await
                    .unwrap();
            }
            project.project_id
        }));
    }

    for task in tasks {
        let project_id = task.await.unwrap();
        let events = h
            .recorder
            .event_log()
            .list_events(project_id, &EventQuery::new())
            .unwrap();
        assert_eq!(events.len(), 3);
        assert!(events.windows(2).all(|w| w[0].ordering_key() < w[1].ordering_key()));
        assert_eq!(h.recorder.storage().fragment_list(project_id).unwrap().len(), 3);
    }
}
