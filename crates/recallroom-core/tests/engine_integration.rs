//! Integration tests for the learner engine.
//!
//! Drives a learner from first exposure through due lists, path planning
//! and analytics against the on-disk stores.

use std::sync::Arc;
use std::thread;

use chrono::{Duration, Utc};
use recallroom_core::{
    AnalyticsOutcome, Interaction, JsonProfileStore, KnowledgeState, MemoryEngine,
    MemoryModelConfig, ProfileStore, SessionType, SqliteProfileStore, StorageError,
};

#[test]
fn test_full_learner_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let store =
        SqliteProfileStore::open_at(&dir.path().join("recallroom.db"), MemoryModelConfig::default())
            .unwrap();
    let engine = MemoryEngine::new(store);
    let start = Utc::now() - Duration::days(30);

    engine
        .link_prerequisite("ana", "closures", "functions", start)
        .unwrap();
    engine
        .associate_material("ana", "closures", "rust-book/ch13.md", start)
        .unwrap();
    engine
        .start_session("ana", SessionType::Study, vec!["basics".into()], start)
        .unwrap();

    // functions: answered well every day for two weeks
    for day in 0..14 {
        let ix = Interaction::new("functions", "Functions", true)
            .with_response_time(4.0)
            .with_confidence(0.9)
            .with_context("daily drill");
        engine
            .record_interaction("ana", &ix, start + Duration::days(day))
            .unwrap();
    }
    // closures: mostly wrong
    for day in 0..4 {
        let ix = Interaction::new("closures", "Closures", day == 3)
            .with_response_time(20.0)
            .with_confidence(0.4);
        engine
            .record_interaction("ana", &ix, start + Duration::days(day))
            .unwrap();
    }
    engine
        .end_session("ana", start + Duration::days(14))
        .unwrap()
        .unwrap();

    let profile = engine.profile("ana").unwrap();
    let functions = profile.concept("functions").unwrap();
    assert!(functions.knowledge_state.is_mastered());
    assert_eq!(functions.dependents, vec!["closures"]);
    let closures = profile.concept("closures").unwrap();
    assert_eq!(closures.knowledge_state, KnowledgeState::Learning);
    assert_eq!(closures.associated_materials, vec!["rust-book/ch13.md"]);

    // everything is overdue 30 days later; the weak concept ranks first
    let now = Utc::now() + Duration::days(400);
    let due = engine.due_concepts("ana", Some(5), now).unwrap();
    let ids: Vec<_> = due.iter().map(|d| d.concept_id.as_str()).collect();
    assert_eq!(ids, vec!["closures", "functions"]);

    let path = engine
        .optimize_path("ana", &["closures".into(), "functions".into(), "macros".into()])
        .unwrap();
    let order = path.concept_order();
    let pos = |id: &str| order.iter().position(|c| *c == id).unwrap();
    assert!(pos("functions") < pos("closures"));
    assert_eq!(order.len(), 3);

    let AnalyticsOutcome::Report(report) = engine.analytics("ana", now).unwrap() else {
        panic!("expected a report");
    };
    assert_eq!(report.summary.total_concepts, 2);
    assert_eq!(report.summary.total_study_sessions, 1);
    assert_eq!(report.performance.total_attempts, 18);
    assert_eq!(report.recommendations.weak_areas[0].concept_id, "closures");
    assert_eq!(report.recommendations.strong_areas[0].concept_id, "functions");
    assert_eq!(report.recommendations.due_for_review, 2);
}

#[test]
fn test_unknown_learner_reports_no_data() {
    let dir = tempfile::tempdir().unwrap();
    let engine = MemoryEngine::new(JsonProfileStore::new(dir.path(), MemoryModelConfig::default()));
    let outcome = engine.analytics("nobody", Utc::now()).unwrap();
    assert!(matches!(outcome, AnalyticsOutcome::NoData(_)));
    assert!(engine.due_concepts("nobody", None, Utc::now()).unwrap().is_empty());
}

#[test]
fn test_linked_concepts_start_fresh_on_first_answer() {
    let dir = tempfile::tempdir().unwrap();
    let engine = MemoryEngine::new(JsonProfileStore::new(dir.path(), MemoryModelConfig::default()));
    let linked_at = Utc::now() - Duration::days(10);
    engine.link_prerequisite("ana", "traits", "generics", linked_at).unwrap();

    let later = Utc::now() + Duration::days(400);
    assert!(engine.due_concepts("ana", None, later).unwrap().is_empty());
    assert!(matches!(
        engine.analytics("ana", later).unwrap(),
        AnalyticsOutcome::NoData(_)
    ));

    let answered_at = Utc::now();
    let ix = Interaction::new("generics", "Generics", true)
        .with_response_time(6.0)
        .with_confidence(0.7);
    let memory = engine.record_interaction("ana", &ix, answered_at).unwrap();
    assert_eq!(memory.concept_name, "Generics");
    assert_eq!(memory.first_exposure, answered_at);
    assert_eq!(memory.knowledge_state, KnowledgeState::Learning);
    assert_eq!(memory.dependents, vec!["traits"]);

    let due = engine.due_concepts("ana", None, later).unwrap();
    let ids: Vec<_> = due.iter().map(|d| d.concept_id.as_str()).collect();
    assert_eq!(ids, vec!["generics"]);
    let AnalyticsOutcome::Report(report) = engine.analytics("ana", later).unwrap() else {
        panic!("expected a report");
    };
    assert_eq!(report.summary.total_concepts, 1);
}

#[test]
fn test_profiles_survive_reopening_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("recallroom.db");
    let now = Utc::now();
    {
        let engine =
            MemoryEngine::new(SqliteProfileStore::open_at(&db, MemoryModelConfig::default()).unwrap());
        engine
            .record_interaction("ana", &Interaction::new("c", "C", true), now)
            .unwrap();
    }
    let engine =
        MemoryEngine::new(SqliteProfileStore::open_at(&db, MemoryModelConfig::default()).unwrap());
    let profile = engine.profile("ana").unwrap();
    assert_eq!(profile.revision, 1);
    assert_eq!(profile.concept("c").unwrap().total_attempts, 1);
}

#[test]
fn test_concurrent_interactions_are_not_lost() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(MemoryEngine::new(JsonProfileStore::new(
        dir.path(),
        MemoryModelConfig::default(),
    )));
    let now = Utc::now();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..5 {
                    let ix = Interaction::new(format!("c{}", i % 2), "C", true);
                    engine.record_interaction("ana", &ix, now).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let profile = engine.profile("ana").unwrap();
    let attempts: u32 = profile.concept_memories.values().map(|m| m.total_attempts).sum();
    assert_eq!(attempts, 40);
    assert_eq!(profile.revision, 40);
}

#[test]
fn test_second_engine_on_same_store_sees_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("recallroom.db");
    let store_a = SqliteProfileStore::open_at(&db, MemoryModelConfig::default()).unwrap();
    let store_b = SqliteProfileStore::open_at(&db, MemoryModelConfig::default()).unwrap();

    let mut from_a = store_a.load("ana").unwrap();
    let mut from_b = store_b.load("ana").unwrap();
    from_a.learning_goals.push("a".into());
    from_b.learning_goals.push("b".into());

    store_a.save(&mut from_a).unwrap();
    let err = store_b.save(&mut from_b).unwrap_err();
    assert!(matches!(
        err,
        StorageError::RevisionConflict { expected: 0, found: 1, .. }
    ));
    assert_eq!(store_b.load("ana").unwrap().learning_goals, vec!["a"]);
}
