//! The check-and-clear error protocol and per-operation failure handling.

use super::InstrumentedEngine;
use crate::{AnnError, Index, IndexConfig, ObjectType, SearchParams};

const NON_CHECKED: [&str; 7] = [
    "create_error_object",
    "destroy_error_object",
    "error_string",
    "clear_error_string",
    "destroy_property",
    "close_index",
    "destroy_results",
];

fn seeded(engine: &std::sync::Arc<InstrumentedEngine>) -> Index {
    let mut index = Index::create_with_engine(engine.clone(), IndexConfig::new(2)).unwrap();
    index
        .batch_insert(&[[0.0, 0.0], [1.0, 0.0], [0.0, 3.0]], 2)
        .unwrap();
    index
}

#[test]
fn every_engine_call_is_followed_by_an_error_check() {
    let engine = InstrumentedEngine::new();
    let mut index = seeded(&engine);
    index.insert(&[5.0, 5.0]).unwrap();
    index.build_index(1).unwrap();
    index.search(&[0.0, 0.0], &SearchParams::default()).unwrap();
    index.object(1).unwrap();
    index.remove(2);
    drop(index);

    let calls = engine.calls();
    for (i, call) in calls.iter().enumerate() {
        if NON_CHECKED.contains(call) {
            continue;
        }
        assert_eq!(
            calls.get(i + 1).copied(),
            Some("error_string"),
            "{call} at {i} was not checked: {calls:?}"
        );
    }
}

#[test]
fn engine_error_is_cleared_before_next_call() {
    let engine = InstrumentedEngine::new();
    let mut index = seeded(&engine);

    engine.fail_on("insert_index");
    let err = index.insert(&[1.0, 1.0]).unwrap_err();
    assert_eq!(err, AnnError::Engine("injected failure in insert_index".into()));
    assert_eq!(engine.count("clear_error_string"), 1);

    engine.clear_failure();
    let id = index.insert(&[1.0, 1.0]).unwrap();
    assert_eq!(id, 4);
}

#[test]
fn search_failure_releases_results_buffer() {
    for op in ["search_index", "get_result_size", "get_result"] {
        let engine = InstrumentedEngine::new();
        let index = seeded(&engine);
        engine.fail_on(op);

        let err = index
            .search(&[0.0, 0.0], &SearchParams::default())
            .unwrap_err();
        assert!(matches!(err, AnnError::Engine(_)), "{op}: {err}");
        assert_eq!(engine.count("create_empty_results"), 1, "{op}");
        assert_eq!(engine.count("destroy_results"), 1, "{op}");

        engine.clear_failure();
        let results = index.search(&[0.0, 0.0], &SearchParams::default()).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(engine.count("destroy_results"), 2, "{op}");
    }
}

#[test]
fn failed_results_allocation_is_not_released() {
    let engine = InstrumentedEngine::new();
    let index = seeded(&engine);
    engine.fail_on("create_empty_results");
    assert!(index.search(&[0.0, 0.0], &SearchParams::default()).is_err());
    assert_eq!(engine.count("destroy_results"), 0);
    assert_eq!(engine.count("search_index"), 0);
}

#[test]
fn remove_swallows_engine_errors() {
    let engine = InstrumentedEngine::new();
    let mut index = seeded(&engine);

    engine.fail_on("remove_index");
    assert!(!index.remove(1));
    engine.clear_failure();

    assert!(index.remove(1));
    assert!(!index.remove(1));
    assert!(!index.remove(99));
}

#[test]
fn empty_batch_makes_no_engine_call() {
    let engine = InstrumentedEngine::new();
    let mut index = Index::create_with_engine(engine.clone(), IndexConfig::new(3)).unwrap();
    engine.reset_calls();

    let empty: Vec<Vec<f64>> = Vec::new();
    assert!(index.batch_insert(&empty, 8).unwrap().is_empty());
    assert!(engine.calls().is_empty(), "{:?}", engine.calls());
}

#[test]
fn batch_dimension_mismatch_mutates_nothing() {
    let engine = InstrumentedEngine::new();
    let mut index = Index::create_with_engine(engine.clone(), IndexConfig::new(3)).unwrap();
    engine.reset_calls();

    let objects = vec![vec![1.0, 2.0, 3.0], vec![1.0, 2.0], vec![1.0]];
    let err = index.batch_insert(&objects, 8).unwrap_err();
    assert_eq!(
        err,
        AnnError::DimensionMismatch {
            expected: 3,
            got: 2
        }
    );
    assert!(engine.calls().is_empty(), "{:?}", engine.calls());

    // The index is still empty: the next id handed out is the first one.
    assert_eq!(index.insert(&[0.0, 0.0, 0.0]).unwrap(), 1);
}

#[test]
fn batch_insert_always_builds() {
    let engine = InstrumentedEngine::new();
    let mut index = Index::create_with_engine(engine.clone(), IndexConfig::new(1)).unwrap();
    engine.reset_calls();
    index.batch_insert(&[[1.0], [2.0]], 3).unwrap();
    assert_eq!(engine.count("batch_insert_index"), 1);
    assert_eq!(engine.count("create_index"), 1);
}

#[test]
fn batch_build_failure_returns_no_ids() {
    let engine = InstrumentedEngine::new();
    let mut index = Index::create_with_engine(engine.clone(), IndexConfig::new(1)).unwrap();
    engine.fail_on("create_index");
    let err = index.batch_insert(&[[1.0], [2.0]], 3).unwrap_err();
    assert_eq!(err, AnnError::Engine("injected failure in create_index".into()));
}

#[test]
fn single_insert_does_not_build() {
    let engine = InstrumentedEngine::new();
    let mut index = Index::create_with_engine(engine.clone(), IndexConfig::new(1)).unwrap();
    engine.reset_calls();
    index.insert(&[1.0]).unwrap();
    assert_eq!(engine.count("create_index"), 0);
}

#[test]
fn dimension_errors_never_reach_the_engine() {
    let engine = InstrumentedEngine::new();
    let mut index = seeded(&engine);
    engine.reset_calls();

    assert!(matches!(
        index.insert(&[1.0]),
        Err(AnnError::DimensionMismatch { expected: 2, got: 1 })
    ));
    assert!(matches!(
        index.search(&[1.0, 2.0, 3.0], &SearchParams::default()),
        Err(AnnError::DimensionMismatch { expected: 2, got: 3 })
    ));
    assert!(engine.calls().is_empty(), "{:?}", engine.calls());
}

#[test]
fn float16_readback_is_unsupported_without_engine_call() {
    let engine = InstrumentedEngine::new();
    let mut index = Index::create_with_engine(
        engine.clone(),
        IndexConfig::new(3).object_type(ObjectType::Float16),
    )
    .unwrap();
    let id = index.insert(&[1.5, 2.5, 3.5]).unwrap();
    assert_eq!(id, 1);
    assert!(index.build_index(8).unwrap());
    engine.reset_calls();

    let err = index.object(id).unwrap_err();
    assert_eq!(
        err,
        AnnError::UnsupportedOperation("Method not supported for this object type".into())
    );
    assert_eq!(engine.count("get_object_space"), 0);
}

#[test]
fn save_failure_is_engine_error() {
    let engine = InstrumentedEngine::new();
    let index = seeded(&engine);
    engine.fail_on("save_index");
    let tmp = tempfile::TempDir::new().unwrap();
    let err = index.save(tmp.path().join("idx")).unwrap_err();
    assert_eq!(err, AnnError::Engine("injected failure in save_index".into()));
}
