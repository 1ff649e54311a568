//! Handle lifetimes: every create has exactly one matching destroy on success
//! and failure paths alike.

use super::InstrumentedEngine;
use crate::{AnnError, DistanceType, Index, IndexConfig, ObjectType};
use tempfile::TempDir;

fn assert_balanced(engine: &InstrumentedEngine) {
    assert_eq!(
        engine.count("create_error_object"),
        engine.count("destroy_error_object"),
        "error objects unbalanced: {:?}",
        engine.calls()
    );
    assert_eq!(engine.live_handles(), 0, "leaked handles: {:?}", engine.calls());
}

#[test]
fn create_and_drop_releases_everything() {
    let engine = InstrumentedEngine::new();
    let index = Index::create_with_engine(engine.clone(), IndexConfig::new(4)).unwrap();
    assert_eq!(engine.live_handles(), 3);
    drop(index);

    assert_balanced(&engine);
    assert_eq!(engine.count("destroy_property"), 1);
    assert_eq!(engine.count("close_index"), 1);
}

#[test]
fn teardown_order_is_index_property_error() {
    let engine = InstrumentedEngine::new();
    let index = Index::create_with_engine(engine.clone(), IndexConfig::new(2)).unwrap();
    engine.reset_calls();
    drop(index);
    assert_eq!(
        engine.calls(),
        vec!["close_index", "destroy_property", "destroy_error_object"]
    );
}

#[test]
fn close_twice_then_drop_closes_once() {
    let engine = InstrumentedEngine::new();
    let mut index = Index::create_with_engine(engine.clone(), IndexConfig::new(2)).unwrap();
    index.close();
    index.close();
    assert!(index.is_closed());
    drop(index);
    assert_eq!(engine.count("close_index"), 1);
    assert_balanced(&engine);
}

#[test]
fn failed_index_allocation_releases_property_and_error() {
    let engine = InstrumentedEngine::new();
    engine.fail_on("create_graph_and_tree_in_memory");

    let err = Index::create_with_engine(engine.clone(), IndexConfig::new(3)).unwrap_err();
    assert_eq!(
        err,
        AnnError::Engine("injected failure in create_graph_and_tree_in_memory".into())
    );
    assert_eq!(engine.count("destroy_property"), 1);
    assert_eq!(engine.count("close_index"), 0);
    assert_balanced(&engine);
}

#[test]
fn failed_property_setter_releases_partial_index() {
    for op in [
        "set_property_dimension",
        "set_property_edge_size_for_creation",
        "set_property_edge_size_for_search",
        "set_property_object_type",
        "set_property_distance_type",
    ] {
        let engine = InstrumentedEngine::new();
        engine.fail_on(op);
        let err = Index::create_with_engine(engine.clone(), IndexConfig::new(3)).unwrap_err();
        assert!(matches!(err, AnnError::Engine(_)), "{op}: {err}");
        assert_eq!(engine.count("create_graph_and_tree_in_memory"), 0, "{op}");
        assert_balanced(&engine);
    }
}

#[test]
fn failed_property_create_releases_error_object() {
    let engine = InstrumentedEngine::new();
    engine.fail_on("create_property");
    assert!(Index::create_with_engine(engine.clone(), IndexConfig::new(3)).is_err());
    assert_eq!(engine.count("destroy_property"), 0);
    assert_balanced(&engine);
}

#[test]
fn failed_read_back_closes_allocated_index() {
    let engine = InstrumentedEngine::new();
    engine.fail_on("get_property_object_type");
    let err = Index::create_with_engine(engine.clone(), IndexConfig::new(3)).unwrap_err();
    assert!(matches!(err, AnnError::Engine(_)));
    assert_eq!(engine.count("close_index"), 1);
    assert_balanced(&engine);
}

#[test]
fn open_missing_path_releases_everything() {
    let engine = InstrumentedEngine::new();
    let tmp = TempDir::new().unwrap();
    let err = Index::open_with_engine(engine.clone(), tmp.path().join("missing")).unwrap_err();
    match err {
        AnnError::Engine(msg) => assert!(msg.contains("Cannot open the index"), "{msg}"),
        other => panic!("expected Engine error, got: {other}"),
    }
    assert_balanced(&engine);
}

#[test]
fn open_failing_property_copy_closes_index() {
    let engine = InstrumentedEngine::new();
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("idx");
    {
        let mut index = Index::create_with_engine(engine.clone(), IndexConfig::new(2)).unwrap();
        index.batch_insert(&[[1.0, 2.0]], 1).unwrap();
        assert!(index.save(&path).unwrap());
    }

    engine.fail_on("get_property");
    assert!(Index::open_with_engine(engine.clone(), &path).is_err());
    assert_eq!(engine.count("open_index"), 1);
    assert_eq!(engine.count("close_index"), 2);
    assert_balanced(&engine);
}

#[test]
fn configuration_errors_allocate_nothing() {
    let engine = InstrumentedEngine::new();
    for config in [
        IndexConfig::new(0),
        IndexConfig::new(3).edge_size_for_creation(0),
        IndexConfig::new(3).edge_size_for_search(-4),
    ] {
        let err = Index::create_with_engine(engine.clone(), config).unwrap_err();
        assert!(matches!(err, AnnError::Configuration(_)), "{err}");
    }
    assert!(engine.calls().is_empty(), "{:?}", engine.calls());
}

#[test]
fn unknown_enum_names_fail_before_engine() {
    let engine = InstrumentedEngine::new();
    let bad_object = IndexConfig::from_json_str(r#"{"dimensions": 3, "objectType": "bad"}"#);
    let bad_distance = IndexConfig::from_json_str(r#"{"dimensions": 3, "distanceType": "bad"}"#);
    assert!(matches!(bad_object, Err(AnnError::Configuration(_))));
    assert!(matches!(bad_distance, Err(AnnError::Configuration(_))));
    assert!(engine.calls().is_empty());
}

#[test]
fn many_indexes_share_one_engine() {
    let engine = InstrumentedEngine::new();
    let indexes: Vec<Index> = DistanceType::ALL
        .into_iter()
        .map(|d| {
            Index::create_with_engine(
                engine.clone(),
                IndexConfig::new(2)
                    .distance_type(d)
                    .object_type(ObjectType::Float),
            )
            .unwrap()
        })
        .collect();
    assert_eq!(engine.live_handles(), 3 * DistanceType::ALL.len());
    for (index, d) in indexes.iter().zip(DistanceType::ALL) {
        assert_eq!(index.distance_type(), d);
    }
    drop(indexes);
    assert_balanced(&engine);
}
