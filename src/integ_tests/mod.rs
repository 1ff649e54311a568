//! Integration tests kept inline so they can use crate internals and an
//! instrumented engine without a separate test binary.

mod test_lifecycle;
mod test_protocol;

use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::engine::{
    Engine, ErrorPtr, IndexPtr, MemoryEngine, ObjectDistance, ObjectSpacePtr, PropertyPtr,
    ResultsPtr,
};

/// [`MemoryEngine`] wrapper that records every call by name and can make a
/// named call fail the way a native engine would: message in the error
/// context, default return value, no side effect.
pub(crate) struct InstrumentedEngine {
    inner: MemoryEngine,
    calls: Mutex<Vec<&'static str>>,
    fail_on: Mutex<Option<&'static str>>,
    injected: DashMap<u64, String>,
}

impl InstrumentedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryEngine::new(),
            calls: Mutex::new(Vec::new()),
            fail_on: Mutex::new(None),
            injected: DashMap::new(),
        })
    }

    /// Every later call to `op` fails until [`InstrumentedEngine::clear_failure`].
    pub fn fail_on(&self, op: &'static str) {
        *self.fail_on.lock().unwrap() = Some(op);
    }

    pub fn clear_failure(&self) {
        *self.fail_on.lock().unwrap() = None;
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    pub fn live_handles(&self) -> usize {
        self.inner.live_handles()
    }

    /// Records `op`; returns `true` when the call must fail.
    fn enter(&self, op: &'static str, err: ErrorPtr) -> bool {
        self.calls.lock().unwrap().push(op);
        let failing = *self.fail_on.lock().unwrap() == Some(op);
        if failing {
            self.injected
                .insert(err.0, format!("injected failure in {op}"));
        }
        failing
    }

    fn record(&self, op: &'static str) {
        self.calls.lock().unwrap().push(op);
    }
}

impl Engine for InstrumentedEngine {
    fn create_error_object(&self) -> ErrorPtr {
        self.record("create_error_object");
        self.inner.create_error_object()
    }

    fn destroy_error_object(&self, err: ErrorPtr) {
        self.record("destroy_error_object");
        self.injected.remove(&err.0);
        self.inner.destroy_error_object(err)
    }

    fn error_string(&self, err: ErrorPtr) -> Option<String> {
        self.record("error_string");
        match self.injected.get(&err.0) {
            Some(message) => Some(message.value().clone()),
            None => self.inner.error_string(err),
        }
    }

    fn clear_error_string(&self, err: ErrorPtr) {
        self.record("clear_error_string");
        self.injected.remove(&err.0);
        self.inner.clear_error_string(err)
    }

    fn create_property(&self, err: ErrorPtr) -> PropertyPtr {
        if self.enter("create_property", err) {
            return PropertyPtr::NULL;
        }
        self.inner.create_property(err)
    }

    fn destroy_property(&self, prop: PropertyPtr) {
        self.record("destroy_property");
        self.inner.destroy_property(prop)
    }

    fn set_property_dimension(&self, prop: PropertyPtr, dimension: i32, err: ErrorPtr) -> bool {
        if self.enter("set_property_dimension", err) {
            return false;
        }
        self.inner.set_property_dimension(prop, dimension, err)
    }

    fn set_property_edge_size_for_creation(
        &self,
        prop: PropertyPtr,
        edge_size: i16,
        err: ErrorPtr,
    ) -> bool {
        if self.enter("set_property_edge_size_for_creation", err) {
            return false;
        }
        self.inner
            .set_property_edge_size_for_creation(prop, edge_size, err)
    }

    fn set_property_edge_size_for_search(
        &self,
        prop: PropertyPtr,
        edge_size: i16,
        err: ErrorPtr,
    ) -> bool {
        if self.enter("set_property_edge_size_for_search", err) {
            return false;
        }
        self.inner
            .set_property_edge_size_for_search(prop, edge_size, err)
    }

    fn set_property_object_type(&self, prop: PropertyPtr, code: i32, err: ErrorPtr) -> bool {
        if self.enter("set_property_object_type", err) {
            return false;
        }
        self.inner.set_property_object_type(prop, code, err)
    }

    fn set_property_distance_type(&self, prop: PropertyPtr, code: i32, err: ErrorPtr) -> bool {
        if self.enter("set_property_distance_type", err) {
            return false;
        }
        self.inner.set_property_distance_type(prop, code, err)
    }

    fn get_property_dimension(&self, prop: PropertyPtr, err: ErrorPtr) -> i32 {
        if self.enter("get_property_dimension", err) {
            return 0;
        }
        self.inner.get_property_dimension(prop, err)
    }

    fn get_property_edge_size_for_creation(&self, prop: PropertyPtr, err: ErrorPtr) -> i16 {
        if self.enter("get_property_edge_size_for_creation", err) {
            return 0;
        }
        self.inner.get_property_edge_size_for_creation(prop, err)
    }

    fn get_property_edge_size_for_search(&self, prop: PropertyPtr, err: ErrorPtr) -> i16 {
        if self.enter("get_property_edge_size_for_search", err) {
            return 0;
        }
        self.inner.get_property_edge_size_for_search(prop, err)
    }

    fn get_property_object_type(&self, prop: PropertyPtr, err: ErrorPtr) -> i32 {
        if self.enter("get_property_object_type", err) {
            return 0;
        }
        self.inner.get_property_object_type(prop, err)
    }

    fn get_property_distance_type(&self, prop: PropertyPtr, err: ErrorPtr) -> i32 {
        if self.enter("get_property_distance_type", err) {
            return 0;
        }
        self.inner.get_property_distance_type(prop, err)
    }

    fn create_graph_and_tree_in_memory(&self, prop: PropertyPtr, err: ErrorPtr) -> IndexPtr {
        if self.enter("create_graph_and_tree_in_memory", err) {
            return IndexPtr::NULL;
        }
        self.inner.create_graph_and_tree_in_memory(prop, err)
    }

    fn open_index(&self, path: &str, err: ErrorPtr) -> IndexPtr {
        if self.enter("open_index", err) {
            return IndexPtr::NULL;
        }
        self.inner.open_index(path, err)
    }

    fn close_index(&self, index: IndexPtr) {
        self.record("close_index");
        self.inner.close_index(index)
    }

    fn get_property(&self, index: IndexPtr, prop: PropertyPtr, err: ErrorPtr) -> bool {
        if self.enter("get_property", err) {
            return false;
        }
        self.inner.get_property(index, prop, err)
    }

    fn insert_index(
        &self,
        index: IndexPtr,
        object: &[f64],
        dimension: u32,
        err: ErrorPtr,
    ) -> u32 {
        if self.enter("insert_index", err) {
            return 0;
        }
        self.inner.insert_index(index, object, dimension, err)
    }

    fn batch_insert_index(
        &self,
        index: IndexPtr,
        objects: &[f32],
        count: u32,
        ids: &mut [u32],
        err: ErrorPtr,
    ) -> bool {
        if self.enter("batch_insert_index", err) {
            return false;
        }
        self.inner
            .batch_insert_index(index, objects, count, ids, err)
    }

    fn create_index(&self, index: IndexPtr, pool_size: u32, err: ErrorPtr) -> bool {
        if self.enter("create_index", err) {
            return false;
        }
        self.inner.create_index(index, pool_size, err)
    }

    fn remove_index(&self, index: IndexPtr, id: u32, err: ErrorPtr) -> bool {
        if self.enter("remove_index", err) {
            return false;
        }
        self.inner.remove_index(index, id, err)
    }

    fn save_index(&self, index: IndexPtr, path: &str, err: ErrorPtr) -> bool {
        if self.enter("save_index", err) {
            return false;
        }
        self.inner.save_index(index, path, err)
    }

    fn create_empty_results(&self, err: ErrorPtr) -> ResultsPtr {
        if self.enter("create_empty_results", err) {
            return ResultsPtr::NULL;
        }
        self.inner.create_empty_results(err)
    }

    fn destroy_results(&self, results: ResultsPtr) {
        self.record("destroy_results");
        self.inner.destroy_results(results)
    }

    fn search_index(
        &self,
        index: IndexPtr,
        query: &[f64],
        dimension: i32,
        size: usize,
        epsilon: f32,
        radius: f32,
        results: ResultsPtr,
        err: ErrorPtr,
    ) -> bool {
        if self.enter("search_index", err) {
            return false;
        }
        self.inner
            .search_index(index, query, dimension, size, epsilon, radius, results, err)
    }

    fn get_result_size(&self, results: ResultsPtr, err: ErrorPtr) -> u32 {
        if self.enter("get_result_size", err) {
            return 0;
        }
        self.inner.get_result_size(results, err)
    }

    fn get_result(&self, results: ResultsPtr, i: u32, err: ErrorPtr) -> ObjectDistance {
        if self.enter("get_result", err) {
            return ObjectDistance::default();
        }
        self.inner.get_result(results, i, err)
    }

    fn get_object_space(&self, index: IndexPtr, err: ErrorPtr) -> ObjectSpacePtr {
        if self.enter("get_object_space", err) {
            return ObjectSpacePtr::NULL;
        }
        self.inner.get_object_space(index, err)
    }

    fn get_object_as_float(
        &self,
        space: ObjectSpacePtr,
        id: u32,
        dimension: u32,
        err: ErrorPtr,
    ) -> Vec<f32> {
        if self.enter("get_object_as_float", err) {
            return Vec::new();
        }
        self.inner.get_object_as_float(space, id, dimension, err)
    }

    fn get_object_as_integer(
        &self,
        space: ObjectSpacePtr,
        id: u32,
        dimension: u32,
        err: ErrorPtr,
    ) -> Vec<u8> {
        if self.enter("get_object_as_integer", err) {
            return Vec::new();
        }
        self.inner.get_object_as_integer(space, id, dimension, err)
    }
}
