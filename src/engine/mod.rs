//! The narrow boundary between the façade and an index engine.
//!
//! [`Engine`] mirrors a C ABI: resources are opaque handles created and
//! destroyed in pairs, and every fallible function takes an error context as
//! its trailing argument. On failure a function writes a message into that
//! context and returns a default (null, zero or `false`) value. Callers are
//! expected to inspect the context after every call; see
//! [`crate::channel::ErrorChannel`].

pub mod distance;
pub mod memory;
#[cfg(feature = "ngt")]
pub mod ngt;

use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub use memory::MemoryEngine;
#[cfg(feature = "ngt")]
pub use ngt::NgtEngine;

macro_rules! raw_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        pub struct $name(pub u64);

        impl $name {
            pub const NULL: $name = $name(0);

            pub fn is_null(self) -> bool {
                self.0 == 0
            }
        }
    };
}

raw_handle!(
    /// Error context shared by every call of one index.
    ErrorPtr
);
raw_handle!(
    /// Property block: dimension, edge sizes, object type, distance type.
    PropertyPtr
);
raw_handle!(
    /// Live index.
    IndexPtr
);
raw_handle!(
    /// Result buffer filled by a search.
    ResultsPtr
);
raw_handle!(
    /// Object repository of an index. Borrowed from the index, never destroyed on its own.
    ObjectSpacePtr
);

/// One entry of a result buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectDistance {
    pub id: u32,
    pub distance: f32,
}

pub trait Engine: Send + Sync {
    fn create_error_object(&self) -> ErrorPtr;
    fn destroy_error_object(&self, err: ErrorPtr);
    /// `None` (or an empty string) when the last call succeeded.
    fn error_string(&self, err: ErrorPtr) -> Option<String>;
    fn clear_error_string(&self, err: ErrorPtr);

    fn create_property(&self, err: ErrorPtr) -> PropertyPtr;
    fn destroy_property(&self, prop: PropertyPtr);
    fn set_property_dimension(&self, prop: PropertyPtr, dimension: i32, err: ErrorPtr) -> bool;
    fn set_property_edge_size_for_creation(
        &self,
        prop: PropertyPtr,
        edge_size: i16,
        err: ErrorPtr,
    ) -> bool;
    fn set_property_edge_size_for_search(
        &self,
        prop: PropertyPtr,
        edge_size: i16,
        err: ErrorPtr,
    ) -> bool;
    fn set_property_object_type(&self, prop: PropertyPtr, code: i32, err: ErrorPtr) -> bool;
    fn set_property_distance_type(&self, prop: PropertyPtr, code: i32, err: ErrorPtr) -> bool;
    fn get_property_dimension(&self, prop: PropertyPtr, err: ErrorPtr) -> i32;
    fn get_property_edge_size_for_creation(&self, prop: PropertyPtr, err: ErrorPtr) -> i16;
    fn get_property_edge_size_for_search(&self, prop: PropertyPtr, err: ErrorPtr) -> i16;
    fn get_property_object_type(&self, prop: PropertyPtr, err: ErrorPtr) -> i32;
    fn get_property_distance_type(&self, prop: PropertyPtr, err: ErrorPtr) -> i32;

    fn create_graph_and_tree_in_memory(&self, prop: PropertyPtr, err: ErrorPtr) -> IndexPtr;
    fn open_index(&self, path: &str, err: ErrorPtr) -> IndexPtr;
    fn close_index(&self, index: IndexPtr);
    /// Copies the index's stored property into `prop`.
    fn get_property(&self, index: IndexPtr, prop: PropertyPtr, err: ErrorPtr) -> bool;

    /// Returns the new object's id, `0` on failure.
    fn insert_index(&self, index: IndexPtr, object: &[f64], dimension: u32, err: ErrorPtr)
        -> u32;
    /// `objects` holds `count` objects back to back; `ids` receives one id per object.
    fn batch_insert_index(
        &self,
        index: IndexPtr,
        objects: &[f32],
        count: u32,
        ids: &mut [u32],
        err: ErrorPtr,
    ) -> bool;
    /// Builds the search graph over every object inserted since the last build.
    fn create_index(&self, index: IndexPtr, pool_size: u32, err: ErrorPtr) -> bool;
    fn remove_index(&self, index: IndexPtr, id: u32, err: ErrorPtr) -> bool;
    fn save_index(&self, index: IndexPtr, path: &str, err: ErrorPtr) -> bool;

    fn create_empty_results(&self, err: ErrorPtr) -> ResultsPtr;
    fn destroy_results(&self, results: ResultsPtr);
    #[allow(clippy::too_many_arguments)]
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
    ) -> bool;
    fn get_result_size(&self, results: ResultsPtr, err: ErrorPtr) -> u32;
    fn get_result(&self, results: ResultsPtr, i: u32, err: ErrorPtr) -> ObjectDistance;

    fn get_object_space(&self, index: IndexPtr, err: ErrorPtr) -> ObjectSpacePtr;
    /// Copies the first `dimension` values of a stored object.
    fn get_object_as_float(
        &self,
        space: ObjectSpacePtr,
        id: u32,
        dimension: u32,
        err: ErrorPtr,
    ) -> Vec<f32>;
    fn get_object_as_integer(
        &self,
        space: ObjectSpacePtr,
        id: u32,
        dimension: u32,
        err: ErrorPtr,
    ) -> Vec<u8>;
}

static DEFAULT_ENGINE: Lazy<Arc<MemoryEngine>> = Lazy::new(|| Arc::new(MemoryEngine::new()));

/// Process-wide engine used by [`crate::Index::create`] and [`crate::Index::open`].
pub fn default_engine() -> Arc<dyn Engine> {
    DEFAULT_ENGINE.clone()
}
