//! [`Engine`] over the native NGT library through `ngt-sys`.
//!
//! Raw pointers cross the trait boundary as `u64` handles. NGT writes its own
//! failures into the error object; failures detected on the Rust side (a path
//! with an interior NUL, an unknown type code) are kept in a side table keyed
//! by the error handle and surface through the same `error_string`.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use dashmap::DashMap;

use super::{Engine, ErrorPtr, IndexPtr, ObjectDistance, ObjectSpacePtr, PropertyPtr, ResultsPtr};
use crate::types::{DistanceType, ObjectType};

fn to_handle<P>(ptr: *mut P) -> u64 {
    ptr as usize as u64
}

fn to_ptr<P>(handle: u64) -> *mut P {
    handle as usize as *mut P
}

/// NGT-backed engine. Stateless apart from Rust-side error messages, so one
/// value can serve any number of indexes.
#[derive(Default)]
pub struct NgtEngine {
    local_errors: DashMap<u64, String>,
}

impl NgtEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn fail<T: Default>(&self, err: ErrorPtr, message: impl Into<String>) -> T {
        let message = message.into();
        tracing::debug!(error = %message, "ngt call rejected");
        self.local_errors.insert(err.0, message);
        T::default()
    }

    fn c_path(&self, path: &str, err: ErrorPtr) -> Option<CString> {
        match CString::new(path) {
            Ok(path) => Some(path),
            Err(_) => self.fail(err, format!("Path contains a NUL byte: {path:?}")),
        }
    }
}

impl Engine for NgtEngine {
    fn create_error_object(&self) -> ErrorPtr {
        // SAFETY: no preconditions.
        ErrorPtr(to_handle(unsafe { ngt_sys::ngt_create_error_object() }))
    }

    fn destroy_error_object(&self, err: ErrorPtr) {
        self.local_errors.remove(&err.0);
        // SAFETY: `err` came from `create_error_object` and is destroyed once.
        unsafe { ngt_sys::ngt_destroy_error_object(to_ptr(err.0)) }
    }

    fn error_string(&self, err: ErrorPtr) -> Option<String> {
        if let Some(message) = self.local_errors.get(&err.0) {
            return Some(message.value().clone());
        }
        // SAFETY: the returned string is owned by the error object and copied
        // before any other call on it.
        unsafe {
            let raw: *const c_char = ngt_sys::ngt_get_error_string(to_ptr(err.0));
            if raw.is_null() {
                return None;
            }
            let message = CStr::from_ptr(raw).to_string_lossy().into_owned();
            (!message.is_empty()).then_some(message)
        }
    }

    fn clear_error_string(&self, err: ErrorPtr) {
        self.local_errors.remove(&err.0);
        // SAFETY: `err` is a live error object.
        unsafe { ngt_sys::ngt_clear_error_string(to_ptr(err.0)) }
    }

    fn create_property(&self, err: ErrorPtr) -> PropertyPtr {
        // SAFETY: `err` is a live error object.
        PropertyPtr(to_handle(unsafe {
            ngt_sys::ngt_create_property(to_ptr(err.0))
        }))
    }

    fn destroy_property(&self, prop: PropertyPtr) {
        // SAFETY: `prop` came from `create_property` and is destroyed once.
        unsafe { ngt_sys::ngt_destroy_property(to_ptr(prop.0)) }
    }

    fn set_property_dimension(&self, prop: PropertyPtr, dimension: i32, err: ErrorPtr) -> bool {
        // SAFETY: live property and error objects.
        unsafe { ngt_sys::ngt_set_property_dimension(to_ptr(prop.0), dimension, to_ptr(err.0)) }
    }

    fn set_property_edge_size_for_creation(
        &self,
        prop: PropertyPtr,
        edge_size: i16,
        err: ErrorPtr,
    ) -> bool {
        // SAFETY: live property and error objects.
        unsafe {
            ngt_sys::ngt_set_property_edge_size_for_creation(
                to_ptr(prop.0),
                edge_size,
                to_ptr(err.0),
            )
        }
    }

    fn set_property_edge_size_for_search(
        &self,
        prop: PropertyPtr,
        edge_size: i16,
        err: ErrorPtr,
    ) -> bool {
        // SAFETY: live property and error objects.
        unsafe {
            ngt_sys::ngt_set_property_edge_size_for_search(
                to_ptr(prop.0),
                edge_size,
                to_ptr(err.0),
            )
        }
    }

    fn set_property_object_type(&self, prop: PropertyPtr, code: i32, err: ErrorPtr) -> bool {
        let Ok(object_type) = ObjectType::try_from(code) else {
            return self.fail(err, format!("Invalid object type code: {code}"));
        };
        let (p, e) = (to_ptr(prop.0), to_ptr(err.0));
        // SAFETY: live property and error objects.
        unsafe {
            match object_type {
                ObjectType::Float => ngt_sys::ngt_set_property_object_type_float(p, e),
                ObjectType::Float16 => ngt_sys::ngt_set_property_object_type_float16(p, e),
                ObjectType::Integer => ngt_sys::ngt_set_property_object_type_integer(p, e),
            }
        }
    }

    fn set_property_distance_type(&self, prop: PropertyPtr, code: i32, err: ErrorPtr) -> bool {
        let Ok(distance_type) = DistanceType::try_from(code) else {
            return self.fail(err, format!("Invalid distance type code: {code}"));
        };
        let (p, e) = (to_ptr(prop.0), to_ptr(err.0));
        // SAFETY: live property and error objects.
        unsafe {
            match distance_type {
                DistanceType::L1 => ngt_sys::ngt_set_property_distance_type_l1(p, e),
                DistanceType::L2 => ngt_sys::ngt_set_property_distance_type_l2(p, e),
                DistanceType::Hamming => ngt_sys::ngt_set_property_distance_type_hamming(p, e),
                DistanceType::Angle => ngt_sys::ngt_set_property_distance_type_angle(p, e),
                DistanceType::Cosine => ngt_sys::ngt_set_property_distance_type_cosine(p, e),
                DistanceType::NormalizedAngle => {
                    ngt_sys::ngt_set_property_distance_type_normalized_angle(p, e)
                }
                DistanceType::NormalizedCosine => {
                    ngt_sys::ngt_set_property_distance_type_normalized_cosine(p, e)
                }
                DistanceType::Jaccard => ngt_sys::ngt_set_property_distance_type_jaccard(p, e),
            }
        }
    }

    fn get_property_dimension(&self, prop: PropertyPtr, err: ErrorPtr) -> i32 {
        // SAFETY: live property and error objects.
        unsafe { ngt_sys::ngt_get_property_dimension(to_ptr(prop.0), to_ptr(err.0)) }
    }

    fn get_property_edge_size_for_creation(&self, prop: PropertyPtr, err: ErrorPtr) -> i16 {
        // SAFETY: live property and error objects.
        unsafe { ngt_sys::ngt_get_property_edge_size_for_creation(to_ptr(prop.0), to_ptr(err.0)) }
    }

    fn get_property_edge_size_for_search(&self, prop: PropertyPtr, err: ErrorPtr) -> i16 {
        // SAFETY: live property and error objects.
        unsafe { ngt_sys::ngt_get_property_edge_size_for_search(to_ptr(prop.0), to_ptr(err.0)) }
    }

    /// NGT numbers object types differently; its predicates translate them to
    /// this crate's codes. Unrecognized types read back as `0`.
    fn get_property_object_type(&self, prop: PropertyPtr, err: ErrorPtr) -> i32 {
        // SAFETY: live property and error objects.
        unsafe {
            let native = ngt_sys::ngt_get_property_object_type(to_ptr(prop.0), to_ptr(err.0));
            if ngt_sys::ngt_is_property_object_type_float(native) {
                ObjectType::Float.code()
            } else if ngt_sys::ngt_is_property_object_type_float16(native) {
                ObjectType::Float16.code()
            } else if ngt_sys::ngt_is_property_object_type_integer(native) {
                ObjectType::Integer.code()
            } else {
                0
            }
        }
    }

    fn get_property_distance_type(&self, prop: PropertyPtr, err: ErrorPtr) -> i32 {
        // SAFETY: live property and error objects.
        unsafe { ngt_sys::ngt_get_property_distance_type(to_ptr(prop.0), to_ptr(err.0)) as i32 }
    }

    fn create_graph_and_tree_in_memory(&self, prop: PropertyPtr, err: ErrorPtr) -> IndexPtr {
        // SAFETY: live property and error objects.
        IndexPtr(to_handle(unsafe {
            ngt_sys::ngt_create_graph_and_tree_in_memory(to_ptr(prop.0), to_ptr(err.0))
        }))
    }

    fn open_index(&self, path: &str, err: ErrorPtr) -> IndexPtr {
        let Some(path) = self.c_path(path, err) else {
            return IndexPtr::NULL;
        };
        // SAFETY: `path` outlives the call.
        IndexPtr(to_handle(unsafe {
            ngt_sys::ngt_open_index(path.as_ptr(), to_ptr(err.0))
        }))
    }

    fn close_index(&self, index: IndexPtr) {
        // SAFETY: `index` came from create/open and is closed once.
        unsafe { ngt_sys::ngt_close_index(to_ptr(index.0)) }
    }

    fn get_property(&self, index: IndexPtr, prop: PropertyPtr, err: ErrorPtr) -> bool {
        // SAFETY: live index, property and error objects.
        unsafe { ngt_sys::ngt_get_property(to_ptr(index.0), to_ptr(prop.0), to_ptr(err.0)) }
    }

    fn insert_index(
        &self,
        index: IndexPtr,
        object: &[f64],
        dimension: u32,
        err: ErrorPtr,
    ) -> u32 {
        // NGT takes a mutable pointer but only reads it.
        let mut buffer = object.to_vec();
        // SAFETY: `buffer` holds `dimension` values and outlives the call.
        unsafe {
            ngt_sys::ngt_insert_index(
                to_ptr(index.0),
                buffer.as_mut_ptr(),
                dimension,
                to_ptr(err.0),
            )
        }
    }

    fn batch_insert_index(
        &self,
        index: IndexPtr,
        objects: &[f32],
        count: u32,
        ids: &mut [u32],
        err: ErrorPtr,
    ) -> bool {
        if ids.len() < count as usize {
            return self.fail(
                err,
                format!("Id buffer too small: {} for {} objects", ids.len(), count),
            );
        }
        let mut buffer = objects.to_vec();
        // SAFETY: `buffer` holds `count` objects and `ids` has room for `count` ids.
        unsafe {
            ngt_sys::ngt_batch_insert_index(
                to_ptr(index.0),
                buffer.as_mut_ptr(),
                count,
                ids.as_mut_ptr(),
                to_ptr(err.0),
            )
        }
    }

    fn create_index(&self, index: IndexPtr, pool_size: u32, err: ErrorPtr) -> bool {
        // SAFETY: live index and error objects.
        unsafe { ngt_sys::ngt_create_index(to_ptr(index.0), pool_size, to_ptr(err.0)) }
    }

    fn remove_index(&self, index: IndexPtr, id: u32, err: ErrorPtr) -> bool {
        // SAFETY: live index and error objects.
        unsafe { ngt_sys::ngt_remove_index(to_ptr(index.0), id, to_ptr(err.0)) }
    }

    fn save_index(&self, index: IndexPtr, path: &str, err: ErrorPtr) -> bool {
        let Some(path) = self.c_path(path, err) else {
            return false;
        };
        // SAFETY: `path` outlives the call.
        unsafe { ngt_sys::ngt_save_index(to_ptr(index.0), path.as_ptr(), to_ptr(err.0)) }
    }

    fn create_empty_results(&self, err: ErrorPtr) -> ResultsPtr {
        // SAFETY: live error object.
        ResultsPtr(to_handle(unsafe {
            ngt_sys::ngt_create_empty_results(to_ptr(err.0))
        }))
    }

    fn destroy_results(&self, results: ResultsPtr) {
        // SAFETY: `results` came from `create_empty_results` and is destroyed once.
        unsafe { ngt_sys::ngt_destroy_results(to_ptr(results.0)) }
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
        let mut buffer = query.to_vec();
        // SAFETY: `buffer` holds `dimension` values and outlives the call.
        unsafe {
            ngt_sys::ngt_search_index(
                to_ptr(index.0),
                buffer.as_mut_ptr(),
                dimension,
                size,
                epsilon,
                radius,
                to_ptr(results.0),
                to_ptr(err.0),
            )
        }
    }

    fn get_result_size(&self, results: ResultsPtr, err: ErrorPtr) -> u32 {
        // SAFETY: live results and error objects.
        unsafe { ngt_sys::ngt_get_result_size(to_ptr(results.0), to_ptr(err.0)) }
    }

    fn get_result(&self, results: ResultsPtr, i: u32, err: ErrorPtr) -> ObjectDistance {
        // SAFETY: live results and error objects; NGT bounds-checks `i`.
        let entry = unsafe { ngt_sys::ngt_get_result(to_ptr(results.0), i, to_ptr(err.0)) };
        ObjectDistance {
            id: entry.id,
            distance: entry.distance,
        }
    }

    fn get_object_space(&self, index: IndexPtr, err: ErrorPtr) -> ObjectSpacePtr {
        // SAFETY: live index and error objects.
        ObjectSpacePtr(to_handle(unsafe {
            ngt_sys::ngt_get_object_space(to_ptr(index.0), to_ptr(err.0))
        }))
    }

    fn get_object_as_float(
        &self,
        space: ObjectSpacePtr,
        id: u32,
        dimension: u32,
        err: ErrorPtr,
    ) -> Vec<f32> {
        // SAFETY: on success NGT returns a pointer to `dimension` values owned by
        // the object space; they are copied out immediately.
        unsafe {
            let raw = ngt_sys::ngt_get_object_as_float(to_ptr(space.0), id, to_ptr(err.0));
            if raw.is_null() {
                return Vec::new();
            }
            std::slice::from_raw_parts(raw, dimension as usize).to_vec()
        }
    }

    fn get_object_as_integer(
        &self,
        space: ObjectSpacePtr,
        id: u32,
        dimension: u32,
        err: ErrorPtr,
    ) -> Vec<u8> {
        // SAFETY: as for `get_object_as_float`.
        unsafe {
            let raw = ngt_sys::ngt_get_object_as_integer(to_ptr(space.0), id, to_ptr(err.0));
            if raw.is_null() {
                return Vec::new();
            }
            std::slice::from_raw_parts(raw, dimension as usize).to_vec()
        }
    }
}
