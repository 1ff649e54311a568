use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use half::f16;
use serde::{Deserialize, Serialize};

use super::distance;
use super::{Engine, ErrorPtr, IndexPtr, ObjectDistance, ObjectSpacePtr, PropertyPtr, ResultsPtr};
use crate::config::{DEFAULT_EDGE_SIZE_FOR_CREATION, DEFAULT_EDGE_SIZE_FOR_SEARCH};
use crate::types::{DistanceType, ObjectType};

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PropertyBlock {
    dimension: i32,
    edge_size_for_creation: i16,
    edge_size_for_search: i16,
    object_type: i32,
    distance_type: i32,
}

impl Default for PropertyBlock {
    fn default() -> Self {
        Self {
            dimension: 0,
            edge_size_for_creation: DEFAULT_EDGE_SIZE_FOR_CREATION,
            edge_size_for_search: DEFAULT_EDGE_SIZE_FOR_SEARCH,
            object_type: ObjectType::Float.code(),
            distance_type: DistanceType::L2.code(),
        }
    }
}

/// Object payload in its storage encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "values")]
enum ObjectData {
    Float(Vec<f32>),
    Float16(Vec<f16>),
    Integer(Vec<u8>),
}

impl ObjectData {
    fn encode(object_type: ObjectType, values: impl Iterator<Item = f32>) -> Self {
        match object_type {
            ObjectType::Float => ObjectData::Float(values.collect()),
            ObjectType::Float16 => ObjectData::Float16(values.map(f16::from_f32).collect()),
            ObjectType::Integer => {
                ObjectData::Integer(values.map(|v| v.round().clamp(0.0, 255.0) as u8).collect())
            }
        }
    }

    fn len(&self) -> usize {
        match self {
            ObjectData::Float(v) => v.len(),
            ObjectData::Float16(v) => v.len(),
            ObjectData::Integer(v) => v.len(),
        }
    }

    fn to_f32(&self) -> Vec<f32> {
        match self {
            ObjectData::Float(v) => v.clone(),
            ObjectData::Float16(v) => v.iter().map(|x| x.to_f32()).collect(),
            ObjectData::Integer(v) => v.iter().map(|x| *x as f32).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Slot {
    data: ObjectData,
    /// Reachable by search. Set by the next build.
    indexed: bool,
}

/// In-memory state behind one [`IndexPtr`]. Also the persisted form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphIndex {
    property: PropertyBlock,
    object_type: ObjectType,
    distance_type: DistanceType,
    /// Object `id` lives at `slots[id - 1]`; removed ids stay `None`.
    slots: Vec<Option<Slot>>,
}

impl GraphIndex {
    fn new(property: PropertyBlock) -> Result<Self, String> {
        if property.dimension <= 0 {
            return Err(format!(
                "Dimension is not specified or invalid: {}",
                property.dimension
            ));
        }
        let object_type =
            ObjectType::try_from(property.object_type).map_err(|e| e.to_string())?;
        let distance_type =
            DistanceType::try_from(property.distance_type).map_err(|e| e.to_string())?;
        Ok(Self {
            property,
            object_type,
            distance_type,
            slots: Vec::new(),
        })
    }

    fn dimension(&self) -> usize {
        self.property.dimension as usize
    }

    /// Rejects a persisted index whose header or objects do not agree.
    fn validate_loaded(&self) -> Result<(), String> {
        let expected = Self::new(self.property.clone())?;
        if expected.object_type != self.object_type || expected.distance_type != self.distance_type
        {
            return Err("Property does not match the stored object and distance types".into());
        }
        for (pos, slot) in self.slots.iter().enumerate() {
            if let Some(slot) = slot {
                if slot.data.len() != self.dimension() {
                    return Err(format!(
                        "Object {} has {} values, expected {}",
                        pos + 1,
                        slot.data.len(),
                        self.dimension()
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_dimension(&self, got: usize) -> Result<(), String> {
        if got != self.dimension() {
            return Err(format!(
                "Dimension mismatch: index={}, object={}",
                self.dimension(),
                got
            ));
        }
        Ok(())
    }

    fn is_normalized(&self) -> bool {
        matches!(
            self.distance_type,
            DistanceType::NormalizedAngle | DistanceType::NormalizedCosine
        ) && self.object_type != ObjectType::Integer
    }

    fn encode(&self, values: impl Iterator<Item = f32>) -> ObjectData {
        if self.is_normalized() {
            let mut v: Vec<f32> = values.collect();
            distance::normalize(&mut v);
            ObjectData::encode(self.object_type, v.into_iter())
        } else {
            ObjectData::encode(self.object_type, values)
        }
    }

    fn insert(&mut self, data: ObjectData) -> u32 {
        self.slots.push(Some(Slot {
            data,
            indexed: false,
        }));
        self.slots.len() as u32
    }

    fn slot(&self, id: u32) -> Option<&Slot> {
        let pos = (id as usize).checked_sub(1)?;
        self.slots.get(pos)?.as_ref()
    }

    fn remove(&mut self, id: u32) -> Result<(), String> {
        let slot = (id as usize)
            .checked_sub(1)
            .and_then(|pos| self.slots.get_mut(pos))
            .filter(|slot| slot.is_some())
            .ok_or_else(|| format!("Not found the specified id. ID={id}"))?;
        *slot = None;
        Ok(())
    }

    fn build(&mut self) -> usize {
        let mut added = 0;
        for slot in self.slots.iter_mut().flatten() {
            if !slot.indexed {
                slot.indexed = true;
                added += 1;
            }
        }
        added
    }

    fn distance(&self, query: &ObjectData, stored: &ObjectData) -> f32 {
        match (self.distance_type, query, stored) {
            (DistanceType::Hamming, ObjectData::Integer(a), ObjectData::Integer(b)) => {
                distance::hamming_bits(a, b)
            }
            (DistanceType::Jaccard, ObjectData::Integer(a), ObjectData::Integer(b)) => {
                distance::jaccard_bits(a, b)
            }
            (kind, _, _) => distance::compute(kind, &query.to_f32(), &stored.to_f32()),
        }
    }

    fn search(&self, query: &ObjectData, size: usize, radius: f32) -> Vec<ObjectDistance> {
        let mut found: Vec<ObjectDistance> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(pos, slot)| {
                let slot = slot.as_ref().filter(|s| s.indexed)?;
                Some(ObjectDistance {
                    id: pos as u32 + 1,
                    distance: self.distance(query, &slot.data),
                })
            })
            .filter(|r| radius < 0.0 || r.distance <= radius)
            .collect();
        found.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        found.truncate(size);
        found
    }
}

/// In-process engine with exact search and JSON persistence.
///
/// Handles are process-unique `u64`s drawn from one counter, so a handle of one
/// kind is never mistaken for another after it is destroyed.
pub struct MemoryEngine {
    next_handle: AtomicU64,
    errors: DashMap<u64, String>,
    properties: DashMap<u64, PropertyBlock>,
    indexes: DashMap<u64, GraphIndex>,
    results: DashMap<u64, Vec<ObjectDistance>>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            errors: DashMap::new(),
            properties: DashMap::new(),
            indexes: DashMap::new(),
            results: DashMap::new(),
        }
    }

    /// Number of error contexts, property blocks, indexes and result buffers
    /// that have been created and not yet destroyed.
    pub fn live_handles(&self) -> usize {
        self.errors.len() + self.properties.len() + self.indexes.len() + self.results.len()
    }

    fn allocate(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn fail<T: Default>(&self, err: ErrorPtr, message: impl Into<String>) -> T {
        let message = message.into();
        tracing::debug!(error = %message, "engine call failed");
        if let Some(mut slot) = self.errors.get_mut(&err.0) {
            *slot = message;
        }
        T::default()
    }

    fn with_property<T: Default>(
        &self,
        prop: PropertyPtr,
        err: ErrorPtr,
        f: impl FnOnce(&mut PropertyBlock) -> T,
    ) -> T {
        match self.properties.get_mut(&prop.0) {
            Some(mut block) => f(&mut block),
            None => self.fail(err, format!("Invalid property handle: {}", prop.0)),
        }
    }

    fn with_index<T: Default>(
        &self,
        index: IndexPtr,
        err: ErrorPtr,
        f: impl FnOnce(&mut GraphIndex) -> Result<T, String>,
    ) -> T {
        let outcome = match self.indexes.get_mut(&index.0) {
            Some(mut graph) => f(&mut graph),
            None => Err(format!("Invalid index handle: {}", index.0)),
        };
        outcome.unwrap_or_else(|message| self.fail(err, message))
    }
}

impl Engine for MemoryEngine {
    fn create_error_object(&self) -> ErrorPtr {
        let handle = self.allocate();
        self.errors.insert(handle, String::new());
        ErrorPtr(handle)
    }

    fn destroy_error_object(&self, err: ErrorPtr) {
        if self.errors.remove(&err.0).is_none() {
            tracing::warn!(handle = err.0, "destroy of unknown error object");
        }
    }

    fn error_string(&self, err: ErrorPtr) -> Option<String> {
        self.errors
            .get(&err.0)
            .filter(|message| !message.is_empty())
            .map(|message| message.value().clone())
    }

    fn clear_error_string(&self, err: ErrorPtr) {
        if let Some(mut message) = self.errors.get_mut(&err.0) {
            message.clear();
        }
    }

    fn create_property(&self, _err: ErrorPtr) -> PropertyPtr {
        let handle = self.allocate();
        self.properties.insert(handle, PropertyBlock::default());
        PropertyPtr(handle)
    }

    fn destroy_property(&self, prop: PropertyPtr) {
        if self.properties.remove(&prop.0).is_none() {
            tracing::warn!(handle = prop.0, "destroy of unknown property");
        }
    }

    fn set_property_dimension(&self, prop: PropertyPtr, dimension: i32, err: ErrorPtr) -> bool {
        self.with_property(prop, err, |block| {
            block.dimension = dimension;
            true
        })
    }

    fn set_property_edge_size_for_creation(
        &self,
        prop: PropertyPtr,
        edge_size: i16,
        err: ErrorPtr,
    ) -> bool {
        self.with_property(prop, err, |block| {
            block.edge_size_for_creation = edge_size;
            true
        })
    }

    fn set_property_edge_size_for_search(
        &self,
        prop: PropertyPtr,
        edge_size: i16,
        err: ErrorPtr,
    ) -> bool {
        self.with_property(prop, err, |block| {
            block.edge_size_for_search = edge_size;
            true
        })
    }

    fn set_property_object_type(&self, prop: PropertyPtr, code: i32, err: ErrorPtr) -> bool {
        if ObjectType::try_from(code).is_err() {
            return self.fail(err, format!("Invalid object type code: {code}"));
        }
        self.with_property(prop, err, |block| {
            block.object_type = code;
            true
        })
    }

    fn set_property_distance_type(&self, prop: PropertyPtr, code: i32, err: ErrorPtr) -> bool {
        if DistanceType::try_from(code).is_err() {
            return self.fail(err, format!("Invalid distance type code: {code}"));
        }
        self.with_property(prop, err, |block| {
            block.distance_type = code;
            true
        })
    }

    fn get_property_dimension(&self, prop: PropertyPtr, err: ErrorPtr) -> i32 {
        self.with_property(prop, err, |block| block.dimension)
    }

    fn get_property_edge_size_for_creation(&self, prop: PropertyPtr, err: ErrorPtr) -> i16 {
        self.with_property(prop, err, |block| block.edge_size_for_creation)
    }

    fn get_property_edge_size_for_search(&self, prop: PropertyPtr, err: ErrorPtr) -> i16 {
        self.with_property(prop, err, |block| block.edge_size_for_search)
    }

    fn get_property_object_type(&self, prop: PropertyPtr, err: ErrorPtr) -> i32 {
        self.with_property(prop, err, |block| block.object_type)
    }

    fn get_property_distance_type(&self, prop: PropertyPtr, err: ErrorPtr) -> i32 {
        self.with_property(prop, err, |block| block.distance_type)
    }

    fn create_graph_and_tree_in_memory(&self, prop: PropertyPtr, err: ErrorPtr) -> IndexPtr {
        let block = match self.properties.get(&prop.0) {
            Some(block) => block.value().clone(),
            None => return self.fail(err, format!("Invalid property handle: {}", prop.0)),
        };
        match GraphIndex::new(block) {
            Ok(graph) => {
                let handle = self.allocate();
                tracing::debug!(
                    handle,
                    dimension = graph.property.dimension,
                    "created in-memory index"
                );
                self.indexes.insert(handle, graph);
                IndexPtr(handle)
            }
            Err(message) => self.fail(err, message),
        }
    }

    fn open_index(&self, path: &str, err: ErrorPtr) -> IndexPtr {
        let file = Path::new(path).join(INDEX_FILE);
        let json = match std::fs::read_to_string(&file) {
            Ok(json) => json,
            Err(e) => return self.fail(err, format!("Cannot open the index. {path}: {e}")),
        };
        let graph: GraphIndex = match serde_json::from_str(&json) {
            Ok(graph) => graph,
            Err(e) => return self.fail(err, format!("Corrupted index file. {path}: {e}")),
        };
        if let Err(e) = graph.validate_loaded() {
            return self.fail(err, format!("Corrupted index file. {path}: {e}"));
        }
        let handle = self.allocate();
        tracing::debug!(handle, path, objects = graph.slots.len(), "opened index");
        self.indexes.insert(handle, graph);
        IndexPtr(handle)
    }

    fn close_index(&self, index: IndexPtr) {
        if self.indexes.remove(&index.0).is_none() {
            tracing::warn!(handle = index.0, "close of unknown index");
        }
    }

    fn get_property(&self, index: IndexPtr, prop: PropertyPtr, err: ErrorPtr) -> bool {
        let block = match self.indexes.get(&index.0) {
            Some(graph) => graph.property.clone(),
            None => return self.fail(err, format!("Invalid index handle: {}", index.0)),
        };
        self.with_property(prop, err, |target| {
            *target = block;
            true
        })
    }

    fn insert_index(
        &self,
        index: IndexPtr,
        object: &[f64],
        dimension: u32,
        err: ErrorPtr,
    ) -> u32 {
        self.with_index(index, err, |graph| {
            graph.check_dimension(dimension as usize)?;
            graph.check_dimension(object.len())?;
            let data = graph.encode(object.iter().map(|v| *v as f32));
            Ok(graph.insert(data))
        })
    }

    fn batch_insert_index(
        &self,
        index: IndexPtr,
        objects: &[f32],
        count: u32,
        ids: &mut [u32],
        err: ErrorPtr,
    ) -> bool {
        self.with_index(index, err, |graph| {
            let count = count as usize;
            if objects.len() != count * graph.dimension() {
                return Err(format!(
                    "Batch size mismatch: {} values for {} objects of dimension {}",
                    objects.len(),
                    count,
                    graph.dimension()
                ));
            }
            if ids.len() < count {
                return Err(format!(
                    "Id buffer too small: {} for {} objects",
                    ids.len(),
                    count
                ));
            }
            for (chunk, id) in objects.chunks(graph.dimension()).zip(ids.iter_mut()) {
                let data = graph.encode(chunk.iter().copied());
                *id = graph.insert(data);
            }
            Ok(true)
        })
    }

    fn create_index(&self, index: IndexPtr, pool_size: u32, err: ErrorPtr) -> bool {
        self.with_index(index, err, |graph| {
            let added = graph.build();
            tracing::debug!(handle = index.0, pool_size, added, "built index");
            Ok(true)
        })
    }

    fn remove_index(&self, index: IndexPtr, id: u32, err: ErrorPtr) -> bool {
        self.with_index(index, err, |graph| graph.remove(id).map(|_| true))
    }

    fn save_index(&self, index: IndexPtr, path: &str, err: ErrorPtr) -> bool {
        self.with_index(index, err, |graph| {
            let dir = Path::new(path);
            std::fs::create_dir_all(dir)
                .map_err(|e| format!("Cannot create the index directory. {path}: {e}"))?;
            let json = serde_json::to_string(&*graph)
                .map_err(|e| format!("Cannot serialize the index: {e}"))?;
            std::fs::write(dir.join(INDEX_FILE), json)
                .map_err(|e| format!("Cannot write the index. {path}: {e}"))?;
            tracing::debug!(handle = index.0, path, "saved index");
            Ok(true)
        })
    }

    fn create_empty_results(&self, _err: ErrorPtr) -> ResultsPtr {
        let handle = self.allocate();
        self.results.insert(handle, Vec::new());
        ResultsPtr(handle)
    }

    fn destroy_results(&self, results: ResultsPtr) {
        if self.results.remove(&results.0).is_none() {
            tracing::warn!(handle = results.0, "destroy of unknown results");
        }
    }

    fn search_index(
        &self,
        index: IndexPtr,
        query: &[f64],
        dimension: i32,
        size: usize,
        _epsilon: f32,
        radius: f32,
        results: ResultsPtr,
        err: ErrorPtr,
    ) -> bool {
        let found = self.with_index(index, err, |graph| {
            graph.check_dimension(dimension.max(0) as usize)?;
            graph.check_dimension(query.len())?;
            let query = graph.encode(query.iter().map(|v| *v as f32));
            Ok(Some(graph.search(&query, size, radius)))
        });
        let Some(found) = found else {
            return false;
        };
        match self.results.get_mut(&results.0) {
            Some(mut buffer) => {
                *buffer = found;
                true
            }
            None => self.fail(err, format!("Invalid results handle: {}", results.0)),
        }
    }

    fn get_result_size(&self, results: ResultsPtr, err: ErrorPtr) -> u32 {
        match self.results.get(&results.0) {
            Some(buffer) => buffer.len() as u32,
            None => self.fail(err, format!("Invalid results handle: {}", results.0)),
        }
    }

    fn get_result(&self, results: ResultsPtr, i: u32, err: ErrorPtr) -> ObjectDistance {
        let entry = self
            .results
            .get(&results.0)
            .map(|buffer| buffer.get(i as usize).copied());
        match entry {
            Some(Some(entry)) => entry,
            Some(None) => self.fail(err, format!("Result index out of range: {i}")),
            None => self.fail(err, format!("Invalid results handle: {}", results.0)),
        }
    }

    fn get_object_space(&self, index: IndexPtr, err: ErrorPtr) -> ObjectSpacePtr {
        if self.indexes.contains_key(&index.0) {
            ObjectSpacePtr(index.0)
        } else {
            self.fail(err, format!("Invalid index handle: {}", index.0))
        }
    }

    fn get_object_as_float(
        &self,
        space: ObjectSpacePtr,
        id: u32,
        dimension: u32,
        err: ErrorPtr,
    ) -> Vec<f32> {
        self.with_index(IndexPtr(space.0), err, |graph| {
            graph.check_dimension(dimension as usize)?;
            match graph.slot(id).map(|slot| &slot.data) {
                Some(ObjectData::Float(v)) => Ok(v.clone()),
                Some(_) => Err("Object is not stored as float".to_string()),
                None => Err(format!("Not found the specified id. ID={id}")),
            }
        })
    }

    fn get_object_as_integer(
        &self,
        space: ObjectSpacePtr,
        id: u32,
        dimension: u32,
        err: ErrorPtr,
    ) -> Vec<u8> {
        self.with_index(IndexPtr(space.0), err, |graph| {
            graph.check_dimension(dimension as usize)?;
            match graph.slot(id).map(|slot| &slot.data) {
                Some(ObjectData::Integer(v)) => Ok(v.clone()),
                Some(_) => Err("Object is not stored as integer".to_string()),
                None => Err(format!("Not found the specified id. ID={id}")),
            }
        })
    }
}
