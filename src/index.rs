use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::channel::ErrorChannel;
use crate::codec::ObjectCodec;
use crate::config::{IndexConfig, SearchParams};
use crate::engine::{self, Engine, IndexPtr, ObjectSpacePtr, PropertyPtr, ResultsPtr};
use crate::error::{AnnError, Result};
use crate::handle::Handle;
use crate::property::{self, Property, PropertySource};
use crate::types::{DistanceType, ObjectId, ObjectType, SearchResult};

/// Graph-and-tree ANN index backed by an [`Engine`].
///
/// Owns the error context, the property block and the index handle of one
/// engine session. All of them are released exactly once, by [`Index::close`]
/// (index only) and by `Drop` (everything, index first, error context last).
///
/// `Index` is `Send` but not `Sync`: every call goes through one shared error
/// context, so concurrent use needs external synchronization.
pub struct Index {
    channel: ErrorChannel,
    property: Handle<PropertyPtr>,
    index: Handle<IndexPtr>,
    resolved: Property,
    codec: ObjectCodec,
}

impl Index {
    /// Creates an in-memory index on the process-wide default engine.
    pub fn create(config: IndexConfig) -> Result<Self> {
        Self::create_with_engine(engine::default_engine(), config)
    }

    pub fn create_with_engine(engine: Arc<dyn Engine>, config: IndexConfig) -> Result<Self> {
        Self::from_source(engine, PropertySource::Fresh(&config))
    }

    /// Opens a persisted index on the process-wide default engine.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_engine(engine::default_engine(), path)
    }

    pub fn open_with_engine(engine: Arc<dyn Engine>, path: impl AsRef<Path>) -> Result<Self> {
        Self::from_source(engine, PropertySource::Existing(path.as_ref()))
    }

    /// Alias of [`Index::open`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path)
    }

    pub fn from_source(engine: Arc<dyn Engine>, source: PropertySource<'_>) -> Result<Self> {
        if let PropertySource::Fresh(config) = source {
            config.validate()?;
        }

        // Handles are locals until the very end: any `?` below drops them in
        // reverse order of acquisition.
        let channel = ErrorChannel::new(engine);
        let raw_property = channel.call(|e, err| e.create_property(err))?;
        let property = acquire_property(&channel, raw_property)?;

        let index = match source {
            PropertySource::Fresh(config) => {
                property::apply_fresh(&channel, property.value(), config)?;
                let raw = channel
                    .call(|e, err| e.create_graph_and_tree_in_memory(property.value(), err))?;
                acquire_index(&channel, raw)?
            }
            PropertySource::Existing(path) => {
                let path_str = path_to_str(path)?;
                let raw = channel.call(|e, err| e.open_index(path_str, err))?;
                let index = acquire_index(&channel, raw)?;
                property::load_existing(&channel, index.value(), property.value())?;
                index
            }
        };

        let resolved = property::read_back(&channel, property.value())?;
        let codec = ObjectCodec::new(resolved.dimensions as usize, resolved.object_type);

        match source {
            PropertySource::Fresh(_) => tracing::info!(
                dimensions = resolved.dimensions,
                object_type = %resolved.object_type,
                distance_type = %resolved.distance_type,
                "created index"
            ),
            PropertySource::Existing(path) => tracing::info!(
                path = %path.display(),
                dimensions = resolved.dimensions,
                object_type = %resolved.object_type,
                distance_type = %resolved.distance_type,
                "opened index"
            ),
        }

        Ok(Self {
            channel,
            property,
            index,
            resolved,
            codec,
        })
    }

    pub fn dimensions(&self) -> u32 {
        self.resolved.dimensions
    }

    pub fn object_type(&self) -> ObjectType {
        self.resolved.object_type
    }

    pub fn distance_type(&self) -> DistanceType {
        self.resolved.distance_type
    }

    pub fn property(&self) -> &Property {
        &self.resolved
    }

    pub fn is_closed(&self) -> bool {
        self.index.is_released()
    }

    /// Inserts one object and returns its id. The object is not searchable
    /// until the next [`Index::build_index`].
    pub fn insert(&mut self, object: &[f64]) -> Result<ObjectId> {
        let index = self.live_index()?;
        let buffer = self.codec.encode(object)?;
        let dimension = buffer.len() as u32;
        let id = self
            .channel
            .call(|e, err| e.insert_index(index, &buffer, dimension, err))?;
        tracing::debug!(id, "inserted object");
        Ok(id)
    }

    /// Inserts all objects, then rebuilds the index so they are searchable.
    ///
    /// Objects travel as one `f32` buffer, unlike [`Index::insert`] which
    /// sends `f64`. Returns ids in input order, or an error and no ids.
    pub fn batch_insert<V: AsRef<[f64]>>(
        &mut self,
        objects: &[V],
        num_threads: u32,
    ) -> Result<Vec<ObjectId>> {
        if objects.is_empty() {
            return Ok(Vec::new());
        }
        let index = self.live_index()?;
        let buffer = self.codec.encode_batch(objects)?;
        let count = u32::try_from(objects.len()).map_err(|_| {
            AnnError::Configuration(format!("batch of {} objects is too large", objects.len()))
        })?;

        let mut ids = vec![0; objects.len()];
        self.channel
            .call(|e, err| e.batch_insert_index(index, &buffer, count, &mut ids, err))?;
        tracing::debug!(count, "batch inserted objects");

        self.build_index(num_threads)?;
        Ok(ids)
    }

    pub fn build_index(&mut self, num_threads: u32) -> Result<bool> {
        let index = self.live_index()?;
        let built = self
            .channel
            .call(|e, err| e.create_index(index, num_threads, err))?;
        tracing::debug!(num_threads, "built index");
        Ok(built)
    }

    /// Returns up to `params.size` neighbors of `query`, nearest first.
    pub fn search(&self, query: &[f64], params: &SearchParams) -> Result<Vec<SearchResult>> {
        let index = self.live_index()?;
        let buffer = self.codec.encode(query)?;
        let dimension = buffer.len() as i32;

        let results = self.acquire_results()?;
        let raw = results.value();
        self.channel.call(|e, err| {
            e.search_index(
                index,
                &buffer,
                dimension,
                params.size,
                params.epsilon,
                params.engine_radius(),
                raw,
                err,
            )
        })?;

        let size = self.channel.call(|e, err| e.get_result_size(raw, err))?;
        let limit = size.min(u32::try_from(params.size).unwrap_or(u32::MAX));
        let mut found = Vec::with_capacity(limit as usize);
        for i in 0..limit {
            let entry = self.channel.call(|e, err| e.get_result(raw, i, err))?;
            found.push(SearchResult {
                id: entry.id,
                distance: entry.distance,
            });
        }
        Ok(found)
    }

    /// Reads back a stored object. Not available for `Float16` indexes.
    pub fn object(&self, id: ObjectId) -> Result<Vec<f64>> {
        let index = self.live_index()?;
        let dimension = self.resolved.dimensions;
        match self.codec.object_type() {
            ObjectType::Float => {
                let space = self.object_space(index)?;
                let raw = self
                    .channel
                    .call(|e, err| e.get_object_as_float(space, id, dimension, err))?;
                self.codec.decode_float(&raw)
            }
            ObjectType::Integer => {
                let space = self.object_space(index)?;
                let raw = self
                    .channel
                    .call(|e, err| e.get_object_as_integer(space, id, dimension, err))?;
                self.codec.decode_integer(&raw)
            }
            ObjectType::Float16 => Err(AnnError::UnsupportedOperation(
                "Method not supported for this object type".into(),
            )),
        }
    }

    /// Returns `false` instead of failing when the id is unknown, already
    /// removed, or the engine reports any other error.
    pub fn remove(&mut self, id: ObjectId) -> bool {
        let Ok(index) = self.live_index() else {
            return false;
        };
        match self.channel.call(|e, err| e.remove_index(index, id, err)) {
            Ok(removed) => removed,
            Err(e) => {
                tracing::debug!(id, error = %e, "remove failed");
                false
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<bool> {
        let index = self.live_index()?;
        let path = path.as_ref();
        let path_str = path_to_str(path)?;
        let saved = self
            .channel
            .call(|e, err| e.save_index(index, path_str, err))?;
        tracing::info!(path = %path.display(), "saved index");
        Ok(saved)
    }

    /// Releases the index handle. Safe to call more than once.
    pub fn close(&mut self) {
        if self.index.release() {
            tracing::debug!("closed index");
        }
    }

    fn teardown(&mut self) {
        self.index.release();
        self.property.release();
        self.channel.release();
    }

    fn live_index(&self) -> Result<IndexPtr> {
        if self.index.is_released() {
            return Err(AnnError::Closed);
        }
        Ok(self.index.value())
    }

    fn object_space(&self, index: IndexPtr) -> Result<ObjectSpacePtr> {
        self.channel.call(|e, err| e.get_object_space(index, err))
    }

    fn acquire_results(&self) -> Result<Handle<ResultsPtr>> {
        let raw = self.channel.call(|e, err| e.create_empty_results(err))?;
        if raw.is_null() {
            return Err(AnnError::Engine("engine returned a null results buffer".into()));
        }
        let engine = Arc::clone(self.channel.engine());
        Ok(Handle::acquire(raw, move |results| {
            engine.destroy_results(results)
        }))
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("property", &self.resolved)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn acquire_property(channel: &ErrorChannel, raw: PropertyPtr) -> Result<Handle<PropertyPtr>> {
    if raw.is_null() {
        return Err(AnnError::Engine("engine returned a null property".into()));
    }
    let engine = Arc::clone(channel.engine());
    Ok(Handle::acquire(raw, move |prop| engine.destroy_property(prop)))
}

fn acquire_index(channel: &ErrorChannel, raw: IndexPtr) -> Result<Handle<IndexPtr>> {
    if raw.is_null() {
        return Err(AnnError::Engine("engine returned a null index".into()));
    }
    let engine = Arc::clone(channel.engine());
    Ok(Handle::acquire(raw, move |index| engine.close_index(index)))
}

fn path_to_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| AnnError::Io(format!("invalid path: {}", path.display())))
}
