use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::channel::ErrorChannel;
use crate::config::IndexConfig;
use crate::engine::{IndexPtr, PropertyPtr};
use crate::error::{AnnError, Result};
use crate::types::{DistanceType, ObjectType};

/// Where an index's property comes from.
#[derive(Debug, Clone, Copy)]
pub enum PropertySource<'a> {
    /// Written from caller configuration, then a new in-memory index is allocated.
    Fresh(&'a IndexConfig),
    /// Read back from a persisted index.
    Existing(&'a Path),
}

/// Resolved configuration of an index, immutable once the index exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub dimensions: u32,
    pub edge_size_for_creation: i16,
    pub edge_size_for_search: i16,
    pub object_type: ObjectType,
    pub distance_type: DistanceType,
}

/// Writes every field of `config` into the property block.
pub(crate) fn apply_fresh(
    channel: &ErrorChannel,
    prop: PropertyPtr,
    config: &IndexConfig,
) -> Result<()> {
    let dimensions = i32::try_from(config.dimensions)
        .map_err(|_| AnnError::Configuration("dimensions out of range".into()))?;
    channel.call(|e, err| e.set_property_dimension(prop, dimensions, err))?;
    channel.call(|e, err| {
        e.set_property_edge_size_for_creation(prop, config.edge_size_for_creation, err)
    })?;
    channel.call(|e, err| e.set_property_edge_size_for_search(prop, config.edge_size_for_search, err))?;
    channel.call(|e, err| e.set_property_object_type(prop, config.object_type.code(), err))?;
    channel.call(|e, err| e.set_property_distance_type(prop, config.distance_type.code(), err))?;
    Ok(())
}

/// Copies a persisted index's stored property into the property block.
pub(crate) fn load_existing(
    channel: &ErrorChannel,
    index: IndexPtr,
    prop: PropertyPtr,
) -> Result<()> {
    channel.call(|e, err| e.get_property(index, prop, err))?;
    Ok(())
}

/// Reads the property block back into a [`Property`].
pub(crate) fn read_back(channel: &ErrorChannel, prop: PropertyPtr) -> Result<Property> {
    let dimensions = channel.call(|e, err| e.get_property_dimension(prop, err))?;
    let edge_size_for_creation =
        channel.call(|e, err| e.get_property_edge_size_for_creation(prop, err))?;
    let edge_size_for_search =
        channel.call(|e, err| e.get_property_edge_size_for_search(prop, err))?;
    let object_code = channel.call(|e, err| e.get_property_object_type(prop, err))?;
    let distance_code = channel.call(|e, err| e.get_property_distance_type(prop, err))?;

    let dimensions = u32::try_from(dimensions)
        .ok()
        .filter(|d| *d > 0)
        .ok_or_else(|| AnnError::Engine(format!("Invalid dimension: {dimensions}")))?;
    let object_type = ObjectType::try_from(object_code)
        .map_err(|_| AnnError::Engine("Unknown object type".into()))?;
    let distance_type = DistanceType::try_from(distance_code)
        .map_err(|_| AnnError::Engine("Unknown distance type".into()))?;

    Ok(Property {
        dimensions,
        edge_size_for_creation,
        edge_size_for_search,
        object_type,
        distance_type,
    })
}
