use serde::{Deserialize, Serialize};

use crate::error::{AnnError, Result};
use crate::types::{DistanceType, ObjectType};

pub const DEFAULT_EDGE_SIZE_FOR_CREATION: i16 = 10;
pub const DEFAULT_EDGE_SIZE_FOR_SEARCH: i16 = 40;
pub const DEFAULT_NUM_THREADS: u32 = 8;
pub const DEFAULT_SEARCH_SIZE: usize = 20;
pub const DEFAULT_EPSILON: f32 = 0.1;

/// Configuration for a freshly created index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct IndexConfig {
    pub dimensions: u32,
    pub edge_size_for_creation: i16,
    pub edge_size_for_search: i16,
    pub distance_type: DistanceType,
    pub object_type: ObjectType,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimensions: 0,
            edge_size_for_creation: DEFAULT_EDGE_SIZE_FOR_CREATION,
            edge_size_for_search: DEFAULT_EDGE_SIZE_FOR_SEARCH,
            distance_type: DistanceType::default(),
            object_type: ObjectType::default(),
        }
    }
}

impl IndexConfig {
    pub fn new(dimensions: u32) -> Self {
        Self {
            dimensions,
            ..Self::default()
        }
    }

    pub fn edge_size_for_creation(mut self, edge_size: i16) -> Self {
        self.edge_size_for_creation = edge_size;
        self
    }

    pub fn edge_size_for_search(mut self, edge_size: i16) -> Self {
        self.edge_size_for_search = edge_size;
        self
    }

    pub fn distance_type(mut self, distance_type: DistanceType) -> Self {
        self.distance_type = distance_type;
        self
    }

    pub fn object_type(mut self, object_type: ObjectType) -> Self {
        self.object_type = object_type;
        self
    }

    /// Parse a camelCase JSON config. Unknown enum names surface as
    /// `AnnError::Configuration`, never as a silent default.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: IndexConfig =
            serde_json::from_str(json).map_err(|e| AnnError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checked before any engine resource is allocated.
    pub fn validate(&self) -> Result<()> {
        if self.dimensions == 0 {
            return Err(AnnError::Configuration(
                "dimensions must be greater than 0".into(),
            ));
        }
        if i32::try_from(self.dimensions).is_err() {
            return Err(AnnError::Configuration(format!(
                "dimensions must be at most {}",
                i32::MAX
            )));
        }
        if self.edge_size_for_creation <= 0 {
            return Err(AnnError::Configuration(
                "edgeSizeForCreation must be greater than 0".into(),
            ));
        }
        if self.edge_size_for_search <= 0 {
            return Err(AnnError::Configuration(
                "edgeSizeForSearch must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Per-query tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct SearchParams {
    pub size: usize,
    pub epsilon: f32,
    /// `None` searches without a radius bound.
    pub radius: Option<f32>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            size: DEFAULT_SEARCH_SIZE,
            epsilon: DEFAULT_EPSILON,
            radius: None,
        }
    }
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn radius(mut self, radius: f32) -> Self {
        self.radius = Some(radius);
        self
    }

    /// Radius as the engine expects it: negative means unbounded.
    pub fn engine_radius(&self) -> f32 {
        self.radius.unwrap_or(-1.0)
    }
}
