use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AnnError;

/// Engine-assigned identifier of a stored object. Opaque to callers.
pub type ObjectId = u32;

/// Element encoding of stored objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ObjectType {
    #[default]
    Float,
    Float16,
    Integer,
}

impl ObjectType {
    pub const ALL: [ObjectType; 3] = [ObjectType::Float, ObjectType::Float16, ObjectType::Integer];

    /// Code used for this type at the engine boundary.
    pub fn code(self) -> i32 {
        match self {
            ObjectType::Float => 1,
            ObjectType::Integer => 2,
            ObjectType::Float16 => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Float => "float",
            ObjectType::Float16 => "float16",
            ObjectType::Integer => "integer",
        }
    }
}

impl TryFrom<i32> for ObjectType {
    type Error = AnnError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(ObjectType::Float),
            2 => Ok(ObjectType::Integer),
            3 => Ok(ObjectType::Float16),
            _ => Err(AnnError::Configuration("Unknown object type".into())),
        }
    }
}

impl FromStr for ObjectType {
    type Err = AnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_name(s).as_str() {
            "float" | "float32" | "f32" => Ok(ObjectType::Float),
            "float16" | "half" | "f16" => Ok(ObjectType::Float16),
            "integer" | "uint8" | "u8" => Ok(ObjectType::Integer),
            _ => Err(AnnError::Configuration("Unknown object type".into())),
        }
    }
}

impl TryFrom<String> for ObjectType {
    type Error = AnnError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ObjectType> for String {
    fn from(t: ObjectType) -> Self {
        t.as_str().to_owned()
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric used for graph construction and search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DistanceType {
    L1,
    #[default]
    L2,
    Hamming,
    Angle,
    Cosine,
    NormalizedAngle,
    NormalizedCosine,
    Jaccard,
}

impl DistanceType {
    pub const ALL: [DistanceType; 8] = [
        DistanceType::L1,
        DistanceType::L2,
        DistanceType::Hamming,
        DistanceType::Angle,
        DistanceType::Cosine,
        DistanceType::NormalizedAngle,
        DistanceType::NormalizedCosine,
        DistanceType::Jaccard,
    ];

    pub fn code(self) -> i32 {
        match self {
            DistanceType::L1 => 0,
            DistanceType::L2 => 1,
            DistanceType::Hamming => 2,
            DistanceType::Angle => 3,
            DistanceType::Cosine => 4,
            DistanceType::NormalizedAngle => 5,
            DistanceType::NormalizedCosine => 6,
            DistanceType::Jaccard => 7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DistanceType::L1 => "l1",
            DistanceType::L2 => "l2",
            DistanceType::Hamming => "hamming",
            DistanceType::Angle => "angle",
            DistanceType::Cosine => "cosine",
            DistanceType::NormalizedAngle => "normalizedAngle",
            DistanceType::NormalizedCosine => "normalizedCosine",
            DistanceType::Jaccard => "jaccard",
        }
    }
}

impl TryFrom<i32> for DistanceType {
    type Error = AnnError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        DistanceType::ALL
            .into_iter()
            .find(|d| d.code() == code)
            .ok_or_else(|| AnnError::Configuration("Unknown distance type".into()))
    }
}

impl FromStr for DistanceType {
    type Err = AnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = normalize_name(s);
        DistanceType::ALL
            .into_iter()
            .find(|d| normalize_name(d.as_str()) == name)
            .ok_or_else(|| AnnError::Configuration("Unknown distance type".into()))
    }
}

impl TryFrom<String> for DistanceType {
    type Error = AnnError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DistanceType> for String {
    fn from(d: DistanceType) -> Self {
        d.as_str().to_owned()
    }
}

impl fmt::Display for DistanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase with `_` and `-` stripped, so `normalized_angle`, `normalized-angle`
/// and `normalizedAngle` all name the same metric.
fn normalize_name(s: &str) -> String {
    s.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// A single result from a nearest-neighbor search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: ObjectId,
    pub distance: f32,
}
