use crate::error::{AnnError, Result};
use crate::types::ObjectType;

/// Converts application vectors to and from the engine's typed buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectCodec {
    dimensions: usize,
    object_type: ObjectType,
}

impl ObjectCodec {
    pub fn new(dimensions: usize, object_type: ObjectType) -> Self {
        Self {
            dimensions,
            object_type,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn check_dimensions(&self, got: usize) -> Result<()> {
        if got != self.dimensions {
            return Err(AnnError::DimensionMismatch {
                expected: self.dimensions,
                got,
            });
        }
        Ok(())
    }

    /// Double-precision buffer for a single insert or a query.
    pub fn encode(&self, object: &[f64]) -> Result<Vec<f64>> {
        self.check_dimensions(object.len())?;
        Ok(object.to_vec())
    }

    /// One contiguous single-precision buffer for a batch insert. Every object
    /// is checked before any value is copied.
    pub fn encode_batch<V: AsRef<[f64]>>(&self, objects: &[V]) -> Result<Vec<f32>> {
        for object in objects {
            self.check_dimensions(object.as_ref().len())?;
        }
        let mut buffer = Vec::with_capacity(self.dimensions * objects.len());
        for object in objects {
            buffer.extend(object.as_ref().iter().map(|v| *v as f32));
        }
        Ok(buffer)
    }

    /// Reads the first `dimensions` values of an engine float buffer.
    pub fn decode_float(&self, raw: &[f32]) -> Result<Vec<f64>> {
        self.check_readback(raw.len())?;
        Ok(raw[..self.dimensions].iter().map(|v| *v as f64).collect())
    }

    pub fn decode_integer(&self, raw: &[u8]) -> Result<Vec<f64>> {
        self.check_readback(raw.len())?;
        Ok(raw[..self.dimensions].iter().map(|v| *v as f64).collect())
    }

    fn check_readback(&self, len: usize) -> Result<()> {
        if len < self.dimensions {
            return Err(AnnError::Engine(format!(
                "object buffer holds {} values, expected {}",
                len, self.dimensions
            )));
        }
        Ok(())
    }
}
