//! Safe client façade over graph-and-tree approximate nearest-neighbor engines.
//!
//! ```
//! use anngraph::{Index, IndexConfig, SearchParams, DEFAULT_NUM_THREADS};
//!
//! # fn main() -> anngraph::Result<()> {
//! let mut index = Index::create(IndexConfig::new(4))?;
//! let ids = index.batch_insert(
//!     &[[1.0, 1.0, 2.0, 1.0], [5.0, 4.0, 6.0, 5.0], [1.0, 2.0, 1.0, 2.0]],
//!     DEFAULT_NUM_THREADS,
//! )?;
//! assert_eq!(ids.len(), 3);
//!
//! let results = index.search(&[1.0, 1.0, 2.0, 1.0], &SearchParams::new().size(3))?;
//! assert_eq!(results[0].id, ids[0]);
//! assert_eq!(results[0].distance, 0.0);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod handle;
pub mod index;
pub mod property;
pub mod types;

#[cfg(test)]
mod integ_tests;

pub use channel::ErrorChannel;
pub use codec::ObjectCodec;
pub use config::{
    IndexConfig, SearchParams, DEFAULT_EDGE_SIZE_FOR_CREATION, DEFAULT_EDGE_SIZE_FOR_SEARCH,
    DEFAULT_EPSILON, DEFAULT_NUM_THREADS, DEFAULT_SEARCH_SIZE,
};
pub use engine::{default_engine, Engine, MemoryEngine};
#[cfg(feature = "ngt")]
pub use engine::NgtEngine;
pub use error::{AnnError, Result};
pub use handle::Handle;
pub use index::Index;
pub use property::{Property, PropertySource};
pub use types::{DistanceType, ObjectId, ObjectType, SearchResult};
