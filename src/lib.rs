//! # Hyperstore
//!
//! Persistent storage for "array sets": numbered collections of dense
//! multi-dimensional arrays, each with typed attributes, stored one
//! Parquet column file per attribute.
//!
//! ## Layers
//!
//! ```text
//! ArrayStore (store)          per-set locking, string arguments, encoding
//!     ↓
//! ArraySet (arrayset)         schema, hyperslice reads/writes, statistics
//!     ├── table               1-D arrays viewed as sortable tables
//!     ├── sort_index          cached stable argsort per attribute
//!     └── codec               binary / JSON payloads, lazy binary stream
//!     ↓
//! storage                     layout, JSON metadata, Parquet columns
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hyperstore::{ArrayStore, Attribute, Config, Dimension, ScalarType};
//!
//! let store = ArrayStore::new(Config::load()?)?;
//! let id = store.create_arrayset(Some("experiment-1"))?;
//! store.start_array(
//!     &id,
//!     0,
//!     vec![Dimension::new("row", 0, 100), Dimension::new("col", 0, 3)],
//!     vec![Attribute::new("value", ScalarType::Float64)],
//! )?;
//!
//! let slab = store.read_json(&id, "0/0/0:10,...")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core types
pub mod config;
pub mod error;
pub mod types;

// Array model
pub mod array;
pub mod arrayset;
pub mod column;
pub mod hyperslice;
pub mod statistics;

// Persistence
pub mod storage;

// Derived views and encodings
pub mod codec;
pub mod sort_index;
pub mod table;

// Boundary
pub mod store;

pub use array::Array;
pub use arrayset::{ArraySet, ArraySource, DenseArray};
pub use codec::HyperchunkStream;
pub use column::ColumnData;
pub use config::{CompressionType, Config, LoggingConfig, PerformanceConfig, StorageConfig};
pub use error::{ArrayError, ArrayResult};
pub use hyperslice::{Hyperchunk, Hyperslice, ResolvedHyperslice, Selector};
pub use sort_index::{SortOrder, Sorter};
pub use statistics::{AttributeStatistics, Scalar};
pub use store::{
    parse_array_list, parse_statistics_list, ArrayInfo, ArrayListing, ArrayStore, Encoded,
    OpenArraySet, ReadOutput, SetMetadata, StatisticsInfo,
};
pub use table::{IndexList, SortSpec, TableChunk, TableMetadata};
pub use types::{schema_from_json, Attribute, ByteOrder, Dimension, ScalarType};
