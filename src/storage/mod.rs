//! Storage Module
//!
//! Persistent layout of array-set stores:
//! - Directory layout and id validation
//! - JSON metadata records (store and per-array)
//! - Parquet column files for attribute buffers and cached sort indices

pub mod layout;
pub mod metadata;
pub mod parquet;

// Re-export commonly used types
pub use layout::{list_set_ids, validate_set_id, StoreLayout};
pub use metadata::{ArrayMetadata, ArraySetMetadata, DEFAULT_CHUNK_CELLS};
pub use parquet::{read_column, read_sort_index, stage_column, write_column, write_sort_index};
