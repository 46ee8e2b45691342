//! Metadata records for array-set stores

use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs::{self, File};
use std::path::Path;

use crate::error::{ArrayError, ArrayResult};
use crate::statistics::AttributeStatistics;
use crate::types::{Attribute, Dimension};

/// Store-level record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArraySetMetadata {
    pub id: String,
    pub version: String,
    pub created_at: String,
    pub arrays: Vec<u64>,
}

/// Cells per attribute chunk file unless configured otherwise
pub const DEFAULT_CHUNK_CELLS: usize = 65_536;

fn default_chunk_cells() -> usize {
    DEFAULT_CHUNK_CELLS
}

/// Per-array record: schema plus running statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayMetadata {
    pub index: u64,
    pub dimensions: Vec<Dimension>,
    pub attributes: Vec<Attribute>,
    pub statistics: Vec<AttributeStatistics>,
    /// Cells per attribute chunk file
    #[serde(default = "default_chunk_cells")]
    pub chunk_cells: usize,
    pub created_at: String,
    pub last_modified: String,
}

impl ArraySetMetadata {
    pub fn new(id: String) -> Self {
        ArraySetMetadata {
            id,
            version: "1.0".to_string(),
            created_at: Utc::now().to_rfc3339(),
            arrays: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> ArrayResult<Self> {
        load_json(path)
    }

    pub fn save(&self, path: &Path) -> ArrayResult<()> {
        save_json(path, self)
    }
}

impl ArrayMetadata {
    pub fn new(index: u64, dimensions: Vec<Dimension>, attributes: Vec<Attribute>) -> Self {
        let now = Utc::now().to_rfc3339();
        ArrayMetadata {
            index,
            statistics: vec![AttributeStatistics::default(); attributes.len()],
            dimensions,
            attributes,
            chunk_cells: DEFAULT_CHUNK_CELLS,
            created_at: now.clone(),
            last_modified: now,
        }
    }

    pub fn load(path: &Path) -> ArrayResult<Self> {
        load_json(path)
    }

    pub fn save(&self, path: &Path) -> ArrayResult<()> {
        save_json(path, self)
    }

    pub fn touch(&mut self) {
        self.last_modified = Utc::now().to_rfc3339();
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> ArrayResult<T> {
    let file = File::open(path).map_err(|e| {
        ArrayError::StorageUnavailable(format!("Failed to open {}: {e}", path.display()))
    })?;
    Ok(serde_json::from_reader(file)?)
}

/// Write through a temporary file and rename, so readers never see a
/// half-written record.
fn save_json<T: Serialize>(path: &Path, value: &T) -> ArrayResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("json.tmp");
    let file = File::create(&tmp)?;
    serde_json::to_writer_pretty(&file, value)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}
