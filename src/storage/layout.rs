//! On-disk layout of array-set stores.
//!
//! ```text
//! <data_dir>/arraysets/<id[0:2]>/<id[2:4]>/<id>/
//!     arrayset.json
//!     array/<a>/metadata.json
//!     array/<a>/attribute/<k>/<c>.parquet
//!     array/<a>/index/<k>.parquet
//! ```

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{ArrayError, ArrayResult};

const ARRAYSETS_DIR: &str = "arraysets";
const ARRAYSET_FILE: &str = "arrayset.json";

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid array-set id pattern"))
}

/// Reject ids that could escape the data directory.
pub fn validate_set_id(id: &str) -> ArrayResult<()> {
    if id_pattern().is_match(id) {
        Ok(())
    } else {
        Err(ArrayError::malformed(
            "arrayset",
            format!("invalid id '{id}'"),
            "Array-set ids must be non-empty and contain only letters, digits, '_' or '-'.",
        ))
    }
}

/// Paths of one array-set store
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    /// Layout for `id` under `data_dir`, sharded by the id's leading characters.
    pub fn new(data_dir: &Path, id: &str) -> Self {
        let mut root = data_dir.join(ARRAYSETS_DIR);
        if id.len() >= 4 && id.is_ascii() {
            root = root.join(&id[0..2]).join(&id[2..4]);
        }
        StoreLayout { root: root.join(id) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.arrayset_file().exists()
    }

    pub fn arrayset_file(&self) -> PathBuf {
        self.root.join(ARRAYSET_FILE)
    }

    pub fn arrays_dir(&self) -> PathBuf {
        self.root.join("array")
    }

    pub fn array_dir(&self, array: u64) -> PathBuf {
        self.arrays_dir().join(array.to_string())
    }

    pub fn metadata_file(&self, array: u64) -> PathBuf {
        self.array_dir(array).join("metadata.json")
    }

    pub fn attribute_dir(&self, array: u64, attribute: usize) -> PathBuf {
        self.array_dir(array)
            .join("attribute")
            .join(attribute.to_string())
    }

    /// File holding chunk `chunk` of one attribute's flat buffer
    pub fn chunk_file(&self, array: u64, attribute: usize, chunk: usize) -> PathBuf {
        self.attribute_dir(array, attribute)
            .join(format!("{chunk}.parquet"))
    }

    pub fn index_file(&self, array: u64, attribute: usize) -> PathBuf {
        self.array_dir(array)
            .join("index")
            .join(format!("{attribute}.parquet"))
    }
}

/// Ids of every store under `data_dir`, sorted.
pub fn list_set_ids(data_dir: &Path) -> ArrayResult<Vec<String>> {
    fn walk(dir: &Path, depth: usize, out: &mut Vec<String>) -> ArrayResult<()> {
        if !dir.is_dir() {
            return Ok(());
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            if path.join(ARRAYSET_FILE).exists() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    out.push(name.to_string());
                }
            }
            if depth < 2 {
                walk(&path, depth + 1, out)?;
            }
        }
        Ok(())
    }

    let mut ids = Vec::new();
    walk(&data_dir.join(ARRAYSETS_DIR), 0, &mut ids)?;
    ids.sort();
    Ok(ids)
}
