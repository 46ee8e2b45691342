//! # ArraySet
//!
//! A sparse, integer-keyed collection of [`Array`]s sharing one on-disk
//! store. The set exclusively owns its arrays: each array's schema and
//! statistics live in `array/<a>/metadata.json`, and each attribute's dense
//! buffer is split into fixed-size chunks under `array/<a>/attribute/<k>/`.
//! Reads and writes only load and rewrite the chunks a hyperslice touches;
//! a chunk that was never written reads as zeros.
//!
//! An `ArraySet` value is only ever reached through a locked
//! [`OpenArraySet`](crate::store::OpenArraySet), so it can memoize loaded
//! chunks without worrying about concurrent writers.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::array::Array;
use crate::column::ColumnData;
use crate::config::CompressionType;
use crate::error::{ArrayError, ArrayResult};
use crate::hyperslice::ResolvedHyperslice;
use crate::statistics::AttributeStatistics;
use crate::storage::{self, ArrayMetadata, ArraySetMetadata, StoreLayout};
use crate::types::{Attribute, Dimension};

/// An already-materialized array that can be ingested in one call
pub trait ArraySource {
    fn dimensions(&self) -> Vec<Dimension>;
    fn attributes(&self) -> Vec<Attribute>;
    /// Full row-major contents of one attribute
    fn attribute_data(&self, attribute: usize) -> ArrayResult<ColumnData>;
}

/// In-memory dense array
#[derive(Debug, Clone)]
pub struct DenseArray {
    dimensions: Vec<Dimension>,
    attributes: Vec<Attribute>,
    columns: Vec<ColumnData>,
}

impl DenseArray {
    /// Attribute types are taken from the columns; every column must cover
    /// the full dimension product.
    pub fn new(dimensions: Vec<Dimension>, columns: Vec<(String, ColumnData)>) -> ArrayResult<Self> {
        let size: usize = dimensions.iter().map(Dimension::extent).product();
        let shape: Vec<usize> = dimensions.iter().map(Dimension::extent).collect();

        let mut attributes = Vec::with_capacity(columns.len());
        let mut data = Vec::with_capacity(columns.len());
        for (name, column) in columns {
            if column.len() != size {
                return Err(ArrayError::ShapeMismatch {
                    expected: shape,
                    actual: vec![column.len()],
                });
            }
            attributes.push(Attribute::new(name, column.kind()));
            data.push(column);
        }

        Ok(DenseArray {
            dimensions,
            attributes,
            columns: data,
        })
    }
}

impl ArraySource for DenseArray {
    fn dimensions(&self) -> Vec<Dimension> {
        self.dimensions.clone()
    }

    fn attributes(&self) -> Vec<Attribute> {
        self.attributes.clone()
    }

    fn attribute_data(&self, attribute: usize) -> ArrayResult<ColumnData> {
        self.columns.get(attribute).cloned().ok_or_else(|| {
            ArrayError::SchemaError(format!("source has no attribute {attribute}"))
        })
    }
}

/// A collection of arrays persisted under one store directory
#[derive(Debug)]
pub struct ArraySet {
    layout: StoreLayout,
    metadata: ArraySetMetadata,
    arrays: BTreeMap<u64, Array>,
    compression: CompressionType,
    chunk_cells: usize,
    chunks: HashMap<(u64, usize, usize), ColumnData>,
}

/// Flat offsets grouped by chunk: local offsets within the chunk, and the
/// positions those cells occupy in the request.
type ChunkGroups = BTreeMap<usize, (Vec<usize>, Vec<usize>)>;

fn group_by_chunk(offsets: &[usize], chunk_cells: usize) -> ChunkGroups {
    let mut groups = ChunkGroups::new();
    for (position, offset) in offsets.iter().enumerate() {
        let (local, positions) = groups.entry(offset / chunk_cells).or_default();
        local.push(offset % chunk_cells);
        positions.push(position);
    }
    groups
}

impl ArraySet {
    /// Initialize an empty store. Fails if one already exists.
    pub fn create(layout: StoreLayout, id: &str, compression: CompressionType) -> ArrayResult<Self> {
        if layout.exists() {
            return Err(ArrayError::SchemaError(format!(
                "Array set '{id}' already exists"
            )));
        }
        let metadata = ArraySetMetadata::new(id.to_string());
        fs::create_dir_all(layout.root())?;
        metadata.save(&layout.arrayset_file())?;

        Ok(ArraySet {
            layout,
            metadata,
            arrays: BTreeMap::new(),
            compression,
            chunk_cells: storage::DEFAULT_CHUNK_CELLS,
            chunks: HashMap::new(),
        })
    }

    /// Load an existing store's metadata. Column buffers load lazily.
    pub fn open(layout: StoreLayout, compression: CompressionType) -> ArrayResult<Self> {
        if !layout.exists() {
            return Err(ArrayError::NotFound(format!(
                "Array set at {}",
                layout.root().display()
            )));
        }
        let metadata = ArraySetMetadata::load(&layout.arrayset_file())?;

        let mut arrays = BTreeMap::new();
        for index in &metadata.arrays {
            let record = ArrayMetadata::load(&layout.metadata_file(*index))?;
            arrays.insert(*index, Array::from_metadata(record)?);
        }

        Ok(ArraySet {
            layout,
            metadata,
            arrays,
            compression,
            chunk_cells: storage::DEFAULT_CHUNK_CELLS,
            chunks: HashMap::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn compression(&self) -> CompressionType {
        self.compression
    }

    /// Chunk size for arrays started from now on; existing arrays keep
    /// the size they were started with.
    #[must_use]
    pub fn with_chunk_cells(mut self, chunk_cells: usize) -> Self {
        self.chunk_cells = chunk_cells.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Array indices in ascending order
    pub fn keys(&self) -> impl Iterator<Item = u64> + '_ {
        self.arrays.keys().copied()
    }

    pub fn arrays(&self) -> impl Iterator<Item = &Array> {
        self.arrays.values()
    }

    pub fn contains(&self, array: u64) -> bool {
        self.arrays.contains_key(&array)
    }

    pub fn array(&self, array: u64) -> ArrayResult<&Array> {
        self.arrays
            .get(&array)
            .ok_or_else(|| ArrayError::NotFound(format!("Array {array} in set '{}'", self.id())))
    }

    fn array_mut(&mut self, array: u64) -> ArrayResult<&mut Array> {
        let id = &self.metadata.id;
        self.arrays
            .get_mut(&array)
            .ok_or_else(|| ArrayError::NotFound(format!("Array {array} in set '{id}'")))
    }

    /// Allocate a fresh array at `index`, replacing any existing one.
    ///
    /// Every attribute reads as zeros (empty strings for string
    /// attributes) until written, with empty statistics.
    pub fn start_array(
        &mut self,
        index: u64,
        dimensions: Vec<Dimension>,
        attributes: Vec<Attribute>,
    ) -> ArrayResult<&Array> {
        let mut array = Array::new(index, dimensions, attributes)?;
        array.metadata_mut().chunk_cells = self.chunk_cells;

        // Unlisted before its files change, listed again once complete
        self.unlist(index)?;
        self.discard(index)?;

        let size = array.size();
        array.metadata().save(&self.layout.metadata_file(index))?;

        self.arrays.insert(index, array);
        self.save_index()?;

        info!(
            set = %self.metadata.id,
            array = index,
            cells = size,
            attributes = self.arrays.get(&index).map_or(0, |a| a.attributes().len()),
            "array_started"
        );
        self.array(index)
    }

    /// Remove a whole array, cached sort indices included.
    pub fn delete_array(&mut self, index: u64) -> ArrayResult<()> {
        self.array(index)?;
        self.unlist(index)?;
        self.discard(index)?;
        info!(set = %self.metadata.id, array = index, "array_deleted");
        Ok(())
    }

    /// Drop `index` from the persisted array list.
    fn unlist(&mut self, index: u64) -> ArrayResult<()> {
        let Some(previous) = self.arrays.remove(&index) else {
            return Ok(());
        };
        if let Err(e) = self.save_index() {
            self.arrays.insert(index, previous);
            self.metadata.arrays = self.arrays.keys().copied().collect();
            return Err(e);
        }
        Ok(())
    }

    fn discard(&mut self, index: u64) -> ArrayResult<()> {
        self.chunks.retain(|(a, _, _), _| *a != index);
        let dir = self.layout.array_dir(index);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    fn save_index(&mut self) -> ArrayResult<()> {
        self.metadata.arrays = self.arrays.keys().copied().collect();
        self.metadata.save(&self.layout.arrayset_file())
    }

    /// One chunk of an attribute, loaded on first use.
    fn chunk(&mut self, array: u64, attribute: usize, chunk: usize) -> ArrayResult<&mut ColumnData> {
        let key = (array, attribute, chunk);
        if !self.chunks.contains_key(&key) {
            let target = self.array(array)?;
            let kind = target.attribute(attribute)?.kind;
            let len = target.chunk_len(chunk);
            let path = self.layout.chunk_file(array, attribute, chunk);
            let column = if path.exists() {
                let column = storage::read_column(&path, kind)?;
                if column.len() != len {
                    return Err(ArrayError::StorageUnavailable(format!(
                        "{} holds {} cells, expected {len}",
                        path.display(),
                        column.len()
                    )));
                }
                debug!(set = %self.metadata.id, array, attribute, chunk, cells = len, "chunk_loaded");
                column
            } else {
                ColumnData::zeros(kind, len)
            };
            self.chunks.insert(key, column);
        }
        self.chunks
            .get_mut(&key)
            .ok_or_else(|| ArrayError::NotFound(format!("Chunk {chunk} of attribute {attribute} of array {array}")))
    }

    /// The full contents of one attribute, row-major.
    pub fn get(&mut self, array: u64, attribute: usize) -> ArrayResult<ColumnData> {
        let target = self.array(array)?;
        let kind = target.attribute(attribute)?.kind;
        let count = target.chunk_count();

        let mut column = ColumnData::zeros(kind, 0);
        for chunk in 0..count {
            column.append(self.chunk(array, attribute, chunk)?.clone())?;
        }
        Ok(column)
    }

    /// The cells at flat row-major `offsets`, in request order. Only the
    /// chunks holding those cells are loaded.
    pub fn get_cells(&mut self, array: u64, attribute: usize, offsets: &[usize]) -> ArrayResult<ColumnData> {
        let target = self.array(array)?;
        let kind = target.attribute(attribute)?.kind;
        let size = target.size();
        let chunk_cells = target.chunk_cells();
        if let Some(bad) = offsets.iter().find(|o| **o >= size) {
            return Err(ArrayError::OutOfRange(format!(
                "cell {bad} outside array {array} of {size} cells"
            )));
        }

        let mut out = ColumnData::zeros(kind, offsets.len());
        for (chunk, (local, positions)) in group_by_chunk(offsets, chunk_cells) {
            let values = self.chunk(array, attribute, chunk)?.gather(&local)?;
            out.scatter(&positions, &values)?;
        }
        Ok(out)
    }

    /// The cells of one attribute selected by `hyperslice`, row-major.
    pub fn get_data(
        &mut self,
        array: u64,
        attribute: usize,
        hyperslice: &ResolvedHyperslice,
    ) -> ArrayResult<ColumnData> {
        self.get_cells(array, attribute, &hyperslice.offsets())
    }

    /// Apply `data` to every chunk in `groups` and encode each beside its
    /// file. Nothing on disk is replaced; on error the temporaries are removed.
    fn stage_chunks(
        &mut self,
        array: u64,
        attribute: usize,
        groups: &ChunkGroups,
        data: &ColumnData,
    ) -> ArrayResult<Vec<(PathBuf, PathBuf)>> {
        let compression = self.compression;
        let mut staged = Vec::with_capacity(groups.len());
        for (chunk, (local, positions)) in groups {
            let path = self.layout.chunk_file(array, attribute, *chunk);
            let result = data.gather(positions).and_then(|part| {
                let column = self.chunk(array, attribute, *chunk)?;
                column.scatter(local, &part)?;
                storage::stage_column(&path, column, compression)
            });
            match result {
                Ok(tmp) => staged.push((tmp, path)),
                Err(e) => {
                    for (tmp, _) in staged {
                        if let Err(cleanup) = fs::remove_file(&tmp) {
                            warn!(path = %tmp.display(), error = %cleanup, "staged_chunk_cleanup_failed");
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(staged)
    }

    /// Write `data` into the cells selected by `hyperslice`, then fold the
    /// payload into the attribute's running statistics.
    ///
    /// Every touched chunk is encoded before any chunk file is replaced.
    pub fn set(
        &mut self,
        array: u64,
        attribute: usize,
        hyperslice: &ResolvedHyperslice,
        data: &ColumnData,
    ) -> ArrayResult<()> {
        let target = self.array(array)?;
        let kind = target.attribute(attribute)?.kind;
        let chunk_cells = target.chunk_cells();
        if data.kind() != kind {
            return Err(ArrayError::SchemaError(format!(
                "Attribute {attribute} of array {array} is {kind}, payload is {}",
                data.kind()
            )));
        }
        if data.len() != hyperslice.len() {
            return Err(ArrayError::ShapeMismatch {
                expected: hyperslice.shape(),
                actual: vec![data.len()],
            });
        }

        let groups = group_by_chunk(&hyperslice.offsets(), chunk_cells);
        let committed = self
            .stage_chunks(array, attribute, &groups, data)
            .and_then(|staged| {
                for (tmp, path) in staged {
                    fs::rename(&tmp, &path)?;
                }
                Ok(())
            });
        if let Err(e) = committed {
            // Cached chunks may hold values that never reached disk
            self.chunks
                .retain(|(a, k, c), _| !(*a == array && *k == attribute && groups.contains_key(c)));
            return Err(e);
        }

        let set_id = self.metadata.id.clone();
        let metadata_file = self.layout.metadata_file(array);
        let target = self.array_mut(array)?;
        let changed = target.statistics_mut(attribute)?.fold(data);
        target.metadata_mut().touch();
        if let Err(e) = target.metadata().save(&metadata_file) {
            warn!(set = %set_id, array, attribute, error = %e, "statistics_persist_failed");
        }

        debug!(
            set = %set_id,
            array,
            attribute,
            cells = data.len(),
            chunks = groups.len(),
            statistics_changed = changed,
            "hyperslice_written"
        );
        Ok(())
    }

    pub fn statistics(&self, array: u64, attribute: usize) -> ArrayResult<&AttributeStatistics> {
        self.array(array)?.statistics(attribute)
    }

    /// `start_array` followed by one full-extent `set` per attribute.
    pub fn store_array(&mut self, index: u64, source: &dyn ArraySource) -> ArrayResult<()> {
        let attributes = source.attributes();
        let count = attributes.len();
        self.start_array(index, source.dimensions(), attributes)?;

        let full = self.array(index)?.full();
        for attribute in 0..count {
            let data = source.attribute_data(attribute)?;
            self.set(index, attribute, &full, &data)?;
        }
        Ok(())
    }
}
