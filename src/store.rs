//! # ArrayStore
//!
//! The boundary of the engine: every public operation takes an array-set
//! id, opens that set's store under its lock, does its work, and releases
//! the lock when the [`OpenArraySet`] handle drops (on every path,
//! including errors).
//!
//! ## Example
//!
//! ```rust,no_run
//! use hyperstore::{ArrayStore, Attribute, Config, Dimension, ScalarType};
//!
//! let store = ArrayStore::new(Config::with_data_dir("/tmp/hyperstore")).unwrap();
//! let id = store.create_arrayset(None).unwrap();
//!
//! store
//!     .start_array(
//!         &id,
//!         0,
//!         vec![Dimension::new("row", 0, 4)],
//!         vec![Attribute::new("x", ScalarType::Float64)],
//!     )
//!     .unwrap();
//! store
//!     .write_json(&id, 0, 0, "...", &serde_json::json!([1.0, null, 3.0, 0.5]))
//!     .unwrap();
//!
//! let chunk = store
//!     .table_chunk(&id, 0, "0-4", "0", None, Some("0:ascending"))
//!     .unwrap();
//! println!("{}", serde_json::to_string(&chunk).unwrap());
//! ```

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::array::Array;
use crate::arrayset::{ArraySet, ArraySource};
use crate::codec::{self, HyperchunkStream};
use crate::column::ColumnData;
use crate::config::{Config, StorageConfig};
use crate::error::{ArrayError, ArrayResult};
use crate::hyperslice::{self, Hyperchunk, Hyperslice, ResolvedHyperslice, HYPERCHUNKS_GRAMMAR};
use crate::sort_index::Sorter;
use crate::statistics::Scalar;
use crate::storage::{self, StoreLayout};
use crate::table::{self, TableChunk, TableMetadata};
use crate::types::{Attribute, ByteOrder, Dimension};

/// Exclusive access to one array set
#[derive(Default)]
struct SetLock {
    held: Mutex<bool>,
    released: Condvar,
}

impl SetLock {
    /// Wait for the set to be free. `None` waits forever.
    fn acquire(self: Arc<Self>, timeout: Option<Duration>) -> Option<SetGuard> {
        {
            let deadline = timeout.map(|t| Instant::now() + t);
            let mut held = self.held.lock();
            while *held {
                match deadline {
                    Some(deadline) => {
                        if self.released.wait_until(&mut held, deadline).timed_out() && *held {
                            return None;
                        }
                    }
                    None => self.released.wait(&mut held),
                }
            }
            *held = true;
        }
        Some(SetGuard(self))
    }
}

/// Releases its set on drop
struct SetGuard(Arc<SetLock>);

impl Drop for SetGuard {
    fn drop(&mut self) {
        *self.0.held.lock() = false;
        self.0.released.notify_one();
    }
}

/// A store opened under its lock
pub struct OpenArraySet {
    set: ArraySet,
    _guard: SetGuard,
}

impl Deref for OpenArraySet {
    type Target = ArraySet;

    fn deref(&self) -> &ArraySet {
        &self.set
    }
}

impl DerefMut for OpenArraySet {
    fn deref_mut(&mut self) -> &mut ArraySet {
        &mut self.set
    }
}

/// A single encoded result
#[derive(Debug, Clone, PartialEq)]
pub enum Encoded {
    Json(Value),
    Binary(Vec<u8>),
}

/// Result of a batched hyperchunk read
pub enum ReadOutput {
    /// One nested array per hyperslice, in request order
    Json(Value),
    /// One packed buffer per hyperslice, fetched as the stream is pulled
    Stream(HyperchunkStream),
}

/// Schema of one member array
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrayInfo {
    pub index: u64,
    pub dimensions: Vec<Dimension>,
    pub attributes: Vec<Attribute>,
}

/// Statistics of one `(array, attribute)` pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsInfo {
    pub array: u64,
    pub attribute: usize,
    pub min: Option<Scalar>,
    pub max: Option<Scalar>,
}

/// Legacy listing entry; `array` and `index` carry the same value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrayListing {
    pub array: u64,
    pub index: u64,
    pub dimensions: Vec<Dimension>,
    pub attributes: Vec<Attribute>,
}

/// Answer to a metadata request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SetMetadata {
    Selected {
        #[serde(skip_serializing_if = "Option::is_none")]
        arrays: Option<Vec<ArrayInfo>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        statistics: Option<Vec<StatisticsInfo>>,
    },
    Listing(Vec<ArrayListing>),
}

/// Parse `"0;2;5"` into array indices.
pub fn parse_array_list(text: &str) -> ArrayResult<Vec<u64>> {
    text.split(';')
        .map(|part| {
            part.trim().parse().map_err(|_| {
                ArrayError::malformed(
                    "arrays",
                    format!("invalid array index '{part}'"),
                    "Arrays argument must be a semicolon-separated sequence of non-negative integers.",
                )
            })
        })
        .collect()
}

/// Parse `"0/1;2/0"` into `(array, attribute)` pairs.
pub fn parse_statistics_list(text: &str) -> ArrayResult<Vec<(u64, usize)>> {
    const GRAMMAR: &str = "Statistics argument must be a semicolon-separated sequence of \
array-index/attribute-index pairs of non-negative integers.";
    text.split(';')
        .map(|part| {
            let bad = || ArrayError::malformed("statistics", format!("invalid pair '{part}'"), GRAMMAR);
            let (array, attribute) = part.split_once('/').ok_or_else(bad)?;
            Ok((
                array.trim().parse().map_err(|_| bad())?,
                attribute.trim().parse().map_err(|_| bad())?,
            ))
        })
        .collect()
}

fn resolve_hyperchunks(
    set: &ArraySet,
    hyperchunks: &[Hyperchunk],
) -> ArrayResult<Vec<(u64, usize, ResolvedHyperslice)>> {
    let mut resolved = Vec::new();
    for chunk in hyperchunks {
        let array = set.array(chunk.array)?;
        array.attribute(chunk.attribute)?;
        for hyperslice in &chunk.hyperslices {
            resolved.push((chunk.array, chunk.attribute, array.resolve(hyperslice)?));
        }
    }
    Ok(resolved)
}

/// Multi-store array engine
pub struct ArrayStore {
    config: StorageConfig,
    locks: DashMap<String, Arc<SetLock>>,
    sorter: Sorter,
}

impl ArrayStore {
    pub fn new(config: Config) -> ArrayResult<Self> {
        let config = config.storage;
        fs::create_dir_all(config.data_dir.join("arraysets"))?;
        let sorter = Sorter::from_config(&config.performance)?;

        info!(
            data_dir = %config.data_dir.display(),
            compression = ?config.compression,
            lock_timeout_ms = config.lock_timeout_ms,
            "array_store_opened"
        );

        Ok(ArrayStore {
            config,
            locks: DashMap::new(),
            sorter,
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    fn layout(&self, id: &str) -> ArrayResult<StoreLayout> {
        storage::validate_set_id(id)?;
        Ok(StoreLayout::new(&self.config.data_dir, id))
    }

    fn lock(&self, id: &str) -> ArrayResult<SetGuard> {
        let lock = Arc::clone(self.locks.entry(id.to_string()).or_default().value());

        let timeout_ms = self.config.lock_timeout_ms;
        let timeout = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms));
        lock.acquire(timeout).ok_or_else(|| {
            ArrayError::StorageUnavailable(format!(
                "Timed out after {timeout_ms} ms waiting for array set '{id}'"
            ))
        })
    }

    /// Release `guard` and drop the lock entry of a set that no longer
    /// exists, unless another caller is queued on it.
    fn release_missing(&self, id: &str, guard: SetGuard) {
        // Only the map and `guard` reference an idle lock
        self.locks.remove_if(id, |_, lock| Arc::strong_count(lock) == 2);
        drop(guard);
    }

    /// Open a store under its lock. The lock is held until the handle drops.
    pub fn open(&self, id: &str) -> ArrayResult<OpenArraySet> {
        let layout = self.layout(id)?;
        let guard = self.lock(id)?;
        if !layout.exists() {
            self.release_missing(id, guard);
            return Err(ArrayError::NotFound(format!("Array set '{id}'")));
        }
        let set = ArraySet::open(layout, self.config.compression)?.with_chunk_cells(self.config.chunk_cells);
        Ok(OpenArraySet { set, _guard: guard })
    }

    // ------------------------------------------------------------------
    // Array-set lifecycle
    // ------------------------------------------------------------------

    /// Create an empty array set; a random id is generated when none is given.
    pub fn create_arrayset(&self, id: Option<&str>) -> ArrayResult<String> {
        let id = id.map_or_else(|| uuid::Uuid::new_v4().simple().to_string(), str::to_string);
        let layout = self.layout(&id)?;
        let _guard = self.lock(&id)?;
        ArraySet::create(layout, &id, self.config.compression)?;
        info!(set = %id, "arrayset_created");
        Ok(id)
    }

    pub fn list_arraysets(&self) -> ArrayResult<Vec<String>> {
        storage::list_set_ids(&self.config.data_dir)
    }

    /// Remove a whole array set. Waits for the store lock like any other
    /// operation.
    pub fn delete_arrayset(&self, id: &str) -> ArrayResult<()> {
        let layout = self.layout(id)?;
        let guard = self.lock(id)?;
        if !layout.exists() {
            self.release_missing(id, guard);
            return Err(ArrayError::NotFound(format!("Array set '{id}'")));
        }
        fs::remove_dir_all(layout.root())?;
        self.release_missing(id, guard);
        info!(set = %id, "arrayset_deleted");
        Ok(())
    }

    pub fn array_indices(&self, id: &str) -> ArrayResult<Vec<u64>> {
        Ok(self.open(id)?.keys().collect())
    }

    // ------------------------------------------------------------------
    // Arrays
    // ------------------------------------------------------------------

    pub fn start_array(
        &self,
        id: &str,
        index: u64,
        dimensions: Vec<Dimension>,
        attributes: Vec<Attribute>,
    ) -> ArrayResult<Array> {
        let mut set = self.open(id)?;
        Ok(set.start_array(index, dimensions, attributes)?.clone())
    }

    pub fn store_array(&self, id: &str, index: u64, source: &dyn ArraySource) -> ArrayResult<()> {
        self.open(id)?.store_array(index, source)
    }

    pub fn delete_array(&self, id: &str, index: u64) -> ArrayResult<()> {
        self.open(id)?.delete_array(index)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Write a packed binary payload into one hyperslice of one attribute.
    /// The payload is read in host byte order unless `byte_order` is given.
    pub fn write(
        &self,
        id: &str,
        array: u64,
        attribute: usize,
        hyperslice: &str,
        payload: &[u8],
        byte_order: Option<ByteOrder>,
    ) -> ArrayResult<()> {
        let hyperslice = Hyperslice::parse(hyperslice)?;
        let mut set = self.open(id)?;

        let target = set.array(array)?;
        let kind = target.attribute(attribute)?.kind;
        let resolved = target.resolve(&hyperslice)?;
        let data = codec::decode_binary(kind, payload, byte_order.unwrap_or_else(ByteOrder::native))?;
        set.set(array, attribute, &resolved, &data)
    }

    /// Write a nested JSON payload whose shape must equal the hyperslice's.
    pub fn write_json(
        &self,
        id: &str,
        array: u64,
        attribute: usize,
        hyperslice: &str,
        value: &Value,
    ) -> ArrayResult<()> {
        let hyperslice = Hyperslice::parse(hyperslice)?;
        let mut set = self.open(id)?;

        let target = set.array(array)?;
        let kind = target.attribute(attribute)?.kind;
        let resolved = target.resolve(&hyperslice)?;
        let (data, shape) = codec::from_json(kind, value)?;
        if shape != resolved.shape() {
            return Err(ArrayError::ShapeMismatch {
                expected: resolved.shape(),
                actual: shape,
            });
        }
        set.set(array, attribute, &resolved, &data)
    }

    /// Apply one payload per resolved hyperslice, in request order.
    ///
    /// With a byte order, `data` is the concatenation of packed buffers;
    /// without one, it is a JSON list holding one nested array per
    /// hyperslice.
    pub fn write_hyperchunks(
        &self,
        id: &str,
        hyperchunks: &str,
        data: &[u8],
        byte_order: Option<ByteOrder>,
    ) -> ArrayResult<()> {
        let hyperchunks = hyperslice::parse_hyperchunks(hyperchunks)?;
        let mut set = self.open(id)?;
        let targets = resolve_hyperchunks(&set, &hyperchunks)?;

        let mut payloads = Vec::with_capacity(targets.len());
        match byte_order {
            Some(order) => {
                let mut rest = data;
                for (array, attribute, resolved) in &targets {
                    let kind = set.array(*array)?.attribute(*attribute)?.kind;
                    let width = kind.width().unwrap_or(0);
                    let bytes = resolved.len() * width;
                    if width == 0 || rest.len() < bytes {
                        return Err(ArrayError::malformed(
                            "data",
                            format!("payload too short for hyperslice of array {array} attribute {attribute}"),
                            HYPERCHUNKS_GRAMMAR,
                        ));
                    }
                    let (head, tail) = rest.split_at(bytes);
                    payloads.push(codec::decode_binary(kind, head, order)?);
                    rest = tail;
                }
                if !rest.is_empty() {
                    return Err(ArrayError::malformed(
                        "data",
                        format!("{} unused trailing bytes", rest.len()),
                        HYPERCHUNKS_GRAMMAR,
                    ));
                }
            }
            None => {
                let value: Value = serde_json::from_slice(data)?;
                let items = value.as_array().filter(|items| items.len() == targets.len()).ok_or_else(|| {
                    ArrayError::malformed(
                        "data",
                        format!("expected a JSON list of {} hyperslice payloads", targets.len()),
                        HYPERCHUNKS_GRAMMAR,
                    )
                })?;
                for ((array, attribute, resolved), item) in targets.iter().zip(items) {
                    let kind = set.array(*array)?.attribute(*attribute)?.kind;
                    let (payload, shape) = codec::from_json(kind, item)?;
                    if shape != resolved.shape() {
                        return Err(ArrayError::ShapeMismatch {
                            expected: resolved.shape(),
                            actual: shape,
                        });
                    }
                    payloads.push(payload);
                }
            }
        }

        for ((array, attribute, resolved), payload) in targets.iter().zip(&payloads) {
            set.set(*array, *attribute, resolved, payload)?;
        }
        debug!(set = %id, hyperslices = targets.len(), "hyperchunks_written");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read every hyperslice of `hyperchunks`, as JSON or as a lazy stream
    /// of packed buffers when a byte order is requested.
    pub fn read(
        &self,
        id: &str,
        hyperchunks: &str,
        byte_order: Option<ByteOrder>,
    ) -> ArrayResult<ReadOutput> {
        match byte_order {
            Some(order) => Ok(ReadOutput::Stream(self.read_stream(id, hyperchunks, order)?)),
            None => Ok(ReadOutput::Json(self.read_json(id, hyperchunks)?)),
        }
    }

    pub fn read_json(&self, id: &str, hyperchunks: &str) -> ArrayResult<Value> {
        let hyperchunks = hyperslice::parse_hyperchunks(hyperchunks)?;
        let mut set = self.open(id)?;
        let targets = resolve_hyperchunks(&set, &hyperchunks)?;

        let mut out = Vec::with_capacity(targets.len());
        for (array, attribute, resolved) in &targets {
            let data = set.get_data(*array, *attribute, resolved)?;
            out.push(codec::to_json(&data, &resolved.shape()));
        }
        debug!(set = %id, hyperslices = targets.len(), "hyperchunks_read");
        Ok(Value::Array(out))
    }

    /// Lazy binary read. The store stays locked until the stream is
    /// exhausted or dropped.
    pub fn read_stream(&self, id: &str, hyperchunks: &str, order: ByteOrder) -> ArrayResult<HyperchunkStream> {
        let hyperchunks = hyperslice::parse_hyperchunks(hyperchunks)?;
        let set = self.open(id)?;
        let targets = resolve_hyperchunks(&set, &hyperchunks)?;
        debug!(set = %id, hyperslices = targets.len(), byte_order = %order, "hyperchunk_stream_opened");
        Ok(HyperchunkStream::new(set, targets, order))
    }

    /// Read one attribute over `"b0,e0,b1,e1,..."` half-open ranges,
    /// clamped to each dimension.
    pub fn read_ranges(
        &self,
        id: &str,
        array: u64,
        attribute: usize,
        ranges: &str,
        byte_order: Option<ByteOrder>,
    ) -> ArrayResult<Encoded> {
        let ranges = hyperslice::parse_ranges(ranges)?;
        let mut set = self.open(id)?;

        let target = set.array(array)?;
        target.attribute(attribute)?;
        let resolved = ResolvedHyperslice::from_ranges(&ranges, target.dimensions())?;
        let data = set.get_data(array, attribute, &resolved)?;
        match byte_order {
            Some(order) => Ok(Encoded::Binary(codec::encode_binary(&data, order)?)),
            None => Ok(Encoded::Json(codec::to_json(&data, &resolved.shape()))),
        }
    }

    /// Array schemas and/or statistics. With neither selection, every
    /// array is listed in index order.
    pub fn metadata(
        &self,
        id: &str,
        arrays: Option<&[u64]>,
        statistics: Option<&[(u64, usize)]>,
    ) -> ArrayResult<SetMetadata> {
        let set = self.open(id)?;

        if arrays.is_none() && statistics.is_none() {
            let listing = set
                .arrays()
                .map(|a| ArrayListing {
                    array: a.index(),
                    index: a.index(),
                    dimensions: a.dimensions().to_vec(),
                    attributes: a.attributes().to_vec(),
                })
                .collect();
            return Ok(SetMetadata::Listing(listing));
        }

        let arrays = arrays
            .map(|indices| {
                indices
                    .iter()
                    .map(|index| {
                        let a = set.array(*index)?;
                        Ok(ArrayInfo {
                            index: *index,
                            dimensions: a.dimensions().to_vec(),
                            attributes: a.attributes().to_vec(),
                        })
                    })
                    .collect::<ArrayResult<Vec<_>>>()
            })
            .transpose()?;

        let statistics = statistics
            .map(|pairs| {
                pairs
                    .iter()
                    .map(|(array, attribute)| {
                        let stats = set.statistics(*array, *attribute)?;
                        Ok(StatisticsInfo {
                            array: *array,
                            attribute: *attribute,
                            min: stats.min.clone(),
                            max: stats.max.clone(),
                        })
                    })
                    .collect::<ArrayResult<Vec<_>>>()
            })
            .transpose()?;

        Ok(SetMetadata::Selected { arrays, statistics })
    }

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    pub fn table_metadata(&self, id: &str, array: u64, index: Option<&str>) -> ArrayResult<TableMetadata> {
        let set = self.open(id)?;
        table::table_metadata(&set, array, index)
    }

    /// `rows` and `columns` use the `"a,b-c"` grammar; `sort` is
    /// `"column:ascending"` or `"column:descending"`.
    pub fn table_chunk(
        &self,
        id: &str,
        array: u64,
        rows: &str,
        columns: &str,
        index: Option<&str>,
        sort: Option<&str>,
    ) -> ArrayResult<TableChunk> {
        let rows = table::parse_rows(rows)?;
        let columns = table::parse_columns(columns)?;
        let sort = sort.map(table::parse_sort).transpose()?;

        let mut set = self.open(id)?;
        let chunk = table::table_chunk(&mut set, &self.sorter, array, &rows, &columns, index, sort)?;
        debug!(set = %id, array, rows = chunk.rows.len(), columns = chunk.columns.len(), "table_chunk_read");
        Ok(chunk)
    }

    pub fn table_sorted_indices(
        &self,
        id: &str,
        array: u64,
        rows: &str,
        index: Option<&str>,
        sort: Option<&str>,
        byte_order: Option<ByteOrder>,
    ) -> ArrayResult<Encoded> {
        let rows = table::parse_rows(rows)?;
        let sort = sort.map(table::parse_sort).transpose()?;

        let mut set = self.open(id)?;
        let indices = table::sorted_indices(&mut set, &self.sorter, array, &rows, index, sort)?;
        encode_indices(indices, byte_order)
    }

    pub fn table_unsorted_indices(
        &self,
        id: &str,
        array: u64,
        rows: &str,
        index: Option<&str>,
        sort: Option<&str>,
        byte_order: Option<ByteOrder>,
    ) -> ArrayResult<Encoded> {
        let rows = table::parse_rows(rows)?;
        let sort = sort.map(table::parse_sort).transpose()?;

        let mut set = self.open(id)?;
        let indices = table::unsorted_indices(&mut set, &self.sorter, array, &rows, index, sort)?;
        encode_indices(indices, byte_order)
    }
}

fn encode_indices(indices: Vec<i32>, byte_order: Option<ByteOrder>) -> ArrayResult<Encoded> {
    match byte_order {
        Some(order) => Ok(Encoded::Binary(codec::encode_binary(&ColumnData::from(indices), order)?)),
        None => Ok(Encoded::Json(Value::from(indices))),
    }
}
