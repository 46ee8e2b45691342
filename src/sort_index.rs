//! # Sort-Index Cache
//!
//! A sort index is the stable ascending permutation of one attribute of a
//! 1-D array: `column[perm[0]] <= column[perm[1]] <= ...`, ties kept in
//! row order, NaN last. It is computed on first request, persisted next to
//! the array as `index/<attribute>.parquet`, and reused from then on.
//!
//! Cached permutations are never invalidated by later writes to the same
//! attribute. Replacing or deleting the array removes them.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::arrayset::ArraySet;
use crate::column::ColumnData;
use crate::config::PerformanceConfig;
use crate::error::{ArrayError, ArrayResult};
use crate::storage;

/// Requested row order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Ascending => f.write_str("ascending"),
            SortOrder::Descending => f.write_str("descending"),
        }
    }
}

impl FromStr for SortOrder {
    type Err = ArrayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ascending" => Ok(SortOrder::Ascending),
            "descending" => Ok(SortOrder::Descending),
            _ => Err(ArrayError::malformed(
                "sort",
                format!("unknown order '{s}'"),
                "Sort-order must be 'ascending' or 'descending'.",
            )),
        }
    }
}

/// Stable argsort, optionally spread over a rayon pool for long columns
#[derive(Clone)]
pub struct Sorter {
    pool: Option<Arc<ThreadPool>>,
    parallel_threshold: usize,
}

impl fmt::Debug for Sorter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sorter")
            .field("threads", &self.pool.as_ref().map(|p| p.current_num_threads()))
            .field("parallel_threshold", &self.parallel_threshold)
            .finish()
    }
}

impl Sorter {
    /// Single-threaded sorter
    pub fn sequential() -> Self {
        Sorter {
            pool: None,
            parallel_threshold: usize::MAX,
        }
    }

    pub fn from_config(config: &PerformanceConfig) -> ArrayResult<Self> {
        let threads = if config.num_threads == 0 {
            num_cpus::get()
        } else {
            config.num_threads
        };
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("hyperstore-sort-{i}"))
            .build()
            .map_err(|e| ArrayError::StorageUnavailable(format!("sort pool: {e}")))?;
        Ok(Sorter {
            pool: Some(Arc::new(pool)),
            parallel_threshold: config.parallel_sort_threshold,
        })
    }

    /// Stable ascending permutation of `column`. NaN sorts after every number.
    pub fn argsort(&self, column: &ColumnData) -> Vec<usize> {
        match column {
            ColumnData::Int8(v) => self.permutation(v, Ord::cmp),
            ColumnData::Int16(v) => self.permutation(v, Ord::cmp),
            ColumnData::Int32(v) => self.permutation(v, Ord::cmp),
            ColumnData::Int64(v) => self.permutation(v, Ord::cmp),
            ColumnData::UInt8(v) => self.permutation(v, Ord::cmp),
            ColumnData::UInt16(v) => self.permutation(v, Ord::cmp),
            ColumnData::UInt32(v) => self.permutation(v, Ord::cmp),
            ColumnData::UInt64(v) => self.permutation(v, Ord::cmp),
            ColumnData::Float32(v) => self.permutation(v, |a, b| nan_last(f64::from(*a), f64::from(*b))),
            ColumnData::Float64(v) => self.permutation(v, |a, b| nan_last(*a, *b)),
            ColumnData::String(v) => self.permutation(v, Ord::cmp),
        }
    }

    fn permutation<T, F>(&self, values: &[T], cmp: F) -> Vec<usize>
    where
        T: Sync,
        F: Fn(&T, &T) -> Ordering + Sync,
    {
        let mut permutation: Vec<usize> = (0..values.len()).collect();
        let by = |a: &usize, b: &usize| cmp(&values[*a], &values[*b]);
        match &self.pool {
            Some(pool) if values.len() >= self.parallel_threshold => {
                pool.install(|| permutation.par_sort_by(by));
            }
            _ => permutation.sort_by(by),
        }
        permutation
    }
}

fn nan_last(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b)
        .unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

/// Stable argsort of plain ordered values
pub fn argsort<T: Ord>(values: &[T]) -> Vec<usize> {
    let mut permutation: Vec<usize> = (0..values.len()).collect();
    permutation.sort_by(|a, b| values[*a].cmp(&values[*b]));
    permutation
}

/// `[0, 1, ..., len)`, optionally reversed
pub fn identity(len: usize, order: SortOrder) -> Vec<usize> {
    match order {
        SortOrder::Ascending => (0..len).collect(),
        SortOrder::Descending => (0..len).rev().collect(),
    }
}

/// The permutation ordering `attribute` of `array`, from cache when present.
///
/// A freshly computed permutation is persisted before returning; failure
/// to persist is logged and the permutation is still returned.
pub fn get_sort_index(
    set: &mut ArraySet,
    sorter: &Sorter,
    array: u64,
    attribute: usize,
    order: SortOrder,
) -> ArrayResult<Vec<usize>> {
    let rows = set.array(array)?.size();
    set.array(array)?.attribute(attribute)?;
    let path = set.layout().index_file(array, attribute);

    let cached = match storage::read_sort_index(&path) {
        Ok(Some(permutation)) if permutation.len() == rows => Some(permutation),
        Ok(Some(permutation)) => {
            warn!(
                set = %set.id(),
                array,
                attribute,
                cached = permutation.len(),
                rows,
                "sort_index_length_mismatch"
            );
            None
        }
        Ok(None) => None,
        Err(e) => {
            warn!(set = %set.id(), array, attribute, error = %e, "sort_index_unreadable");
            None
        }
    };

    let mut permutation = if let Some(permutation) = cached {
        debug!(set = %set.id(), array, attribute, "sort_index_loaded");
        permutation
    } else {
        let permutation = sorter.argsort(&set.get(array, attribute)?);
        match storage::write_sort_index(&path, &permutation, set.compression()) {
            Ok(()) => debug!(set = %set.id(), array, attribute, rows, "sort_index_cached"),
            Err(e) => {
                warn!(set = %set.id(), array, attribute, error = %e, "sort_index_cache_write_failed");
            }
        }
        permutation
    };

    if order == SortOrder::Descending {
        permutation.reverse();
    }
    Ok(permutation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompressionType;
    use crate::storage::StoreLayout;
    use crate::types::{Attribute, Dimension, ScalarType};
    use tempfile::TempDir;

    fn apply(column: &ColumnData, permutation: &[usize]) -> ColumnData {
        column.gather(permutation).unwrap()
    }

    #[test]
    fn test_argsort_is_stable() {
        let sorter = Sorter::sequential();
        let column = ColumnData::from(vec![3i32, 1, 3, 2]);
        let permutation = sorter.argsort(&column);
        assert_eq!(permutation, vec![1, 3, 0, 2]);
        assert_eq!(apply(&column, &permutation), ColumnData::Int32(vec![1, 2, 3, 3]));
    }

    #[test]
    fn test_argsort_nan_last() {
        let sorter = Sorter::sequential();
        let column = ColumnData::from(vec![1.0, f64::NAN, 3.0, 0.5]);
        assert_eq!(sorter.argsort(&column), vec![3, 0, 2, 1]);
    }

    #[test]
    fn test_argsort_strings() {
        let sorter = Sorter::sequential();
        let column = ColumnData::from(vec!["pear", "apple", "fig", "apple"]);
        assert_eq!(sorter.argsort(&column), vec![1, 3, 2, 0]);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let config = PerformanceConfig {
            num_threads: 2,
            parallel_sort_threshold: 16,
        };
        let parallel = Sorter::from_config(&config).unwrap();
        let values: Vec<i64> = (0..1000).map(|i| (i * 7919) % 13).collect();
        let column = ColumnData::from(values);
        assert_eq!(parallel.argsort(&column), Sorter::sequential().argsort(&column));
    }

    #[test]
    fn test_identity() {
        assert_eq!(identity(3, SortOrder::Ascending), vec![0, 1, 2]);
        assert_eq!(identity(3, SortOrder::Descending), vec![2, 1, 0]);
    }

    #[test]
    fn test_sort_order_parse() {
        assert_eq!("descending".parse::<SortOrder>().unwrap(), SortOrder::Descending);
        assert!(matches!(
            "sideways".parse::<SortOrder>(),
            Err(ArrayError::MalformedQuery { .. })
        ));
    }

    #[test]
    fn test_sort_index_cached_and_stale_after_write() {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path(), "sorted");
        let mut set = ArraySet::create(layout, "sorted", CompressionType::Snappy).unwrap();
        set.start_array(
            0,
            vec![Dimension::new("row", 0, 4)],
            vec![Attribute::new("x", ScalarType::Int64)],
        )
        .unwrap();
        let full = set.array(0).unwrap().full();
        set.set(0, 0, &full, &ColumnData::from(vec![3i64, 1, 3, 2])).unwrap();

        let sorter = Sorter::sequential();
        let ascending = get_sort_index(&mut set, &sorter, 0, 0, SortOrder::Ascending).unwrap();
        assert_eq!(ascending, vec![1, 3, 0, 2]);
        assert!(set.layout().index_file(0, 0).exists());

        let descending = get_sort_index(&mut set, &sorter, 0, 0, SortOrder::Descending).unwrap();
        assert_eq!(descending, vec![2, 0, 3, 1]);

        // Later writes do not refresh the cached permutation
        set.set(0, 0, &full, &ColumnData::from(vec![0i64, 1, 2, 3])).unwrap();
        let stale = get_sort_index(&mut set, &sorter, 0, 0, SortOrder::Ascending).unwrap();
        assert_eq!(stale, vec![1, 3, 0, 2]);
    }
}
