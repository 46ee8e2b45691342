//! # Table Views
//!
//! A 1-D array read as a table: one row per cell, one column per
//! attribute, plus an optional synthetic index column holding each row's
//! position before sorting.
//!
//! Chunk reads map logical rows to physical rows through a sort index,
//! fetch the physical rows in ascending order, and restore the caller's
//! row order before returning.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::arrayset::ArraySet;
use crate::codec::json_values;
use crate::error::{ArrayError, ArrayResult};
use crate::sort_index::{self, argsort, identity, SortOrder, Sorter};
use crate::statistics::Scalar;
use crate::types::ScalarType;

pub const ROWS_GRAMMAR: &str =
    "Rows argument must be a comma separated collection of row indices or half-open index ranges.";

pub const COLUMNS_GRAMMAR: &str =
    "Columns argument must be a comma separated collection of column indices or half-open index ranges.";

pub const SORT_GRAMMAR: &str = "Sort argument must be a single column:order tuple, where column \
is a non-negative integer and order is 'ascending' or 'descending'.";

/// Comma-separated indices and half-open `b-c` ranges, kept as ranges
/// until they are capped against a row or column count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexList(Vec<(u64, u64)>);

impl IndexList {
    fn parse(argument: &str, text: &str, grammar: &str) -> ArrayResult<Self> {
        let bad = |detail: String| ArrayError::malformed(argument, detail, grammar);
        let number = |token: &str| -> ArrayResult<u64> {
            token
                .trim()
                .parse()
                .map_err(|_| bad(format!("invalid index '{token}'")))
        };

        let mut ranges = Vec::new();
        for token in text.split(',') {
            let bounds: Vec<&str> = token.split('-').collect();
            let range = match bounds.as_slice() {
                [single] => {
                    let value = number(single)?;
                    (value, value.saturating_add(1))
                }
                [begin, end] => (number(begin)?, number(end)?),
                _ => return Err(bad(format!("invalid range '{token}'"))),
            };
            ranges.push(range);
        }
        Ok(IndexList(ranges))
    }

    /// Largest listed index, if any
    pub fn max(&self) -> Option<u64> {
        self.0
            .iter()
            .filter(|(begin, end)| begin < end)
            .map(|(_, end)| end - 1)
            .max()
    }

    /// Every listed index below `limit`, in listed order.
    pub fn expand(&self, limit: usize) -> Vec<u64> {
        let limit = limit as u64;
        self.0
            .iter()
            .flat_map(|&(begin, end)| begin..end.min(limit))
            .collect()
    }
}

impl FromIterator<u64> for IndexList {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        IndexList(iter.into_iter().map(|i| (i, i.saturating_add(1))).collect())
    }
}

/// Parse `"a,b-c,..."` into row indices, ranges half-open.
pub fn parse_rows(text: &str) -> ArrayResult<IndexList> {
    IndexList::parse("rows", text, ROWS_GRAMMAR)
}

/// Parse `"a,b-c,..."` into column indices, ranges half-open.
pub fn parse_columns(text: &str) -> ArrayResult<IndexList> {
    IndexList::parse("columns", text, COLUMNS_GRAMMAR)
}

/// One sort key, serialized as `[column, "order"]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec(pub usize, pub SortOrder);

impl SortSpec {
    pub fn column(self) -> usize {
        self.0
    }

    pub fn order(self) -> SortOrder {
        self.1
    }
}

/// Parse `"column:ascending"` or `"column:descending"`.
///
/// Exactly one sort column is accepted.
pub fn parse_sort(text: &str) -> ArrayResult<SortSpec> {
    let bad = |detail: String| ArrayError::malformed("sort", detail, SORT_GRAMMAR);

    let mut specs = Vec::new();
    for spec in text.split(',') {
        let Some((column, order)) = spec.split_once(':') else {
            return Err(bad(format!("'{spec}' is not a column:order tuple")));
        };
        let column = column
            .trim()
            .parse()
            .map_err(|_| bad(format!("sort column '{column}' must be a non-negative integer")))?;
        let order = order
            .trim()
            .parse()
            .map_err(|_| bad(format!("sort order '{order}' must be 'ascending' or 'descending'")))?;
        specs.push(SortSpec(column, order));
    }

    match specs.as_slice() {
        [spec] => Ok(*spec),
        _ => Err(bad(format!("{} sort columns given, only one can be sorted", specs.len()))),
    }
}

/// Table-oriented description of a 1-D array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TableMetadata {
    pub row_count: usize,
    pub column_count: usize,
    pub column_names: Vec<String>,
    pub column_types: Vec<ScalarType>,
    pub column_min: Vec<Option<Scalar>>,
    pub column_max: Vec<Option<Scalar>>,
    #[serde(skip)]
    pub has_index: bool,
}

impl TableMetadata {
    /// True if `column` is the synthetic index column
    pub fn is_index_column(&self, column: usize) -> bool {
        self.has_index && column + 1 == self.column_count
    }
}

/// One requested block of table data, columns outermost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TableChunk {
    pub rows: Vec<u64>,
    pub columns: Vec<u64>,
    pub column_names: Vec<String>,
    pub data: Vec<Vec<Value>>,
    pub sort: Option<Vec<SortSpec>>,
}

/// Describe `array` as a table, appending an index column named `index`.
pub fn table_metadata(set: &ArraySet, array: u64, index: Option<&str>) -> ArrayResult<TableMetadata> {
    let target = set.array(array)?;
    if target.ndim() != 1 {
        return Err(ArrayError::SchemaError(format!(
            "Array {array} is not a table (1-D array), it has {} dimensions",
            target.ndim()
        )));
    }

    let row_count = target.dimensions()[0].extent();
    let attributes = target.attributes();
    let statistics = &target.metadata().statistics;

    let mut metadata = TableMetadata {
        row_count,
        column_count: attributes.len(),
        column_names: attributes.iter().map(|a| a.name.clone()).collect(),
        column_types: attributes.iter().map(|a| a.kind).collect(),
        column_min: statistics.iter().map(|s| s.min.clone()).collect(),
        column_max: statistics.iter().map(|s| s.max.clone()).collect(),
        has_index: false,
    };

    if let Some(name) = index {
        metadata.has_index = true;
        metadata.column_count += 1;
        metadata.column_names.push(name.to_string());
        metadata.column_types.push(ScalarType::Int64);
        metadata.column_min.push(Some(Scalar::Int(0)));
        metadata.column_max.push(Some(Scalar::Int(row_count as i64 - 1)));
    }

    Ok(metadata)
}

fn check_sort_column(metadata: &TableMetadata, sort: Option<SortSpec>) -> ArrayResult<()> {
    match sort {
        Some(spec) if spec.column() >= metadata.column_count => Err(ArrayError::OutOfRange(
            format!(
                "Sort column {} out-of-range ({} columns)",
                spec.column(),
                metadata.column_count
            ),
        )),
        _ => Ok(()),
    }
}

/// Logical-to-physical row permutation for `sort`; identity when unsorted
/// or when sorting by the index column.
fn table_sort_index(
    set: &mut ArraySet,
    sorter: &Sorter,
    metadata: &TableMetadata,
    array: u64,
    sort: Option<SortSpec>,
) -> ArrayResult<Vec<usize>> {
    match sort {
        None => Ok(identity(metadata.row_count, SortOrder::Ascending)),
        Some(spec) if metadata.is_index_column(spec.column()) => {
            Ok(identity(metadata.row_count, spec.order()))
        }
        Some(spec) => sort_index::get_sort_index(set, sorter, array, spec.column(), spec.order()),
    }
}

/// Fetch `columns` of the logical `rows` of `array`, in the caller's row
/// order. Rows past the end are dropped; columns past the end are an error.
///
/// The returned `rows` are the physical rows backing each requested
/// logical row, so they equal the request when no sort is given.
pub fn table_chunk(
    set: &mut ArraySet,
    sorter: &Sorter,
    array: u64,
    rows: &IndexList,
    columns: &IndexList,
    index: Option<&str>,
    sort: Option<SortSpec>,
) -> ArrayResult<TableChunk> {
    let metadata = table_metadata(set, array, index)?;
    let rows = rows.expand(metadata.row_count);
    if let Some(column) = columns.max().filter(|c| *c >= metadata.column_count as u64) {
        return Err(ArrayError::OutOfRange(format!(
            "Column {column} out-of-range ({} columns)",
            metadata.column_count
        )));
    }
    let columns = columns.expand(metadata.column_count);
    check_sort_column(&metadata, sort)?;

    let sort_index = table_sort_index(set, sorter, &metadata, array, sort)?;
    let physical: Vec<usize> = rows.iter().map(|r| sort_index[*r as usize]).collect();
    let fetch_order = argsort(&physical);
    let restore = argsort(&fetch_order);
    let ascending: Vec<usize> = fetch_order.iter().map(|i| physical[*i]).collect();

    let mut data = Vec::with_capacity(columns.len());
    for column in &columns {
        let column = *column as usize;
        if metadata.is_index_column(column) {
            data.push(physical.iter().map(|p| Value::from(*p as u64)).collect());
        } else {
            let fetched = set.get_cells(array, column, &ascending)?;
            data.push(json_values(&fetched.gather(&restore)?));
        }
    }

    Ok(TableChunk {
        column_names: columns
            .iter()
            .map(|c| metadata.column_names[*c as usize].clone())
            .collect(),
        rows: physical.iter().map(|p| *p as u64).collect(),
        columns,
        data,
        sort: sort.map(|spec| vec![spec]),
    })
}

fn to_i32(values: impl Iterator<Item = usize>) -> ArrayResult<Vec<i32>> {
    values
        .map(|v| {
            i32::try_from(v).map_err(|_| {
                ArrayError::OutOfRange(format!("row {v} does not fit in an int32 index"))
            })
        })
        .collect()
}

/// For each requested physical row, its position in sorted order.
pub fn sorted_indices(
    set: &mut ArraySet,
    sorter: &Sorter,
    array: u64,
    rows: &IndexList,
    index: Option<&str>,
    sort: Option<SortSpec>,
) -> ArrayResult<Vec<i32>> {
    let metadata = table_metadata(set, array, index)?;
    let rows = rows.expand(metadata.row_count);
    check_sort_column(&metadata, sort)?;

    let sort_index = table_sort_index(set, sorter, &metadata, array, sort)?;
    let inverse = argsort(&sort_index);
    to_i32(rows.iter().map(|r| inverse[*r as usize]))
}

/// For each requested logical (sorted) row, its physical row.
pub fn unsorted_indices(
    set: &mut ArraySet,
    sorter: &Sorter,
    array: u64,
    rows: &IndexList,
    index: Option<&str>,
    sort: Option<SortSpec>,
) -> ArrayResult<Vec<i32>> {
    let metadata = table_metadata(set, array, index)?;
    let rows = rows.expand(metadata.row_count);
    check_sort_column(&metadata, sort)?;

    let sort_index = table_sort_index(set, sorter, &metadata, array, sort)?;
    to_i32(rows.iter().map(|r| sort_index[*r as usize]))
}
