//! Parquet column files.
//!
//! Each attribute buffer is split into single-column Parquet files, one
//! per fixed-size chunk of the array's flat row-major cells. Cached sort permutations use the
//! same format with an `int64` column.

use arrow::array::{
    Array as _, ArrayRef, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array,
    Int8Array, RecordBatch, StringArray, UInt16Array, UInt32Array, UInt64Array, UInt8Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use parquet::arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter};
use parquet::basic::{Compression, GzipLevel};
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::column::ColumnData;
use crate::config::CompressionType;
use crate::error::{ArrayError, ArrayResult};
use crate::types::ScalarType;

const VALUES_FIELD: &str = "values";
const SORT_INDEX_FIELD: &str = "sort_index";

fn arrow_type(kind: ScalarType) -> DataType {
    match kind {
        ScalarType::Int8 => DataType::Int8,
        ScalarType::Int16 => DataType::Int16,
        ScalarType::Int32 => DataType::Int32,
        ScalarType::Int64 => DataType::Int64,
        ScalarType::UInt8 => DataType::UInt8,
        ScalarType::UInt16 => DataType::UInt16,
        ScalarType::UInt32 => DataType::UInt32,
        ScalarType::UInt64 => DataType::UInt64,
        ScalarType::Float32 => DataType::Float32,
        ScalarType::Float64 => DataType::Float64,
        ScalarType::String => DataType::Utf8,
    }
}

fn to_arrow(column: &ColumnData) -> ArrayRef {
    match column {
        ColumnData::Int8(v) => Arc::new(Int8Array::from(v.clone())),
        ColumnData::Int16(v) => Arc::new(Int16Array::from(v.clone())),
        ColumnData::Int32(v) => Arc::new(Int32Array::from(v.clone())),
        ColumnData::Int64(v) => Arc::new(Int64Array::from(v.clone())),
        ColumnData::UInt8(v) => Arc::new(UInt8Array::from(v.clone())),
        ColumnData::UInt16(v) => Arc::new(UInt16Array::from(v.clone())),
        ColumnData::UInt32(v) => Arc::new(UInt32Array::from(v.clone())),
        ColumnData::UInt64(v) => Arc::new(UInt64Array::from(v.clone())),
        ColumnData::Float32(v) => Arc::new(Float32Array::from(v.clone())),
        ColumnData::Float64(v) => Arc::new(Float64Array::from(v.clone())),
        ColumnData::String(v) => Arc::new(StringArray::from(v.clone())),
    }
}

fn downcast<'a, T: 'static>(array: &'a ArrayRef, path: &Path) -> ArrayResult<&'a T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        ArrayError::StorageUnavailable(format!(
            "{} holds {} values, not the declared attribute type",
            path.display(),
            array.data_type()
        ))
    })
}

fn from_arrow(kind: ScalarType, array: &ArrayRef, path: &Path) -> ArrayResult<ColumnData> {
    Ok(match kind {
        ScalarType::Int8 => downcast::<Int8Array>(array, path)?.values().to_vec().into(),
        ScalarType::Int16 => downcast::<Int16Array>(array, path)?.values().to_vec().into(),
        ScalarType::Int32 => downcast::<Int32Array>(array, path)?.values().to_vec().into(),
        ScalarType::Int64 => downcast::<Int64Array>(array, path)?.values().to_vec().into(),
        ScalarType::UInt8 => downcast::<UInt8Array>(array, path)?.values().to_vec().into(),
        ScalarType::UInt16 => downcast::<UInt16Array>(array, path)?.values().to_vec().into(),
        ScalarType::UInt32 => downcast::<UInt32Array>(array, path)?.values().to_vec().into(),
        ScalarType::UInt64 => downcast::<UInt64Array>(array, path)?.values().to_vec().into(),
        ScalarType::Float32 => downcast::<Float32Array>(array, path)?.values().to_vec().into(),
        ScalarType::Float64 => downcast::<Float64Array>(array, path)?.values().to_vec().into(),
        ScalarType::String => ColumnData::String(
            downcast::<StringArray>(array, path)?
                .iter()
                .map(|s| s.unwrap_or_default().to_string())
                .collect(),
        ),
    })
}

fn writer_properties(compression: CompressionType) -> WriterProperties {
    let codec = match compression {
        CompressionType::Snappy => Compression::SNAPPY,
        CompressionType::Gzip => Compression::GZIP(GzipLevel::default()),
        CompressionType::None => Compression::UNCOMPRESSED,
    };
    WriterProperties::builder().set_compression(codec).build()
}

/// Encode `values` next to `path` without replacing it; returns the
/// temporary file to rename into place.
fn stage_single_column(
    path: &Path,
    field: &str,
    values: ArrayRef,
    compression: CompressionType,
) -> ArrayResult<PathBuf> {
    let schema = Arc::new(Schema::new(vec![Field::new(
        field,
        values.data_type().clone(),
        false,
    )]));
    let batch = RecordBatch::try_new(schema.clone(), vec![values])?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("parquet.tmp");
    let file = File::create(&tmp)?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(writer_properties(compression)))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(tmp)
}

fn write_single_column(
    path: &Path,
    field: &str,
    values: ArrayRef,
    compression: CompressionType,
) -> ArrayResult<()> {
    let tmp = stage_single_column(path, field, values, compression)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_single_column(path: &Path) -> ArrayResult<Vec<ArrayRef>> {
    let file = File::open(path).map_err(|e| {
        ArrayError::StorageUnavailable(format!("Failed to open {}: {e}", path.display()))
    })?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut arrays = Vec::new();
    for batch in reader {
        let batch = batch?;
        if batch.num_columns() != 1 {
            return Err(ArrayError::StorageUnavailable(format!(
                "{} has {} columns, expected 1",
                path.display(),
                batch.num_columns()
            )));
        }
        arrays.push(batch.column(0).clone());
    }
    Ok(arrays)
}

/// Persist an attribute buffer
pub fn write_column(
    path: &Path,
    column: &ColumnData,
    compression: CompressionType,
) -> ArrayResult<()> {
    debug_assert_eq!(arrow_type(column.kind()), *to_arrow(column).data_type());
    write_single_column(path, VALUES_FIELD, to_arrow(column), compression)
}

/// Encode an attribute buffer beside `path`, leaving the current file in
/// place until the returned temporary is renamed over it.
pub fn stage_column(
    path: &Path,
    column: &ColumnData,
    compression: CompressionType,
) -> ArrayResult<PathBuf> {
    stage_single_column(path, VALUES_FIELD, to_arrow(column), compression)
}

/// Load an attribute buffer of the declared type
pub fn read_column(path: &Path, kind: ScalarType) -> ArrayResult<ColumnData> {
    let mut column = ColumnData::zeros(kind, 0);
    for array in read_single_column(path)? {
        column.append(from_arrow(kind, &array, path)?)?;
    }
    Ok(column)
}

/// Persist a sort permutation
pub fn write_sort_index(
    path: &Path,
    permutation: &[usize],
    compression: CompressionType,
) -> ArrayResult<()> {
    let values: Int64Array = permutation.iter().map(|i| *i as i64).collect();
    write_single_column(path, SORT_INDEX_FIELD, Arc::new(values), compression)
}

/// Load a cached sort permutation, if one has been written
pub fn read_sort_index(path: &Path) -> ArrayResult<Option<Vec<usize>>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut permutation = Vec::new();
    for array in read_single_column(path)? {
        let values = downcast::<Int64Array>(&array, path)?;
        permutation.extend(values.values().iter().map(|i| *i as usize));
    }
    Ok(Some(permutation))
}
