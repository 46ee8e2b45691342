//! Dense typed attribute buffers.
//!
//! One [`ColumnData`] holds the flat row-major contents of an attribute
//! (or of a hyperslice fetched from it). Variants mirror [`ScalarType`].

use crate::error::{ArrayError, ArrayResult};
use crate::types::ScalarType;

/// A flat buffer of one scalar type
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    String(Vec<String>),
}

/// Run `$body` with `$v` bound to the inner `Vec` of any variant.
#[macro_export]
macro_rules! with_column {
    ($column:expr, $v:ident => $body:expr) => {
        match $column {
            $crate::column::ColumnData::Int8($v) => $body,
            $crate::column::ColumnData::Int16($v) => $body,
            $crate::column::ColumnData::Int32($v) => $body,
            $crate::column::ColumnData::Int64($v) => $body,
            $crate::column::ColumnData::UInt8($v) => $body,
            $crate::column::ColumnData::UInt16($v) => $body,
            $crate::column::ColumnData::UInt32($v) => $body,
            $crate::column::ColumnData::UInt64($v) => $body,
            $crate::column::ColumnData::Float32($v) => $body,
            $crate::column::ColumnData::Float64($v) => $body,
            $crate::column::ColumnData::String($v) => $body,
        }
    };
}

/// Like `with_column!`, but rewraps the result in the same variant.
macro_rules! map_column {
    ($column:expr, $v:ident => $body:expr) => {
        match $column {
            ColumnData::Int8($v) => ColumnData::Int8($body),
            ColumnData::Int16($v) => ColumnData::Int16($body),
            ColumnData::Int32($v) => ColumnData::Int32($body),
            ColumnData::Int64($v) => ColumnData::Int64($body),
            ColumnData::UInt8($v) => ColumnData::UInt8($body),
            ColumnData::UInt16($v) => ColumnData::UInt16($body),
            ColumnData::UInt32($v) => ColumnData::UInt32($body),
            ColumnData::UInt64($v) => ColumnData::UInt64($body),
            ColumnData::Float32($v) => ColumnData::Float32($body),
            ColumnData::Float64($v) => ColumnData::Float64($body),
            ColumnData::String($v) => ColumnData::String($body),
        }
    };
}

impl ColumnData {
    /// Zero-valued buffer (empty strings for string attributes)
    pub fn zeros(kind: ScalarType, len: usize) -> Self {
        match kind {
            ScalarType::Int8 => ColumnData::Int8(vec![0; len]),
            ScalarType::Int16 => ColumnData::Int16(vec![0; len]),
            ScalarType::Int32 => ColumnData::Int32(vec![0; len]),
            ScalarType::Int64 => ColumnData::Int64(vec![0; len]),
            ScalarType::UInt8 => ColumnData::UInt8(vec![0; len]),
            ScalarType::UInt16 => ColumnData::UInt16(vec![0; len]),
            ScalarType::UInt32 => ColumnData::UInt32(vec![0; len]),
            ScalarType::UInt64 => ColumnData::UInt64(vec![0; len]),
            ScalarType::Float32 => ColumnData::Float32(vec![0.0; len]),
            ScalarType::Float64 => ColumnData::Float64(vec![0.0; len]),
            ScalarType::String => ColumnData::String(vec![String::new(); len]),
        }
    }

    pub fn kind(&self) -> ScalarType {
        match self {
            ColumnData::Int8(_) => ScalarType::Int8,
            ColumnData::Int16(_) => ScalarType::Int16,
            ColumnData::Int32(_) => ScalarType::Int32,
            ColumnData::Int64(_) => ScalarType::Int64,
            ColumnData::UInt8(_) => ScalarType::UInt8,
            ColumnData::UInt16(_) => ScalarType::UInt16,
            ColumnData::UInt32(_) => ScalarType::UInt32,
            ColumnData::UInt64(_) => ScalarType::UInt64,
            ColumnData::Float32(_) => ScalarType::Float32,
            ColumnData::Float64(_) => ScalarType::Float64,
            ColumnData::String(_) => ScalarType::String,
        }
    }

    pub fn len(&self) -> usize {
        with_column!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out the cells at `offsets`, in that order.
    pub fn gather(&self, offsets: &[usize]) -> ArrayResult<ColumnData> {
        let len = self.len();
        if let Some(bad) = offsets.iter().find(|o| **o >= len) {
            return Err(ArrayError::OutOfRange(format!(
                "offset {bad} outside buffer of {len} cells"
            )));
        }
        Ok(map_column!(self, v => offsets.iter().map(|o| v[*o].clone()).collect()))
    }

    /// Overwrite the cells at `offsets` with `values`, element by element.
    pub fn scatter(&mut self, offsets: &[usize], values: &ColumnData) -> ArrayResult<()> {
        if offsets.len() != values.len() {
            return Err(ArrayError::ShapeMismatch {
                expected: vec![offsets.len()],
                actual: vec![values.len()],
            });
        }
        let len = self.len();
        if let Some(bad) = offsets.iter().find(|o| **o >= len) {
            return Err(ArrayError::OutOfRange(format!(
                "offset {bad} outside buffer of {len} cells"
            )));
        }

        macro_rules! put {
            ($dst:expr, $src:expr) => {{
                for (o, value) in offsets.iter().zip($src) {
                    $dst[*o] = value.clone();
                }
                Ok(())
            }};
        }

        match (self, values) {
            (ColumnData::Int8(d), ColumnData::Int8(s)) => put!(d, s),
            (ColumnData::Int16(d), ColumnData::Int16(s)) => put!(d, s),
            (ColumnData::Int32(d), ColumnData::Int32(s)) => put!(d, s),
            (ColumnData::Int64(d), ColumnData::Int64(s)) => put!(d, s),
            (ColumnData::UInt8(d), ColumnData::UInt8(s)) => put!(d, s),
            (ColumnData::UInt16(d), ColumnData::UInt16(s)) => put!(d, s),
            (ColumnData::UInt32(d), ColumnData::UInt32(s)) => put!(d, s),
            (ColumnData::UInt64(d), ColumnData::UInt64(s)) => put!(d, s),
            (ColumnData::Float32(d), ColumnData::Float32(s)) => put!(d, s),
            (ColumnData::Float64(d), ColumnData::Float64(s)) => put!(d, s),
            (ColumnData::String(d), ColumnData::String(s)) => put!(d, s),
            (d, s) => Err(ArrayError::SchemaError(format!(
                "cannot store {} values in a {} attribute",
                s.kind(),
                d.kind()
            ))),
        }
    }

    /// Append another buffer of the same type.
    pub fn append(&mut self, other: ColumnData) -> ArrayResult<()> {
        match (self, other) {
            (ColumnData::Int8(d), ColumnData::Int8(s)) => d.extend(s),
            (ColumnData::Int16(d), ColumnData::Int16(s)) => d.extend(s),
            (ColumnData::Int32(d), ColumnData::Int32(s)) => d.extend(s),
            (ColumnData::Int64(d), ColumnData::Int64(s)) => d.extend(s),
            (ColumnData::UInt8(d), ColumnData::UInt8(s)) => d.extend(s),
            (ColumnData::UInt16(d), ColumnData::UInt16(s)) => d.extend(s),
            (ColumnData::UInt32(d), ColumnData::UInt32(s)) => d.extend(s),
            (ColumnData::UInt64(d), ColumnData::UInt64(s)) => d.extend(s),
            (ColumnData::Float32(d), ColumnData::Float32(s)) => d.extend(s),
            (ColumnData::Float64(d), ColumnData::Float64(s)) => d.extend(s),
            (ColumnData::String(d), ColumnData::String(s)) => d.extend(s),
            (d, s) => {
                return Err(ArrayError::SchemaError(format!(
                    "cannot append {} values to a {} buffer",
                    s.kind(),
                    d.kind()
                )))
            }
        }
        Ok(())
    }

    pub fn as_f64_slice(&self) -> Option<&[f64]> {
        match self {
            ColumnData::Float64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            ColumnData::String(v) => Some(v),
            _ => None,
        }
    }
}

macro_rules! impl_from_vec {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$t>> for ColumnData {
                fn from(v: Vec<$t>) -> Self {
                    ColumnData::$variant(v)
                }
            }
        )*
    };
}

impl_from_vec!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    String => String,
);

impl From<Vec<&str>> for ColumnData {
    fn from(v: Vec<&str>) -> Self {
        ColumnData::String(v.into_iter().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let col = ColumnData::zeros(ScalarType::UInt16, 3);
        assert_eq!(col, ColumnData::UInt16(vec![0, 0, 0]));
        let col = ColumnData::zeros(ScalarType::String, 2);
        assert_eq!(col.as_strings().unwrap(), &["", ""]);
        assert_eq!(col.kind(), ScalarType::String);
    }

    #[test]
    fn test_gather_preserves_requested_order() {
        let col = ColumnData::from(vec![10i32, 11, 12, 13]);
        let out = col.gather(&[3, 0, 2]).unwrap();
        assert_eq!(out, ColumnData::Int32(vec![13, 10, 12]));
        assert!(col.gather(&[4]).is_err());
    }

    #[test]
    fn test_scatter_writes_cells() {
        let mut col = ColumnData::zeros(ScalarType::Float64, 4);
        col.scatter(&[1, 3], &ColumnData::from(vec![1.5, f64::NAN]))
            .unwrap();
        let values = col.as_f64_slice().unwrap();
        assert_eq!(values[1], 1.5);
        assert!(values[3].is_nan());
        assert_eq!(values[0], 0.0);
    }

    #[test]
    fn test_scatter_type_mismatch() {
        let mut col = ColumnData::zeros(ScalarType::Int64, 2);
        let err = col
            .scatter(&[0], &ColumnData::from(vec!["a"]))
            .unwrap_err();
        assert!(matches!(err, ArrayError::SchemaError(_)));
    }

    #[test]
    fn test_scatter_length_mismatch() {
        let mut col = ColumnData::zeros(ScalarType::Int64, 2);
        let err = col.scatter(&[0, 1], &ColumnData::from(vec![1i64])).unwrap_err();
        assert!(matches!(err, ArrayError::ShapeMismatch { .. }));
    }
}
