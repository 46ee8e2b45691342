//! # Binary Transfer Codec
//!
//! Moves fetched slices across the boundary:
//!
//! - **JSON**: nested arrays of native JSON scalars, NaN rendered as `null`.
//! - **Binary**: flat row-major buffer in the requested byte order. Raw
//!   bits pass through untouched, NaN included.
//! - **Streaming**: [`HyperchunkStream`] yields one binary buffer per
//!   resolved hyperslice, fetching each only when it is pulled.

use serde_json::Value;
use std::collections::VecDeque;

use crate::column::ColumnData;
use crate::error::{ArrayError, ArrayResult};
use crate::hyperslice::ResolvedHyperslice;
use crate::store::OpenArraySet;
use crate::types::{ByteOrder, ScalarType};

const DATA_GRAMMAR: &str =
    "Payloads must be rectangular nested arrays (JSON) or packed arrays of the attribute's type (binary).";

macro_rules! encode_numbers {
    ($values:expr, $order:expr) => {{
        let values = $values;
        let mut out = Vec::with_capacity(std::mem::size_of_val(&values[..]));
        match $order {
            ByteOrder::Little => values.iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
            ByteOrder::Big => values.iter().for_each(|v| out.extend_from_slice(&v.to_be_bytes())),
        }
        out
    }};
}

/// Serialize `column` into a packed buffer in `order`.
///
/// Strings have no fixed-width representation and are rejected.
pub fn encode_binary(column: &ColumnData, order: ByteOrder) -> ArrayResult<Vec<u8>> {
    Ok(match column {
        ColumnData::Int8(v) => encode_numbers!(v, order),
        ColumnData::Int16(v) => encode_numbers!(v, order),
        ColumnData::Int32(v) => encode_numbers!(v, order),
        ColumnData::Int64(v) => encode_numbers!(v, order),
        ColumnData::UInt8(v) => v.clone(),
        ColumnData::UInt16(v) => encode_numbers!(v, order),
        ColumnData::UInt32(v) => encode_numbers!(v, order),
        ColumnData::UInt64(v) => encode_numbers!(v, order),
        ColumnData::Float32(v) => encode_numbers!(v, order),
        ColumnData::Float64(v) => encode_numbers!(v, order),
        ColumnData::String(_) => {
            return Err(ArrayError::malformed(
                "byteorder",
                "string attributes have no binary form",
                "Omit byteorder to receive string data as JSON.",
            ))
        }
    })
}

macro_rules! decode_numbers {
    ($t:ty, $bytes:expr, $order:expr) => {{
        const WIDTH: usize = std::mem::size_of::<$t>();
        $bytes
            .chunks_exact(WIDTH)
            .map(|chunk| {
                let mut raw = [0u8; WIDTH];
                raw.copy_from_slice(chunk);
                match $order {
                    ByteOrder::Little => <$t>::from_le_bytes(raw),
                    ByteOrder::Big => <$t>::from_be_bytes(raw),
                }
            })
            .collect::<Vec<$t>>()
            .into()
    }};
}

/// Parse a packed buffer of `kind` values written in `order`.
pub fn decode_binary(kind: ScalarType, bytes: &[u8], order: ByteOrder) -> ArrayResult<ColumnData> {
    let width = kind.width().unwrap_or(1);
    if bytes.len() % width != 0 {
        return Err(ArrayError::malformed(
            "data",
            format!("{} bytes is not a whole number of {kind} values", bytes.len()),
            DATA_GRAMMAR,
        ));
    }

    Ok(match kind {
        ScalarType::Int8 => decode_numbers!(i8, bytes, order),
        ScalarType::Int16 => decode_numbers!(i16, bytes, order),
        ScalarType::Int32 => decode_numbers!(i32, bytes, order),
        ScalarType::Int64 => decode_numbers!(i64, bytes, order),
        ScalarType::UInt8 => ColumnData::UInt8(bytes.to_vec()),
        ScalarType::UInt16 => decode_numbers!(u16, bytes, order),
        ScalarType::UInt32 => decode_numbers!(u32, bytes, order),
        ScalarType::UInt64 => decode_numbers!(u64, bytes, order),
        ScalarType::Float32 => decode_numbers!(f32, bytes, order),
        ScalarType::Float64 => decode_numbers!(f64, bytes, order),
        ScalarType::String => {
            return Err(ArrayError::malformed(
                "data",
                "string attributes cannot be written as binary",
                DATA_GRAMMAR,
            ))
        }
    })
}

fn float_value(v: f64) -> Value {
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

/// Flat JSON scalars for `column`; NaN becomes `null`.
pub fn json_values(column: &ColumnData) -> Vec<Value> {
    match column {
        ColumnData::Float32(v) => v.iter().map(|x| float_value(f64::from(*x))).collect(),
        ColumnData::Float64(v) => v.iter().map(|x| float_value(*x)).collect(),
        ColumnData::String(v) => v.iter().map(|s| Value::String(s.clone())).collect(),
        ColumnData::Int8(v) => v.iter().map(|x| Value::from(*x)).collect(),
        ColumnData::Int16(v) => v.iter().map(|x| Value::from(*x)).collect(),
        ColumnData::Int32(v) => v.iter().map(|x| Value::from(*x)).collect(),
        ColumnData::Int64(v) => v.iter().map(|x| Value::from(*x)).collect(),
        ColumnData::UInt8(v) => v.iter().map(|x| Value::from(*x)).collect(),
        ColumnData::UInt16(v) => v.iter().map(|x| Value::from(*x)).collect(),
        ColumnData::UInt32(v) => v.iter().map(|x| Value::from(*x)).collect(),
        ColumnData::UInt64(v) => v.iter().map(|x| Value::from(*x)).collect(),
    }
}

/// Nest `column` into arrays of `shape`. An empty shape yields one scalar.
pub fn to_json(column: &ColumnData, shape: &[usize]) -> Value {
    fn nest(values: &mut impl Iterator<Item = Value>, shape: &[usize]) -> Value {
        match shape.split_first() {
            None => values.next().unwrap_or(Value::Null),
            Some((len, rest)) => Value::Array((0..*len).map(|_| nest(values, rest)).collect()),
        }
    }
    nest(&mut json_values(column).into_iter(), shape)
}

/// Parse a nested JSON payload for a `kind` attribute.
///
/// Returns the flat row-major cells and the payload's shape. For float
/// attributes `null` stands for NaN.
pub fn from_json(kind: ScalarType, value: &Value) -> ArrayResult<(ColumnData, Vec<usize>)> {
    let mut shape = Vec::new();
    let mut cursor = value;
    while let Value::Array(items) = cursor {
        shape.push(items.len());
        match items.first() {
            Some(first) => cursor = first,
            None => break,
        }
    }

    fn flatten<'a>(value: &'a Value, shape: &[usize], out: &mut Vec<&'a Value>) -> bool {
        match shape.split_first() {
            None => {
                out.push(value);
                !value.is_array()
            }
            Some((len, rest)) => match value {
                Value::Array(items) if items.len() == *len => {
                    items.iter().all(|item| flatten(item, rest, out))
                }
                _ => false,
            },
        }
    }

    let mut cells = Vec::with_capacity(shape.iter().product());
    if !flatten(value, &shape, &mut cells) {
        return Err(ArrayError::malformed("data", "ragged nested arrays", DATA_GRAMMAR));
    }

    let bad = |cell: &Value| {
        ArrayError::SchemaError(format!("{cell} is not a valid {kind} value"))
    };

    fn signed<T: TryFrom<i64>>(cells: &[&Value], bad: impl Fn(&Value) -> ArrayError) -> ArrayResult<Vec<T>> {
        cells
            .iter()
            .map(|c| c.as_i64().and_then(|v| T::try_from(v).ok()).ok_or_else(|| bad(*c)))
            .collect()
    }
    fn unsigned<T: TryFrom<u64>>(cells: &[&Value], bad: impl Fn(&Value) -> ArrayError) -> ArrayResult<Vec<T>> {
        cells
            .iter()
            .map(|c| c.as_u64().and_then(|v| T::try_from(v).ok()).ok_or_else(|| bad(*c)))
            .collect()
    }
    fn floats(cells: &[&Value], bad: impl Fn(&Value) -> ArrayError) -> ArrayResult<Vec<f64>> {
        cells
            .iter()
            .map(|c| match c {
                Value::Null => Ok(f64::NAN),
                _ => c.as_f64().ok_or_else(|| bad(*c)),
            })
            .collect()
    }

    let column = match kind {
        ScalarType::Int8 => ColumnData::Int8(signed(&cells, bad)?),
        ScalarType::Int16 => ColumnData::Int16(signed(&cells, bad)?),
        ScalarType::Int32 => ColumnData::Int32(signed(&cells, bad)?),
        ScalarType::Int64 => ColumnData::Int64(signed(&cells, bad)?),
        ScalarType::UInt8 => ColumnData::UInt8(unsigned(&cells, bad)?),
        ScalarType::UInt16 => ColumnData::UInt16(unsigned(&cells, bad)?),
        ScalarType::UInt32 => ColumnData::UInt32(unsigned(&cells, bad)?),
        ScalarType::UInt64 => ColumnData::UInt64(unsigned(&cells, bad)?),
        ScalarType::Float32 => {
            ColumnData::Float32(floats(&cells, bad)?.into_iter().map(|v| v as f32).collect())
        }
        ScalarType::Float64 => ColumnData::Float64(floats(&cells, bad)?),
        ScalarType::String => ColumnData::String(
            cells
                .iter()
                .map(|c| c.as_str().map(str::to_string).ok_or_else(|| bad(*c)))
                .collect::<ArrayResult<_>>()?,
        ),
    };
    Ok((column, shape))
}

/// Lazily fetched binary hyperslices.
///
/// Owns the open store, so the store lock is held until the stream is
/// exhausted or dropped.
pub struct HyperchunkStream {
    set: OpenArraySet,
    pending: VecDeque<(u64, usize, ResolvedHyperslice)>,
    order: ByteOrder,
}

impl HyperchunkStream {
    pub(crate) fn new(
        set: OpenArraySet,
        pending: Vec<(u64, usize, ResolvedHyperslice)>,
        order: ByteOrder,
    ) -> Self {
        HyperchunkStream {
            set,
            pending: pending.into(),
            order,
        }
    }

    /// Hyperslices not yet emitted
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl Iterator for HyperchunkStream {
    type Item = ArrayResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let (array, attribute, hyperslice) = self.pending.pop_front()?;
        let result = self
            .set
            .get_data(array, attribute, &hyperslice)
            .and_then(|data| encode_binary(&data, self.order));
        if result.is_err() {
            self.pending.clear();
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.pending.len(), Some(self.pending.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_byte_order_swaps_each_element() {
        let column = ColumnData::from(vec![1u16, 0x0203]);
        assert_eq!(encode_binary(&column, ByteOrder::Little).unwrap(), vec![1, 0, 3, 2]);
        assert_eq!(encode_binary(&column, ByteOrder::Big).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_native_order_matches_raw_dump() {
        let values = vec![1.5f64, -2.25, f64::NAN];
        let raw: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        let column = ColumnData::from(values);
        let native = encode_binary(&column, ByteOrder::native()).unwrap();
        assert_eq!(native, raw);

        let other = match ByteOrder::native() {
            ByteOrder::Little => ByteOrder::Big,
            ByteOrder::Big => ByteOrder::Little,
        };
        let swapped = encode_binary(&column, other).unwrap();
        assert_eq!(swapped.len(), native.len());
        assert_ne!(swapped, native);
    }

    #[test]
    fn test_decode_binary() {
        let bytes = encode_binary(&ColumnData::from(vec![-7i32, 9]), ByteOrder::Big).unwrap();
        let back = decode_binary(ScalarType::Int32, &bytes, ByteOrder::Big).unwrap();
        assert_eq!(back, ColumnData::Int32(vec![-7, 9]));

        let err = decode_binary(ScalarType::Int32, &bytes[..5], ByteOrder::Big).unwrap_err();
        assert!(matches!(err, ArrayError::MalformedQuery { .. }));
    }

    #[test]
    fn test_strings_rejected_on_binary_path() {
        let column = ColumnData::from(vec!["a"]);
        assert!(encode_binary(&column, ByteOrder::Little).is_err());
        assert!(decode_binary(ScalarType::String, b"a", ByteOrder::Little).is_err());
    }

    #[test]
    fn test_to_json_nests_and_masks_nan() {
        let column = ColumnData::from(vec![0.5, f64::NAN, 2.0, 3.0]);
        assert_eq!(to_json(&column, &[2, 2]), json!([[0.5, null], [2.0, 3.0]]));
        assert_eq!(to_json(&column, &[]), json!(0.5));
    }

    #[test]
    fn test_from_json_shapes() {
        let (column, shape) = from_json(ScalarType::Int16, &json!([[1, 2, 3], [4, 5, 6]])).unwrap();
        assert_eq!(shape, vec![2, 3]);
        assert_eq!(column, ColumnData::Int16(vec![1, 2, 3, 4, 5, 6]));

        let (column, shape) = from_json(ScalarType::Float64, &json!([1.0, null])).unwrap();
        assert_eq!(shape, vec![2]);
        assert!(column.as_f64_slice().unwrap()[1].is_nan());

        let (column, shape) = from_json(ScalarType::String, &json!("solo")).unwrap();
        assert!(shape.is_empty());
        assert_eq!(column.as_strings().unwrap(), &["solo"]);
    }

    #[test]
    fn test_from_json_rejects_bad_payloads() {
        assert!(matches!(
            from_json(ScalarType::Int32, &json!([[1, 2], [3]])),
            Err(ArrayError::MalformedQuery { .. })
        ));
        assert!(matches!(
            from_json(ScalarType::UInt8, &json!([1, 300])),
            Err(ArrayError::SchemaError(_))
        ));
        assert!(matches!(
            from_json(ScalarType::Int64, &json!([1, null])),
            Err(ArrayError::SchemaError(_))
        ));
    }
}
