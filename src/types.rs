//! # Schema Types
//!
//! Scalar type tags, dimension and attribute descriptors, and byte order.
//!
//! The attribute type set is closed: every storage, statistics, and codec
//! path dispatches on [`ScalarType`] (or on the matching
//! [`ColumnData`](crate::column::ColumnData) variant) with a `match`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ArrayError, ArrayResult};

/// Supported attribute / dimension element types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    #[serde(alias = "float")]
    Float32,
    #[serde(alias = "double")]
    Float64,
    String,
}

impl ScalarType {
    /// Canonical type tag
    pub fn name(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::String => "string",
        }
    }

    /// Element width in bytes for the binary codec; `None` for strings.
    pub fn width(self) -> Option<usize> {
        match self {
            Self::Int8 | Self::UInt8 => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32 | Self::UInt32 | Self::Float32 => Some(4),
            Self::Int64 | Self::UInt64 | Self::Float64 => Some(8),
            Self::String => None,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScalarType {
    type Err = ArrayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int8" => Ok(Self::Int8),
            "int16" => Ok(Self::Int16),
            "int32" => Ok(Self::Int32),
            "int64" => Ok(Self::Int64),
            "uint8" => Ok(Self::UInt8),
            "uint16" => Ok(Self::UInt16),
            "uint32" => Ok(Self::UInt32),
            "uint64" => Ok(Self::UInt64),
            "float32" | "float" => Ok(Self::Float32),
            "float64" | "double" => Ok(Self::Float64),
            "string" => Ok(Self::String),
            _ => Err(ArrayError::SchemaError(format!("Unsupported type: {s}"))),
        }
    }
}

/// A named array dimension covering coordinates `[begin, end)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ScalarType,
    pub begin: i64,
    pub end: i64,
}

impl Dimension {
    /// An `int64` dimension
    pub fn new(name: impl Into<String>, begin: i64, end: i64) -> Self {
        Dimension {
            name: name.into(),
            kind: ScalarType::Int64,
            begin,
            end,
        }
    }

    pub fn extent(&self) -> usize {
        (self.end - self.begin).max(0) as usize
    }

    pub fn validate(&self) -> ArrayResult<()> {
        if self.begin > self.end {
            return Err(ArrayError::SchemaError(format!(
                "Dimension '{}' has begin {} greater than end {}",
                self.name, self.begin, self.end
            )));
        }
        Ok(())
    }
}

/// A named, typed attribute spanning the whole array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ScalarType,
}

impl Attribute {
    pub fn new(name: impl Into<String>, kind: ScalarType) -> Self {
        Attribute {
            name: name.into(),
            kind,
        }
    }
}

/// Parse `{"dimensions": [...], "attributes": [...]}` as sent by a client.
///
/// Unknown type tags are reported as `SchemaError` rather than as a
/// generic deserialization failure.
pub fn schema_from_json(value: &serde_json::Value) -> ArrayResult<(Vec<Dimension>, Vec<Attribute>)> {
    let list = |key: &str| {
        value
            .get(key)
            .and_then(serde_json::Value::as_array)
            .ok_or_else(|| ArrayError::SchemaError(format!("Missing '{key}' list")))
    };
    let text = |item: &serde_json::Value, key: &str| -> ArrayResult<String> {
        item.get(key)
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ArrayError::SchemaError(format!("Missing string field '{key}'")))
    };
    let int = |item: &serde_json::Value, key: &str| -> ArrayResult<i64> {
        item.get(key)
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| ArrayError::SchemaError(format!("Missing integer field '{key}'")))
    };

    let mut dimensions = Vec::new();
    for item in list("dimensions")? {
        let kind = match item.get("type") {
            Some(_) => text(item, "type")?.parse()?,
            None => ScalarType::Int64,
        };
        dimensions.push(Dimension {
            name: text(item, "name")?,
            kind,
            begin: int(item, "begin").unwrap_or(0),
            end: int(item, "end")?,
        });
    }

    let mut attributes = Vec::new();
    for item in list("attributes")? {
        attributes.push(Attribute {
            name: text(item, "name")?,
            kind: text(item, "type")?.parse()?,
        });
    }

    Ok((dimensions, attributes))
}

/// Byte order requested for binary transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Host byte order
    pub fn native() -> Self {
        if cfg!(target_endian = "little") {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        }
    }

    pub fn is_native(self) -> bool {
        self == Self::native()
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteOrder::Little => f.write_str("little"),
            ByteOrder::Big => f.write_str("big"),
        }
    }
}

impl FromStr for ByteOrder {
    type Err = ArrayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "little" => Ok(ByteOrder::Little),
            "big" => Ok(ByteOrder::Big),
            _ => Err(ArrayError::malformed(
                "byteorder",
                format!("got '{s}'"),
                "Optional byteorder argument must be 'little' or 'big'.",
            )),
        }
    }
}
