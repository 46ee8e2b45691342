//! Array Store Error Types

use std::io;
use thiserror::Error;

/// Array store errors
#[derive(Error, Debug)]
pub enum ArrayError {
    /// Bad hyperslice / rows / columns / sort / byte-order grammar
    #[error("Malformed {argument} argument ({detail}). {expected}")]
    MalformedQuery {
        argument: String,
        detail: String,
        expected: String,
    },

    /// Attribute index outside the array's attribute list
    #[error("Attribute {attribute} out-of-range for array {array} ({count} attributes)")]
    InvalidAttribute {
        array: u64,
        attribute: usize,
        count: usize,
    },

    /// Index outside the current schema or extent
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Payload shape differs from the resolved hyperslice shape
    #[error("Shape mismatch: hyperslice has shape {expected:?}, payload has shape {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Unknown type tag or invalid dimension/attribute descriptor
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Array-set, array, or attribute does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backing store could not be opened or locked
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ArrayError {
    pub fn malformed(
        argument: impl Into<String>,
        detail: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        ArrayError::MalformedQuery {
            argument: argument.into(),
            detail: detail.into(),
            expected: expected.into(),
        }
    }

    /// True for errors caused by the caller's input; never worth retrying.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ArrayError::MalformedQuery { .. }
                | ArrayError::InvalidAttribute { .. }
                | ArrayError::OutOfRange(_)
                | ArrayError::ShapeMismatch { .. }
                | ArrayError::SchemaError(_)
                | ArrayError::NotFound(_)
        )
    }

    /// HTTP-equivalent status for the boundary layer.
    pub fn status_code(&self) -> u16 {
        match self {
            ArrayError::NotFound(_) => 404,
            ArrayError::StorageUnavailable(_) => 503,
            e if e.is_client_error() => 400,
            _ => 500,
        }
    }
}

/// Result type for array store operations
pub type ArrayResult<T> = Result<T, ArrayError>;
