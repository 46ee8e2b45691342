//! A single N-dimensional, multi-attribute array.
//!
//! The handle carries the schema and running statistics; cell values live
//! in the owning [`ArraySet`](crate::arrayset::ArraySet)'s column files.

use crate::error::{ArrayError, ArrayResult};
use crate::hyperslice::{Hyperslice, ResolvedHyperslice};
use crate::statistics::AttributeStatistics;
use crate::storage::ArrayMetadata;
use crate::types::{Attribute, Dimension};

/// Schema and statistics of one member array
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    metadata: ArrayMetadata,
}

impl Array {
    /// Validate a schema and build a fresh handle with empty statistics.
    pub fn new(index: u64, dimensions: Vec<Dimension>, attributes: Vec<Attribute>) -> ArrayResult<Self> {
        if dimensions.is_empty() {
            return Err(ArrayError::SchemaError(format!(
                "Array {index} needs at least one dimension"
            )));
        }
        for dimension in &dimensions {
            dimension.validate()?;
        }
        Ok(Array {
            metadata: ArrayMetadata::new(index, dimensions, attributes),
        })
    }

    /// Rebuild a handle from a stored record, rejecting records whose
    /// statistics do not line up with their attributes.
    pub(crate) fn from_metadata(metadata: ArrayMetadata) -> ArrayResult<Self> {
        if metadata.chunk_cells == 0 {
            return Err(ArrayError::StorageUnavailable(format!(
                "Array {} metadata has a zero chunk size",
                metadata.index
            )));
        }
        if metadata.statistics.len() != metadata.attributes.len() {
            return Err(ArrayError::StorageUnavailable(format!(
                "Array {} metadata lists {} attributes but {} statistics",
                metadata.index,
                metadata.attributes.len(),
                metadata.statistics.len()
            )));
        }
        Ok(Array { metadata })
    }

    pub fn index(&self) -> u64 {
        self.metadata.index
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.metadata.dimensions
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.metadata.attributes
    }

    pub fn ndim(&self) -> usize {
        self.metadata.dimensions.len()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.metadata.dimensions.iter().map(Dimension::extent).collect()
    }

    /// Total number of cells
    pub fn size(&self) -> usize {
        self.shape().iter().product()
    }

    /// Cells per attribute chunk file
    pub fn chunk_cells(&self) -> usize {
        self.metadata.chunk_cells
    }

    pub fn chunk_count(&self) -> usize {
        self.size().div_ceil(self.metadata.chunk_cells)
    }

    /// Cells held by `chunk`; only the last chunk may be short.
    pub fn chunk_len(&self, chunk: usize) -> usize {
        let start = chunk.saturating_mul(self.metadata.chunk_cells);
        self.size().saturating_sub(start).min(self.metadata.chunk_cells)
    }

    pub fn attribute(&self, attribute: usize) -> ArrayResult<&Attribute> {
        self.metadata
            .attributes
            .get(attribute)
            .ok_or(ArrayError::InvalidAttribute {
                array: self.metadata.index,
                attribute,
                count: self.metadata.attributes.len(),
            })
    }

    pub fn statistics(&self, attribute: usize) -> ArrayResult<&AttributeStatistics> {
        self.attribute(attribute)?;
        Ok(&self.metadata.statistics[attribute])
    }

    pub(crate) fn statistics_mut(&mut self, attribute: usize) -> ArrayResult<&mut AttributeStatistics> {
        self.attribute(attribute)?;
        Ok(&mut self.metadata.statistics[attribute])
    }

    pub fn metadata(&self) -> &ArrayMetadata {
        &self.metadata
    }

    pub(crate) fn metadata_mut(&mut self) -> &mut ArrayMetadata {
        &mut self.metadata
    }

    pub fn resolve(&self, hyperslice: &Hyperslice) -> ArrayResult<ResolvedHyperslice> {
        hyperslice.resolve(self.dimensions())
    }

    /// The whole array as one hyperslice
    pub fn full(&self) -> ResolvedHyperslice {
        ResolvedHyperslice::full(self.dimensions())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarType;

    fn sample() -> Array {
        Array::new(
            3,
            vec![Dimension::new("i", 0, 4), Dimension::new("j", 10, 13)],
            vec![
                Attribute::new("a", ScalarType::Int32),
                Attribute::new("b", ScalarType::String),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_shape_and_size() {
        let array = sample();
        assert_eq!(array.index(), 3);
        assert_eq!(array.ndim(), 2);
        assert_eq!(array.shape(), vec![4, 3]);
        assert_eq!(array.size(), 12);
    }

    #[test]
    fn test_chunk_lengths() {
        let mut array = sample();
        array.metadata_mut().chunk_cells = 5;
        assert_eq!(array.chunk_count(), 3);
        let lengths: Vec<usize> = (0..4).map(|c| array.chunk_len(c)).collect();
        assert_eq!(lengths, vec![5, 5, 2, 0]);
    }

    #[test]
    fn test_stored_record_is_validated() {
        let mut record = sample().metadata().clone();
        record.statistics.pop();
        assert!(matches!(
            Array::from_metadata(record),
            Err(ArrayError::StorageUnavailable(_))
        ));

        let mut record = sample().metadata().clone();
        record.chunk_cells = 0;
        assert!(matches!(
            Array::from_metadata(record),
            Err(ArrayError::StorageUnavailable(_))
        ));
    }

    #[test]
    fn test_invalid_attribute() {
        let array = sample();
        assert!(array.attribute(1).is_ok());
        let err = array.statistics(2).unwrap_err();
        assert!(matches!(
            err,
            ArrayError::InvalidAttribute {
                array: 3,
                attribute: 2,
                count: 2
            }
        ));
    }

    #[test]
    fn test_schema_validation() {
        assert!(matches!(
            Array::new(0, Vec::new(), Vec::new()),
            Err(ArrayError::SchemaError(_))
        ));
        assert!(matches!(
            Array::new(0, vec![Dimension::new("i", 5, 1)], Vec::new()),
            Err(ArrayError::SchemaError(_))
        ));
    }

    #[test]
    fn test_new_array_has_empty_statistics() {
        let array = sample();
        assert!(array.statistics(0).unwrap().is_empty());
        assert_eq!(array.full().len(), 12);
    }
}
