//! Running per-attribute statistics.
//!
//! Every write folds the written payload's min/max into the attribute's
//! running record, so the record always covers all data written so far
//! without re-reading storage. NaN is excluded for floating attributes;
//! strings compare lexicographically.
//!
//! # Example
//!
//! ```
//! use hyperstore::column::ColumnData;
//! use hyperstore::statistics::{AttributeStatistics, Scalar};
//!
//! let mut stats = AttributeStatistics::default();
//! stats.fold(&ColumnData::from(vec![1.0, f64::NAN, 3.0]));
//! stats.fold(&ColumnData::from(vec![0.5]));
//! assert_eq!(stats.min, Some(Scalar::Float(0.5)));
//! assert_eq!(stats.max, Some(Scalar::Float(3.0)));
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::column::ColumnData;

/// A single statistics value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Scalar::String(a), Scalar::String(b)) => Some(a.cmp(b)),
            (Scalar::String(_), _) | (_, Scalar::String(_)) => None,
            (Scalar::Int(a), Scalar::Int(b)) => Some(a.cmp(b)),
            (Scalar::UInt(a), Scalar::UInt(b)) => Some(a.cmp(b)),
            (Scalar::Int(a), Scalar::UInt(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Scalar::UInt(a), Scalar::Int(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::UInt(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            Scalar::String(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Scalar::Int(v) => serde_json::Value::from(*v),
            Scalar::UInt(v) => serde_json::Value::from(*v),
            Scalar::Float(v) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Scalar::String(v) => serde_json::Value::String(v.clone()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::UInt(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::String(v) => write!(f, "{v}"),
        }
    }
}

/// Running `{min, max}` of one attribute. Both are `None` until a
/// non-missing value has been written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeStatistics {
    pub min: Option<Scalar>,
    pub max: Option<Scalar>,
}

impl AttributeStatistics {
    /// Fold a written payload into the running record.
    ///
    /// Returns `true` if min or max changed. A payload without any
    /// non-missing value leaves the record untouched.
    pub fn fold(&mut self, data: &ColumnData) -> bool {
        let Some((data_min, data_max)) = payload_min_max(data) else {
            return false;
        };

        let mut changed = false;
        if self
            .min
            .as_ref()
            .map_or(true, |old| data_min.partial_cmp(old) == Some(Ordering::Less))
        {
            self.min = Some(data_min);
            changed = true;
        }
        if self
            .max
            .as_ref()
            .map_or(true, |old| data_max.partial_cmp(old) == Some(Ordering::Greater))
        {
            self.max = Some(data_max);
            changed = true;
        }
        changed
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// Min and max of a payload, excluding NaN. `None` if nothing remains.
pub fn payload_min_max(data: &ColumnData) -> Option<(Scalar, Scalar)> {
    fn ints<T: Copy + Ord>(v: &[T], wrap: impl Fn(T) -> Scalar) -> Option<(Scalar, Scalar)> {
        let min = v.iter().min()?;
        let max = v.iter().max()?;
        Some((wrap(*min), wrap(*max)))
    }

    fn floats(v: impl Iterator<Item = f64>) -> Option<(Scalar, Scalar)> {
        let (min, max) = v.filter(|x| !x.is_nan()).fold(None, |acc, x| match acc {
            None => Some((x, x)),
            Some((lo, hi)) => Some((f64::min(lo, x), f64::max(hi, x))),
        })?;
        Some((Scalar::Float(min), Scalar::Float(max)))
    }

    match data {
        ColumnData::Int8(v) => ints(v, |x| Scalar::Int(x.into())),
        ColumnData::Int16(v) => ints(v, |x| Scalar::Int(x.into())),
        ColumnData::Int32(v) => ints(v, |x| Scalar::Int(x.into())),
        ColumnData::Int64(v) => ints(v, Scalar::Int),
        ColumnData::UInt8(v) => ints(v, |x| Scalar::UInt(x.into())),
        ColumnData::UInt16(v) => ints(v, |x| Scalar::UInt(x.into())),
        ColumnData::UInt32(v) => ints(v, |x| Scalar::UInt(x.into())),
        ColumnData::UInt64(v) => ints(v, Scalar::UInt),
        ColumnData::Float32(v) => floats(v.iter().map(|x| f64::from(*x))),
        ColumnData::Float64(v) => floats(v.iter().copied()),
        ColumnData::String(v) => {
            let min = v.iter().min()?;
            let max = v.iter().max()?;
            Some((Scalar::String(min.clone()), Scalar::String(max.clone())))
        }
    }
}
