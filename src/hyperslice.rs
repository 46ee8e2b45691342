//! # Hyperslice Grammar & Resolver
//!
//! A hyperslice is a comma-separated list of per-dimension selectors:
//!
//! ```text
//! N        single coordinate (negative counts from the dimension end)
//! A:B      half-open range, either bound optional
//! A:B:S    strided range, S non-zero (negative S iterates backwards)
//! ...      every dimension not otherwise covered, taken in full
//! ```
//!
//! Batched requests ("hyperchunks") join `array/attribute/hyperslices`
//! units with `;`, and the hyperslices of one unit with `|`:
//!
//! ```text
//! 0/1/0:10|20:30;2/0/...
//! ```
//!
//! Parsing produces raw [`Selector`]s; [`Hyperslice::resolve`] turns them
//! into clamped [`ResolvedRange`]s against a concrete dimension list.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ArrayError, ArrayResult};
use crate::types::Dimension;

/// Expected grammar for a single hyperslice
pub const HYPERSLICE_GRAMMAR: &str = "Each hyperslice must be a comma-separated sequence of \
dimensions. Dimensions must be integers, colon-delimited slice specifications, or ellipses.";

/// Expected grammar for a hyperchunks list
pub const HYPERCHUNKS_GRAMMAR: &str = "Hyperchunks argument must be a semicolon-separated \
sequence of array-index/attribute-index/hyperslices. Array and attribute indices must be \
non-negative integers. Hyperslices must be a vertical-bar-separated sequence of hyperslice \
specifications. Each hyperslice must be a comma-separated sequence of dimensions. Dimensions \
must be integers, colon-delimited slice specifications, or ellipses.";

/// Expected grammar for the legacy ranges argument
pub const RANGES_GRAMMAR: &str =
    "Ranges argument must be a comma separated collection of half-open index ranges.";

/// One raw per-dimension selector, as written by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selector {
    Index(i64),
    Range {
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    },
    Rest,
}

impl Selector {
    /// `:`, the whole dimension
    pub fn full() -> Self {
        Selector::Range {
            start: None,
            stop: None,
            step: None,
        }
    }

    fn parse(token: &str) -> ArrayResult<Self> {
        let token = token.trim();
        let bad = |detail: String| ArrayError::malformed("hyperslice", detail, HYPERSLICE_GRAMMAR);

        if token == "..." {
            return Ok(Selector::Rest);
        }
        if token.is_empty() {
            return Err(bad("empty dimension".to_string()));
        }

        if !token.contains(':') {
            return token
                .parse()
                .map(Selector::Index)
                .map_err(|_| bad(format!("invalid index '{token}'")));
        }

        let parts: Vec<&str> = token.split(':').collect();
        if parts.len() > 3 {
            return Err(bad(format!("too many colons in '{token}'")));
        }
        let bound = |part: &str| -> ArrayResult<Option<i64>> {
            let part = part.trim();
            if part.is_empty() {
                Ok(None)
            } else {
                part.parse()
                    .map(Some)
                    .map_err(|_| bad(format!("invalid bound '{part}' in '{token}'")))
            }
        };

        let start = bound(parts[0])?;
        let stop = bound(parts[1])?;
        let step = match parts.get(2) {
            Some(part) => bound(part)?,
            None => None,
        };
        if step == Some(0) {
            return Err(bad(format!("zero stride in '{token}'")));
        }

        Ok(Selector::Range { start, stop, step })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt = |v: &Option<i64>| v.map(|v| v.to_string()).unwrap_or_default();
        match self {
            Selector::Index(i) => write!(f, "{i}"),
            Selector::Rest => f.write_str("..."),
            Selector::Range {
                start,
                stop,
                step: None,
            } => write!(f, "{}:{}", opt(start), opt(stop)),
            Selector::Range { start, stop, step } => {
                write!(f, "{}:{}:{}", opt(start), opt(stop), opt(step))
            }
        }
    }
}

/// A parsed, unresolved hyperslice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hyperslice(Vec<Selector>);

impl Hyperslice {
    pub fn new(selectors: Vec<Selector>) -> Self {
        Hyperslice(selectors)
    }

    /// Select every cell of an array of any dimensionality
    pub fn all() -> Self {
        Hyperslice(vec![Selector::Rest])
    }

    pub fn selectors(&self) -> &[Selector] {
        &self.0
    }

    pub fn parse(text: &str) -> ArrayResult<Self> {
        let selectors = text
            .split(',')
            .map(Selector::parse)
            .collect::<ArrayResult<Vec<_>>>()?;

        let rests = selectors.iter().filter(|s| **s == Selector::Rest).count();
        if rests > 1 {
            return Err(ArrayError::malformed(
                "hyperslice",
                format!("more than one ellipsis in '{text}'"),
                HYPERSLICE_GRAMMAR,
            ));
        }

        Ok(Hyperslice(selectors))
    }

    /// Expand `...`, check dimensionality, and clamp every bound.
    pub fn resolve(&self, dimensions: &[Dimension]) -> ArrayResult<ResolvedHyperslice> {
        let ndim = dimensions.len();
        let explicit = self.0.iter().filter(|s| **s != Selector::Rest).count();
        let has_rest = explicit != self.0.len();

        if explicit > ndim || (!has_rest && explicit != ndim) {
            return Err(ArrayError::malformed(
                "hyperslice",
                format!("'{self}' selects {explicit} dimensions, array has {ndim}"),
                HYPERSLICE_GRAMMAR,
            ));
        }

        let mut expanded = Vec::with_capacity(ndim);
        for selector in &self.0 {
            if *selector == Selector::Rest {
                expanded.extend(std::iter::repeat(Selector::full()).take(ndim - explicit));
            } else {
                expanded.push(*selector);
            }
        }

        let ranges = expanded
            .iter()
            .zip(dimensions)
            .map(|(selector, dimension)| ResolvedRange::resolve(selector, dimension))
            .collect::<ArrayResult<Vec<_>>>()?;

        Ok(ResolvedHyperslice::new(ranges, dimensions))
    }
}

impl FromStr for Hyperslice {
    type Err = ArrayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hyperslice::parse(s)
    }
}

impl fmt::Display for Hyperslice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, selector) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{selector}")?;
        }
        Ok(())
    }
}

/// A concrete `(begin, end, stride)` triple in dimension coordinates.
///
/// Iteration visits `begin, begin + stride, ...` while strictly before
/// `end` in the direction of `stride`. `squeeze` marks ranges produced by
/// a single-index selector; they do not contribute to the output shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRange {
    pub begin: i64,
    pub end: i64,
    pub stride: i64,
    #[serde(default)]
    pub squeeze: bool,
}

impl ResolvedRange {
    pub fn new(begin: i64, end: i64, stride: i64) -> Self {
        ResolvedRange {
            begin,
            end,
            stride,
            squeeze: false,
        }
    }

    fn resolve(selector: &Selector, dimension: &Dimension) -> ArrayResult<Self> {
        let (lo, hi) = (dimension.begin, dimension.end);
        let normalize = |v: i64| if v < 0 { hi.saturating_add(v) } else { v };

        match *selector {
            Selector::Index(i) => {
                let coordinate = normalize(i);
                if coordinate < lo || coordinate >= hi {
                    return Err(ArrayError::OutOfRange(format!(
                        "index {i} outside dimension '{}' [{lo}, {hi})",
                        dimension.name
                    )));
                }
                Ok(ResolvedRange {
                    begin: coordinate,
                    end: coordinate + 1,
                    stride: 1,
                    squeeze: true,
                })
            }
            Selector::Range { start, stop, step } => {
                let stride = step.unwrap_or(1);
                if stride > 0 {
                    let begin = start.map_or(lo, normalize).clamp(lo, hi);
                    let end = stop.map_or(hi, normalize).clamp(lo, hi).max(begin);
                    Ok(ResolvedRange::new(begin, end, stride))
                } else {
                    let begin = start.map_or(hi - 1, normalize).clamp(lo - 1, hi - 1);
                    let end = stop.map_or(lo - 1, normalize).clamp(lo - 1, hi - 1).min(begin);
                    Ok(ResolvedRange::new(begin, end, stride))
                }
            }
            Selector::Rest => Err(ArrayError::malformed(
                "hyperslice",
                "unexpanded ellipsis",
                HYPERSLICE_GRAMMAR,
            )),
        }
    }

    /// Number of coordinates visited
    pub fn len(&self) -> usize {
        let forward = if self.stride > 0 {
            self.end > self.begin
        } else {
            self.begin > self.end
        };
        if !forward {
            return 0;
        }
        let span = self.begin.abs_diff(self.end);
        span.div_ceil(self.stride.unsigned_abs()) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.len() as i64).map(move |i| self.begin + i * self.stride)
    }
}

/// A hyperslice resolved against a concrete array shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHyperslice {
    ranges: Vec<ResolvedRange>,
    origins: Vec<i64>,
    extents: Vec<usize>,
}

impl ResolvedHyperslice {
    fn new(ranges: Vec<ResolvedRange>, dimensions: &[Dimension]) -> Self {
        ResolvedHyperslice {
            ranges,
            origins: dimensions.iter().map(|d| d.begin).collect(),
            extents: dimensions.iter().map(Dimension::extent).collect(),
        }
    }

    /// The full extent of every dimension
    pub fn full(dimensions: &[Dimension]) -> Self {
        let ranges = dimensions
            .iter()
            .map(|d| ResolvedRange::new(d.begin, d.end, 1))
            .collect();
        Self::new(ranges, dimensions)
    }

    /// Legacy `[(begin, end), ...]` form, clamped to each dimension.
    pub fn from_ranges(pairs: &[(i64, i64)], dimensions: &[Dimension]) -> ArrayResult<Self> {
        if pairs.len() != dimensions.len() {
            return Err(ArrayError::malformed(
                "ranges",
                format!(
                    "got {} ranges for {} dimensions",
                    pairs.len(),
                    dimensions.len()
                ),
                RANGES_GRAMMAR,
            ));
        }
        let ranges = pairs
            .iter()
            .zip(dimensions)
            .map(|((begin, end), d)| {
                let begin = (*begin).clamp(d.begin, d.end);
                let end = (*end).clamp(d.begin, d.end).max(begin);
                ResolvedRange::new(begin, end, 1)
            })
            .collect();
        Ok(Self::new(ranges, dimensions))
    }

    pub fn ranges(&self) -> &[ResolvedRange] {
        &self.ranges
    }

    /// Output shape; single-index dimensions are dropped.
    pub fn shape(&self) -> Vec<usize> {
        self.ranges
            .iter()
            .filter(|r| !r.squeeze)
            .map(ResolvedRange::len)
            .collect()
    }

    /// Number of selected cells
    pub fn len(&self) -> usize {
        self.ranges.iter().map(ResolvedRange::len).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat row-major storage offsets of the selected cells, in iteration order.
    pub fn offsets(&self) -> Vec<usize> {
        let total = self.len();
        let mut out = Vec::with_capacity(total);
        if total == 0 {
            return out;
        }

        let mut strides = vec![1usize; self.extents.len()];
        for axis in (0..self.extents.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * self.extents[axis + 1];
        }

        let axes: Vec<Vec<usize>> = self
            .ranges
            .iter()
            .zip(&self.origins)
            .zip(&strides)
            .map(|((range, origin), stride)| {
                range
                    .iter()
                    .map(|c| (c - origin) as usize * stride)
                    .collect()
            })
            .collect();

        let mut counter = vec![0usize; axes.len()];
        loop {
            out.push(counter.iter().zip(&axes).map(|(i, axis)| axis[*i]).sum());

            let mut axis = axes.len();
            loop {
                if axis == 0 {
                    return out;
                }
                axis -= 1;
                counter[axis] += 1;
                if counter[axis] < axes[axis].len() {
                    break;
                }
                counter[axis] = 0;
            }
        }
    }
}

/// One `(array, attribute, hyperslices)` unit of a batched request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hyperchunk {
    pub array: u64,
    pub attribute: usize,
    pub hyperslices: Vec<Hyperslice>,
}

impl Hyperchunk {
    pub fn new(array: u64, attribute: usize, hyperslices: Vec<Hyperslice>) -> Self {
        Hyperchunk {
            array,
            attribute,
            hyperslices,
        }
    }
}

/// Parse `array/attribute/hs|hs;array/attribute/hs`.
pub fn parse_hyperchunks(text: &str) -> ArrayResult<Vec<Hyperchunk>> {
    let bad = |detail: String| ArrayError::malformed("hyperchunks", detail, HYPERCHUNKS_GRAMMAR);
    let index = |part: &str, what: &str| -> ArrayResult<i64> {
        let value: i64 = part
            .trim()
            .parse()
            .map_err(|_| bad(format!("invalid {what} index '{part}'")))?;
        if value < 0 {
            return Err(bad(format!("negative {what} index {value}")));
        }
        Ok(value)
    };

    text.split(';')
        .map(|chunk| {
            let parts: Vec<&str> = chunk.split('/').collect();
            if parts.len() != 3 {
                return Err(bad(format!("'{chunk}' is not array/attribute/hyperslices")));
            }
            let array = index(parts[0], "array")? as u64;
            let attribute = index(parts[1], "attribute")? as usize;
            let hyperslices = parts[2]
                .split('|')
                .map(|hs| Hyperslice::parse(hs).map_err(|e| bad(e.to_string())))
                .collect::<ArrayResult<Vec<_>>>()?;
            Ok(Hyperchunk::new(array, attribute, hyperslices))
        })
        .collect()
}

/// Parse the legacy `b0,e0,b1,e1,...` ranges argument.
pub fn parse_ranges(text: &str) -> ArrayResult<Vec<(i64, i64)>> {
    let values = text
        .split(',')
        .map(|v| {
            v.trim().parse::<i64>().map_err(|_| {
                ArrayError::malformed("ranges", format!("invalid value '{v}'"), RANGES_GRAMMAR)
            })
        })
        .collect::<ArrayResult<Vec<_>>>()?;
    if values.len() % 2 != 0 {
        return Err(ArrayError::malformed(
            "ranges",
            "odd number of values",
            RANGES_GRAMMAR,
        ));
    }
    Ok(values.chunks(2).map(|pair| (pair[0], pair[1])).collect())
}
