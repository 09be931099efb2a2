//! Fixed-binning histograms for run statistics
//!
//! Every axis carries an underflow (index 0) and overflow (index bins + 1)
//! bucket, so values outside the range are still counted. NaN coordinates
//! are rejected and tallied separately.

use serde::Serialize;
use std::collections::BTreeMap;

/// Uniform binning over `[low, high)`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axis {
    pub label: String,
    pub bins: usize,
    pub low: f64,
    pub high: f64,
}

impl Axis {
    pub fn new(label: &str, bins: usize, low: f64, high: f64) -> Self {
        debug_assert!(bins > 0 && high > low, "axis '{label}' has empty range");
        Self { label: label.to_string(), bins, low, high }
    }

    /// Number of buckets including underflow and overflow
    #[inline]
    pub fn len(&self) -> usize {
        self.bins + 2
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bins == 0
    }

    /// Bucket index for a value, or None for NaN
    #[inline]
    pub fn index(&self, value: f64) -> Option<usize> {
        if value.is_nan() {
            return None;
        }
        if value < self.low {
            return Some(0);
        }
        if value >= self.high {
            return Some(self.bins + 1);
        }
        let width = (self.high - self.low) / self.bins as f64;
        let bin = ((value - self.low) / width) as usize;
        // Rounding at the upper edge can land one past the last bin
        Some(bin.min(self.bins - 1) + 1)
    }

    /// Lower edge of a regular bin (1..=bins)
    pub fn bin_low_edge(&self, index: usize) -> f64 {
        let width = (self.high - self.low) / self.bins as f64;
        self.low + width * (index.saturating_sub(1)) as f64
    }
}

/// N-dimensional counting histogram
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub name: String,
    pub axes: Vec<Axis>,
    /// Row-major counts, last axis fastest
    pub counts: Vec<u64>,
    pub entries: u64,
    pub rejected: u64,
}

impl Histogram {
    pub fn new(name: &str, axes: Vec<Axis>) -> Self {
        let size = axes.iter().map(Axis::len).product();
        Self { name: name.to_string(), axes, counts: vec![0; size], entries: 0, rejected: 0 }
    }

    pub fn one_d(name: &str, x: Axis) -> Self {
        Self::new(name, vec![x])
    }

    pub fn two_d(name: &str, x: Axis, y: Axis) -> Self {
        Self::new(name, vec![x, y])
    }

    pub fn three_d(name: &str, x: Axis, y: Axis, z: Axis) -> Self {
        Self::new(name, vec![x, y, z])
    }

    /// Count one entry at the given coordinates
    ///
    /// Returns false (and bumps `rejected`) when a coordinate is NaN or the
    /// number of coordinates does not match the number of axes.
    pub fn fill(&mut self, coords: &[f64]) -> bool {
        match self.flat_index(coords) {
            Some(idx) => {
                self.counts[idx] += 1;
                self.entries += 1;
                true
            }
            None => {
                self.rejected += 1;
                false
            }
        }
    }

    /// Content of the bucket containing the given coordinates
    pub fn count_at(&self, coords: &[f64]) -> u64 {
        self.flat_index(coords).map(|i| self.counts[i]).unwrap_or(0)
    }

    /// Sum over all buckets, under/overflow included
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    fn flat_index(&self, coords: &[f64]) -> Option<usize> {
        if coords.len() != self.axes.len() {
            return None;
        }
        let mut idx = 0usize;
        for (axis, &value) in self.axes.iter().zip(coords) {
            idx = idx * axis.len() + axis.index(value)?;
        }
        Some(idx)
    }
}

/// Per-category counts along one binned axis (e.g. PDG id vs. energy)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryHistogram {
    pub name: String,
    pub axis: Axis,
    pub categories: BTreeMap<i32, Vec<u64>>,
    pub entries: u64,
    pub rejected: u64,
}

impl CategoryHistogram {
    pub fn new(name: &str, axis: Axis) -> Self {
        Self { name: name.to_string(), axis, categories: BTreeMap::new(), entries: 0, rejected: 0 }
    }

    pub fn fill(&mut self, value: f64, category: i32) -> bool {
        let Some(bin) = self.axis.index(value) else {
            self.rejected += 1;
            return false;
        };
        let len = self.axis.len();
        self.categories.entry(category).or_insert_with(|| vec![0; len])[bin] += 1;
        self.entries += 1;
        true
    }

    /// Total count for one category across all bins
    pub fn category_total(&self, category: i32) -> u64 {
        self.categories.get(&category).map(|c| c.iter().sum()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_index() {
        let axis = Axis::new("x", 10, 0.0, 100.0);
        assert_eq!(axis.index(-0.1), Some(0)); // underflow
        assert_eq!(axis.index(0.0), Some(1));
        assert_eq!(axis.index(9.99), Some(1));
        assert_eq!(axis.index(10.0), Some(2));
        assert_eq!(axis.index(99.99), Some(10));
        assert_eq!(axis.index(100.0), Some(11)); // overflow
        assert_eq!(axis.index(f64::INFINITY), Some(11));
        assert_eq!(axis.index(f64::NEG_INFINITY), Some(0));
        assert_eq!(axis.index(f64::NAN), None);
    }

    #[test]
    fn test_bin_low_edge() {
        let axis = Axis::new("x", 4, -2.0, 2.0);
        assert_eq!(axis.bin_low_edge(1), -2.0);
        assert_eq!(axis.bin_low_edge(3), 0.0);
    }

    #[test]
    fn test_fill_two_d() {
        let mut h = Histogram::two_d("h", Axis::new("e", 4, 0.0, 4.0), Axis::new("n", 2, 0.0, 2.0));
        assert!(h.fill(&[0.5, 1.5]));
        assert!(h.fill(&[0.5, 1.5]));
        assert!(h.fill(&[3.5, 10.0]));

        assert_eq!(h.count_at(&[0.7, 1.2]), 2);
        assert_eq!(h.count_at(&[3.1, 99.0]), 1);
        assert_eq!(h.count_at(&[1.5, 0.5]), 0);
        assert_eq!(h.entries, 3);
        assert_eq!(h.total(), 3);
    }

    #[test]
    fn test_fill_rejects_nan_and_wrong_arity() {
        let mut h = Histogram::one_d("h", Axis::new("x", 2, 0.0, 1.0));
        assert!(!h.fill(&[f64::NAN]));
        assert!(!h.fill(&[0.1, 0.2]));
        assert_eq!(h.rejected, 2);
        assert_eq!(h.entries, 0);
        assert_eq!(h.total(), 0);
    }

    #[test]
    fn test_three_d_layout() {
        let mut h = Histogram::three_d(
            "h",
            Axis::new("a", 1, 0.0, 1.0),
            Axis::new("b", 2, 0.0, 2.0),
            Axis::new("c", 3, 0.0, 3.0),
        );
        assert_eq!(h.counts.len(), 3 * 4 * 5);
        h.fill(&[0.5, 1.5, 2.5]);
        assert_eq!(h.count_at(&[0.1, 1.9, 2.1]), 1);
        assert_eq!(h.count_at(&[0.1, 0.9, 2.1]), 0);
    }

    #[test]
    fn test_category_histogram() {
        let mut h = CategoryHistogram::new("pdg", Axis::new("e", 2, 0.0, 2.0));
        h.fill(0.5, 13);
        h.fill(1.5, 13);
        h.fill(1.5, -211);
        assert!(!h.fill(f64::NAN, 22));

        assert_eq!(h.category_total(13), 2);
        assert_eq!(h.category_total(-211), 1);
        assert_eq!(h.category_total(22), 0);
        assert_eq!(h.entries, 3);
        assert_eq!(h.rejected, 1);
    }
}
