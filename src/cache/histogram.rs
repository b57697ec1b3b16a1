//! Usage Histogram
//!
//! Reporting-only tally of how many elements left (or still sit in) a cache
//! with a given hit count.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::element::Element;

/// `hit count -> number of elements with that hit count`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageHistogram {
    buckets: BTreeMap<u64, u64>,
    unused: u64,
}

impl UsageHistogram {
    /// Create an empty histogram
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one element into the tally
    pub fn record(&mut self, element: &Element) {
        *self.buckets.entry(element.hits).or_insert(0) += 1;
        if element.is_unused() {
            self.unused += 1;
        }
    }

    /// Fold many elements
    pub fn record_all<'a>(&mut self, elements: impl IntoIterator<Item = &'a Element>) {
        for element in elements {
            self.record(element);
        }
    }

    /// Combine two tallies
    pub fn merge(&mut self, other: &UsageHistogram) {
        for (&hits, &count) in &other.buckets {
            *self.buckets.entry(hits).or_insert(0) += count;
        }
        self.unused += other.unused;
    }

    /// Elements recorded with this hit count
    pub fn count(&self, hits: u64) -> u64 {
        self.buckets.get(&hits).copied().unwrap_or(0)
    }

    /// Elements recorded with zero hits
    pub fn unused(&self) -> u64 {
        self.unused
    }

    /// Elements recorded in total
    pub fn total(&self) -> u64 {
        self.buckets.values().sum()
    }

    /// Sum of all recorded hits
    pub fn total_hits(&self) -> u64 {
        self.buckets.iter().map(|(&hits, &count)| hits * count).sum()
    }

    /// `(hit count, elements)` pairs in ascending hit order
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.buckets.iter().map(|(&hits, &count)| (hits, count))
    }

    /// Check if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element_with_hits(id: u64, hits: u64) -> Element {
        let mut element = Element::new(id, 0.0);
        element.hits = hits;
        element
    }

    #[test]
    fn test_record_and_counts() {
        let mut histogram = UsageHistogram::new();
        histogram.record(&element_with_hits(1, 0));
        histogram.record(&element_with_hits(2, 3));
        histogram.record(&element_with_hits(3, 3));

        assert_eq!(histogram.count(0), 1);
        assert_eq!(histogram.count(3), 2);
        assert_eq!(histogram.unused(), 1);
        assert_eq!(histogram.total(), 3);
        assert_eq!(histogram.total_hits(), 6);
        assert_eq!(histogram.iter().collect::<Vec<_>>(), vec![(0, 1), (3, 2)]);
    }

    #[test]
    fn test_merge() {
        let mut left = UsageHistogram::new();
        left.record(&element_with_hits(1, 1));
        let mut right = UsageHistogram::new();
        right.record(&element_with_hits(2, 1));
        right.record(&element_with_hits(3, 0));

        left.merge(&right);
        assert_eq!(left.count(1), 2);
        assert_eq!(left.unused(), 1);
    }
}
