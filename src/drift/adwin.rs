//! Adaptive Windowing Change Detector
//!
//! Keeps a variable-length window of recent values compressed into an
//! exponential histogram: row `i` holds buckets summarising `2^i` values,
//! newest first, at most `max_buckets` per row. After each insertion every
//! bucket boundary is tried as a cut between an older and a newer
//! sub-window; if their means differ by more than the Hoeffding-style bound
//!
//! ```text
//!   m   = 1/(n0 - min + 1) + 1/(n1 - min + 1)
//!   dd  = ln(2 ln(W) / delta)
//!   eps = sqrt(2 m v dd) + 2/3 dd m          v = window variance
//! ```
//!
//! the oldest bucket is dropped and the check repeats. A value that caused
//! at least one drop is reported as a change.
//!
//! The bound assumes values in `[0, 1]`.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Default confidence parameter
pub const DEFAULT_DELTA: f64 = 0.002;

/// Default smallest sub-window on either side of a cut
pub const DEFAULT_MIN_SUB_WINDOW: u64 = 5;

/// Default buckets per histogram row
pub const DEFAULT_MAX_BUCKETS: usize = 50;

/// Tuning for one detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdwinConfig {
    /// Confidence; smaller means fewer false alarms and later detection
    pub delta: f64,

    /// Buckets per row before the two oldest are merged upward
    pub max_buckets: usize,

    /// Each side of a cut must summarise at least this many values
    pub min_sub_window: u64,
}

impl Default for AdwinConfig {
    fn default() -> Self {
        Self {
            delta: DEFAULT_DELTA,
            max_buckets: DEFAULT_MAX_BUCKETS,
            min_sub_window: DEFAULT_MIN_SUB_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    total: f64,
    variance: f64,
}

/// Single-stream change detector
#[derive(Debug, Clone)]
pub struct Adwin {
    config: AdwinConfig,
    // rows[i]: buckets of 2^i values, newest at the front
    rows: Vec<VecDeque<Bucket>>,
    width: u64,
    total: f64,
    variance: f64,
    detections: u64,
}

impl Adwin {
    /// Create an empty detector
    pub fn new(config: AdwinConfig) -> Self {
        Self {
            config,
            rows: Vec::new(),
            width: 0,
            total: 0.0,
            variance: 0.0,
            detections: 0,
        }
    }

    /// Add a value; true when it revealed a change
    pub fn update(&mut self, value: f64) -> bool {
        self.insert(value);
        self.compress();
        let changed = self.detect();
        if changed {
            self.detections += 1;
        }
        changed
    }

    fn insert(&mut self, value: f64) {
        if self.rows.is_empty() {
            self.rows.push(VecDeque::new());
        }
        self.rows[0].push_front(Bucket {
            total: value,
            variance: 0.0,
        });

        self.width += 1;
        if self.width > 1 {
            let previous = (self.width - 1) as f64;
            let delta = value - self.total / previous;
            self.variance += previous * delta * delta / self.width as f64;
        }
        self.total += value;
    }

    fn compress(&mut self) {
        let max = self.config.max_buckets.max(1);
        let mut row = 0;
        while row < self.rows.len() {
            if self.rows[row].len() <= max {
                row += 1;
                continue;
            }

            let (Some(oldest), Some(next)) = (self.rows[row].pop_back(), self.rows[row].pop_back())
            else {
                break;
            };
            let size = (1u64 << row) as f64;
            let mean_diff = oldest.total / size - next.total / size;
            let merged = Bucket {
                total: oldest.total + next.total,
                variance: oldest.variance
                    + next.variance
                    + size * size * mean_diff * mean_diff / (2.0 * size),
            };

            if row + 1 == self.rows.len() {
                self.rows.push(VecDeque::new());
            }
            self.rows[row + 1].push_front(merged);
            row += 1;
        }
    }

    fn detect(&mut self) -> bool {
        let min = self.config.min_sub_window;
        let mut changed = false;

        loop {
            if self.width <= 2 * min {
                break;
            }

            let mut reduced = false;
            let mut n0: u64 = 0;
            let mut sum0 = 0.0;

            // oldest first: highest row, back of each row
            'cuts: for row in (0..self.rows.len()).rev() {
                let size = 1u64 << row;
                for bucket in self.rows[row].iter().rev() {
                    n0 += size;
                    sum0 += bucket.total;
                    let n1 = self.width - n0;
                    if n1 < min {
                        break 'cuts;
                    }
                    if n0 < min {
                        continue;
                    }

                    let sum1 = self.total - sum0;
                    let gap = (sum0 / n0 as f64 - sum1 / n1 as f64).abs();
                    if gap > self.cut_bound(n0, n1) {
                        reduced = true;
                        break 'cuts;
                    }
                }
            }

            if !reduced {
                break;
            }
            self.drop_oldest();
            changed = true;
        }

        changed
    }

    fn cut_bound(&self, n0: u64, n1: u64) -> f64 {
        let min = self.config.min_sub_window;
        let width = self.width as f64;
        let m = 1.0 / (n0 - min + 1) as f64 + 1.0 / (n1 - min + 1) as f64;
        let dd = (2.0 * width.ln() / self.config.delta).ln();
        let v = self.variance / width;
        (2.0 * m * v * dd).sqrt() + 2.0 / 3.0 * dd * m
    }

    fn drop_oldest(&mut self) {
        while let Some(top) = self.rows.last() {
            if top.is_empty() {
                self.rows.pop();
            } else {
                break;
            }
        }
        let row = match self.rows.len() {
            0 => return,
            len => len - 1,
        };
        let Some(bucket) = self.rows[row].pop_back() else {
            return;
        };

        let n1 = (1u64 << row) as f64;
        self.width -= 1u64 << row;
        self.total -= bucket.total;

        if self.width == 0 {
            self.total = 0.0;
            self.variance = 0.0;
        } else {
            let width = self.width as f64;
            let u1 = bucket.total / n1;
            let diff = u1 - self.total / width;
            self.variance -= bucket.variance + n1 * width * diff * diff / (n1 + width);
            self.variance = self.variance.max(0.0);
        }
    }

    /// Forget everything
    pub fn reset(&mut self) {
        self.rows.clear();
        self.width = 0;
        self.total = 0.0;
        self.variance = 0.0;
    }

    /// Values currently summarised
    pub fn width(&self) -> u64 {
        self.width
    }

    /// Mean of the current window
    pub fn mean(&self) -> f64 {
        if self.width == 0 {
            0.0
        } else {
            self.total / self.width as f64
        }
    }

    /// Variance of the current window
    pub fn variance(&self) -> f64 {
        if self.width == 0 {
            0.0
        } else {
            self.variance / self.width as f64
        }
    }

    /// Changes detected since creation
    pub fn detections(&self) -> u64 {
        self.detections
    }

    /// Buckets held across all rows
    pub fn bucket_count(&self) -> usize {
        self.rows.iter().map(VecDeque::len).sum()
    }
}

impl Default for Adwin {
    fn default() -> Self {
        Self::new(AdwinConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(max_buckets: usize) -> Adwin {
        Adwin::new(AdwinConfig {
            max_buckets,
            ..Default::default()
        })
    }

    #[test]
    fn test_constant_stream_never_changes() {
        let mut adwin = detector(5);
        for _ in 0..500 {
            assert!(!adwin.update(0.4));
        }
        assert_eq!(adwin.width(), 500);
        assert!((adwin.mean() - 0.4).abs() < 1e-9);
        assert!(adwin.variance() < 1e-12);
    }

    #[test]
    fn test_step_change_detected_and_window_shrinks() {
        let mut adwin = detector(5);
        for _ in 0..200 {
            adwin.update(0.0);
        }

        let mut detected_at = None;
        for i in 0..200 {
            if adwin.update(1.0) && detected_at.is_none() {
                detected_at = Some(i);
            }
        }

        let at = detected_at.expect("step change should be detected");
        assert!(at < 60, "detected after {} values", at);
        assert!(adwin.width() < 400);
        assert!(adwin.mean() > 0.5);
        assert!(adwin.detections() >= 1);
    }

    #[test]
    fn test_compression_bounds_bucket_count() {
        let mut adwin = detector(3);
        for i in 0..1000 {
            adwin.update((i % 2) as f64 * 0.01);
        }
        // log2(1000) rows of at most 3 buckets each
        assert!(adwin.bucket_count() <= 3 * 11);
        assert_eq!(adwin.width(), 1000);
    }

    #[test]
    fn test_variance_matches_direct_computation() {
        // the values cycle around one mean, far inside the cut bound
        let mut adwin = detector(64);
        let values: Vec<f64> = (0..40).map(|i| ((i * 7) % 10) as f64 / 10.0).collect();
        for &v in &values {
            assert!(!adwin.update(v));
        }
        assert_eq!(adwin.width(), values.len() as u64);

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        assert!((adwin.mean() - mean).abs() < 1e-9);
        assert!((adwin.variance() - var).abs() < 1e-9);
    }

    #[test]
    fn test_variance_survives_bucket_merges() {
        let mut adwin = detector(2);
        let values: Vec<f64> = (0..64).map(|i| ((i * 3) % 4) as f64 / 4.0).collect();
        for &v in &values {
            assert!(!adwin.update(v));
        }
        assert_eq!(adwin.width(), 64);
        assert!(adwin.bucket_count() < 64);

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        assert!((adwin.variance() - var).abs() < 1e-9);
    }

    #[test]
    fn test_reset() {
        let mut adwin = detector(5);
        for _ in 0..20 {
            adwin.update(1.0);
        }
        adwin.reset();
        assert_eq!(adwin.width(), 0);
        assert_eq!(adwin.bucket_count(), 0);
        assert_eq!(adwin.mean(), 0.0);
    }
}
