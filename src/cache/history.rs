//! Access History Log
//!
//! Ordered record of observed object IDs. Only the most recent entries are
//! ever consulted (the transition window and the voter window), so the log
//! is a ring buffer sized to the largest window it has to serve. Older
//! entries fall off the front; the total number of observations is still
//! counted.

use std::collections::VecDeque;

use super::element::ObjectId;

/// Bounded access history
#[derive(Debug, Clone)]
pub struct HistoryLog {
    entries: VecDeque<ObjectId>,
    capacity: usize,
    observed: u64,
}

impl HistoryLog {
    /// Create a log retaining at most `capacity` entries (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            observed: 0,
        }
    }

    /// Append an observation, dropping the oldest entry when full
    pub fn push(&mut self, id: ObjectId) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(id);
        self.observed += 1;
    }

    /// Grow the retention bound. Shrinking is ignored so that a window
    /// widened later still sees what was recorded.
    pub fn ensure_capacity(&mut self, capacity: usize) {
        if capacity > self.capacity {
            self.entries.reserve(capacity - self.capacity);
            self.capacity = capacity;
        }
    }

    /// Retained entry count
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing was ever recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retention bound
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total observations since creation, including dropped ones
    pub fn observed(&self) -> u64 {
        self.observed
    }

    /// Most recent entry
    pub fn last(&self) -> Option<ObjectId> {
        self.entries.back().copied()
    }

    /// Up to `count` entries immediately preceding the newest one, oldest first
    pub fn preceding(&self, count: usize) -> impl Iterator<Item = ObjectId> + '_ {
        let end = self.entries.len().saturating_sub(1);
        let start = end.saturating_sub(count);
        self.entries.range(start..end).copied()
    }

    /// Up to `count` most recent entries including the newest, oldest first
    pub fn recent(&self, count: usize) -> impl Iterator<Item = ObjectId> + '_ {
        let end = self.entries.len();
        let start = end.saturating_sub(count);
        self.entries.range(start..end).copied()
    }

    /// Retained entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.entries.iter().copied()
    }
}
