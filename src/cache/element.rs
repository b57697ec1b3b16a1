//! Cache Element Types

use serde::{Deserialize, Serialize};

/// Dense object identifier handed out by the interning layer
pub type ObjectId = u64;

/// A single tracked object inside a cache.
///
/// Elements are copied between containers, never shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Dense object ID
    pub id: ObjectId,

    /// Relative significance score
    pub belief: f64,

    /// Hits observed while resident
    pub hits: u64,

    /// Pinned elements are skipped by eviction
    pub pinned: bool,
}

impl Element {
    /// Create an unpinned element with no hits
    pub fn new(id: ObjectId, belief: f64) -> Self {
        Self {
            id,
            belief,
            hits: 0,
            pinned: false,
        }
    }

    /// Record one hit
    #[inline]
    pub fn record_hit(&mut self) {
        self.hits = self.hits.saturating_add(1);
    }

    /// Whether the element was never hit while resident
    #[inline]
    pub fn is_unused(&self) -> bool {
        self.hits == 0
    }
}
