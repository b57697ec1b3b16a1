//! Prediction Core
//!
//! The synchronous access path shared by the async engine and the
//! simulator. One call handles one access:
//!
//! ```text
//!   id ─▶ real hit? ──miss──▶ demand insert
//!          │
//!          ▼
//!   primary virtual cache: hit, update_history ─▶ MergeOutcome
//!          │
//!          ├── prefetch ─▶ real insert
//!          └── evict    ─▶ real remove (belief mode only)
//! ```
//!
//! Evict advice is ignored in LRU mode: recency alone decides what the
//! real cache drops there.
//!
//! The hit rate handed to the drift detector covers only the last
//! `hit_window` accesses; the lifetime ratio is kept for reporting.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::warn;

use crate::cache::{
    CacheParameters, Element, EvictionMode, ObjectId, RealCache, SharedVirtualCache,
    MergeOutcome, UsageHistogram, VirtualCache,
};
use crate::error::Result;

/// Default number of recent accesses behind [`AccessOutcome::hitrate`]
pub const DEFAULT_HIT_WINDOW: usize = 100;

/// Result of one access
#[derive(Debug, Clone, PartialEq)]
pub struct AccessOutcome {
    /// Accessed object
    pub object_id: ObjectId,

    /// Zero-based position of this access in the stream
    pub tick: u64,

    /// Whether the real cache already held the object
    pub real_hit: bool,

    /// Whether the primary virtual cache held the object before the update
    pub primary_hit: bool,

    /// Real cache hit rate over the recent window, this access included
    pub hitrate: f64,

    /// Objects newly admitted to the virtual cache, with their beliefs
    pub prefetch: Vec<Element>,

    /// Objects the virtual cache cut during this access
    pub advised_evictions: Vec<ObjectId>,

    /// Objects that left the real cache during this access
    pub evicted: Vec<Element>,
}

/// Copy-out view of the engine state
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub accesses: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub real_len: usize,
    pub real_capacity: usize,
    pub eviction_mode: EvictionMode,
    pub resident: Vec<Element>,
    pub parameters: CacheParameters,
    pub virtual_insertions: u64,
    pub virtual_evictions: u64,
    pub usage: UsageHistogram,
    pub phase_shifts: u64,
    pub promotions: u64,
}

/// Real cache side of a virtual cache membership change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResidencyChange {
    /// Newly admitted objects, with their beliefs
    pub prefetch: Vec<Element>,

    /// Objects that left the real cache
    pub evicted: Vec<Element>,
}

/// Real cache driven by a primary virtual cache
#[derive(Debug)]
pub struct PredictionCore {
    real: RealCache,
    primary: SharedVirtualCache,
    tick: u64,
    hits: u64,
    misses: u64,
    window: usize,
    recent: VecDeque<bool>,
    recent_hits: usize,
}

impl PredictionCore {
    /// Create a core with fresh caches
    pub fn new(params: CacheParameters, capacity: usize, mode: EvictionMode) -> Result<Self> {
        let primary = VirtualCache::shared(params)?;
        let real = RealCache::new(capacity, mode)?;
        Ok(Self::with_primary(real, primary))
    }

    /// Create a core around existing caches
    pub fn with_primary(real: RealCache, primary: SharedVirtualCache) -> Self {
        Self {
            real,
            primary,
            tick: 0,
            hits: 0,
            misses: 0,
            window: DEFAULT_HIT_WINDOW,
            recent: VecDeque::with_capacity(DEFAULT_HIT_WINDOW),
            recent_hits: 0,
        }
    }

    /// Number of recent accesses the reported hit rate covers
    pub fn with_hit_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        while self.recent.len() > self.window {
            if self.recent.pop_front() == Some(true) {
                self.recent_hits -= 1;
            }
        }
        self
    }

    /// Process one access
    pub fn access(&mut self, object_id: ObjectId) -> Result<AccessOutcome> {
        // reject before touching either cache
        if let Err(e) = self.primary.read().parameters().check_id(object_id) {
            warn!(object_id, error = %e, "Rejected access");
            return Err(e);
        }

        let tick = self.tick;
        self.tick += 1;

        let mut evicted = Vec::new();
        let real_hit = self.real.hit(object_id);
        if real_hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        self.record_recent(real_hit);

        let (primary_hit, merge) = {
            let mut primary = self.primary.write();
            if !real_hit {
                let belief = primary.belief_of(object_id).unwrap_or(0.0);
                evicted.extend(self.real.insert(Element::new(object_id, belief)));
            }
            let primary_hit = primary.hit(object_id, true);
            let merge = primary.update_history(object_id)?;
            (primary_hit, merge)
        };

        let change = self.apply_changes(&merge);
        evicted.extend(change.evicted);

        Ok(AccessOutcome {
            object_id,
            tick,
            real_hit,
            primary_hit,
            hitrate: self.recent_hit_ratio(),
            prefetch: change.prefetch,
            advised_evictions: merge.evict,
            evicted,
        })
    }

    /// Carry a primary membership change into the real cache.
    ///
    /// Prefetches are inserted with their current belief; evictions are
    /// honored only in belief mode. Used after every merge and after the
    /// switch controller imports a new state into the primary.
    pub fn apply_changes(&mut self, changes: &MergeOutcome) -> ResidencyChange {
        let prefetch: Vec<Element> = {
            let primary = self.primary.read();
            changes
                .prefetch
                .iter()
                .filter_map(|&id| primary.belief_of(id).map(|belief| Element::new(id, belief)))
                .collect()
        };

        let mut evicted = Vec::new();
        for element in &prefetch {
            evicted.extend(self.real.insert(element.clone()));
        }

        if self.real.mode() == EvictionMode::Belief {
            for &id in &changes.evict {
                if let Some(element) = self.real.remove(id) {
                    evicted.push(element);
                }
            }
        }

        ResidencyChange { prefetch, evicted }
    }

    fn record_recent(&mut self, hit: bool) {
        if self.recent.len() == self.window && self.recent.pop_front() == Some(true) {
            self.recent_hits -= 1;
        }
        self.recent.push_back(hit);
        if hit {
            self.recent_hits += 1;
        }
    }

    /// Keep an object in the real cache while any unpinned one remains
    pub fn pin(&mut self, object_id: ObjectId) -> bool {
        self.real.pin(object_id)
    }

    /// Release a pin
    pub fn unpin(&mut self, object_id: ObjectId) -> bool {
        self.real.unpin(object_id)
    }

    /// Real cache hit rate over the last `hit_window` accesses
    pub fn recent_hit_ratio(&self) -> f64 {
        if self.recent.is_empty() {
            0.0
        } else {
            self.recent_hits as f64 / self.recent.len() as f64
        }
    }

    /// Real cache hit rate so far
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Accesses processed
    pub fn accesses(&self) -> u64 {
        self.tick
    }

    /// Real cache hits
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Real cache misses
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// The real cache
    pub fn real(&self) -> &RealCache {
        &self.real
    }

    /// Shared handle to the primary virtual cache
    pub fn primary(&self) -> &SharedVirtualCache {
        &self.primary
    }

    /// Copy out the current state; detector and switch counters are zero
    pub fn snapshot(&self) -> EngineSnapshot {
        let primary = self.primary.read();
        EngineSnapshot {
            accesses: self.tick,
            hits: self.hits,
            misses: self.misses,
            hit_ratio: self.hit_ratio(),
            real_len: self.real.len(),
            real_capacity: self.real.capacity(),
            eviction_mode: self.real.mode(),
            resident: primary.resident().to_vec(),
            parameters: primary.parameters().clone(),
            virtual_insertions: primary.insertions(),
            virtual_evictions: primary.evictions(),
            usage: primary.usage_histogram(),
            phase_shifts: 0,
            promotions: 0,
        }
    }
}
