//! Real Cache
//!
//! Bounded store of the objects actually held, ranked by one of two
//! eviction disciplines:
//!
//! - **LRU**: recency only. Inserting or hitting an element makes it the
//!   most recent; the least recent is evicted.
//! - **Belief**: highest belief survives. On equal belief the element
//!   admitted earlier survives.
//!
//! Pinned elements are skipped when choosing a victim. If every element is
//! pinned the lowest-ranked one goes anyway; capacity always wins.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::element::{Element, ObjectId};
use super::histogram::UsageHistogram;
use crate::error::{Error, Result};

/// Default real cache capacity (elements)
pub const DEFAULT_REAL_CACHE_CAPACITY: usize = 655_360;

/// Eviction discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionMode {
    /// Recency only
    Lru,
    /// Belief ordered
    #[default]
    Belief,
}

impl std::fmt::Display for EvictionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictionMode::Lru => write!(f, "lru"),
            EvictionMode::Belief => write!(f, "belief"),
        }
    }
}

impl std::str::FromStr for EvictionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionMode::Lru),
            "belief" => Ok(EvictionMode::Belief),
            other => Err(Error::InvalidConfig(format!(
                "unknown eviction mode '{}'",
                other
            ))),
        }
    }
}

/// Position in eviction order; smallest is evicted first
#[derive(Debug, Clone, Copy)]
struct RankKey {
    belief: f64,
    order: u64,
    id: ObjectId,
}

impl PartialEq for RankKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankKey {}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.belief
            .total_cmp(&other.belief)
            .then(self.order.cmp(&other.order))
            .then(self.id.cmp(&other.id))
    }
}

#[derive(Debug, Clone)]
struct Slot {
    element: Element,
    key: RankKey,
}

/// Bounded object store
#[derive(Debug, Clone)]
pub struct RealCache {
    capacity: usize,
    mode: EvictionMode,
    slots: HashMap<ObjectId, Slot>,
    ranking: BTreeSet<RankKey>,
    clock: u64,
    insertions: u64,
    evictions: u64,
    evicted_usage: UsageHistogram,
}

impl RealCache {
    /// Create an empty cache
    pub fn new(capacity: usize, mode: EvictionMode) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidConfig(
                "real cache capacity must be at least 1".into(),
            ));
        }
        Ok(Self {
            capacity,
            mode,
            slots: HashMap::new(),
            ranking: BTreeSet::new(),
            clock: 0,
            insertions: 0,
            evictions: 0,
            evicted_usage: UsageHistogram::new(),
        })
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Fresh key for a new admission
    fn rank_key(&mut self, id: ObjectId, belief: f64) -> RankKey {
        let stamp = self.tick();
        match self.mode {
            EvictionMode::Lru => RankKey {
                belief: 0.0,
                order: stamp,
                id,
            },
            // later admissions lose ties
            EvictionMode::Belief => RankKey {
                belief,
                order: u64::MAX - stamp,
                id,
            },
        }
    }

    /// Move an element in eviction order: LRU refreshes recency, belief
    /// mode keeps the admission stamp and takes the new belief.
    fn rerank(&mut self, id: ObjectId, belief: Option<f64>) {
        let Some(slot) = self.slots.get(&id) else {
            return;
        };
        let old = slot.key;
        let belief = belief.unwrap_or(slot.element.belief);

        let key = match self.mode {
            EvictionMode::Lru => RankKey {
                belief: 0.0,
                order: self.tick(),
                id,
            },
            EvictionMode::Belief => RankKey { belief, ..old },
        };
        self.ranking.remove(&old);
        self.ranking.insert(key);
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.key = key;
            slot.element.belief = belief;
        }
    }

    /// Insert or refresh an element and return whatever had to make room.
    ///
    /// An already-present element keeps its hit count. In LRU mode it
    /// becomes the most recent; in belief mode its belief is overwritten.
    pub fn insert(&mut self, element: Element) -> Vec<Element> {
        if self.slots.contains_key(&element.id) {
            self.rerank(element.id, Some(element.belief));
            return Vec::new();
        }

        let key = self.rank_key(element.id, element.belief);
        let element = Element {
            hits: 0,
            ..element
        };
        self.ranking.insert(key);
        self.slots.insert(element.id, Slot { element, key });
        self.insertions += 1;

        let mut evicted = Vec::new();
        while self.slots.len() > self.capacity {
            match self.evict_one() {
                Some(victim) => evicted.push(victim),
                None => break,
            }
        }
        evicted
    }

    fn evict_one(&mut self) -> Option<Element> {
        let victim = self
            .ranking
            .iter()
            .find(|key| {
                self.slots
                    .get(&key.id)
                    .map(|slot| !slot.element.pinned)
                    .unwrap_or(false)
            })
            .or_else(|| self.ranking.iter().next())
            .map(|key| key.id)?;

        let removed = self.take(victim)?;
        trace!(id = removed.id, hits = removed.hits, "Real cache evicted");
        Some(removed)
    }

    fn take(&mut self, id: ObjectId) -> Option<Element> {
        let slot = self.slots.remove(&id)?;
        self.ranking.remove(&slot.key);
        self.evictions += 1;
        self.evicted_usage.record(&slot.element);
        Some(slot.element)
    }

    /// Drop an element on external advice
    pub fn remove(&mut self, id: ObjectId) -> Option<Element> {
        self.take(id)
    }

    /// Count a hit; in LRU mode the element also becomes the most recent
    pub fn hit(&mut self, id: ObjectId) -> bool {
        let Some(slot) = self.slots.get_mut(&id) else {
            return false;
        };
        slot.element.record_hit();
        if self.mode == EvictionMode::Lru {
            self.rerank(id, None);
        }
        true
    }

    /// Protect an element from eviction
    pub fn pin(&mut self, id: ObjectId) -> bool {
        self.set_pinned(id, true)
    }

    /// Make an element evictable again
    pub fn unpin(&mut self, id: ObjectId) -> bool {
        self.set_pinned(id, false)
    }

    fn set_pinned(&mut self, id: ObjectId, pinned: bool) -> bool {
        match self.slots.get_mut(&id) {
            Some(slot) => {
                slot.element.pinned = pinned;
                true
            }
            None => false,
        }
    }

    /// Membership check without touching counters
    pub fn contains(&self, id: ObjectId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Copy of a held element
    pub fn get(&self, id: ObjectId) -> Option<Element> {
        self.slots.get(&id).map(|slot| slot.element.clone())
    }

    /// Held IDs, most valuable first
    pub fn ids(&self) -> Vec<ObjectId> {
        self.ranking.iter().rev().map(|key| key.id).collect()
    }

    /// Held elements, most valuable first
    pub fn elements(&self) -> Vec<Element> {
        self.ranking
            .iter()
            .rev()
            .filter_map(|key| self.slots.get(&key.id))
            .map(|slot| slot.element.clone())
            .collect()
    }

    /// Held element count
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if nothing is held
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Configured bound
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Eviction discipline
    pub fn mode(&self) -> EvictionMode {
        self.mode
    }

    /// New elements admitted so far
    pub fn insertions(&self) -> u64 {
        self.insertions
    }

    /// Elements removed so far
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Usage of evicted elements plus everything still held
    pub fn usage_histogram(&self) -> UsageHistogram {
        let mut histogram = self.evicted_usage.clone();
        for slot in self.slots.values() {
            histogram.record(&slot.element);
        }
        histogram
    }
}

// =============================================================================
// Tests
// =============================================================================
