//! Virtual Cache
//!
//! Belief-ranked working set. Every observed access runs through the
//! statistics engine; the resulting candidates are merged into the resident
//! set, which is re-sorted and cut back to `cache_size`. The difference
//! between the resident set before and after a merge is the advice handed
//! to the real cache:
//!
//! ```text
//!   before ──┐                        ┌── prefetch: admitted, not in before
//!            ├── merge ── sort ── cut ┤
//! candidates ┘                        └── evict:    cut, and was in before
//! ```
//!
//! Ties in belief keep their previous relative order (stable sort), so an
//! incumbent is never displaced by a newcomer with the same belief.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::element::{Element, ObjectId};
use super::histogram::UsageHistogram;
use super::params::CacheParameters;
use super::statistics::BeliefStatistics;
use crate::error::Result;

/// Virtual cache shared between its writer and snapshot readers
pub type SharedVirtualCache = Arc<RwLock<VirtualCache>>;

/// Advice produced by one merge or import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// Newly admitted IDs, in rank order
    pub prefetch: Vec<ObjectId>,

    /// Previously resident IDs that were cut
    pub evict: Vec<ObjectId>,
}

impl MergeOutcome {
    /// Check if the merge changed membership
    pub fn is_empty(&self) -> bool {
        self.prefetch.is_empty() && self.evict.is_empty()
    }
}

/// Policy state moved between caches by the switch controller.
///
/// Reporting counters are not part of the state; each cache accounts the
/// membership change of an import in its own counters.
#[derive(Debug, Clone)]
pub struct VirtualCacheState {
    statistics: BeliefStatistics,
    resident: Vec<Element>,
}

impl VirtualCacheState {
    /// Parameters carried by this state
    pub fn parameters(&self) -> &CacheParameters {
        self.statistics.parameters()
    }

    /// Resident elements carried by this state
    pub fn resident(&self) -> &[Element] {
        &self.resident
    }
}

/// Belief-ranked bounded working set
#[derive(Debug, Clone)]
pub struct VirtualCache {
    statistics: BeliefStatistics,
    resident: Vec<Element>,
    index: HashMap<ObjectId, usize>,
    insertions: u64,
    evictions: u64,
    evicted_usage: UsageHistogram,
}

impl VirtualCache {
    /// Create an empty cache
    pub fn new(params: CacheParameters) -> Result<Self> {
        let statistics = BeliefStatistics::new(params)?;
        Ok(Self {
            statistics,
            resident: Vec::new(),
            index: HashMap::new(),
            insertions: 0,
            evictions: 0,
            evicted_usage: UsageHistogram::new(),
        })
    }

    /// Create a cache wrapped for sharing
    pub fn shared(params: CacheParameters) -> Result<SharedVirtualCache> {
        Ok(Arc::new(RwLock::new(Self::new(params)?)))
    }

    /// Current parameters
    pub fn parameters(&self) -> &CacheParameters {
        self.statistics.parameters()
    }

    /// Replace the parameters. A smaller `cache_size` cuts the tail at once.
    pub fn set_parameters(&mut self, params: CacheParameters) -> Result<()> {
        self.statistics.set_parameters(params)?;

        let size = self.parameters().cache_size;
        if self.resident.len() > size {
            let removed = self.resident.split_off(size);
            self.evictions += removed.len() as u64;
            self.evicted_usage.record_all(&removed);
            self.reindex();
        }
        Ok(())
    }

    /// Observe an access and merge whatever the statistics propose
    pub fn update_history(&mut self, object_id: ObjectId) -> Result<MergeOutcome> {
        let candidates = self.statistics.update(object_id, &self.resident)?;
        if candidates.is_empty() {
            return Ok(MergeOutcome::default());
        }
        Ok(self.merge(candidates))
    }

    /// Merge candidates into the resident set
    pub fn merge(&mut self, candidates: Vec<Element>) -> MergeOutcome {
        let before: HashSet<ObjectId> = self.index.keys().copied().collect();

        for candidate in candidates {
            match self.index.get(&candidate.id) {
                Some(&pos) => self.resident[pos].belief = candidate.belief,
                None => {
                    self.index.insert(candidate.id, self.resident.len());
                    self.resident.push(Element::new(candidate.id, candidate.belief));
                }
            }
        }

        self.resident.sort_by(|a, b| b.belief.total_cmp(&a.belief));

        let size = self.parameters().cache_size;
        let removed = if self.resident.len() > size {
            self.resident.split_off(size)
        } else {
            Vec::new()
        };

        let prefetch: Vec<ObjectId> = self
            .resident
            .iter()
            .map(|e| e.id)
            .filter(|id| !before.contains(id))
            .collect();

        let mut evict = Vec::new();
        for element in removed.iter().filter(|e| before.contains(&e.id)) {
            self.evicted_usage.record(element);
            evict.push(element.id);
        }

        self.insertions += prefetch.len() as u64;
        self.evictions += evict.len() as u64;
        self.reindex();

        if !evict.is_empty() || !prefetch.is_empty() {
            debug!(
                prefetch = prefetch.len(),
                evict = evict.len(),
                resident = self.resident.len(),
                "Virtual cache merged"
            );
        }

        MergeOutcome { prefetch, evict }
    }

    fn reindex(&mut self) {
        self.index.clear();
        self.index.extend(
            self.resident
                .iter()
                .enumerate()
                .map(|(pos, element)| (element.id, pos)),
        );
    }

    /// Whether `object_id` is resident. Counting a hit never reorders.
    pub fn hit(&mut self, object_id: ObjectId, count_toward_stats: bool) -> bool {
        match self.index.get(&object_id) {
            Some(&pos) => {
                if count_toward_stats {
                    self.resident[pos].record_hit();
                }
                true
            }
            None => false,
        }
    }

    /// Membership check without touching counters
    pub fn contains(&self, object_id: ObjectId) -> bool {
        self.index.contains_key(&object_id)
    }

    /// Belief of a resident element
    pub fn belief_of(&self, object_id: ObjectId) -> Option<f64> {
        self.index
            .get(&object_id)
            .map(|&pos| self.resident[pos].belief)
    }

    /// Resident elements in rank order
    pub fn resident(&self) -> &[Element] {
        &self.resident
    }

    /// Resident IDs in rank order
    pub fn resident_ids(&self) -> Vec<ObjectId> {
        self.resident.iter().map(|e| e.id).collect()
    }

    /// Resident count
    pub fn len(&self) -> usize {
        self.resident.len()
    }

    /// Check if nothing is resident
    pub fn is_empty(&self) -> bool {
        self.resident.is_empty()
    }

    /// Elements admitted so far
    pub fn insertions(&self) -> u64 {
        self.insertions
    }

    /// Resident elements cut so far
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Usage of evicted elements plus the current residents
    pub fn usage_histogram(&self) -> UsageHistogram {
        let mut histogram = self.evicted_usage.clone();
        histogram.record_all(&self.resident);
        histogram
    }

    /// Underlying statistics
    pub fn statistics(&self) -> &BeliefStatistics {
        &self.statistics
    }

    /// Copy out the policy state
    pub fn export_state(&self) -> VirtualCacheState {
        VirtualCacheState {
            statistics: self.statistics.clone(),
            resident: self.resident.clone(),
        }
    }

    /// Replace the policy state wholesale and report the membership
    /// change as merge advice: imported IDs that were not resident are
    /// prefetches, residents the import dropped are evictions.
    pub fn import_state(&mut self, state: VirtualCacheState) -> MergeOutcome {
        let incoming: HashSet<ObjectId> = state.resident.iter().map(|e| e.id).collect();
        let previous = std::mem::replace(&mut self.resident, state.resident);
        self.statistics = state.statistics;

        let prefetch: Vec<ObjectId> = self
            .resident
            .iter()
            .map(|e| e.id)
            .filter(|id| !self.index.contains_key(id))
            .collect();

        let mut evict = Vec::new();
        for element in previous.iter().filter(|e| !incoming.contains(&e.id)) {
            self.evicted_usage.record(element);
            evict.push(element.id);
        }

        self.insertions += prefetch.len() as u64;
        self.evictions += evict.len() as u64;
        self.reindex();

        MergeOutcome { prefetch, evict }
    }
}

// =============================================================================
// Tests
// =============================================================================
