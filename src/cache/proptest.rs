//! Property-Based Tests for the Prediction Caches
//!
//! # Test Properties
//!
//! 1. **Bounded Residency**: the virtual cache never holds more than
//!    `cache_size` elements after a merge or an update
//! 2. **Advice Partition**: prefetch and evict never overlap; evicted IDs
//!    were resident before the merge, prefetched IDs were not
//! 3. **Real Cache Bound**: no sequence of inserts, hits and pins pushes
//!    the real cache past its capacity

#![cfg(test)]

use std::collections::HashSet;

use proptest::prelude::*;

use super::element::{Element, ObjectId};
use super::params::CacheParameters;
use super::real_cache::{EvictionMode, RealCache};
use super::virtual_cache::VirtualCache;

// =============================================================================
// Property Strategies
// =============================================================================

/// Strategy for one batch of merge candidates
fn candidate_batch_strategy() -> impl Strategy<Value = Vec<(ObjectId, f64)>> {
    prop::collection::vec((0u64..40, 0.0f64..1.0), 0..12)
}

/// Strategy for a short access stream over a small object space
fn stream_strategy() -> impl Strategy<Value = Vec<ObjectId>> {
    prop::collection::vec(0u64..16, 1..200)
}

/// Strategy for real cache operations: (op, id, belief)
fn real_cache_ops_strategy() -> impl Strategy<Value = Vec<(u8, ObjectId, f64)>> {
    prop::collection::vec((0u8..4, 0u64..30, 0.0f64..1.0), 1..150)
}

fn params(cache_size: usize) -> CacheParameters {
    CacheParameters {
        cache_size,
        candidate_set_size: cache_size.min(3),
        voter_window_size: 3,
        history_window_size: 2,
        belief_threshold: 0.0,
        max_tracked_objects: 64,
        min_history_windows: 1,
    }
}

// =============================================================================
// Virtual Cache Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: residency stays bounded and advice partitions cleanly.
    #[test]
    fn prop_merge_bounded_and_partitioned(
        cache_size in 1usize..8,
        batches in prop::collection::vec(candidate_batch_strategy(), 1..20),
    ) {
        let mut cache = VirtualCache::new(params(cache_size))?;

        for batch in batches {
            let before: HashSet<ObjectId> = cache.resident_ids().into_iter().collect();
            let candidates = batch.iter().map(|&(id, b)| Element::new(id, b)).collect();

            let outcome = cache.merge(candidates);
            prop_assert!(cache.len() <= cache_size);

            let prefetch: HashSet<_> = outcome.prefetch.iter().copied().collect();
            let evict: HashSet<_> = outcome.evict.iter().copied().collect();
            prop_assert!(prefetch.is_disjoint(&evict));

            for id in &outcome.evict {
                prop_assert!(before.contains(id));
                prop_assert!(!cache.contains(*id));
            }
            for id in &outcome.prefetch {
                prop_assert!(!before.contains(id));
                prop_assert!(cache.contains(*id));
            }
        }
    }

    /// Property: resident set stays sorted by belief, descending.
    #[test]
    fn prop_merge_keeps_rank_order(
        batches in prop::collection::vec(candidate_batch_strategy(), 1..10),
    ) {
        let mut cache = VirtualCache::new(params(6))?;
        for batch in batches {
            cache.merge(batch.iter().map(|&(id, b)| Element::new(id, b)).collect());
            let beliefs: Vec<f64> = cache.resident().iter().map(|e| e.belief).collect();
            for pair in beliefs.windows(2) {
                prop_assert!(pair[0] >= pair[1]);
            }
        }
    }

    /// Property: driving the full statistics path never overfills the cache.
    #[test]
    fn prop_update_history_bounded(
        cache_size in 1usize..6,
        stream in stream_strategy(),
    ) {
        let mut cache = VirtualCache::new(params(cache_size))?;
        for id in stream {
            let outcome = cache.update_history(id)?;
            prop_assert!(cache.len() <= cache_size);
            prop_assert!(outcome.prefetch.iter().all(|id| !outcome.evict.contains(id)));
        }
    }
}

// =============================================================================
// Real Cache Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: capacity holds after every mutating call in either mode.
    #[test]
    fn prop_real_cache_bounded(
        capacity in 1usize..8,
        lru in any::<bool>(),
        ops in real_cache_ops_strategy(),
    ) {
        let mode = if lru { EvictionMode::Lru } else { EvictionMode::Belief };
        let mut cache = RealCache::new(capacity, mode)?;

        for (op, id, belief) in ops {
            match op {
                0 | 1 => {
                    let evicted = cache.insert(Element::new(id, belief));
                    prop_assert!(evicted.iter().all(|e| !cache.contains(e.id)));
                }
                2 => {
                    cache.hit(id);
                }
                _ => {
                    cache.pin(id);
                }
            }
            prop_assert!(cache.len() <= capacity);
            prop_assert_eq!(cache.ids().len(), cache.len());
        }
    }
}
