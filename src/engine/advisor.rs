//! Cache Advisors
//!
//! Two [`CacheAdvisor`] backends. `LoggingAdvisor` traces every advice
//! with its own fields: residency advice at debug, adaptation events at
//! info. `InMemoryAdviceCollector` keeps advice in arrival order with a
//! per-object index, which is what tests and offline replays ask about.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::events::CacheAdvice;
use super::ports::CacheAdvisor;
use crate::cache::ObjectId;
use crate::error::Result;

/// Advisor that only traces advice
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingAdvisor;

impl LoggingAdvisor {
    pub fn new() -> Self {
        Self
    }

    fn trace(advice: &CacheAdvice) {
        match advice {
            CacheAdvice::Prefetch {
                object_id,
                belief,
                tick,
                ..
            } => debug!(object_id, belief, tick, "Prefetch advised"),
            CacheAdvice::Evict {
                object_id, tick, ..
            } => debug!(object_id, tick, "Eviction advised"),
            CacheAdvice::PhaseShift {
                tick, phase_shifts, ..
            } => info!(tick, phase_shifts, "Workload phase shift"),
            CacheAdvice::Promotion {
                winner,
                parameter,
                hit_rate,
                parameters,
                ..
            } => info!(
                winner,
                %parameter,
                hit_rate,
                cache_size = parameters.cache_size,
                belief_threshold = parameters.belief_threshold,
                history_window = parameters.history_window_size,
                voter_window = parameters.voter_window_size,
                "Alternate configuration promoted"
            ),
        }
    }
}

#[async_trait]
impl CacheAdvisor for LoggingAdvisor {
    async fn publish(&self, advice: CacheAdvice) -> Result<()> {
        Self::trace(&advice);
        Ok(())
    }

    async fn publish_all(&self, advice: Vec<CacheAdvice>) -> Result<()> {
        advice.iter().for_each(Self::trace);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct AdviceLog {
    entries: Vec<CacheAdvice>,
    // positions in `entries` of the residency advice for each object
    by_object: HashMap<ObjectId, Vec<usize>>,
}

impl AdviceLog {
    fn push(&mut self, advice: CacheAdvice) {
        if let Some(object_id) = advice.object_id() {
            self.by_object
                .entry(object_id)
                .or_default()
                .push(self.entries.len());
        }
        self.entries.push(advice);
    }

    fn ids_where(&self, keep: impl Fn(&CacheAdvice) -> bool) -> Vec<ObjectId> {
        self.entries
            .iter()
            .filter(|a| keep(a))
            .filter_map(CacheAdvice::object_id)
            .collect()
    }
}

/// Advisor that records everything it receives
#[derive(Debug, Default)]
pub struct InMemoryAdviceCollector {
    log: RwLock<AdviceLog>,
}

impl InMemoryAdviceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every advice in arrival order
    pub fn advice(&self) -> Vec<CacheAdvice> {
        self.log.read().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.log.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.read().entries.is_empty()
    }

    pub fn clear(&self) {
        let mut log = self.log.write();
        log.entries.clear();
        log.by_object.clear();
    }

    /// Objects advised for prefetch, in arrival order
    pub fn prefetched(&self) -> Vec<ObjectId> {
        self.log
            .read()
            .ids_where(|a| matches!(a, CacheAdvice::Prefetch { .. }))
    }

    /// Objects advised for eviction, in arrival order
    pub fn evicted(&self) -> Vec<ObjectId> {
        self.log
            .read()
            .ids_where(|a| matches!(a, CacheAdvice::Evict { .. }))
    }

    /// Residency advice for one object, oldest first
    pub fn history(&self, object_id: ObjectId) -> Vec<CacheAdvice> {
        let log = self.log.read();
        log.by_object
            .get(&object_id)
            .map(|positions| positions.iter().map(|&i| log.entries[i].clone()).collect())
            .unwrap_or_default()
    }

    /// Whether the latest advice for the object was a prefetch
    pub fn advised_resident(&self, object_id: ObjectId) -> bool {
        let log = self.log.read();
        log.by_object
            .get(&object_id)
            .and_then(|positions| positions.last())
            .is_some_and(|&i| matches!(log.entries[i], CacheAdvice::Prefetch { .. }))
    }

    /// Phase shift notifications received
    pub fn phase_shifts(&self) -> usize {
        self.log
            .read()
            .entries
            .iter()
            .filter(|a| matches!(a, CacheAdvice::PhaseShift { .. }))
            .count()
    }

    /// Promotion notifications, in arrival order
    pub fn promotions(&self) -> Vec<CacheAdvice> {
        self.log
            .read()
            .entries
            .iter()
            .filter(|a| matches!(a, CacheAdvice::Promotion { .. }))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CacheAdvisor for InMemoryAdviceCollector {
    async fn publish(&self, advice: CacheAdvice) -> Result<()> {
        self.log.write().push(advice);
        Ok(())
    }

    async fn publish_all(&self, advice: Vec<CacheAdvice>) -> Result<()> {
        let mut log = self.log.write();
        for item in advice {
            log.push(item);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheParameters;
    use crate::switch::Tunable;

    #[tokio::test]
    async fn test_logging_advisor_accepts_every_variant() {
        let advisor = LoggingAdvisor::new();
        advisor
            .publish(CacheAdvice::prefetch(1, 0.5, 0))
            .await
            .unwrap();
        advisor
            .publish_all(vec![
                CacheAdvice::evict(1, 1),
                CacheAdvice::phase_shift(2, 1),
                CacheAdvice::promotion(1, Tunable::Threshold, 0.4, CacheParameters::default()),
            ])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_collector_indexes_by_object() {
        let collector = InMemoryAdviceCollector::new();
        assert!(collector.is_empty());

        collector
            .publish(CacheAdvice::prefetch(4, 0.2, 0))
            .await
            .unwrap();
        collector
            .publish_all(vec![
                CacheAdvice::prefetch(5, 0.3, 1),
                CacheAdvice::phase_shift(1, 1),
                CacheAdvice::evict(4, 2),
            ])
            .await
            .unwrap();

        assert_eq!(collector.len(), 4);
        assert_eq!(collector.prefetched(), vec![4, 5]);
        assert_eq!(collector.evicted(), vec![4]);
        assert_eq!(collector.phase_shifts(), 1);
        assert!(collector.promotions().is_empty());

        let history = collector.history(4);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].event_type(), "Prefetch");
        assert_eq!(history[1].event_type(), "Evict");
        assert!(collector.history(9).is_empty());

        assert!(!collector.advised_resident(4));
        assert!(collector.advised_resident(5));

        collector.clear();
        assert!(collector.is_empty());
        assert!(collector.history(5).is_empty());
    }

    #[test]
    fn test_collector_from_sync_context() {
        let collector = InMemoryAdviceCollector::new();
        tokio_test::block_on(collector.publish(CacheAdvice::evict(9, 3))).unwrap();
        assert_eq!(collector.evicted(), vec![9]);
        assert!(!collector.advised_resident(9));
    }
}
