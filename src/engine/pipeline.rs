//! Prediction Engine
//!
//! Three single-consumer queues, one per subsystem:
//!
//! ```text
//!                 submit(id)
//!                     │
//!                     ▼
//!   ┌──────────────────────────────────┐   advice   ┌──────────────┐
//!   │ prediction: PredictionCore       │ ─────────▶ │ CacheAdvisor │
//!   └──────┬─────────────────┬─────────┘            └──────────────┘
//!          │ (id, hitrate)   │ (id, primary_hit)          ▲
//!          ▼                 ▼                            │
//!   ┌──────────────┐  ┌──────────────────┐   promotion    │
//!   │ detection:   │  │ switch:          │ ───────────────┘
//!   │ DriftDetector│─▶│ SwitchController │
//!   └──────────────┘  └──────────────────┘
//!        phase shift ─▶ StartEvaluation
//! ```
//!
//! The primary virtual cache is shared between the prediction consumer,
//! which drives it, and the switch controller, which overwrites it under
//! the write lock when an alternate wins. The switch consumer then carries
//! the primary's membership change into the real cache and publishes it as
//! residency advice. Cross-queue ordering is not guaranteed.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::core::{EngineSnapshot, PredictionCore, DEFAULT_HIT_WINDOW};
use super::events::{CacheAdvice, DetectionInput, SwitchInput};
use super::metrics::EngineMetrics;
use super::ports::CacheAdvisor;
use super::queue::{QueueConsumer, QueueSender, QueueStats, WorkQueue};
use crate::cache::{
    chunk_span, CacheParameters, EvictionMode, ObjectId, ObjectInterner, RealCache,
    SharedVirtualCache, VirtualCache, DEFAULT_CHUNK_SIZE, DEFAULT_REAL_CACHE_CAPACITY,
};
use crate::drift::{DriftConfig, DriftDetector};
use crate::error::{Error, Result};
use crate::switch::{SwitchConfig, SwitchController, SwitchState};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the whole engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Virtual cache and statistics parameters
    pub cache: CacheParameters,

    /// Real cache capacity (elements)
    pub real_capacity: usize,

    /// Real cache eviction order
    pub eviction_mode: EvictionMode,

    /// Byte granularity of `submit_read`
    pub chunk_size: u64,

    /// Run the drift detector and switch controller
    pub adaptive: bool,

    pub drift: DriftConfig,

    pub switch: SwitchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache: CacheParameters::default(),
            real_capacity: DEFAULT_REAL_CACHE_CAPACITY,
            eviction_mode: EvictionMode::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            adaptive: true,
            drift: DriftConfig::default(),
            switch: SwitchConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        if self.real_capacity == 0 {
            return Err(Error::InvalidConfig(
                "real_capacity must be at least 1".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be at least 1".into()));
        }
        if self.adaptive {
            self.drift.validate()?;
            self.switch.validate()?;
        }
        Ok(())
    }

    /// Load a YAML document; missing fields keep their defaults
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Queue Consumers
// =============================================================================

struct PredictionConsumer {
    core: Arc<Mutex<PredictionCore>>,
    advisor: Arc<dyn CacheAdvisor>,
    metrics: EngineMetrics,
    detection: Option<QueueSender<DetectionInput>>,
    switch: Option<QueueSender<SwitchInput>>,
}

#[async_trait]
impl QueueConsumer<ObjectId> for PredictionConsumer {
    async fn process(&mut self, object_id: ObjectId) -> Result<()> {
        let result = self.core.lock().access(object_id);
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.metrics.rejected.inc();
                return Err(e);
            }
        };
        self.metrics.record_access(&outcome);

        let mut advice: Vec<CacheAdvice> = outcome
            .prefetch
            .iter()
            .map(|e| CacheAdvice::prefetch(e.id, e.belief, outcome.tick))
            .collect();
        advice.extend(
            outcome
                .evicted
                .iter()
                .map(|e| CacheAdvice::evict(e.id, outcome.tick)),
        );
        if !advice.is_empty() {
            if let Err(e) = self.advisor.publish_all(advice).await {
                warn!(object_id, error = %e, "Advisor rejected advice");
            }
        }

        if let Some(detection) = &self.detection {
            detection.push(DetectionInput::Access {
                object_id,
                hitrate: outcome.hitrate,
            })?;
        }
        if let Some(switch) = &self.switch {
            switch.push(SwitchInput::Access {
                object_id,
                primary_hit: outcome.primary_hit,
            })?;
        }
        Ok(())
    }
}

struct DetectionConsumer {
    detector: Arc<Mutex<DriftDetector>>,
    advisor: Arc<dyn CacheAdvisor>,
    metrics: EngineMetrics,
}

#[async_trait]
impl QueueConsumer<DetectionInput> for DetectionConsumer {
    async fn process(&mut self, input: DetectionInput) -> Result<()> {
        let DetectionInput::Access { object_id, hitrate } = input;
        let shift = {
            let mut detector = self.detector.lock();
            detector
                .update_history(object_id, hitrate)
                .then(|| detector.snapshot())
        };

        if let Some(signals) = shift {
            self.metrics.phase_shifts.inc();
            self.advisor
                .publish(CacheAdvice::phase_shift(signals.tick, signals.phase_shifts))
                .await
                .map_err(|e| Error::Advisor(e.to_string()))?;
        }
        Ok(())
    }
}

struct SwitchConsumer {
    controller: Arc<Mutex<SwitchController>>,
    core: Arc<Mutex<PredictionCore>>,
    advisor: Arc<dyn CacheAdvisor>,
    metrics: EngineMetrics,
}

#[async_trait]
impl QueueConsumer<SwitchInput> for SwitchConsumer {
    async fn process(&mut self, input: SwitchInput) -> Result<()> {
        let report = {
            let mut controller = self.controller.lock();
            match input {
                SwitchInput::StartEvaluation => {
                    controller.start_evaluation();
                    None
                }
                SwitchInput::Access {
                    object_id,
                    primary_hit,
                } => controller.observe(object_id, primary_hit)?,
            }
        };

        if let Some(report) = report.filter(|r| r.promoted) {
            self.metrics.promotions.inc();

            let (change, tick) = {
                let mut core = self.core.lock();
                (core.apply_changes(&report.primary_changes), core.accesses())
            };
            self.metrics.record_residency(&change);
            let mut advice: Vec<CacheAdvice> = change
                .prefetch
                .iter()
                .map(|e| CacheAdvice::prefetch(e.id, e.belief, tick))
                .collect();
            advice.extend(change.evicted.iter().map(|e| CacheAdvice::evict(e.id, tick)));
            if !advice.is_empty() {
                self.advisor
                    .publish_all(advice)
                    .await
                    .map_err(|e| Error::Advisor(e.to_string()))?;
            }

            let hit_rate = report.hit_rates[report.winner];
            self.advisor
                .publish(CacheAdvice::promotion(
                    report.winner,
                    report.parameter,
                    hit_rate,
                    report.parameters,
                ))
                .await
                .map_err(|e| Error::Advisor(e.to_string()))?;
        }
        Ok(())
    }
}

// =============================================================================
// Prediction Engine
// =============================================================================

/// Counters from the three queues at shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub prediction: QueueStats,
    pub detection: Option<QueueStats>,
    pub switch: Option<QueueStats>,
}

/// Asynchronous predictive cache engine
pub struct PredictionEngine {
    config: EngineConfig,
    core: Arc<Mutex<PredictionCore>>,
    primary: SharedVirtualCache,
    controller: Option<Arc<Mutex<SwitchController>>>,
    interner: ObjectInterner,
    metrics: EngineMetrics,
    prediction: WorkQueue<ObjectId>,
    detection: Option<WorkQueue<DetectionInput>>,
    switch: Option<WorkQueue<SwitchInput>>,
}

impl std::fmt::Debug for PredictionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionEngine")
            .field("config", &self.config)
            .field("interned", &self.interner.len())
            .finish_non_exhaustive()
    }
}

impl PredictionEngine {
    /// Build the engine and spawn its queues on the current runtime
    pub fn start(config: EngineConfig, advisor: Arc<dyn CacheAdvisor>) -> Result<Self> {
        config.validate()?;
        let metrics = EngineMetrics::new()?;

        let primary = VirtualCache::shared(config.cache.clone())?;
        let real = RealCache::new(config.real_capacity, config.eviction_mode)?;
        let hit_window = usize::try_from(config.drift.cycle_ticks).unwrap_or(DEFAULT_HIT_WINDOW);
        let core = Arc::new(Mutex::new(
            PredictionCore::with_primary(real, Arc::clone(&primary)).with_hit_window(hit_window),
        ));
        let interner = ObjectInterner::new(config.cache.max_tracked_objects)?;

        let (controller, detection, switch) = if config.adaptive {
            let controller = Arc::new(Mutex::new(SwitchController::new(
                config.switch.clone(),
                Arc::clone(&primary),
            )?));
            let switch = WorkQueue::spawn(
                "switch",
                SwitchConsumer {
                    controller: Arc::clone(&controller),
                    core: Arc::clone(&core),
                    advisor: Arc::clone(&advisor),
                    metrics: metrics.clone(),
                },
            );

            let trigger = switch.sender();
            let detector = DriftDetector::with_callback(
                config.drift.clone(),
                Box::new(move || {
                    if let Err(e) = trigger.push(SwitchInput::StartEvaluation) {
                        warn!(error = %e, "Could not start switch evaluation");
                    }
                }),
            )?;
            let detection = WorkQueue::spawn(
                "detection",
                DetectionConsumer {
                    detector: Arc::new(Mutex::new(detector)),
                    advisor: Arc::clone(&advisor),
                    metrics: metrics.clone(),
                },
            );
            (Some(controller), Some(detection), Some(switch))
        } else {
            (None, None, None)
        };

        let prediction = WorkQueue::spawn(
            "prediction",
            PredictionConsumer {
                core: Arc::clone(&core),
                advisor,
                metrics: metrics.clone(),
                detection: detection.as_ref().map(WorkQueue::sender),
                switch: switch.as_ref().map(WorkQueue::sender),
            },
        );

        info!(
            cache_size = config.cache.cache_size,
            real_capacity = config.real_capacity,
            mode = %config.eviction_mode,
            adaptive = config.adaptive,
            "Prediction engine started"
        );

        Ok(Self {
            config,
            core,
            primary,
            controller,
            interner,
            metrics,
            prediction,
            detection,
            switch,
        })
    }

    /// Queue one access by dense object ID
    pub fn submit(&self, object_id: ObjectId) -> Result<()> {
        self.prediction.push(object_id)
    }

    /// Queue several accesses in order
    pub fn submit_all(&self, object_ids: impl IntoIterator<Item = ObjectId>) -> Result<()> {
        for id in object_ids {
            self.submit(id)?;
        }
        Ok(())
    }

    /// Queue a byte-range read as one access per covered chunk.
    /// Returns the dense IDs submitted.
    pub fn submit_read(&self, offset: u64, length: u64) -> Result<Vec<ObjectId>> {
        let mut submitted = Vec::new();
        for chunk in chunk_span(offset, length, self.config.chunk_size) {
            let id = self.interner.intern(chunk)?;
            self.submit(id)?;
            submitted.push(id);
        }
        Ok(submitted)
    }

    /// Address-to-ID mapping used by `submit_read`
    pub fn interner(&self) -> &ObjectInterner {
        &self.interner
    }

    /// Pin an object in the real cache
    pub fn pin(&self, object_id: ObjectId) -> bool {
        self.core.lock().pin(object_id)
    }

    /// Release a pin
    pub fn unpin(&self, object_id: ObjectId) -> bool {
        self.core.lock().unpin(object_id)
    }

    /// Shared handle to the primary virtual cache
    pub fn primary(&self) -> SharedVirtualCache {
        Arc::clone(&self.primary)
    }

    /// Switch controller state, when adaptation is enabled
    pub fn switch_state(&self) -> Option<SwitchState> {
        self.controller.as_ref().map(|c| c.lock().state())
    }

    /// Prometheus instruments
    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Configuration in use
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Copy out the current state
    pub fn snapshot(&self) -> EngineSnapshot {
        let mut snapshot = self.core.lock().snapshot();
        snapshot.phase_shifts = self.metrics.phase_shifts.get();
        snapshot.promotions = self.metrics.promotions.get();
        snapshot
    }

    /// Drain every queue in pipeline order and stop
    pub async fn shutdown(self) -> Result<(EngineSnapshot, EngineStats)> {
        let prediction = self.prediction.shutdown().await?;
        let detection = match self.detection {
            Some(queue) => Some(queue.shutdown().await?),
            None => None,
        };
        let switch = match self.switch {
            Some(queue) => Some(queue.shutdown().await?),
            None => None,
        };

        let mut snapshot = self.core.lock().snapshot();
        snapshot.phase_shifts = self.metrics.phase_shifts.get();
        snapshot.promotions = self.metrics.promotions.get();

        info!(
            accesses = snapshot.accesses,
            hit_ratio = snapshot.hit_ratio,
            phase_shifts = snapshot.phase_shifts,
            promotions = snapshot.promotions,
            "Prediction engine stopped"
        );

        Ok((
            snapshot,
            EngineStats {
                prediction,
                detection,
                switch,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::advisor::InMemoryAdviceCollector;
    use assert_matches::assert_matches;

    fn small_config(adaptive: bool) -> EngineConfig {
        EngineConfig {
            cache: CacheParameters {
                cache_size: 3,
                candidate_set_size: 2,
                voter_window_size: 3,
                history_window_size: 3,
                belief_threshold: 0.0,
                max_tracked_objects: 64,
                min_history_windows: 1,
            },
            real_capacity: 3,
            eviction_mode: EvictionMode::Lru,
            adaptive,
            switch: SwitchConfig {
                seed: Some(1),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.real_capacity, 655_360);
        assert_eq!(config.eviction_mode, EvictionMode::Belief);
        assert_eq!(config.chunk_size, 1024);
        assert!(config.adaptive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_engine_config_from_yaml() {
        let config = EngineConfig::from_yaml(
            "real_capacity: 64\neviction_mode: lru\ncache:\n  cache_size: 32\n",
        )
        .unwrap();
        assert_eq!(config.real_capacity, 64);
        assert_eq!(config.eviction_mode, EvictionMode::Lru);
        assert_eq!(config.cache.cache_size, 32);
        assert_eq!(config.cache.candidate_set_size, 10);

        assert_matches!(
            EngineConfig::from_yaml("real_capacity: 0\n"),
            Err(Error::InvalidConfig(_))
        );
    }

    #[tokio::test]
    async fn test_engine_processes_and_drains() {
        let collector = Arc::new(InMemoryAdviceCollector::new());
        let engine = PredictionEngine::start(small_config(true), collector.clone()).unwrap();

        engine.submit_all([1, 2, 3, 1, 2, 3, 1, 2, 3, 4]).unwrap();
        let (snapshot, stats) = engine.shutdown().await.unwrap();

        assert_eq!(snapshot.accesses, 10);
        assert_eq!(stats.prediction.processed, 10);
        assert_eq!(stats.detection.map(|s| s.processed), Some(10));
        assert_eq!(stats.switch.map(|s| s.processed), Some(10));
        assert_eq!(collector.evicted(), vec![1]);
        assert!(collector.advised_resident(2));
    }

    #[tokio::test]
    async fn test_promotion_reaches_real_cache_and_advisor() {
        let config = small_config(true);
        let primary = VirtualCache::shared(config.cache.clone()).unwrap();
        let real = RealCache::new(8, EvictionMode::Belief).unwrap();
        let core = Arc::new(Mutex::new(PredictionCore::with_primary(
            real,
            Arc::clone(&primary),
        )));
        let controller = SwitchController::new(
            SwitchConfig {
                cycle_ticks: 30,
                cycles_per_test: 1,
                alternates: 1,
                seed: Some(3),
            },
            Arc::clone(&primary),
        )
        .unwrap();
        let collector = Arc::new(InMemoryAdviceCollector::new());
        let metrics = EngineMetrics::new().unwrap();
        let mut consumer = SwitchConsumer {
            controller: Arc::new(Mutex::new(controller)),
            core: Arc::clone(&core),
            advisor: collector.clone(),
            metrics: metrics.clone(),
        };

        consumer.process(SwitchInput::StartEvaluation).await.unwrap();
        // the primary never hits, so the alternate wins the cycle
        for i in 0..30u64 {
            consumer
                .process(SwitchInput::Access {
                    object_id: 1 + i % 3,
                    primary_hit: false,
                })
                .await
                .unwrap();
        }

        assert_eq!(collector.promotions().len(), 1);
        let resident = primary.read().resident_ids();
        assert!(!resident.is_empty());
        assert_eq!(collector.prefetched(), resident);
        assert!(collector.evicted().is_empty());
        for id in &resident {
            assert!(core.lock().real().contains(*id));
            assert!(collector.advised_resident(*id));
        }
        assert_eq!(metrics.prefetches.get(), resident.len() as u64);
        assert_eq!(metrics.promotions.get(), 1);
    }

    #[tokio::test]
    async fn test_rejected_ids_are_counted() {
        let collector = Arc::new(InMemoryAdviceCollector::new());
        let engine = PredictionEngine::start(small_config(false), collector).unwrap();

        engine.submit_all([1, 500, 2]).unwrap();
        let metrics = engine.metrics().clone();
        let (snapshot, stats) = engine.shutdown().await.unwrap();

        assert_eq!(snapshot.accesses, 2);
        assert_eq!(stats.prediction.failed, 1);
        assert_eq!(metrics.rejected.get(), 1);
        assert!(stats.detection.is_none());
    }

    #[tokio::test]
    async fn test_submit_read_interns_chunks() {
        let collector = Arc::new(InMemoryAdviceCollector::new());
        let engine = PredictionEngine::start(small_config(false), collector).unwrap();

        let ids = engine.submit_read(4096, 2048).unwrap();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(engine.interner().resolve(1), Some(5));

        let again = engine.submit_read(5200, 10).unwrap();
        assert_eq!(again, vec![1]);
        engine.shutdown().await.unwrap();
    }
}
