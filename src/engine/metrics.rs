//! Engine Metrics
//!
//! Prometheus counters for the access path and the adaptation loop, kept
//! in a private registry so several engines can live in one process.

use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};

use super::core::{AccessOutcome, ResidencyChange};
use crate::error::{Error, Result};

/// Prometheus instruments of one engine
#[derive(Debug, Clone)]
pub struct EngineMetrics {
    registry: Registry,
    pub accesses: IntCounter,
    pub real_hits: IntCounter,
    pub prefetches: IntCounter,
    pub evictions: IntCounter,
    pub rejected: IntCounter,
    pub phase_shifts: IntCounter,
    pub promotions: IntCounter,
    pub hit_ratio: Gauge,
}

impl EngineMetrics {
    /// Create and register every instrument
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("beliefcache".to_string()), None)?;

        let accesses = IntCounter::new("accesses_total", "Accesses processed")?;
        let real_hits = IntCounter::new("real_hits_total", "Accesses served by the real cache")?;
        let prefetches = IntCounter::new(
            "prefetches_total",
            "Objects admitted to the virtual cache",
        )?;
        let evictions = IntCounter::new("evictions_total", "Objects dropped from the real cache")?;
        let rejected = IntCounter::new("rejected_total", "Accesses rejected as out of range")?;
        let phase_shifts = IntCounter::new("phase_shifts_total", "Detected phase shifts")?;
        let promotions = IntCounter::new(
            "promotions_total",
            "Alternate configurations promoted to primary",
        )?;
        let hit_ratio = Gauge::new("hit_ratio", "Real cache hit ratio")?;

        registry.register(Box::new(accesses.clone()))?;
        registry.register(Box::new(real_hits.clone()))?;
        registry.register(Box::new(prefetches.clone()))?;
        registry.register(Box::new(evictions.clone()))?;
        registry.register(Box::new(rejected.clone()))?;
        registry.register(Box::new(phase_shifts.clone()))?;
        registry.register(Box::new(promotions.clone()))?;
        registry.register(Box::new(hit_ratio.clone()))?;

        Ok(Self {
            registry,
            accesses,
            real_hits,
            prefetches,
            evictions,
            rejected,
            phase_shifts,
            promotions,
            hit_ratio,
        })
    }

    /// Account for one processed access
    pub fn record_access(&self, outcome: &AccessOutcome) {
        self.accesses.inc();
        if outcome.real_hit {
            self.real_hits.inc();
        }
        self.prefetches.inc_by(outcome.prefetch.len() as u64);
        self.evictions.inc_by(outcome.evicted.len() as u64);
        // lifetime ratio; the windowed rate only feeds drift detection
        self.hit_ratio.set(self.real_hits.get() as f64 / self.accesses.get() as f64);
    }

    /// Account for real cache changes that followed a promotion
    pub fn record_residency(&self, change: &ResidencyChange) {
        self.prefetches.inc_by(change.prefetch.len() as u64);
        self.evictions.inc_by(change.evicted.len() as u64);
    }

    /// The underlying registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every instrument in the text exposition format
    pub fn encode_text(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| Error::Internal(format!("metrics are not valid UTF-8: {}", e)))
    }
}
