//! Trace Simulator
//!
//! Replays a workload through the prediction core on the calling thread,
//! with the drift detector and switch controller inline when adaptation is
//! enabled. A training prefix only feeds the statistics; a warm-up prefix
//! of the replay is processed but not counted.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::workload::Workload;
use crate::cache::{CacheParameters, EvictionMode, ObjectId, ObjectInterner, UsageHistogram};
use crate::drift::DriftDetector;
use crate::engine::{EngineConfig, EngineMetrics, PredictionCore, DEFAULT_HIT_WINDOW};
use crate::error::Result;
use crate::switch::SwitchController;

/// Configuration for one simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub engine: EngineConfig,

    /// Replayed accesses excluded from hit counting
    pub warmup: u64,

    /// Leading accesses that only train the statistics
    pub train: usize,

    /// Map trace IDs onto dense IDs in first-seen order
    pub intern_ids: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            warmup: 0,
            train: 0,
            intern_ids: true,
        }
    }
}

impl SimulationConfig {
    /// Load a YAML document; missing fields keep their defaults
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.engine.validate()?;
        Ok(config)
    }
}

/// Outcome of a simulation run
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub generated_at: DateTime<Utc>,
    pub trained: u64,
    pub replayed: u64,
    pub counted: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub insertions: u64,
    pub unused: u64,
    pub used_ratio: f64,
    pub usage: UsageHistogram,
    pub phase_shifts: u64,
    pub promotions: u64,
    pub eviction_mode: EvictionMode,
    pub real_capacity: usize,
    pub parameters: CacheParameters,
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "accesses:      {} replayed, {} trained", self.replayed, self.trained)?;
        writeln!(
            f,
            "hits:          {} / {} ({:.4})",
            self.hits, self.counted, self.hit_ratio
        )?;
        writeln!(
            f,
            "prefetched:    {} ({} unused, used ratio {:.4})",
            self.insertions, self.unused, self.used_ratio
        )?;
        writeln!(
            f,
            "adaptation:    {} phase shifts, {} promotions",
            self.phase_shifts, self.promotions
        )?;
        writeln!(
            f,
            "real cache:    {} entries, {}",
            self.real_capacity, self.eviction_mode
        )?;
        write!(
            f,
            "parameters:    size={} candidates={} voters={} window={} threshold={:.2}",
            self.parameters.cache_size,
            self.parameters.candidate_set_size,
            self.parameters.voter_window_size,
            self.parameters.history_window_size,
            self.parameters.belief_threshold
        )
    }
}

/// Synchronous trace replayer
#[derive(Debug)]
pub struct Simulator {
    config: SimulationConfig,
    core: PredictionCore,
    detector: Option<DriftDetector>,
    switch: Option<SwitchController>,
    interner: ObjectInterner,
    metrics: EngineMetrics,
    phase_shifts: u64,
    promotions: u64,
}

impl Simulator {
    /// Build the caches and, when adaptive, the detector and controller
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let engine = &config.engine;
        engine.validate()?;

        let hit_window = usize::try_from(engine.drift.cycle_ticks).unwrap_or(DEFAULT_HIT_WINDOW);
        let core = PredictionCore::new(
            engine.cache.clone(),
            engine.real_capacity,
            engine.eviction_mode,
        )?
        .with_hit_window(hit_window);
        let (detector, switch) = if engine.adaptive {
            (
                Some(DriftDetector::new(engine.drift.clone())?),
                Some(SwitchController::new(
                    engine.switch.clone(),
                    core.primary().clone(),
                )?),
            )
        } else {
            (None, None)
        };
        let interner = ObjectInterner::new(engine.cache.max_tracked_objects)?;

        Ok(Self {
            config,
            core,
            detector,
            switch,
            interner,
            metrics: EngineMetrics::new()?,
            phase_shifts: 0,
            promotions: 0,
        })
    }

    fn resolve(&self, id: ObjectId) -> Result<ObjectId> {
        if self.config.intern_ids {
            self.interner.intern(id)
        } else {
            Ok(id)
        }
    }

    /// Replay `workload` and report
    pub fn run(&mut self, workload: &Workload) -> Result<SimulationReport> {
        let (train, replay) = workload.split(self.config.train);
        info!(
            train = train.len(),
            replay = replay.len(),
            warmup = self.config.warmup,
            adaptive = self.detector.is_some(),
            "Simulation started"
        );

        for &raw in train {
            let id = self.resolve(raw)?;
            self.core.primary().write().update_history(id)?;
        }

        let mut hits = 0u64;
        let mut misses = 0u64;
        for (position, &raw) in replay.iter().enumerate() {
            let id = self.resolve(raw)?;
            let outcome = match self.core.access(id) {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.metrics.rejected.inc();
                    return Err(e);
                }
            };
            self.metrics.record_access(&outcome);

            if position as u64 >= self.config.warmup {
                if outcome.real_hit {
                    hits += 1;
                } else {
                    misses += 1;
                }
            }

            if let Some(detector) = self.detector.as_mut() {
                if detector.update_history(id, outcome.hitrate) {
                    self.phase_shifts += 1;
                    self.metrics.phase_shifts.inc();
                    if let Some(switch) = self.switch.as_mut() {
                        switch.start_evaluation();
                    }
                }
            }
            if let Some(switch) = self.switch.as_mut() {
                if let Some(report) = switch.observe(id, outcome.primary_hit)? {
                    if report.promoted {
                        self.promotions += 1;
                        self.metrics.promotions.inc();
                        let change = self.core.apply_changes(&report.primary_changes);
                        self.metrics.record_residency(&change);
                    }
                    debug!(
                        parameter = %report.parameter,
                        winner = report.winner,
                        "Simulated switch cycle"
                    );
                }
            }
        }

        let report = self.report(train.len() as u64, replay.len() as u64, hits, misses);
        info!(
            hit_ratio = report.hit_ratio,
            used_ratio = report.used_ratio,
            phase_shifts = report.phase_shifts,
            "Simulation finished"
        );
        Ok(report)
    }

    fn report(&self, trained: u64, replayed: u64, hits: u64, misses: u64) -> SimulationReport {
        let primary = self.core.primary().read();
        let usage = primary.usage_histogram();
        let insertions = primary.insertions();
        let unused = usage.unused();
        let counted = hits + misses;

        SimulationReport {
            generated_at: Utc::now(),
            trained,
            replayed,
            counted,
            hits,
            misses,
            hit_ratio: ratio(hits, counted),
            insertions,
            unused,
            used_ratio: if insertions == 0 {
                0.0
            } else {
                1.0 - ratio(unused, insertions)
            },
            usage,
            phase_shifts: self.phase_shifts,
            promotions: self.promotions,
            eviction_mode: self.core.real().mode(),
            real_capacity: self.core.real().capacity(),
            parameters: primary.parameters().clone(),
        }
    }

    /// The prediction core
    pub fn core(&self) -> &PredictionCore {
        &self.core
    }

    /// Counters accumulated over every run
    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// The switch controller, when adaptive
    pub fn switch(&self) -> Option<&SwitchController> {
        self.switch.as_ref()
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
