//! Concept Drift Detector
//!
//! Watches three behavioural signals of the access stream and raises a
//! phase-shift event when all of them change at once.
//!
//! # Signals
//!
//! ```text
//!   frequency = w_f * count(obj)       + (1 - w_f) * frequency
//!   recency   = w_r * min(Δt, max_age) + (1 - w_r) * recency
//!   hitrate   = caller supplied
//! ```
//!
//! Every `cycle_ticks` accesses the three signals are scaled into `[0, 1]`
//! and each is fed to its own [`Adwin`]. Only a cycle in which all three
//! detectors report a change fires the callback; the detectors then start
//! over so one divergence produces one event.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::adwin::{Adwin, AdwinConfig};
use crate::cache::ObjectId;
use crate::error::{Error, Result};

/// Default accesses per detection cycle
pub const DEFAULT_CYCLE_TICKS: u64 = 100;

/// Default recency cap in ticks
pub const DEFAULT_MAX_ACCESS_TIME: u64 = 20_000;

/// Default EWMA weight for both frequency and recency
pub const DEFAULT_SIGNAL_WEIGHT: f64 = 0.5;

/// Zero-argument phase-shift notification
pub type PhaseShiftCallback = Box<dyn Fn() + Send + Sync>;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the drift detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Accesses per detection cycle
    pub cycle_ticks: u64,

    /// Recency cap for unseen or stale objects
    pub max_access_time: u64,

    /// EWMA weight of the newest frequency sample
    pub frequency_weight: f64,

    /// EWMA weight of the newest recency sample
    pub recency_weight: f64,

    /// Tuning shared by the three change detectors
    pub adwin: AdwinConfig,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            cycle_ticks: DEFAULT_CYCLE_TICKS,
            max_access_time: DEFAULT_MAX_ACCESS_TIME,
            frequency_weight: DEFAULT_SIGNAL_WEIGHT,
            recency_weight: DEFAULT_SIGNAL_WEIGHT,
            adwin: AdwinConfig::default(),
        }
    }
}

impl DriftConfig {
    /// Reject configurations the detector cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cycle_ticks == 0 {
            return Err(Error::InvalidConfig("cycle_ticks must be at least 1".into()));
        }
        if self.max_access_time == 0 {
            return Err(Error::InvalidConfig(
                "max_access_time must be at least 1".into(),
            ));
        }
        for (name, weight) in [
            ("frequency_weight", self.frequency_weight),
            ("recency_weight", self.recency_weight),
        ] {
            if !(weight > 0.0 && weight <= 1.0) {
                return Err(Error::InvalidConfig(format!(
                    "{} must be within (0, 1], got {}",
                    name, weight
                )));
            }
        }
        if !(self.adwin.delta > 0.0 && self.adwin.delta < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "adwin delta must be within (0, 1), got {}",
                self.adwin.delta
            )));
        }
        if self.adwin.max_buckets == 0 || self.adwin.min_sub_window == 0 {
            return Err(Error::InvalidConfig(
                "adwin max_buckets and min_sub_window must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Signals
// =============================================================================

/// One cycle's signals, each scaled into `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleSignals {
    pub frequency: f64,
    pub recency: f64,
    pub hitrate: f64,
}

/// Point-in-time view of the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    /// Raw EWMA access count
    pub frequency: f64,

    /// Raw EWMA inter-access ticks
    pub recency: f64,

    /// Last supplied hit rate
    pub hitrate: f64,

    /// Accesses observed
    pub tick: u64,

    /// Completed detection cycles
    pub cycles: u64,

    /// Phase shifts raised
    pub phase_shifts: u64,
}

/// Per-signal change flags from the latest cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleVotes {
    pub frequency: bool,
    pub recency: bool,
    pub hitrate: bool,
}

impl CycleVotes {
    /// Whether all three signals agree on a change
    pub fn unanimous(&self) -> bool {
        self.frequency && self.recency && self.hitrate
    }
}

// =============================================================================
// Shift Voter
// =============================================================================

/// Three independent change detectors requiring unanimity
#[derive(Debug, Clone)]
pub struct ShiftVoter {
    frequency: Adwin,
    recency: Adwin,
    hitrate: Adwin,
    last: CycleVotes,
}

impl ShiftVoter {
    /// Create a voter with one detector per signal
    pub fn new(config: AdwinConfig) -> Self {
        Self {
            frequency: Adwin::new(config.clone()),
            recency: Adwin::new(config.clone()),
            hitrate: Adwin::new(config),
            last: CycleVotes::default(),
        }
    }

    /// Feed one cycle; true when all three detectors changed together
    pub fn observe(&mut self, signals: CycleSignals) -> bool {
        self.last = CycleVotes {
            frequency: self.frequency.update(signals.frequency),
            recency: self.recency.update(signals.recency),
            hitrate: self.hitrate.update(signals.hitrate),
        };

        if self.last.unanimous() {
            self.frequency.reset();
            self.recency.reset();
            self.hitrate.reset();
            return true;
        }
        false
    }

    /// Flags from the most recent cycle
    pub fn last_votes(&self) -> CycleVotes {
        self.last
    }
}

// =============================================================================
// Drift Detector
// =============================================================================

/// Phase-shift detector over the access stream
pub struct DriftDetector {
    config: DriftConfig,
    access_counts: HashMap<ObjectId, u64>,
    last_access: HashMap<ObjectId, u64>,
    frequency: f64,
    recency: f64,
    hitrate: f64,
    tick: u64,
    cycle_position: u64,
    cycles: u64,
    phase_shifts: u64,
    voter: ShiftVoter,
    on_phase_shift: Option<PhaseShiftCallback>,
}

impl std::fmt::Debug for DriftDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriftDetector")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("cycles", &self.cycles)
            .field("phase_shifts", &self.phase_shifts)
            .finish_non_exhaustive()
    }
}

impl DriftDetector {
    /// Create a detector without a callback
    pub fn new(config: DriftConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            voter: ShiftVoter::new(config.adwin.clone()),
            config,
            access_counts: HashMap::new(),
            last_access: HashMap::new(),
            frequency: 0.0,
            recency: 0.0,
            hitrate: 0.0,
            tick: 0,
            cycle_position: 0,
            cycles: 0,
            phase_shifts: 0,
            on_phase_shift: None,
        })
    }

    /// Create a detector that invokes `callback` on every phase shift
    pub fn with_callback(config: DriftConfig, callback: PhaseShiftCallback) -> Result<Self> {
        let mut detector = Self::new(config)?;
        detector.on_phase_shift = Some(callback);
        Ok(detector)
    }

    /// Install or replace the phase-shift callback
    pub fn set_callback(&mut self, callback: PhaseShiftCallback) {
        self.on_phase_shift = Some(callback);
    }

    /// Record one access and its hit rate. Returns true if this access
    /// closed a cycle that raised a phase shift.
    pub fn update_history(&mut self, object_id: ObjectId, hitrate: f64) -> bool {
        let count = {
            let count = self.access_counts.entry(object_id).or_insert(0);
            *count += 1;
            *count
        };
        let wf = self.config.frequency_weight;
        self.frequency = wf * count as f64 + (1.0 - wf) * self.frequency;

        let cap = self.config.max_access_time;
        let elapsed = self
            .last_access
            .get(&object_id)
            .map(|&seen| self.tick - seen)
            .filter(|&delta| delta <= cap)
            .unwrap_or(cap);
        let wr = self.config.recency_weight;
        self.recency = wr * elapsed as f64 + (1.0 - wr) * self.recency;

        self.hitrate = hitrate;

        self.last_access.insert(object_id, self.tick);
        self.tick += 1;

        self.cycle_position += 1;
        if self.cycle_position < self.config.cycle_ticks {
            return false;
        }
        self.cycle_position = 0;
        self.observe_cycle(self.scaled_signals())
    }

    /// Signals of the current state scaled into `[0, 1]`
    pub fn scaled_signals(&self) -> CycleSignals {
        let frequency = if self.frequency > 1.0 {
            1.0 - 1.0 / self.frequency
        } else {
            0.0
        };
        CycleSignals {
            frequency,
            recency: (self.recency / self.config.max_access_time as f64).clamp(0.0, 1.0),
            hitrate: self.hitrate.clamp(0.0, 1.0),
        }
    }

    /// Feed one cycle's signals to the voter and fire the callback on a
    /// unanimous change.
    pub fn observe_cycle(&mut self, signals: CycleSignals) -> bool {
        self.cycles += 1;
        let fired = self.voter.observe(signals);
        let votes = self.voter.last_votes();

        debug!(
            cycle = self.cycles,
            frequency = signals.frequency,
            recency = signals.recency,
            hitrate = signals.hitrate,
            ?votes,
            "Drift cycle evaluated"
        );

        if fired {
            self.phase_shifts += 1;
            info!(
                cycle = self.cycles,
                tick = self.tick,
                phase_shifts = self.phase_shifts,
                "Phase shift detected"
            );
            if let Some(callback) = &self.on_phase_shift {
                callback();
            }
        }
        fired
    }

    /// Copy out the current signal state
    pub fn snapshot(&self) -> SignalSnapshot {
        SignalSnapshot {
            frequency: self.frequency,
            recency: self.recency,
            hitrate: self.hitrate,
            tick: self.tick,
            cycles: self.cycles,
            phase_shifts: self.phase_shifts,
        }
    }

    /// Phase shifts raised so far
    pub fn phase_shifts(&self) -> u64 {
        self.phase_shifts
    }

    /// Configuration in use
    pub fn config(&self) -> &DriftConfig {
        &self.config
    }
}

// =============================================================================
// Tests
// =============================================================================
