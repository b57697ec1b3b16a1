//! Switch Controller
//!
//! Runs a bounded A/B experiment over virtual cache parameters. Cache `0`
//! is the primary, driven by the prediction path; the remaining caches are
//! alternates driven here while an experiment is running.
//!
//! # State Machine
//!
//! ```text
//!              start_evaluation()
//!   ┌──────┐ ───────────────────▶ ┌────────────┐
//!   │ Idle │                      │ Evaluating │ ──┐ every cycle_ticks:
//!   └──────┘ ◀─────────────────── └────────────┘ ◀─┘ score, promote, rotate
//!              cycles ≥ cycles_per_test
//! ```
//!
//! At the end of each cycle the cache with the best hit rate (lowest index
//! on ties) overwrites every other cache. The rotation then moves to the
//! next parameter and every alternate steps it by one in a random
//! direction, wrapping at the tuning bounds.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{
    CacheParameters, MergeOutcome, ObjectId, SharedVirtualCache, VirtualCache, MAX_TUNABLE_WINDOW,
    THRESHOLD_CEILING, THRESHOLD_FLOOR, THRESHOLD_STEP,
};
use crate::error::{Error, Result};

/// Default accesses per evaluation cycle
pub const DEFAULT_SWITCH_CYCLE_TICKS: u64 = 100;

/// Default full rotations per experiment
pub const DEFAULT_CYCLES_PER_TEST: u64 = 3;

/// Default number of alternate caches
pub const DEFAULT_ALTERNATES: usize = 1;

const THRESHOLD_EPSILON: f64 = 1e-9;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the switch controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    /// Accesses per evaluation cycle
    pub cycle_ticks: u64,

    /// Full parameter rotations before the experiment ends
    pub cycles_per_test: u64,

    /// Perturbed caches evaluated next to the primary
    pub alternates: usize,

    /// Fixed seed for perturbation directions; entropy when unset
    pub seed: Option<u64>,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            cycle_ticks: DEFAULT_SWITCH_CYCLE_TICKS,
            cycles_per_test: DEFAULT_CYCLES_PER_TEST,
            alternates: DEFAULT_ALTERNATES,
            seed: None,
        }
    }
}

impl SwitchConfig {
    /// Reject configurations the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cycle_ticks == 0 {
            return Err(Error::InvalidConfig(
                "switch cycle_ticks must be at least 1".into(),
            ));
        }
        if self.cycles_per_test == 0 {
            return Err(Error::InvalidConfig(
                "cycles_per_test must be at least 1".into(),
            ));
        }
        if self.alternates == 0 {
            return Err(Error::InvalidConfig("alternates must be at least 1".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Tunables
// =============================================================================

/// Parameters visited by the rotation, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tunable {
    Threshold,
    HistoryWindow,
    CandidateSet,
    VoterWindow,
}

impl Tunable {
    /// Fixed rotation order
    pub const ROTATION: [Tunable; 4] = [
        Tunable::Threshold,
        Tunable::HistoryWindow,
        Tunable::CandidateSet,
        Tunable::VoterWindow,
    ];

    /// Step this parameter by one unit, wrapping at its bounds
    pub fn perturb(self, params: &mut CacheParameters, up: bool) {
        match self {
            Tunable::Threshold => {
                params.belief_threshold = step_threshold(params.belief_threshold, up);
            }
            Tunable::HistoryWindow => {
                params.history_window_size =
                    step_wrapping(params.history_window_size, MAX_TUNABLE_WINDOW, up);
            }
            Tunable::CandidateSet => {
                params.candidate_set_size =
                    step_wrapping(params.candidate_set_size, params.cache_size, up);
            }
            Tunable::VoterWindow => {
                params.voter_window_size =
                    step_wrapping(params.voter_window_size, MAX_TUNABLE_WINDOW, up);
            }
        }
    }
}

impl fmt::Display for Tunable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tunable::Threshold => write!(f, "threshold"),
            Tunable::HistoryWindow => write!(f, "history_window"),
            Tunable::CandidateSet => write!(f, "candidate_set"),
            Tunable::VoterWindow => write!(f, "voter_window"),
        }
    }
}

fn step_threshold(value: f64, up: bool) -> f64 {
    let base = value.clamp(THRESHOLD_FLOOR, THRESHOLD_CEILING);
    let next = if up {
        base + THRESHOLD_STEP
    } else {
        base - THRESHOLD_STEP
    };
    if next > THRESHOLD_CEILING + THRESHOLD_EPSILON {
        THRESHOLD_FLOOR
    } else if next < THRESHOLD_FLOOR - THRESHOLD_EPSILON {
        THRESHOLD_CEILING
    } else {
        (next / THRESHOLD_STEP).round() * THRESHOLD_STEP
    }
}

fn step_wrapping(value: usize, max: usize, up: bool) -> usize {
    let max = max.max(1);
    let value = value.clamp(1, max);
    match (up, value) {
        (true, v) if v >= max => 1,
        (true, v) => v + 1,
        (false, 1) => max,
        (false, v) => v - 1,
    }
}

// =============================================================================
// State and Reports
// =============================================================================

/// Experiment state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchState {
    Idle,
    Evaluating,
}

/// Outcome of one evaluation cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Parameter that was under test during the cycle
    pub parameter: Tunable,

    /// Hit rate of each cache over the cycle, primary first
    pub hit_rates: Vec<f64>,

    /// Index of the best cache
    pub winner: usize,

    /// Whether an alternate replaced the primary
    pub promoted: bool,

    /// Parameters every cache now shares before the next perturbation
    pub parameters: CacheParameters,

    /// State after the cycle
    pub state: SwitchState,

    /// Resident set change applied to the primary, empty unless promoted
    pub primary_changes: MergeOutcome,
}

// =============================================================================
// Switch Controller
// =============================================================================

/// A/B tuner over a primary and its alternates
pub struct SwitchController {
    config: SwitchConfig,
    caches: Vec<SharedVirtualCache>,
    state: SwitchState,
    rotation: usize,
    ticks: u64,
    hits: Vec<u64>,
    cycles: u64,
    evaluations: u64,
    promotions: u64,
    rng: StdRng,
}

impl fmt::Debug for SwitchController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchController")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("parameter", &self.current_parameter())
            .field("ticks", &self.ticks)
            .field("cycles", &self.cycles)
            .field("promotions", &self.promotions)
            .finish_non_exhaustive()
    }
}

impl SwitchController {
    /// Create a controller around `primary`, cloning it for each alternate
    pub fn new(config: SwitchConfig, primary: SharedVirtualCache) -> Result<Self> {
        config.validate()?;

        let template: VirtualCache = primary.read().clone();
        let mut caches = Vec::with_capacity(config.alternates + 1);
        caches.push(primary);
        for _ in 0..config.alternates {
            caches.push(Arc::new(RwLock::new(template.clone())));
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            hits: vec![0; caches.len()],
            caches,
            state: SwitchState::Idle,
            rotation: 0,
            ticks: 0,
            cycles: 0,
            evaluations: 0,
            promotions: 0,
            rng,
            config,
        })
    }

    /// Begin an experiment. A running one is discarded and restarted.
    pub fn start_evaluation(&mut self) {
        if self.state == SwitchState::Evaluating {
            info!(
                parameter = %self.current_parameter(),
                ticks = self.ticks,
                "Restarting evaluation in progress"
            );
        }

        self.state = SwitchState::Evaluating;
        self.rotation = 0;
        self.ticks = 0;
        self.cycles = 0;
        self.hits.iter_mut().for_each(|h| *h = 0);
        self.evaluations += 1;

        let baseline = self.caches[0].read().export_state();
        for cache in &self.caches[1..] {
            cache.write().import_state(baseline.clone());
        }
        self.perturb_alternates();

        info!(
            evaluation = self.evaluations,
            caches = self.caches.len(),
            "Switch evaluation started"
        );
    }

    /// Drive every cache, primary included, with one access
    pub fn update_history(&mut self, object_id: ObjectId) -> Result<Option<CycleReport>> {
        if self.state == SwitchState::Idle {
            return Ok(None);
        }
        let primary_hit = Self::drive(&self.caches[0], object_id)?;
        self.record(object_id, primary_hit)
    }

    /// Drive the alternates with one access whose primary outcome is
    /// already known
    pub fn observe(&mut self, object_id: ObjectId, primary_hit: bool) -> Result<Option<CycleReport>> {
        if self.state == SwitchState::Idle {
            return Ok(None);
        }
        self.record(object_id, primary_hit)
    }

    fn record(&mut self, object_id: ObjectId, primary_hit: bool) -> Result<Option<CycleReport>> {
        if primary_hit {
            self.hits[0] += 1;
        }
        for index in 1..self.caches.len() {
            if Self::drive(&self.caches[index], object_id)? {
                self.hits[index] += 1;
            }
        }

        self.ticks += 1;
        if self.ticks < self.config.cycle_ticks {
            return Ok(None);
        }
        Ok(Some(self.finish_cycle()))
    }

    // scoring hits stay out of element counters, which travel with imports
    fn drive(cache: &SharedVirtualCache, object_id: ObjectId) -> Result<bool> {
        let mut cache = cache.write();
        let hit = cache.hit(object_id, false);
        cache.update_history(object_id)?;
        Ok(hit)
    }

    fn finish_cycle(&mut self) -> CycleReport {
        let parameter = self.current_parameter();
        let cycle_ticks = self.config.cycle_ticks as f64;
        let hit_rates: Vec<f64> = self.hits.iter().map(|&h| h as f64 / cycle_ticks).collect();

        // first strictly greater wins, so ties keep the lowest index
        let mut winner = 0;
        for (index, &rate) in hit_rates.iter().enumerate().skip(1) {
            if rate > hit_rates[winner] {
                winner = index;
            }
        }

        let best = self.caches[winner].read().export_state();
        let mut primary_changes = MergeOutcome::default();
        for (index, cache) in self.caches.iter().enumerate() {
            if index != winner {
                let changes = cache.write().import_state(best.clone());
                if index == 0 {
                    primary_changes = changes;
                }
            }
        }
        let promoted = winner != 0;
        if promoted {
            self.promotions += 1;
            info!(
                winner,
                %parameter,
                hit_rate = hit_rates[winner],
                primary_hit_rate = hit_rates[0],
                "Alternate promoted to primary"
            );
        }

        self.ticks = 0;
        self.hits.iter_mut().for_each(|h| *h = 0);
        self.rotation = (self.rotation + 1) % Tunable::ROTATION.len();
        if self.rotation == 0 {
            self.cycles += 1;
        }

        if self.cycles >= self.config.cycles_per_test {
            self.state = SwitchState::Idle;
            info!(
                cycles = self.cycles,
                promotions = self.promotions,
                "Switch evaluation finished"
            );
        } else {
            self.perturb_alternates();
        }

        debug!(
            %parameter,
            winner,
            ?hit_rates,
            next = %self.current_parameter(),
            "Switch cycle complete"
        );

        CycleReport {
            parameter,
            hit_rates,
            winner,
            promoted,
            parameters: best.parameters().clone(),
            state: self.state,
            primary_changes,
        }
    }

    fn perturb_alternates(&mut self) {
        let parameter = self.current_parameter();
        for cache in &self.caches[1..] {
            let up = self.rng.gen_bool(0.5);
            let mut cache = cache.write();
            let mut params = cache.parameters().clone();
            parameter.perturb(&mut params, up);
            if let Err(e) = cache.set_parameters(params) {
                debug!(%parameter, error = %e, "Perturbation rejected");
            }
        }
    }

    /// Current experiment state
    pub fn state(&self) -> SwitchState {
        self.state
    }

    /// Parameter currently under test
    pub fn current_parameter(&self) -> Tunable {
        Tunable::ROTATION[self.rotation]
    }

    /// Accesses recorded in the current cycle
    pub fn ticks_in_cycle(&self) -> u64 {
        self.ticks
    }

    /// Completed rotations in the current experiment
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Experiments started so far
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Cycles in which an alternate replaced the primary
    pub fn promotions(&self) -> u64 {
        self.promotions
    }

    /// Managed caches, primary first
    pub fn caches(&self) -> &[SharedVirtualCache] {
        &self.caches
    }

    /// Configuration in use
    pub fn config(&self) -> &SwitchConfig {
        &self.config
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn params() -> CacheParameters {
        CacheParameters {
            cache_size: 3,
            candidate_set_size: 2,
            voter_window_size: 3,
            history_window_size: 3,
            belief_threshold: 0.0,
            max_tracked_objects: 100,
            min_history_windows: 1,
        }
    }

    fn controller(cycle_ticks: u64, cycles_per_test: u64, seed: u64) -> SwitchController {
        let primary = VirtualCache::shared(params()).unwrap();
        SwitchController::new(
            SwitchConfig {
                cycle_ticks,
                cycles_per_test,
                alternates: 1,
                seed: Some(seed),
            },
            primary,
        )
        .unwrap()
    }

    #[test]
    fn test_switch_config_default() {
        let config = SwitchConfig::default();
        assert_eq!(config.cycle_ticks, 100);
        assert_eq!(config.cycles_per_test, 3);
        assert_eq!(config.alternates, 1);
        assert_eq!(config.seed, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_switch_config_validation() {
        let primary = VirtualCache::shared(params()).unwrap();
        let config = SwitchConfig {
            alternates: 0,
            ..Default::default()
        };
        assert_matches!(
            SwitchController::new(config, primary),
            Err(Error::InvalidConfig(_))
        );
    }

    #[test]
    fn test_threshold_wraps() {
        let mut p = params();
        p.belief_threshold = 0.17;
        Tunable::Threshold.perturb(&mut p, true);
        assert_eq!(p.belief_threshold, THRESHOLD_FLOOR);

        Tunable::Threshold.perturb(&mut p, false);
        assert_eq!(p.belief_threshold, THRESHOLD_CEILING);

        p.belief_threshold = 0.12;
        Tunable::Threshold.perturb(&mut p, true);
        assert!((p.belief_threshold - 0.13).abs() < 1e-9);
        Tunable::Threshold.perturb(&mut p, false);
        Tunable::Threshold.perturb(&mut p, false);
        assert!((p.belief_threshold - 0.11).abs() < 1e-9);
    }

    #[test]
    fn test_window_and_candidate_wrap() {
        let mut p = params();
        p.history_window_size = MAX_TUNABLE_WINDOW;
        Tunable::HistoryWindow.perturb(&mut p, true);
        assert_eq!(p.history_window_size, 1);
        Tunable::HistoryWindow.perturb(&mut p, false);
        assert_eq!(p.history_window_size, MAX_TUNABLE_WINDOW);

        p.voter_window_size = 1;
        Tunable::VoterWindow.perturb(&mut p, false);
        assert_eq!(p.voter_window_size, MAX_TUNABLE_WINDOW);

        p.candidate_set_size = p.cache_size;
        Tunable::CandidateSet.perturb(&mut p, true);
        assert_eq!(p.candidate_set_size, 1);
        Tunable::CandidateSet.perturb(&mut p, false);
        assert_eq!(p.candidate_set_size, p.cache_size);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_idle_ignores_accesses() {
        let mut switch = controller(5, 1, 7);
        assert_eq!(switch.state(), SwitchState::Idle);

        for id in 0..20 {
            assert!(switch.observe(id % 3, false).unwrap().is_none());
        }
        assert!(switch.caches()[1].read().statistics().history().is_empty());
    }

    #[test]
    fn test_start_evaluation_perturbs_threshold() {
        let mut switch = controller(5, 1, 7);
        switch.start_evaluation();

        assert_eq!(switch.state(), SwitchState::Evaluating);
        assert_eq!(switch.current_parameter(), Tunable::Threshold);

        let primary = switch.caches()[0].read().parameters().clone();
        let alternate = switch.caches()[1].read().parameters().clone();
        assert_eq!(primary.belief_threshold, 0.0);
        // 0.0 is below the wrap range: stepping starts from the floor
        assert!(
            (alternate.belief_threshold - 0.07).abs() < 1e-9
                || alternate.belief_threshold == THRESHOLD_CEILING
        );
        assert_eq!(alternate.history_window_size, primary.history_window_size);
    }

    #[test]
    fn test_tie_prefers_lowest_index_deterministically() {
        let run = || {
            let mut switch = controller(10, 1, 42);
            switch.start_evaluation();
            let mut reports = Vec::new();
            // fresh IDs: nothing ever hits
            for id in 0..40 {
                if let Some(report) = switch.observe(id, false).unwrap() {
                    reports.push(report);
                }
            }
            reports
        };

        let first = run();
        let second = run();
        assert_eq!(first.len(), 4);
        assert!(first.iter().all(|r| r.winner == 0 && !r.promoted));
        assert_eq!(first, second);
    }

    #[test]
    fn test_winner_overwrites_losers() {
        let mut switch = controller(30, 1, 3);
        switch.start_evaluation();

        let mut report = None;
        for i in 0..30u64 {
            report = switch.observe(1 + i % 3, false).unwrap();
        }
        let report = report.expect("cycle should complete");

        assert_eq!(report.parameter, Tunable::Threshold);
        assert_eq!(report.winner, 1);
        assert!(report.promoted);
        assert_eq!(report.hit_rates[0], 0.0);
        assert!(report.hit_rates[1] > 0.0);
        assert_eq!(switch.promotions(), 1);

        let primary = switch.caches()[0].read();
        let alternate = switch.caches()[1].read();
        assert_eq!(primary.parameters(), &report.parameters);
        assert_ne!(primary.parameters().belief_threshold, 0.0);
        assert_eq!(primary.resident_ids(), alternate.resident_ids());
        assert_eq!(switch.current_parameter(), Tunable::HistoryWindow);

        // the primary held nothing, so every imported resident is new
        assert!(!report.primary_changes.prefetch.is_empty());
        assert_eq!(report.primary_changes.prefetch, primary.resident_ids());
        assert!(report.primary_changes.evict.is_empty());
    }

    #[test]
    fn test_primary_changes_empty_without_promotion() {
        let mut switch = controller(10, 1, 42);
        switch.start_evaluation();
        let mut report = None;
        for id in 0..10 {
            report = switch.observe(id, false).unwrap();
        }
        let report = report.unwrap();
        assert!(!report.promoted);
        assert!(report.primary_changes.is_empty());
    }

    #[test]
    fn test_alternate_hits_do_not_reach_element_counters() {
        let mut switch = controller(30, 1, 3);
        switch.start_evaluation();
        for i in 0..30u64 {
            switch.observe(1 + i % 3, false).unwrap();
        }

        // the winning alternate scored hits, but its elements carry none
        // into the primary's usage histogram
        let primary = switch.caches()[0].read();
        assert!(!primary.resident().is_empty());
        assert!(primary.resident().iter().all(|e| e.hits == 0));
        let usage = primary.usage_histogram();
        assert_eq!(usage.total(), usage.unused());
    }

    #[test]
    fn test_returns_to_idle_after_cycles_per_test() {
        let mut switch = controller(5, 1, 11);
        switch.start_evaluation();

        for id in 0..19 {
            switch.observe(id, false).unwrap();
        }
        assert_eq!(switch.state(), SwitchState::Evaluating);
        assert_eq!(switch.current_parameter(), Tunable::VoterWindow);

        let report = switch.observe(19, false).unwrap().unwrap();
        assert_eq!(report.state, SwitchState::Idle);
        assert_eq!(switch.state(), SwitchState::Idle);
        assert_eq!(switch.cycles(), 1);
    }

    #[test]
    fn test_restart_resets_experiment() {
        let mut switch = controller(5, 2, 5);
        switch.start_evaluation();
        for id in 0..7 {
            switch.observe(id, false).unwrap();
        }
        assert_eq!(switch.current_parameter(), Tunable::HistoryWindow);
        assert_eq!(switch.ticks_in_cycle(), 2);

        switch.start_evaluation();
        assert_eq!(switch.state(), SwitchState::Evaluating);
        assert_eq!(switch.current_parameter(), Tunable::Threshold);
        assert_eq!(switch.ticks_in_cycle(), 0);
        assert_eq!(switch.cycles(), 0);
        assert_eq!(switch.evaluations(), 2);
    }

    #[test]
    fn test_update_history_drives_primary() {
        let mut switch = controller(100, 1, 9);
        switch.start_evaluation();
        for i in 0..12u64 {
            switch.update_history(1 + i % 3).unwrap();
        }
        assert_eq!(switch.caches()[0].read().statistics().history().len(), 12);
        assert_eq!(switch.caches()[1].read().statistics().history().len(), 12);
    }
}
