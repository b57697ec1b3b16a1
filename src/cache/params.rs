//! Cache Parameters
//!
//! Tunables read by the statistics engine and the virtual cache on every
//! update. The switch controller is the only component that changes them
//! after construction.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default virtual cache size (elements)
pub const DEFAULT_CACHE_SIZE: usize = 1000;

/// Default number of candidates kept per update
pub const DEFAULT_CANDIDATE_SET_SIZE: usize = 10;

/// Default voter window (history entries)
pub const DEFAULT_VOTER_WINDOW_SIZE: usize = 5;

/// Default transition window (history entries)
pub const DEFAULT_HISTORY_WINDOW_SIZE: usize = 5;

/// Default belief threshold
pub const DEFAULT_BELIEF_THRESHOLD: f64 = 0.12;

/// Default size of the dense object ID space
pub const DEFAULT_MAX_TRACKED_OBJECTS: u64 = 5000;

/// Default minimum number of windows before a row is scored
pub const DEFAULT_MIN_HISTORY_WINDOWS: u64 = 2;

/// Lower wrap bound for the belief threshold
pub const THRESHOLD_FLOOR: f64 = 0.06;

/// Upper wrap bound for the belief threshold
pub const THRESHOLD_CEILING: f64 = 0.17;

/// Threshold perturbation step
pub const THRESHOLD_STEP: f64 = 0.01;

/// Upper wrap bound for history and voter windows
pub const MAX_TUNABLE_WINDOW: usize = 30;

/// Parameters shared by `BeliefStatistics` and `VirtualCache`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheParameters {
    /// Resident set bound
    pub cache_size: usize,

    /// Candidates kept after ranking
    pub candidate_set_size: usize,

    /// History entries that vote on candidate belief
    pub voter_window_size: usize,

    /// History entries credited with a transition to each new access
    pub history_window_size: usize,

    /// Candidates at or below this belief are dropped
    pub belief_threshold: f64,

    /// Object IDs must be strictly below this bound
    pub max_tracked_objects: u64,

    /// A row is scored only once its sum exceeds this many windows
    pub min_history_windows: u64,
}

impl Default for CacheParameters {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
            candidate_set_size: DEFAULT_CANDIDATE_SET_SIZE,
            voter_window_size: DEFAULT_VOTER_WINDOW_SIZE,
            history_window_size: DEFAULT_HISTORY_WINDOW_SIZE,
            belief_threshold: DEFAULT_BELIEF_THRESHOLD,
            max_tracked_objects: DEFAULT_MAX_TRACKED_OBJECTS,
            min_history_windows: DEFAULT_MIN_HISTORY_WINDOWS,
        }
    }
}

impl CacheParameters {
    /// Reject parameter sets the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cache_size == 0 {
            return Err(Error::InvalidConfig("cache_size must be at least 1".into()));
        }
        if self.candidate_set_size == 0 || self.candidate_set_size > self.cache_size {
            return Err(Error::InvalidConfig(format!(
                "candidate_set_size must be within 1..={}, got {}",
                self.cache_size, self.candidate_set_size
            )));
        }
        if self.voter_window_size == 0 {
            return Err(Error::InvalidConfig(
                "voter_window_size must be at least 1".into(),
            ));
        }
        if self.history_window_size == 0 {
            return Err(Error::InvalidConfig(
                "history_window_size must be at least 1".into(),
            ));
        }
        if !self.belief_threshold.is_finite()
            || self.belief_threshold < 0.0
            || self.belief_threshold > THRESHOLD_CEILING
        {
            return Err(Error::InvalidConfig(format!(
                "belief_threshold must be within [0, {}], got {}",
                THRESHOLD_CEILING, self.belief_threshold
            )));
        }
        if self.max_tracked_objects == 0 {
            return Err(Error::InvalidConfig(
                "max_tracked_objects must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Row-sum guard a row must exceed before it is scored
    #[inline]
    pub fn significance_guard(&self) -> u64 {
        self.min_history_windows
            .saturating_mul(self.history_window_size as u64)
    }

    /// History retention needed to serve every window these parameters,
    /// or any tuned variant of them, can ask for.
    pub fn history_capacity(&self) -> usize {
        (self.history_window_size + 1)
            .max(self.voter_window_size)
            .max(MAX_TUNABLE_WINDOW + 1)
    }

    /// Check that an object ID fits the dense ID space
    #[inline]
    pub fn check_id(&self, id: u64) -> Result<()> {
        if id >= self.max_tracked_objects {
            return Err(Error::ObjectIdOutOfRange {
                id,
                max: self.max_tracked_objects,
            });
        }
        Ok(())
    }
}
