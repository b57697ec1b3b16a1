//! Engine Events
//!
//! Advice handed to the storage layer and the work items passed between
//! the engine's queues. Every variant carries only its own fields.
//!
//! # Example
//!
//! ```ignore
//! let advice = CacheAdvice::prefetch(42, 0.31, 1_000);
//! advisor.publish(advice).await?;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheParameters, ObjectId};
use crate::switch::Tunable;

/// Advice emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CacheAdvice {
    // =========================================================================
    // Residency
    // =========================================================================
    /// An object entered the virtual cache and should be fetched.
    Prefetch {
        object_id: ObjectId,
        belief: f64,
        tick: u64,
        timestamp: DateTime<Utc>,
    },

    /// An object left the real cache; its bytes may be dropped.
    Evict {
        object_id: ObjectId,
        tick: u64,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Adaptation
    // =========================================================================
    /// The workload changed phase and a tuning experiment begins.
    PhaseShift {
        tick: u64,
        phase_shifts: u64,
        timestamp: DateTime<Utc>,
    },

    /// An alternate configuration replaced the primary.
    Promotion {
        winner: usize,
        parameter: Tunable,
        hit_rate: f64,
        parameters: CacheParameters,
        timestamp: DateTime<Utc>,
    },
}

impl CacheAdvice {
    /// Get the timestamp of the advice.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CacheAdvice::Prefetch { timestamp, .. } => *timestamp,
            CacheAdvice::Evict { timestamp, .. } => *timestamp,
            CacheAdvice::PhaseShift { timestamp, .. } => *timestamp,
            CacheAdvice::Promotion { timestamp, .. } => *timestamp,
        }
    }

    /// Get the advice type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            CacheAdvice::Prefetch { .. } => "Prefetch",
            CacheAdvice::Evict { .. } => "Evict",
            CacheAdvice::PhaseShift { .. } => "PhaseShift",
            CacheAdvice::Promotion { .. } => "Promotion",
        }
    }

    /// Get the object this advice concerns, if any.
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            CacheAdvice::Prefetch { object_id, .. } => Some(*object_id),
            CacheAdvice::Evict { object_id, .. } => Some(*object_id),
            _ => None,
        }
    }
}

// =============================================================================
// Advice Builders
// =============================================================================

impl CacheAdvice {
    /// Create a Prefetch advice.
    pub fn prefetch(object_id: ObjectId, belief: f64, tick: u64) -> Self {
        CacheAdvice::Prefetch {
            object_id,
            belief,
            tick,
            timestamp: Utc::now(),
        }
    }

    /// Create an Evict advice.
    pub fn evict(object_id: ObjectId, tick: u64) -> Self {
        CacheAdvice::Evict {
            object_id,
            tick,
            timestamp: Utc::now(),
        }
    }

    /// Create a PhaseShift notification.
    pub fn phase_shift(tick: u64, phase_shifts: u64) -> Self {
        CacheAdvice::PhaseShift {
            tick,
            phase_shifts,
            timestamp: Utc::now(),
        }
    }

    /// Create a Promotion notification.
    pub fn promotion(
        winner: usize,
        parameter: Tunable,
        hit_rate: f64,
        parameters: CacheParameters,
    ) -> Self {
        CacheAdvice::Promotion {
            winner,
            parameter,
            hit_rate,
            parameters,
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// Queue Inputs
// =============================================================================

/// Work for the detection queue
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectionInput {
    /// One access with the real cache hit rate over the recent window
    Access { object_id: ObjectId, hitrate: f64 },
}

/// Work for the switch queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchInput {
    /// One access with the primary's outcome
    Access {
        object_id: ObjectId,
        primary_hit: bool,
    },

    /// Begin or restart a tuning experiment
    StartEvaluation,
}
