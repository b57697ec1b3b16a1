//! Phase-Shift Detection
//!
//! Adaptive windowing change detectors combined into a unanimous vote over
//! the frequency, recency and hit-rate signals of the access stream.

mod adwin;
mod detector;

pub use adwin::{Adwin, AdwinConfig, DEFAULT_DELTA, DEFAULT_MAX_BUCKETS, DEFAULT_MIN_SUB_WINDOW};
pub use detector::{
    CycleSignals, CycleVotes, DriftConfig, DriftDetector, PhaseShiftCallback, ShiftVoter,
    SignalSnapshot, DEFAULT_CYCLE_TICKS, DEFAULT_MAX_ACCESS_TIME, DEFAULT_SIGNAL_WEIGHT,
};
