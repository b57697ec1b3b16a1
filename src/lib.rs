//! BeliefCache - Predictive Block Cache Engine
//!
//! Learns which objects tend to follow one another in an access stream,
//! keeps a belief-ranked virtual working set, and advises a bounded real
//! cache what to prefetch and what to drop. A drift detector watches the
//! stream for phase changes and starts an A/B experiment that retunes the
//! cache parameters.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        PredictionEngine                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  Prediction  │───▶│    Drift     │───▶│    Switch    │       │
//! │  │ Statistics + │    │   Detector   │    │  Controller  │       │
//! │  │ Virtual/Real │    │  (3x ADWIN)  │    │  (A/B tune)  │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Statistics, virtual cache, real cache, ID interning
//! - [`drift`] - Adaptive windowing and phase-shift detection
//! - [`switch`] - Parameter tuning experiments
//! - [`engine`] - Access path, advice port, queued pipeline, metrics
//! - [`simulation`] - Trace replay and reporting
//! - [`error`] - Error types

pub mod cache;
pub mod drift;
pub mod engine;
pub mod error;
pub mod simulation;
pub mod switch;

// Re-export commonly used types
pub use cache::{CacheParameters, Element, EvictionMode, ObjectId, RealCache, VirtualCache};
pub use drift::{DriftConfig, DriftDetector};
pub use engine::{
    CacheAdvice, CacheAdvisor, EngineConfig, EngineSnapshot, PredictionCore, PredictionEngine,
};
pub use error::{Error, Result};
pub use simulation::{SimulationConfig, SimulationReport, Simulator, Workload};
pub use switch::{SwitchConfig, SwitchController, SwitchState};
