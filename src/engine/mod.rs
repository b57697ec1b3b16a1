//! Prediction Engine
//!
//! The access path, the advice port it reports through, and the queued
//! pipeline that runs prediction, drift detection and parameter tuning on
//! separate consumers.

mod advisor;
mod core;
mod events;
mod metrics;
mod pipeline;
mod ports;
mod queue;

pub use advisor::{InMemoryAdviceCollector, LoggingAdvisor};
pub use self::core::{
    AccessOutcome, EngineSnapshot, PredictionCore, ResidencyChange, DEFAULT_HIT_WINDOW,
};
pub use events::{CacheAdvice, DetectionInput, SwitchInput};
pub use metrics::EngineMetrics;
pub use pipeline::{EngineConfig, EngineStats, PredictionEngine};
pub use ports::CacheAdvisor;
pub use queue::{QueueConsumer, QueueSender, QueueStats, WorkQueue};
