//! Prediction Caches
//!
//! Belief statistics, the virtual working set they feed, and the bounded
//! real cache that acts on the virtual cache's advice.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Access stream                             │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ object id
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  BeliefStatistics                                                │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────────┐  │
//! │  │ HistoryLog   │  │ access_counts│  │ probabilities          │  │
//! │  │ (ring)       │  │ (sparse)     │  │ (sparse significance)  │  │
//! │  └──────────────┘  └──────────────┘  └────────────────────────┘  │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ candidates
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  VirtualCache: merge → sort by belief → cut to cache_size        │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ prefetch / evict advice
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  RealCache: LRU or belief-ordered bounded store                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod element;
mod histogram;
mod history;
mod interner;
mod matrix;
mod params;
mod proptest;
mod real_cache;
mod statistics;
mod virtual_cache;

pub use element::{Element, ObjectId};
pub use histogram::UsageHistogram;
pub use history::HistoryLog;
pub use interner::{chunk_span, ObjectInterner, DEFAULT_CHUNK_SIZE};
pub use matrix::SparseMatrix;
pub use params::{
    CacheParameters, DEFAULT_BELIEF_THRESHOLD, DEFAULT_CACHE_SIZE, DEFAULT_CANDIDATE_SET_SIZE,
    DEFAULT_HISTORY_WINDOW_SIZE, DEFAULT_MAX_TRACKED_OBJECTS, DEFAULT_MIN_HISTORY_WINDOWS,
    DEFAULT_VOTER_WINDOW_SIZE, MAX_TUNABLE_WINDOW, THRESHOLD_CEILING, THRESHOLD_FLOOR,
    THRESHOLD_STEP,
};
pub use real_cache::{EvictionMode, RealCache, DEFAULT_REAL_CACHE_CAPACITY};
pub use statistics::BeliefStatistics;
pub use virtual_cache::{MergeOutcome, SharedVirtualCache, VirtualCache, VirtualCacheState};
