//! Engine Ports
//!
//! The storage layer receives prefetch and eviction advice through
//! [`CacheAdvisor`]. Receivers fetch or drop bytes on their own schedule;
//! the engine never waits for the data to move.
//!
//! ```text
//! ┌──────────────────────────┐        ┌──────────────────────────┐
//! │  PredictionEngine        │ advice │  CacheAdvisor (trait)    │
//! │  prediction consumer     │ ─────▶ │  LoggingAdvisor          │
//! │                          │        │  InMemoryAdviceCollector │
//! └──────────────────────────┘        └──────────────────────────┘
//! ```

use async_trait::async_trait;

use super::events::CacheAdvice;
use crate::error::Result;

/// Port for receiving cache advice.
#[async_trait]
pub trait CacheAdvisor: Send + Sync {
    /// Deliver one advice.
    async fn publish(&self, advice: CacheAdvice) -> Result<()>;

    /// Deliver several advices in order.
    async fn publish_all(&self, advice: Vec<CacheAdvice>) -> Result<()>;
}
