//! Work Queues
//!
//! Unbounded FIFO queues with exactly one consumer task each. Producers
//! never block. Shutdown is cooperative: the token is cancelled, the
//! consumer stops accepting new work, drains what is already queued and
//! exits.
//!
//! ```text
//!  producers ──push──▶ [ mpsc unbounded ] ──recv──▶ QueueConsumer::process
//!                                 ▲
//!        shutdown() ── cancel ────┘  close, drain, join
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::error::{Error, Result};

/// Single consumer of a [`WorkQueue`].
#[async_trait]
pub trait QueueConsumer<T: Send + 'static>: Send + 'static {
    /// Handle one item. Errors are logged and the queue keeps running.
    async fn process(&mut self, item: T) -> Result<()>;
}

/// Cloneable producer side of a queue
#[derive(Debug)]
pub struct QueueSender<T> {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<T>,
    submitted: Arc<AtomicU64>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            tx: self.tx.clone(),
            submitted: Arc::clone(&self.submitted),
        }
    }
}

impl<T> QueueSender<T> {
    /// Enqueue an item; fails once the queue is shutting down
    pub fn push(&self, item: T) -> Result<()> {
        self.tx
            .send(item)
            .map_err(|_| Error::QueueClosed(self.name.to_string()))?;
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Queue name
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Counters reported when a queue shuts down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub submitted: u64,
    pub processed: u64,
    pub failed: u64,
}

/// FIFO queue with one spawned consumer
#[derive(Debug)]
pub struct WorkQueue<T> {
    sender: QueueSender<T>,
    cancel: CancellationToken,
    handle: JoinHandle<QueueStats>,
}

impl<T: Send + 'static> WorkQueue<T> {
    /// Spawn the consumer task on the current runtime
    pub fn spawn<C>(name: &str, consumer: C) -> Self
    where
        C: QueueConsumer<T>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let sender = QueueSender {
            name: Arc::from(name),
            tx,
            submitted: Arc::new(AtomicU64::new(0)),
        };

        let worker = Worker {
            name: Arc::clone(&sender.name),
            rx,
            consumer,
            cancel: cancel.clone(),
            stats: QueueStats::default(),
        };
        let handle = tokio::spawn(worker.run());

        debug!(queue = name, "Work queue started");
        Self {
            sender,
            cancel,
            handle,
        }
    }

    /// Producer handle
    pub fn sender(&self) -> QueueSender<T> {
        self.sender.clone()
    }

    /// Enqueue an item
    pub fn push(&self, item: T) -> Result<()> {
        self.sender.push(item)
    }

    /// Stop accepting work, drain the backlog and join the consumer
    pub async fn shutdown(self) -> Result<QueueStats> {
        self.cancel.cancel();
        let mut stats = self.handle.await.map_err(|e| {
            Error::Internal(format!("queue '{}' worker failed: {}", self.sender.name, e))
        })?;
        stats.submitted = self.sender.submitted.load(Ordering::Relaxed);
        info!(
            queue = %self.sender.name,
            processed = stats.processed,
            failed = stats.failed,
            "Work queue stopped"
        );
        Ok(stats)
    }
}

struct Worker<T, C> {
    name: Arc<str>,
    rx: mpsc::UnboundedReceiver<T>,
    consumer: C,
    cancel: CancellationToken,
    stats: QueueStats,
}

impl<T: Send + 'static, C: QueueConsumer<T>> Worker<T, C> {
    #[instrument(skip(self), fields(queue = %self.name))]
    async fn run(mut self) -> QueueStats {
        loop {
            tokio::select! {
                biased;

                item = self.rx.recv() => match item {
                    Some(item) => self.handle(item).await,
                    None => break,
                },

                _ = self.cancel.cancelled() => {
                    self.rx.close();
                    while let Some(item) = self.rx.recv().await {
                        self.handle(item).await;
                    }
                    break;
                }
            }
        }
        self.stats
    }

    async fn handle(&mut self, item: T) {
        match self.consumer.process(item).await {
            Ok(()) => self.stats.processed += 1,
            Err(e) => {
                self.stats.failed += 1;
                error!(queue = %self.name, error = %e, "Work item failed");
            }
        }
    }
}
