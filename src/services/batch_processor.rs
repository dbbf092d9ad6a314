//! Batch processor.
//!
//! Coalesces submitted items into batches handed to a user-supplied process
//! function, flushing when a batch fills or the oldest item has waited long
//! enough. The input queue is bounded: overflow evicts the oldest queued
//! item, rejects its completion promise with a queue-capacity error, and
//! invokes the overflow handler.

use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::collections::{BoundedQueue, OverflowPolicy};
use crate::domain::error::SwarmError;

/// Batch processing function: receives a batch, returns one result per
/// input, position-wise.
pub type ProcessFn<T, R> =
    Arc<dyn Fn(Vec<T>) -> BoxFuture<'static, Result<Vec<R>, String>> + Send + Sync>;

/// Handler invoked with each item evicted on queue overflow.
pub type OverflowHandler<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Configuration for a batch processor.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Flush when this many items are queued
    pub max_batch_size: usize,
    /// Flush when the oldest queued item has waited this long
    pub max_wait: Duration,
    /// Queue capacity; overflow evicts the oldest item
    pub max_queue_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 32,
            max_wait: Duration::from_millis(200),
            max_queue_size: 1024,
        }
    }
}

struct Pending<T, R> {
    item: T,
    reply: oneshot::Sender<Result<R, SwarmError>>,
    enqueued_at: Instant,
}

enum Message<T, R> {
    Item(Pending<T, R>),
    FlushAll(oneshot::Sender<()>),
}

/// Handle to a running batch processor.
///
/// Idle means the queue is empty and no batch is in flight. Dropping the
/// handle flushes whatever is queued and stops the worker.
pub struct BatchProcessor<T, R> {
    tx: mpsc::UnboundedSender<Message<T, R>>,
    queue_len: Arc<AtomicUsize>,
    in_flight: Arc<AtomicBool>,
    evicted_total: Arc<AtomicU64>,
}

impl<T: Send + 'static, R: Send + 'static> BatchProcessor<T, R> {
    /// Spawn a processor with the given process function.
    pub fn spawn(config: BatchConfig, process: ProcessFn<T, R>) -> Self {
        Self::spawn_with_overflow(config, process, None)
    }

    /// Spawn a processor with an overflow handler for evicted items.
    pub fn spawn_with_overflow(
        config: BatchConfig,
        process: ProcessFn<T, R>,
        overflow: Option<OverflowHandler<T>>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue_len = Arc::new(AtomicUsize::new(0));
        let in_flight = Arc::new(AtomicBool::new(false));
        let evicted_total = Arc::new(AtomicU64::new(0));

        let worker = Worker {
            queue: BoundedQueue::new(config.max_queue_size, OverflowPolicy::EvictOldest),
            config,
            process,
            overflow,
            queue_len: Arc::clone(&queue_len),
            in_flight: Arc::clone(&in_flight),
            evicted_total: Arc::clone(&evicted_total),
        };
        tokio::spawn(worker.run(rx));

        Self {
            tx,
            queue_len,
            in_flight,
            evicted_total,
        }
    }

    /// Submit an item. The returned receiver resolves with the item's result
    /// once its batch has been processed, or with an error if the item was
    /// evicted on overflow.
    pub fn submit(&self, item: T) -> oneshot::Receiver<Result<R, SwarmError>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let pending = Pending {
            item,
            reply: reply_tx,
            enqueued_at: Instant::now(),
        };
        if self.tx.send(Message::Item(pending)).is_err() {
            // Worker is gone; the dropped reply sender resolves the receiver
            // with a cancellation the caller observes as an error.
            warn!("Batch processor worker is gone; submission dropped");
        }
        reply_rx
    }

    /// Submit and wait for the item's result.
    pub async fn submit_wait(&self, item: T) -> Result<R, SwarmError> {
        match self.submit(item).await {
            Ok(result) => result,
            Err(_) => Err(SwarmError::ShuttingDown),
        }
    }

    /// Force batches until the processor is idle.
    pub async fn flush_all(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Message::FlushAll(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Idle when the queue is empty and no batch is in flight.
    pub fn is_idle(&self) -> bool {
        self.queue_len.load(Ordering::SeqCst) == 0 && !self.in_flight.load(Ordering::SeqCst)
    }

    /// Items currently queued.
    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::SeqCst)
    }

    /// Total items evicted on overflow since start.
    pub fn evicted_total(&self) -> u64 {
        self.evicted_total.load(Ordering::SeqCst)
    }
}

struct Worker<T, R> {
    config: BatchConfig,
    process: ProcessFn<T, R>,
    overflow: Option<OverflowHandler<T>>,
    queue: BoundedQueue<Pending<T, R>>,
    queue_len: Arc<AtomicUsize>,
    in_flight: Arc<AtomicBool>,
    evicted_total: Arc<AtomicU64>,
}

impl<T: Send + 'static, R: Send + 'static> Worker<T, R> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message<T, R>>) {
        loop {
            let deadline = self.queue.front().map(|p| p.enqueued_at + self.config.max_wait);
            let timer = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                message = rx.recv() => match message {
                    Some(Message::Item(pending)) => {
                        self.enqueue(pending);
                        while self.queue.len() >= self.config.max_batch_size {
                            self.flush_batch().await;
                        }
                    }
                    Some(Message::FlushAll(ack)) => {
                        while !self.queue.is_empty() {
                            self.flush_batch().await;
                        }
                        let _ = ack.send(());
                    }
                    None => {
                        // Producer gone: drain what remains, then exit
                        while !self.queue.is_empty() {
                            self.flush_batch().await;
                        }
                        return;
                    }
                },
                _ = timer => {
                    self.flush_batch().await;
                }
            }
        }
    }

    fn enqueue(&mut self, pending: Pending<T, R>) {
        // The bounded queue evicts the oldest item on overflow; its promise
        // is rejected and the overflow handler told
        if let Some(evicted) = self.queue.push(pending) {
            self.evicted_total.fetch_add(1, Ordering::SeqCst);
            let _ = evicted.reply.send(Err(SwarmError::QueueCapacity {
                capacity: self.config.max_queue_size,
            }));
            if let Some(handler) = &self.overflow {
                handler.as_ref()(evicted.item);
            }
        }
        self.queue_len.store(self.queue.len(), Ordering::SeqCst);
    }

    async fn flush_batch(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let take = self.queue.len().min(self.config.max_batch_size);
        let batch: Vec<Pending<T, R>> = self.queue.drain_front(take);
        self.queue_len.store(self.queue.len(), Ordering::SeqCst);
        self.in_flight.store(true, Ordering::SeqCst);

        let (items, replies): (Vec<T>, Vec<oneshot::Sender<Result<R, SwarmError>>>) =
            batch.into_iter().map(|p| (p.item, p.reply)).unzip();
        let count = items.len();
        debug!(batch_size = count, "Flushing batch");

        match self.process.as_ref()(items).await {
            Ok(results) => {
                let produced = results.len();
                let mut results = results.into_iter();
                for reply in replies {
                    // results[i] corresponds to inputs[i]; a short result set
                    // rejects the unmatched tail
                    match results.next() {
                        Some(result) => {
                            let _ = reply.send(Ok(result));
                        }
                        None => {
                            let _ = reply.send(Err(SwarmError::RunnerFailed {
                                task: uuid::Uuid::nil(),
                                message: format!(
                                    "batch produced {produced} results for {count} inputs"
                                ),
                            }));
                        }
                    }
                }
            }
            Err(message) => {
                warn!(error = %message, "Batch processing failed");
                for reply in replies {
                    let _ = reply.send(Err(SwarmError::Persistence {
                        backend: "batch-processor".to_string(),
                        message: message.clone(),
                    }));
                }
            }
        }
        self.in_flight.store(false, Ordering::SeqCst);
    }
}
