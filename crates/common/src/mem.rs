//! In-process implementations of the bus and store contracts.
//!
//! `MemoryQueue` preserves the semantics the engine depends on: publishes
//! are buffered until a consumer attaches, deliveries require manual
//! acknowledgement, and a nack with `requeue` puts the message back at the
//! head of the queue. It backs the integration tests and the CLI's local
//! pipeline mode.

use crate::error::{DragnetError, DragnetResult};
use crate::traits::{Acknowledger, Delivery, MessageQueue, ResultStore};
use crate::types::ScanResult;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

const CONSUMER_BUFFER: usize = 1024;

#[derive(Default)]
struct QueueState {
    backlog: VecDeque<Vec<u8>>,
    consumer: Option<mpsc::Sender<Delivery>>,
}

#[derive(Default)]
struct Inner {
    queues: Mutex<HashMap<String, QueueState>>,
    acked: AtomicU64,
    nacked: AtomicU64,
}

/// In-memory durable queue.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    inner: Arc<Inner>,
}

impl MemoryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages currently buffered (not yet delivered) on a queue.
    pub async fn depth(&self, queue: &str) -> usize {
        let queues = self.inner.queues.lock().await;
        queues.get(queue).map_or(0, |q| q.backlog.len())
    }

    /// Drain every buffered message from a queue. Test helper for inspecting
    /// sink output.
    pub async fn drain(&self, queue: &str) -> Vec<Vec<u8>> {
        let mut queues = self.inner.queues.lock().await;
        queues
            .get_mut(queue)
            .map(|q| q.backlog.drain(..).collect())
            .unwrap_or_default()
    }

    /// Total acknowledgements observed across all queues.
    pub fn ack_count(&self) -> u64 {
        self.inner.acked.load(Ordering::Relaxed)
    }

    /// Total negative acknowledgements observed across all queues.
    pub fn nack_count(&self) -> u64 {
        self.inner.nacked.load(Ordering::Relaxed)
    }

    async fn deliver(&self, queue: &str, body: Vec<u8>, front: bool) -> DragnetResult<()> {
        let mut queues = self.inner.queues.lock().await;
        let state = queues.entry(queue.to_string()).or_default();

        let mut consumer_gone = false;
        if let Some(tx) = &state.consumer {
            let delivery = Delivery::new(
                body.clone(),
                Box::new(MemAcker {
                    queue: queue.to_string(),
                    body: body.clone(),
                    bus: self.clone(),
                }),
            );
            match tx.try_send(delivery) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // consumer saturated, fall through to the backlog
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    consumer_gone = true;
                }
            }
        }
        if consumer_gone {
            state.consumer = None;
        }

        if front {
            state.backlog.push_front(body);
        } else {
            state.backlog.push_back(body);
        }
        Ok(())
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn publish(&self, queue: &str, body: Vec<u8>) -> DragnetResult<()> {
        self.deliver(queue, body, false).await
    }

    async fn consume(&self, queue: &str) -> DragnetResult<mpsc::Receiver<Delivery>> {
        let (tx, rx) = mpsc::channel(CONSUMER_BUFFER);

        let mut queues = self.inner.queues.lock().await;
        let state = queues.entry(queue.to_string()).or_default();
        if state.consumer.is_some() {
            return Err(DragnetError::Queue(format!(
                "queue {queue} already has a consumer"
            )));
        }

        while let Some(body) = state.backlog.pop_front() {
            let delivery = Delivery::new(
                body.clone(),
                Box::new(MemAcker {
                    queue: queue.to_string(),
                    body,
                    bus: self.clone(),
                }),
            );
            if let Err(e) = tx.try_send(delivery) {
                let delivery = match e {
                    mpsc::error::TrySendError::Full(d) | mpsc::error::TrySendError::Closed(d) => d,
                };
                state.backlog.push_front(delivery.body.clone());
                break;
            }
        }

        state.consumer = Some(tx);
        Ok(rx)
    }
}

struct MemAcker {
    queue: String,
    body: Vec<u8>,
    bus: MemoryQueue,
}

#[async_trait]
impl Acknowledger for MemAcker {
    async fn ack(self: Box<Self>) -> DragnetResult<()> {
        self.bus.inner.acked.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn nack(self: Box<Self>, requeue: bool) -> DragnetResult<()> {
        self.bus.inner.nacked.fetch_add(1, Ordering::Relaxed);
        if requeue {
            self.bus.deliver(&self.queue, self.body, true).await?;
        }
        Ok(())
    }
}

/// In-memory result store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    results: Arc<Mutex<Vec<ScanResult>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<ScanResult> {
        self.results.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.results.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.results.lock().await.is_empty()
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn save(&self, result: &ScanResult) -> DragnetResult<()> {
        self.results.lock().await.push(result.clone());
        Ok(())
    }
}
