//! Collaborator contracts for the dragnet pipeline.
//!
//! The message bus and the document store live behind these seams. The
//! pipeline only relies on queue semantics (durable publish, manual
//! per-delivery acknowledgement) and a single best-effort write, so broker
//! and database adapters stay out of the core crates; tests and the local
//! pipeline use the in-memory implementations from [`crate::mem`].

use crate::error::DragnetResult;
use crate::types::ScanResult;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// One message handed to a consumer, acknowledged exactly once.
pub struct Delivery {
    pub body: Vec<u8>,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    #[must_use]
    pub fn new(body: Vec<u8>, acker: Box<dyn Acknowledger>) -> Self {
        Self { body, acker }
    }

    /// Acknowledge the delivery; the bus may then delete the message.
    pub async fn ack(self) -> DragnetResult<()> {
        self.acker.ack().await
    }

    /// Negatively acknowledge; `requeue` puts the message back at the head
    /// of the queue for redelivery.
    pub async fn nack(self, requeue: bool) -> DragnetResult<()> {
        self.acker.nack(requeue).await
    }
}

/// Acknowledgement half of a [`Delivery`].
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(self: Box<Self>) -> DragnetResult<()>;
    async fn nack(self: Box<Self>, requeue: bool) -> DragnetResult<()>;
}

/// Durable message queue with manual acknowledgement.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Publish a message durably onto the named queue.
    async fn publish(&self, queue: &str, body: Vec<u8>) -> DragnetResult<()>;

    /// Attach a consumer to the named queue. Deliveries arrive on the
    /// returned channel until the receiver is dropped; each must be acked or
    /// nacked by the caller.
    async fn consume(&self, queue: &str) -> DragnetResult<mpsc::Receiver<Delivery>>;
}

/// Document persistence for scan results, best effort from the engine's
/// point of view.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save(&self, result: &ScanResult) -> DragnetResult<()>;
}
