//! Batch dispatch onto the ingress queue.
//!
//! Chunks an enumeration request into messages of bounded size and publishes
//! each durably. All chunks of one request share a base identifier; the
//! per-message id carries the chunk index so downstream consumers can
//! correlate partial results.

use crate::enumerate::{self, IpGenerator};
use dragnet_common::{BatchMessage, DragnetResult, MessageQueue};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

const DEFAULT_BATCH_SIZE: usize = 100;

/// Publishes enumerated addresses as batch messages.
pub struct BatchDispatcher {
    bus: Arc<dyn MessageQueue>,
    queue: String,
}

impl BatchDispatcher {
    #[must_use]
    pub fn new(bus: Arc<dyn MessageQueue>, queue: impl Into<String>) -> Self {
        Self {
            bus,
            queue: queue.into(),
        }
    }

    /// Generate `count` random addresses and publish them in chunks of
    /// `batch_size`. Returns the published messages.
    pub async fn dispatch_random(
        &self,
        generator: &mut IpGenerator,
        count: usize,
        batch_size: usize,
    ) -> DragnetResult<Vec<BatchMessage>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let batch_size = effective_batch_size(batch_size);
        let base_id = generate_batch_id();

        let num_batches = count.div_ceil(batch_size);
        let mut messages = Vec::with_capacity(num_batches);

        for i in 0..num_batches {
            let chunk = chunk_size(count, batch_size, i, num_batches);
            let ips = generator.random(chunk)?;
            messages.push(BatchMessage {
                ips: ips.iter().map(Ipv4Addr::to_string).collect(),
                batch_id: format!("{base_id}-{i}"),
                count: chunk,
            });
        }

        self.publish_all(&messages).await?;
        Ok(messages)
    }

    /// Generate `count` sequential addresses starting at `start` and publish
    /// them in chunks. Each chunk resumes one past the previous chunk's last
    /// address.
    pub async fn dispatch_sequential(
        &self,
        start: Ipv4Addr,
        count: usize,
        batch_size: usize,
    ) -> DragnetResult<Vec<BatchMessage>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let batch_size = effective_batch_size(batch_size);
        let base_id = generate_batch_id();

        let num_batches = count.div_ceil(batch_size);
        let mut messages = Vec::with_capacity(num_batches);
        let mut cursor = start;

        for i in 0..num_batches {
            let chunk = chunk_size(count, batch_size, i, num_batches);
            let ips = enumerate::sequential(cursor, chunk)?;
            if let Some(last) = ips.last() {
                cursor = enumerate::next_address(*last)?;
            }
            messages.push(BatchMessage {
                ips: ips.iter().map(Ipv4Addr::to_string).collect(),
                batch_id: format!("{base_id}-{i}"),
                count: chunk,
            });
        }

        self.publish_all(&messages).await?;
        Ok(messages)
    }

    async fn publish_all(&self, messages: &[BatchMessage]) -> DragnetResult<()> {
        for message in messages {
            let body = serde_json::to_vec(message)?;
            self.bus.publish(&self.queue, body).await?;
            info!(
                batch_id = %message.batch_id,
                count = message.count,
                "published batch"
            );
        }
        Ok(())
    }
}

fn effective_batch_size(batch_size: usize) -> usize {
    if batch_size == 0 {
        DEFAULT_BATCH_SIZE
    } else {
        batch_size
    }
}

fn chunk_size(count: usize, batch_size: usize, index: usize, num_batches: usize) -> usize {
    if index == num_batches - 1 && count % batch_size != 0 {
        count % batch_size
    } else {
        batch_size
    }
}

fn generate_batch_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("batch-{nanos}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dragnet_common::mem::MemoryQueue;
    use dragnet_common::IP_QUEUE;

    fn dispatcher(bus: &MemoryQueue) -> BatchDispatcher {
        BatchDispatcher::new(Arc::new(bus.clone()), IP_QUEUE)
    }

    #[tokio::test]
    async fn partitions_exactly() {
        let bus = MemoryQueue::new();
        let mut generator = IpGenerator::new(7);

        let messages = dispatcher(&bus)
            .dispatch_random(&mut generator, 250, 100)
            .await
            .unwrap();

        assert_eq!(messages.len(), 3);
        assert_eq!(
            messages.iter().map(|m| m.count).collect::<Vec<_>>(),
            vec![100, 100, 50]
        );
        assert_eq!(messages.iter().map(|m| m.count).sum::<usize>(), 250);
        for message in &messages {
            assert_eq!(message.count, message.ips.len());
        }

        let base = messages[0].batch_id.strip_suffix("-0").unwrap().to_string();
        assert_eq!(messages[1].batch_id, format!("{base}-1"));
        assert_eq!(messages[2].batch_id, format!("{base}-2"));

        assert_eq!(bus.depth(IP_QUEUE).await, 3);
    }

    #[tokio::test]
    async fn zero_count_publishes_nothing() {
        let bus = MemoryQueue::new();
        let mut generator = IpGenerator::new(7);

        let messages = dispatcher(&bus)
            .dispatch_random(&mut generator, 0, 100)
            .await
            .unwrap();
        assert!(messages.is_empty());
        assert_eq!(bus.depth(IP_QUEUE).await, 0);
    }

    #[tokio::test]
    async fn batch_size_covering_count_yields_one_message() {
        let bus = MemoryQueue::new();
        let mut generator = IpGenerator::new(7);

        let messages = dispatcher(&bus)
            .dispatch_random(&mut generator, 30, 100)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].count, 30);
        assert!(messages[0].batch_id.ends_with("-0"));
    }

    #[tokio::test]
    async fn zero_batch_size_falls_back_to_default() {
        let bus = MemoryQueue::new();
        let mut generator = IpGenerator::new(7);

        let messages = dispatcher(&bus)
            .dispatch_random(&mut generator, 150, 0)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].count, 100);
        assert_eq!(messages[1].count, 50);
    }

    #[tokio::test]
    async fn sequential_chunks_are_contiguous() {
        let bus = MemoryQueue::new();

        let messages = dispatcher(&bus)
            .dispatch_sequential("1.0.0.0".parse().unwrap(), 25, 10)
            .await
            .unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].count, 5);

        // chunk i+1 picks up exactly one past chunk i's last address
        assert_eq!(messages[0].ips[9], "1.0.0.9");
        assert_eq!(messages[1].ips[0], "1.0.0.10");
        assert_eq!(messages[1].ips[9], "1.0.0.19");
        assert_eq!(messages[2].ips[0], "1.0.0.20");
    }

    #[tokio::test]
    async fn published_bodies_decode_to_batch_messages() {
        let bus = MemoryQueue::new();
        let mut generator = IpGenerator::new(7);

        dispatcher(&bus)
            .dispatch_random(&mut generator, 5, 5)
            .await
            .unwrap();

        let bodies = bus.drain(IP_QUEUE).await;
        assert_eq!(bodies.len(), 1);
        let decoded: BatchMessage = serde_json::from_slice(&bodies[0]).unwrap();
        assert_eq!(decoded.count, 5);
        assert_eq!(decoded.ips.len(), 5);
    }
}
