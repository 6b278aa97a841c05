//! Result fan-out to the downstream queues and the document store.
//!
//! Every scan result produces up to three publishes and one persistence
//! write. Each sink is isolated: a failure is logged and suppresses nothing
//! else. Persistence is best effort and bounded so a slow store cannot
//! stall the pipeline.

use dragnet_common::types::unix_timestamp;
use dragnet_common::{
    EnrichmentMessage, MessageQueue, ResultStore, ScanResult, ScanResultMessage,
    ServiceAnalysisMessage,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

const STORE_DEADLINE: Duration = Duration::from_secs(5);

/// Queue names for the three egress sinks.
#[derive(Debug, Clone)]
pub struct SinkQueues {
    pub scan_result: String,
    pub enrichment: String,
    pub service_analysis: String,
}

impl Default for SinkQueues {
    fn default() -> Self {
        Self {
            scan_result: dragnet_common::SCAN_RESULT_QUEUE.to_string(),
            enrichment: dragnet_common::ENRICHMENT_QUEUE.to_string(),
            service_analysis: dragnet_common::SERVICE_ANALYSIS_QUEUE.to_string(),
        }
    }
}

/// Fans one scan result out to the egress queues and the store.
pub struct SinkFanout {
    bus: Arc<dyn MessageQueue>,
    store: Option<Arc<dyn ResultStore>>,
    queues: SinkQueues,
    worker_id: String,
}

impl SinkFanout {
    #[must_use]
    pub fn new(
        bus: Arc<dyn MessageQueue>,
        store: Option<Arc<dyn ResultStore>>,
        queues: SinkQueues,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            store,
            queues,
            worker_id: worker_id.into(),
        }
    }

    /// Publish the result on every applicable sink. Never fails; sink
    /// errors are logged and swallowed.
    pub async fn dispatch(&self, result: &ScanResult) {
        let timestamp = unix_timestamp();

        let full = ScanResultMessage {
            scan_result: result.clone(),
            timestamp,
            worker_id: self.worker_id.clone(),
        };
        self.publish(&self.queues.scan_result, &full).await;

        let enrichment = EnrichmentMessage {
            ip: result.ip.clone(),
            is_up: result.is_up,
            batch_id: result.batch_id.clone(),
            timestamp,
        };
        self.publish(&self.queues.enrichment, &enrichment).await;

        let open_ports = result.open_ports();
        if !open_ports.is_empty() {
            let analysis = ServiceAnalysisMessage {
                ip: result.ip.clone(),
                open_ports,
                batch_id: result.batch_id.clone(),
                timestamp,
            };
            self.publish(&self.queues.service_analysis, &analysis).await;
        }

        if let Some(store) = &self.store {
            match timeout(STORE_DEADLINE, store.save(result)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(ip = %result.ip, error = %e, "result store write failed"),
                Err(_) => error!(ip = %result.ip, "result store write timed out"),
            }
        }
    }

    async fn publish<T: Serialize>(&self, queue: &str, message: &T) {
        let body = match serde_json::to_vec(message) {
            Ok(body) => body,
            Err(e) => {
                error!(queue, error = %e, "failed to serialize sink message");
                return;
            }
        };
        match self.bus.publish(queue, body).await {
            Ok(()) => info!(queue, "published sink message"),
            Err(e) => error!(queue, error = %e, "sink publish failed"),
        }
    }
}
