//! The scan engine: batch consumption, scheduling and acknowledgement.
//!
//! A single consumer reads batch messages off the ingress queue. Each batch
//! schedules its IPs onto a semaphore-bounded worker group; every IP yields
//! a result (completed, failed or timed out) that fans out through the
//! sinks, and the delivery is acknowledged exactly once after the whole
//! batch is done. Malformed messages are acknowledged and dropped so a
//! poison message cannot wedge the queue.

use crate::sinks::{SinkFanout, SinkQueues};
use dashmap::DashMap;
use dragnet_common::{
    BatchMessage, Delivery, DragnetError, DragnetResult, MessageQueue, ResultStore, ScanResult,
    ScanStats,
};
use dragnet_probe::ProbePool;
use dragnet_scanner::Scanner;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Engine wiring and lifecycle configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub ip_queue: String,
    pub sink_queues: SinkQueues,
    pub shutdown_timeout: Duration,
    /// Upper bound on the advisory in-memory results table.
    pub results_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ip_queue: dragnet_common::IP_QUEUE.to_string(),
            sink_queues: SinkQueues::default(),
            shutdown_timeout: Duration::from_secs(30),
            results_capacity: 10_000,
        }
    }
}

/// Consumes generator batches and runs the scan pipeline over them.
pub struct ScanEngine {
    scanner: Scanner,
    pool: Arc<ProbePool>,
    bus: Arc<dyn MessageQueue>,
    config: EngineConfig,
    sinks: SinkFanout,
    worker_id: String,
    cancel: CancellationToken,
    running: AtomicBool,
    consumer: Mutex<Option<JoinHandle<()>>>,
    results: DashMap<String, ScanResult>,
}

impl ScanEngine {
    #[must_use]
    pub fn new(
        scanner: Scanner,
        pool: Arc<ProbePool>,
        bus: Arc<dyn MessageQueue>,
        store: Option<Arc<dyn ResultStore>>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let worker_id = format!("worker-{}", Uuid::new_v4());
        let sinks = SinkFanout::new(
            bus.clone(),
            store,
            config.sink_queues.clone(),
            worker_id.clone(),
        );
        Arc::new(Self {
            scanner,
            pool,
            bus,
            config,
            sinks,
            worker_id,
            cancel: CancellationToken::new(),
            running: AtomicBool::new(false),
            consumer: Mutex::new(None),
            results: DashMap::new(),
        })
    }

    #[must_use]
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Attach the consumer and start processing. Errors if already running.
    pub async fn start(self: &Arc<Self>) -> DragnetResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(DragnetError::AlreadyRunning);
        }

        let rx = match self.bus.consume(&self.config.ip_queue).await {
            Ok(rx) => rx,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        info!(worker_id = %self.worker_id, queue = %self.config.ip_queue, "scan engine started");
        let engine = self.clone();
        let handle = tokio::spawn(async move { engine.consume_loop(rx).await });
        *self.consumer.lock().await = Some(handle);
        Ok(())
    }

    /// Stop consuming, let in-flight work finish under the shutdown
    /// deadline, then close the probe pool.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        info!(worker_id = %self.worker_id, "stopping scan engine");
        self.cancel.cancel();

        let handle = self.consumer.lock().await.take();
        if let Some(handle) = handle {
            if timeout(self.config.shutdown_timeout, handle).await.is_err() {
                warn!("consumer did not drain within the shutdown deadline");
            }
        }

        self.pool.shutdown().await;
        info!(worker_id = %self.worker_id, "scan engine stopped");
    }

    /// Advisory lookup of the latest result for an IP.
    #[must_use]
    pub fn scan_status(&self, ip: &str) -> Option<ScanResult> {
        self.results.get(ip).map(|entry| entry.value().clone())
    }

    /// Snapshot of the scanner statistics.
    #[must_use]
    pub fn stats(&self) -> ScanStats {
        self.scanner.stats()
    }

    async fn consume_loop(self: Arc<Self>, mut rx: mpsc::Receiver<Delivery>) {
        loop {
            let delivery = tokio::select! {
                _ = self.cancel.cancelled() => break,
                delivery = rx.recv() => match delivery {
                    Some(delivery) => delivery,
                    None => break,
                },
            };
            self.handle_delivery(delivery).await;
        }
        debug!("consumer loop exited");
        // dropping rx detaches the consumer
    }

    async fn handle_delivery(self: &Arc<Self>, delivery: Delivery) {
        let message: BatchMessage = match serde_json::from_slice(&delivery.body) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "malformed batch message, dropping");
                if let Err(e) = delivery.ack().await {
                    error!(error = %e, "failed to ack poison message");
                }
                return;
            }
        };

        if message.ips.is_empty() {
            warn!(batch_id = %message.batch_id, "batch carries no addresses, dropping");
            if let Err(e) = delivery.ack().await {
                error!(error = %e, "failed to ack empty batch");
            }
            return;
        }

        match self.process_batch(&message).await {
            Ok(()) => {
                if let Err(e) = delivery.ack().await {
                    error!(batch_id = %message.batch_id, error = %e, "failed to ack batch");
                }
            }
            Err(e) => {
                error!(batch_id = %message.batch_id, error = %e, "batch processing failed, requeueing");
                if let Err(e) = delivery.nack(true).await {
                    error!(error = %e, "failed to nack batch");
                }
            }
        }
    }

    /// Scan every IP of one batch under the outer concurrency bound.
    async fn process_batch(self: &Arc<Self>, message: &BatchMessage) -> DragnetResult<()> {
        info!(
            batch_id = %message.batch_id,
            ip_count = message.ips.len(),
            "processing batch"
        );

        let semaphore = Arc::new(Semaphore::new(
            self.scanner.config().outer_concurrency.max(1),
        ));
        let mut handles = Vec::with_capacity(message.ips.len());

        for ip in &message.ips {
            if ip.is_empty() {
                warn!(batch_id = %message.batch_id, "skipping empty address");
                continue;
            }

            let engine = self.clone();
            let semaphore = semaphore.clone();
            let ip = ip.clone();
            let batch_id = message.batch_id.clone();
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                engine.scan_and_emit(&ip, &batch_id).await;
            }));
        }

        for handle in handles {
            handle
                .await
                .map_err(|e| DragnetError::Network(format!("scan task panicked: {e}")))?;
        }

        info!(batch_id = %message.batch_id, "batch completed");
        Ok(())
    }

    async fn scan_and_emit(&self, ip: &str, batch_id: &str) {
        let result = tokio::select! {
            result = self.scanner.scan_ip(ip, batch_id, &self.worker_id) => result,
            _ = self.cancel.cancelled() => {
                let mut result = ScanResult::new(ip, batch_id, &self.worker_id);
                result.set_timeout("scan cancelled by shutdown");
                result
            }
        };

        self.remember(&result);
        self.sinks.dispatch(&result).await;
    }

    /// Keep a bounded advisory copy of the latest result per IP.
    fn remember(&self, result: &ScanResult) {
        if self.results.contains_key(&result.ip) || self.results.len() < self.config.results_capacity
        {
            self.results.insert(result.ip.clone(), result.clone());
        }
    }
}
