//! End-to-end pipeline tests over the in-memory bus and store.

use async_trait::async_trait;
use dragnet_common::mem::{MemoryQueue, MemoryStore};
use dragnet_common::{
    BatchMessage, DragnetError, DragnetResult, EnrichmentMessage, MessageQueue, ScanConfig,
    ScanResultMessage, ScanStatus, ENRICHMENT_QUEUE, IP_QUEUE, SCAN_RESULT_QUEUE,
    SERVICE_ANALYSIS_QUEUE,
};
use dragnet_engine::{EngineConfig, ScanEngine};
use dragnet_probe::{BannerCoordinator, ProbeExecutor, ProbePool};
use dragnet_scanner::Scanner;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

struct NoProbe;

#[async_trait]
impl ProbeExecutor for NoProbe {
    async fn execute(
        &self,
        _ip: &str,
        _port: u16,
        _modules: &[&str],
        _deadline: Duration,
    ) -> DragnetResult<String> {
        Err(DragnetError::Environment("no probe binary".to_string()))
    }
}

fn scan_config(ports: Vec<u16>) -> ScanConfig {
    ScanConfig {
        connect_timeout: Duration::from_millis(300),
        banner_timeout: Duration::from_millis(200),
        max_retries: 0,
        retry_delay: Duration::from_millis(10),
        outer_concurrency: 16,
        port_override: ports,
        enable_ping: false,
        enable_banner: false,
        ..ScanConfig::default()
    }
}

fn build_engine(
    bus: &MemoryQueue,
    store: &MemoryStore,
    config: ScanConfig,
) -> Arc<ScanEngine> {
    let pool = Arc::new(ProbePool::new(
        config.probe_pool_concurrency,
        config.banner_timeout,
        Arc::new(NoProbe),
    ));
    let coordinator = Arc::new(BannerCoordinator::new(
        pool.clone(),
        &config.priority_ports,
        config.banner_timeout,
    ));
    let scanner = Scanner::new(config, coordinator);
    ScanEngine::new(
        scanner,
        pool,
        Arc::new(bus.clone()),
        Some(Arc::new(store.clone())),
        EngineConfig {
            shutdown_timeout: Duration::from_secs(5),
            ..EngineConfig::default()
        },
    )
}

async fn publish_batch(bus: &MemoryQueue, ips: &[&str], batch_id: &str) {
    let message = BatchMessage {
        ips: ips.iter().map(|s| s.to_string()).collect(),
        batch_id: batch_id.to_string(),
        count: ips.len(),
    };
    bus.publish(IP_QUEUE, serde_json::to_vec(&message).unwrap())
        .await
        .unwrap();
}

async fn wait_for_depth(bus: &MemoryQueue, queue: &str, expected: usize) {
    for _ in 0..250 {
        if bus.depth(queue).await >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "queue {queue} never reached depth {expected} (got {})",
        bus.depth(queue).await
    );
}

async fn wait_for_acks(bus: &MemoryQueue, expected: u64) {
    for _ in 0..250 {
        if bus.ack_count() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("ack count never reached {expected} (got {})", bus.ack_count());
}

#[tokio::test]
async fn batch_flows_through_all_sinks() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open_port = listener.local_addr().unwrap().port();

    let bus = MemoryQueue::new();
    let store = MemoryStore::new();
    let engine = build_engine(&bus, &store, scan_config(vec![open_port]));

    publish_batch(&bus, &["127.0.0.1", "127.0.0.2", "127.0.0.3"], "batch-t-0").await;
    engine.start().await.unwrap();

    wait_for_depth(&bus, ENRICHMENT_QUEUE, 3).await;
    wait_for_depth(&bus, SCAN_RESULT_QUEUE, 3).await;
    wait_for_acks(&bus, 1).await;

    // the listener is bound to 127.0.0.1 only, so exactly one IP has an
    // open port and exactly one service-analysis record appears
    wait_for_depth(&bus, SERVICE_ANALYSIS_QUEUE, 1).await;
    assert_eq!(bus.depth(SERVICE_ANALYSIS_QUEUE).await, 1);

    let enrichments: Vec<EnrichmentMessage> = bus
        .drain(ENRICHMENT_QUEUE)
        .await
        .iter()
        .map(|b| serde_json::from_slice(b).unwrap())
        .collect();
    assert_eq!(enrichments.len(), 3);
    assert!(enrichments.iter().all(|e| e.batch_id == "batch-t-0"));
    assert!(enrichments.iter().all(|e| e.is_up));

    let results: Vec<ScanResultMessage> = bus
        .drain(SCAN_RESULT_QUEUE)
        .await
        .iter()
        .map(|b| serde_json::from_slice(b).unwrap())
        .collect();
    assert!(results
        .iter()
        .all(|m| m.scan_result.status == ScanStatus::Completed));
    assert!(results
        .iter()
        .all(|m| m.scan_result.worker_id == engine.worker_id()));

    assert_eq!(store.len().await, 3);
    assert_eq!(bus.ack_count(), 1);

    let stats = engine.stats();
    assert_eq!(stats.total_scanned, 3);
    assert_eq!(stats.successful_scans, 3);

    assert!(engine.scan_status("127.0.0.1").is_some());
    assert!(engine.scan_status("10.99.99.99").is_none());

    engine.stop().await;
}

#[tokio::test]
async fn malformed_message_is_acked_and_dropped() {
    let bus = MemoryQueue::new();
    let store = MemoryStore::new();
    let engine = build_engine(&bus, &store, scan_config(vec![1]));

    bus.publish(IP_QUEUE, b"this is not json".to_vec())
        .await
        .unwrap();
    engine.start().await.unwrap();

    wait_for_acks(&bus, 1).await;
    assert_eq!(bus.depth(ENRICHMENT_QUEUE).await, 0);
    assert_eq!(engine.stats().total_scanned, 0);
    assert_eq!(store.len().await, 0);

    engine.stop().await;
}

#[tokio::test]
async fn failing_ip_still_produces_downstream_records() {
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed_port = closed.local_addr().unwrap().port();
    drop(closed);

    let bus = MemoryQueue::new();
    let store = MemoryStore::new();
    let engine = build_engine(&bus, &store, scan_config(vec![closed_port]));

    publish_batch(&bus, &["127.0.0.1", "300.300.300.300"], "batch-f-0").await;
    engine.start().await.unwrap();

    wait_for_depth(&bus, ENRICHMENT_QUEUE, 2).await;
    wait_for_acks(&bus, 1).await;

    let results: Vec<ScanResultMessage> = bus
        .drain(SCAN_RESULT_QUEUE)
        .await
        .iter()
        .map(|b| serde_json::from_slice(b).unwrap())
        .collect();
    assert_eq!(results.len(), 2);

    let failed = results
        .iter()
        .find(|m| m.scan_result.status == ScanStatus::Failed)
        .expect("one result should be failed");
    assert_eq!(failed.scan_result.ip, "300.300.300.300");
    assert!(!failed.scan_result.error.is_empty());
    assert!(!failed.scan_result.is_up);

    let completed = results
        .iter()
        .find(|m| m.scan_result.status == ScanStatus::Completed)
        .expect("one result should complete");
    assert_eq!(completed.scan_result.ip, "127.0.0.1");

    let stats = engine.stats();
    assert_eq!(stats.total_scanned, 2);
    assert_eq!(stats.failed_scans, 1);

    engine.stop().await;
}

#[tokio::test]
async fn start_is_not_reentrant() {
    let bus = MemoryQueue::new();
    let store = MemoryStore::new();
    let engine = build_engine(&bus, &store, scan_config(vec![1]));

    engine.start().await.unwrap();
    assert!(matches!(
        engine.start().await,
        Err(DragnetError::AlreadyRunning)
    ));

    engine.stop().await;
    // stop twice is a no-op
    engine.stop().await;
}

#[tokio::test]
async fn batches_after_start_are_consumed_live() {
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed_port = closed.local_addr().unwrap().port();
    drop(closed);

    let bus = MemoryQueue::new();
    let store = MemoryStore::new();
    let engine = build_engine(&bus, &store, scan_config(vec![closed_port]));

    engine.start().await.unwrap();
    publish_batch(&bus, &["127.0.0.1"], "batch-l-0").await;
    publish_batch(&bus, &["127.0.0.2"], "batch-l-1").await;

    wait_for_depth(&bus, ENRICHMENT_QUEUE, 2).await;
    wait_for_acks(&bus, 2).await;
    assert_eq!(store.len().await, 2);

    engine.stop().await;
}
