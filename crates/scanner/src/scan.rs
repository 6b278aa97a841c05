//! Full per-IP scan composition.
//!
//! Ping gate, concurrent port sweep under an IP-local semaphore, banner
//! acquisition for open ports, aggregation into a [`ScanResult`]. The
//! scanner is stateless across invocations apart from the shared statistics
//! counters.

use crate::ping::{validate_ip, Pinger};
use crate::tcp::PortProber;
use dragnet_common::{DragnetError, Port, ScanConfig, ScanResult, ScanStats};
use dragnet_probe::BannerCoordinator;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Composes the reachability probe, the port prober and the banner
/// coordinator into complete per-IP scans.
#[derive(Clone)]
pub struct Scanner {
    config: Arc<ScanConfig>,
    pinger: Pinger,
    prober: PortProber,
    banner: Arc<BannerCoordinator>,
    stats: Arc<RwLock<ScanStats>>,
}

impl Scanner {
    #[must_use]
    pub fn new(config: ScanConfig, banner: Arc<BannerCoordinator>) -> Self {
        let pinger = Pinger::new(config.ping_timeout);
        let prober = PortProber::new(config.connect_timeout);
        Self {
            config: Arc::new(config),
            pinger,
            prober,
            banner,
            stats: Arc::new(RwLock::new(ScanStats::new())),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Snapshot of the shared statistics.
    #[must_use]
    pub fn stats(&self) -> ScanStats {
        self.stats.read().clone()
    }

    /// Run a complete scan of one IP. Failures are folded into the returned
    /// result rather than surfaced as errors, so every scheduled IP yields a
    /// record for the downstream sinks.
    pub async fn scan_ip(&self, ip: &str, batch_id: &str, worker_id: &str) -> ScanResult {
        let mut result = ScanResult::new(ip, batch_id, worker_id);
        result.status = dragnet_common::ScanStatus::Running;

        if let Err(e) = validate_ip(ip) {
            result.set_failed(e.to_string());
            self.update_stats(&result);
            return result;
        }

        if self.config.enable_ping {
            match self.pinger.ping(ip).await {
                Ok(outcome) => {
                    result.is_up = outcome.is_up;
                    result.ping_time = outcome.duration;
                    if !outcome.is_up {
                        debug!(ip, "host down, skipping port sweep");
                        result.set_completed();
                        self.update_stats(&result);
                        return result;
                    }
                }
                Err(e) => {
                    result.set_failed(format!("ping failed: {e}"));
                    self.update_stats(&result);
                    return result;
                }
            }
        } else {
            result.is_up = true;
        }

        let ports = self.sweep_ports(ip).await;
        for port in ports {
            result.add_port(port);
        }

        result.set_completed();
        self.update_stats(&result);
        info!(
            ip,
            open = result.open_ports().len(),
            total = result.ports.len(),
            "scan completed"
        );
        result
    }

    /// Probe every effective port concurrently under the IP-local semaphore.
    async fn sweep_ports(&self, ip: &str) -> Vec<Port> {
        let semaphore = Arc::new(Semaphore::new(self.config.outer_concurrency.max(1)));
        let mut handles = Vec::with_capacity(self.config.effective_ports().len());

        for &port in self.config.effective_ports() {
            let scanner = self.clone();
            let ip = ip.to_string();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                Some(scanner.scan_port(&ip, port).await)
            }));
        }

        let mut ports = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(Some(port)) => ports.push(port),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "port task failed"),
            }
        }
        ports
    }

    /// One port: retried probe, then banner acquisition when open.
    async fn scan_port(&self, ip: &str, port: u16) -> Port {
        let mut record = self.probe_with_retry(ip, port).await;

        if record.is_open() && self.config.enable_banner {
            match self.banner.get_banner(ip, port).await {
                Ok(info) => record.apply_banner(info),
                Err(e) => debug!(ip, port, error = %e, "no banner acquired"),
            }
        }

        record
    }

    /// Retry loop around genuinely errored probes. Refusal and deadline
    /// expiry are classifications, not errors, so they return immediately.
    async fn probe_with_retry(&self, ip: &str, port: u16) -> Port {
        let mut last_error: Option<DragnetError> = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay).await;
            }
            match self.prober.probe(ip, port).await {
                Ok(record) => return record,
                Err(e) => {
                    debug!(ip, port, attempt, error = %e, "port probe errored");
                    last_error = Some(e);
                }
            }
        }

        if let Some(e) = last_error {
            warn!(ip, port, error = %e, "port probe exhausted retries");
        }
        Port::new(port)
    }

    fn update_stats(&self, result: &ScanResult) {
        self.stats.write().update(result);
    }
}
