//! Core data types for the dragnet reconnaissance pipeline.
//!
//! These are the value objects shared by every stage: the batch messages the
//! generator publishes, the per-port and per-IP scan records the scanner
//! produces, and the envelopes the engine fans out to the downstream queues.
//!
//! Kept `SystemTime` for timestamps so serde-friendly serialization is
//! preserved across the bus; message envelopes carry unix seconds (`i64`)
//! to match the downstream consumers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Lifecycle states of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
            ScanStatus::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Port states returned by the TCP prober.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortStatus {
    Open,
    Closed,
    Filtered,
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PortStatus::Open => "open",
            PortStatus::Closed => "closed",
            PortStatus::Filtered => "filtered",
        };
        f.write_str(s)
    }
}

/// Source quality of a banner result, ordered `Port < Banner < Probe`.
///
/// `Probe` means rich structured output from a protocol probe module,
/// `Banner` a plain line read from an open socket, `Port` that no bytes were
/// obtained and the service was inferred from the port number alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Port,
    Banner,
    Probe,
}

impl Confidence {
    /// Base score used when ranking competing probe outputs.
    #[inline]
    #[must_use]
    pub const fn base_score(&self) -> i32 {
        match self {
            Confidence::Probe => 100,
            Confidence::Banner => 50,
            Confidence::Port => 10,
        }
    }
}

/// Structured banner information attached to an open port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BannerInfo {
    pub raw_banner: String,
    pub service: String,
    pub protocol: String,
    #[serde(default)]
    pub version: String,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl BannerInfo {
    /// Banner obtained from a plain socket line read.
    #[must_use]
    pub fn from_line(raw: String, service: String, version: String) -> Self {
        Self {
            raw_banner: raw,
            service,
            protocol: "tcp".to_string(),
            version,
            confidence: Confidence::Banner,
            metadata: serde_json::Map::new(),
        }
    }

    /// No bytes obtained; the service is inferred from the port number only.
    #[must_use]
    pub fn port_only(service: String) -> Self {
        Self {
            raw_banner: String::new(),
            service,
            protocol: "tcp".to_string(),
            version: String::new(),
            confidence: Confidence::Port,
            metadata: serde_json::Map::new(),
        }
    }
}

/// A single probed port with its classification and any acquired banner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub number: u16,
    pub status: PortStatus,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub banner: String,
    #[serde(default)]
    pub version: String,
    pub scan_time: SystemTime,
    pub response_time: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner_info: Option<BannerInfo>,
}

impl Port {
    /// New port record, closed until proven otherwise.
    #[inline]
    #[must_use]
    pub fn new(number: u16) -> Self {
        Self {
            number,
            status: PortStatus::Closed,
            service: String::new(),
            banner: String::new(),
            version: String::new(),
            scan_time: SystemTime::now(),
            response_time: Duration::ZERO,
            banner_info: None,
        }
    }

    /// Copy the banner fields onto the port record.
    pub fn apply_banner(&mut self, info: BannerInfo) {
        self.banner = info.raw_banner.clone();
        self.service = info.service.clone();
        self.version = info.version.clone();
        self.banner_info = Some(info);
    }

    #[inline]
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.status, PortStatus::Open)
    }
}

/// Complete scan result for one IP address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub ip: String,
    pub is_up: bool,
    pub ping_time: Duration,
    pub scan_start: SystemTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_end: Option<SystemTime>,
    pub status: ScanStatus,
    #[serde(default)]
    pub error: String,
    pub batch_id: String,
    pub worker_id: String,
    pub ports: Vec<Port>,
}

impl ScanResult {
    #[must_use]
    pub fn new(
        ip: impl Into<String>,
        batch_id: impl Into<String>,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            ip: ip.into(),
            is_up: false,
            ping_time: Duration::ZERO,
            scan_start: SystemTime::now(),
            scan_end: None,
            status: ScanStatus::Pending,
            error: String::new(),
            batch_id: batch_id.into(),
            worker_id: worker_id.into(),
            ports: Vec::new(),
        }
    }

    pub fn add_port(&mut self, port: Port) {
        self.ports.push(port);
    }

    /// Mark the scan as completed; a completed scan carries no error.
    pub fn set_completed(&mut self) {
        self.scan_end = Some(SystemTime::now());
        self.status = ScanStatus::Completed;
        self.error.clear();
    }

    pub fn set_failed(&mut self, error: impl Into<String>) {
        self.scan_end = Some(SystemTime::now());
        self.status = ScanStatus::Failed;
        self.error = error.into();
    }

    pub fn set_timeout(&mut self, error: impl Into<String>) {
        self.scan_end = Some(SystemTime::now());
        self.status = ScanStatus::Timeout;
        self.error = error.into();
    }

    /// All ports classified open.
    #[must_use]
    pub fn open_ports(&self) -> Vec<Port> {
        self.ports.iter().filter(|p| p.is_open()).cloned().collect()
    }

    /// Total scan duration; still-running scans measure up to now.
    #[must_use]
    pub fn duration(&self) -> Duration {
        let end = self.scan_end.unwrap_or_else(SystemTime::now);
        end.duration_since(self.scan_start).unwrap_or(Duration::ZERO)
    }
}

/// Tuning knobs for a scan, immutable per invocation.
///
/// `port_override` narrows the port list for a single request; empty means
/// use `default_ports`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub ping_timeout: Duration,
    pub connect_timeout: Duration,
    pub banner_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub outer_concurrency: usize,
    pub probe_pool_concurrency: usize,
    pub default_ports: Vec<u16>,
    pub priority_ports: Vec<u16>,
    #[serde(default)]
    pub port_override: Vec<u16>,
    pub enable_ping: bool,
    pub enable_banner: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ping_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(3),
            banner_timeout: Duration::from_secs(2),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            outer_concurrency: 100,
            probe_pool_concurrency: 20,
            default_ports: vec![
                21, 22, 23, 25, 53, 80, 110, 143, 443, 993, 995, 3306, 3389, 5432, 8080, 8443,
            ],
            priority_ports: vec![80, 443, 22, 21, 25, 3306, 5432],
            port_override: Vec::new(),
            enable_ping: true,
            enable_banner: true,
        }
    }
}

impl ScanConfig {
    /// Port list effective for this invocation.
    #[inline]
    #[must_use]
    pub fn effective_ports(&self) -> &[u16] {
        if self.port_override.is_empty() {
            &self.default_ports
        } else {
            &self.port_override
        }
    }
}

/// One generator batch as carried on the ingress queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMessage {
    pub ips: Vec<String>,
    pub batch_id: String,
    pub count: usize,
}

/// Full scan result envelope for the result queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResultMessage {
    pub scan_result: ScanResult,
    pub timestamp: i64,
    pub worker_id: String,
}

/// Liveness record for the enrichment queue, published for every scanned IP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentMessage {
    pub ip: String,
    pub is_up: bool,
    pub batch_id: String,
    pub timestamp: i64,
}

/// Open-port record for the service analysis queue; only published when open
/// ports exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAnalysisMessage {
    pub ip: String,
    pub open_ports: Vec<Port>,
    pub batch_id: String,
    pub timestamp: i64,
}

/// Runtime scan statistics collected incrementally, one update per IP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanStats {
    pub total_scanned: u64,
    pub successful_scans: u64,
    pub failed_scans: u64,
    pub average_scan_time: Duration,
    pub start_time: SystemTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scan_time: Option<SystemTime>,
}

impl ScanStats {
    #[must_use]
    pub fn new() -> Self {
        Self {
            total_scanned: 0,
            successful_scans: 0,
            failed_scans: 0,
            average_scan_time: Duration::ZERO,
            start_time: SystemTime::now(),
            last_scan_time: None,
        }
    }

    /// Incrementally fold a result into the counters.
    ///
    /// The rolling average only tracks successful scans:
    /// `new_avg = (old_avg * (n-1) + duration) / n`.
    pub fn update(&mut self, result: &ScanResult) {
        self.total_scanned += 1;
        self.last_scan_time = Some(SystemTime::now());

        if result.status == ScanStatus::Completed {
            self.successful_scans += 1;
            let n = self.successful_scans as u128;
            let old = self.average_scan_time.as_nanos();
            let add = result.duration().as_nanos();
            let total = old.saturating_mul(n - 1).saturating_add(add);
            self.average_scan_time = Duration::from_nanos((total / n) as u64);
        } else {
            self.failed_scans += 1;
        }
    }
}

impl Default for ScanStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Unix seconds for message envelope timestamps.
#[inline]
#[must_use]
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_ordering_and_scores() {
        assert!(Confidence::Probe > Confidence::Banner);
        assert!(Confidence::Banner > Confidence::Port);
        assert_eq!(Confidence::Probe.base_score(), 100);
        assert_eq!(Confidence::Banner.base_score(), 50);
        assert_eq!(Confidence::Port.base_score(), 10);
    }

    #[test]
    fn port_starts_closed() {
        let p = Port::new(443);
        assert_eq!(p.status, PortStatus::Closed);
        assert!(p.banner_info.is_none());
        assert!(!p.is_open());
    }

    #[test]
    fn port_apply_banner_copies_fields() {
        let mut p = Port::new(80);
        p.status = PortStatus::Open;
        p.apply_banner(BannerInfo::from_line(
            "Server: nginx/1.24.0".to_string(),
            "http".to_string(),
            "1.24.0".to_string(),
        ));
        assert_eq!(p.service, "http");
        assert_eq!(p.version, "1.24.0");
        assert_eq!(p.banner_info.as_ref().unwrap().confidence, Confidence::Banner);
    }

    #[test]
    fn scan_result_lifecycle() {
        let mut r = ScanResult::new("1.2.3.4", "batch-1-0", "worker-x");
        assert_eq!(r.status, ScanStatus::Pending);

        r.set_failed("boom");
        assert_eq!(r.status, ScanStatus::Failed);
        assert_eq!(r.error, "boom");

        r.set_completed();
        assert_eq!(r.status, ScanStatus::Completed);
        assert!(r.error.is_empty());
        assert!(r.scan_end.unwrap() >= r.scan_start);
    }

    #[test]
    fn open_ports_filters() {
        let mut r = ScanResult::new("1.2.3.4", "b", "w");
        let mut open = Port::new(80);
        open.status = PortStatus::Open;
        r.add_port(open);
        r.add_port(Port::new(81));
        let open = r.open_ports();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].number, 80);
    }

    #[test]
    fn effective_ports_override() {
        let mut cfg = ScanConfig::default();
        assert_eq!(cfg.effective_ports(), cfg.default_ports.as_slice());
        cfg.port_override = vec![8081];
        assert_eq!(cfg.effective_ports(), &[8081]);
    }

    #[test]
    fn stats_rolling_average() {
        let mut stats = ScanStats::new();
        let mut ok = ScanResult::new("1.1.1.1", "b", "w");
        ok.set_completed();
        stats.update(&ok);
        assert_eq!(stats.total_scanned, 1);
        assert_eq!(stats.successful_scans, 1);

        let mut bad = ScanResult::new("2.2.2.2", "b", "w");
        bad.set_failed("x");
        stats.update(&bad);
        assert_eq!(stats.total_scanned, 2);
        assert_eq!(stats.failed_scans, 1);
        assert!(stats.last_scan_time.is_some());
    }

    #[test]
    fn scan_result_message_round_trip() {
        let mut r = ScanResult::new("9.9.9.9", "batch-7-0", "worker-1");
        let mut p = Port::new(22);
        p.status = PortStatus::Open;
        p.apply_banner(BannerInfo::from_line(
            "SSH-2.0-OpenSSH_8.2".to_string(),
            "ssh".to_string(),
            "8.2".to_string(),
        ));
        r.add_port(p);
        r.is_up = true;
        r.set_completed();

        let msg = ScanResultMessage {
            scan_result: r,
            timestamp: unix_timestamp(),
            worker_id: "worker-1".to_string(),
        };

        let body = serde_json::to_vec(&msg).unwrap();
        let back: ScanResultMessage = serde_json::from_slice(&body).unwrap();
        assert_eq!(back.scan_result.ip, "9.9.9.9");
        assert_eq!(back.scan_result.status, ScanStatus::Completed);
        assert_eq!(back.scan_result.ports.len(), 1);
        assert_eq!(back.scan_result.ports[0].service, "ssh");
        assert_eq!(
            back.scan_result.ports[0].banner_info.as_ref().unwrap().confidence,
            Confidence::Banner
        );
    }

    #[test]
    fn batch_message_round_trip() {
        let msg = BatchMessage {
            ips: vec!["1.2.3.4".to_string(), "5.6.7.8".to_string()],
            batch_id: "batch-42-0".to_string(),
            count: 2,
        };
        let body = serde_json::to_vec(&msg).unwrap();
        let back: BatchMessage = serde_json::from_slice(&body).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ScanStatus::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(
            serde_json::to_string(&PortStatus::Filtered).unwrap(),
            "\"filtered\""
        );
        assert_eq!(serde_json::to_string(&Confidence::Probe).unwrap(), "\"probe\"");
    }
}
