//! Banner acquisition strategy per open port.
//!
//! Priority and common service ports go through the structured probe path
//! (the worker pool running protocol modules); everything else, and every
//! structured failure, takes the minimal line-read path. When a probe run
//! emits several documents the coordinator scores them and keeps the best.

use crate::detect;
use crate::fallback;
use crate::modules::{is_common_probe_port, modules_for_port, probe_priority};
use crate::pool::ProbePool;
use dragnet_common::{BannerInfo, Confidence, DragnetError, DragnetResult};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Selects and runs the banner strategy for open ports.
pub struct BannerCoordinator {
    pool: Arc<ProbePool>,
    priority_ports: HashSet<u16>,
    deadline: Duration,
}

impl BannerCoordinator {
    #[must_use]
    pub fn new(pool: Arc<ProbePool>, priority_ports: &[u16], deadline: Duration) -> Self {
        Self {
            pool,
            priority_ports: priority_ports.iter().copied().collect(),
            deadline,
        }
    }

    /// Acquire the best available banner for `(ip, port)`.
    pub async fn get_banner(&self, ip: &str, port: u16) -> DragnetResult<BannerInfo> {
        if self.use_structured_probe(port) {
            match self.structured_probe(ip, port).await {
                Ok(info) => return Ok(info),
                Err(e) => {
                    debug!(ip, port, error = %e, "structured probe failed, using line read");
                }
            }
        }
        fallback::line_read_banner(ip, port, self.deadline).await
    }

    fn use_structured_probe(&self, port: u16) -> bool {
        self.priority_ports.contains(&port) || is_common_probe_port(port)
    }

    async fn structured_probe(&self, ip: &str, port: u16) -> DragnetResult<BannerInfo> {
        let modules = modules_for_port(port);
        let output = self
            .pool
            .submit(ip, port, modules, probe_priority(port))
            .await?;
        select_best_result(&output, port)
    }
}

/// Parse probe output (one JSON document per line) and pick the
/// highest-scoring result. Errors when no document parses.
pub fn select_best_result(output: &str, port: u16) -> DragnetResult<BannerInfo> {
    let mut best: Option<(i32, BannerInfo)> = None;

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let document: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let Some(data) = document.get("data").and_then(Value::as_object) else {
            continue;
        };

        let info = analyze_document(data, port);
        let score = score_result(&info);
        // strictly greater keeps the first-seen document on ties
        if best.as_ref().map_or(true, |(s, _)| score > *s) {
            best = Some((score, info));
        }
    }

    best.map(|(_, info)| info).ok_or_else(|| {
        DragnetError::Parse(format!("no parseable probe document for port {port}"))
    })
}

/// Deterministic ranking of a probe result.
pub fn score_result(info: &BannerInfo) -> i32 {
    let mut score = info.confidence.base_score();
    if !info.version.is_empty() {
        score += 20;
    }
    if info.raw_banner.len() > 10 {
        score += 10;
    }
    if !info.metadata.is_empty() {
        score += 5;
    }
    score
}

/// Build a [`BannerInfo`] from one probe document's `data` object.
fn analyze_document(data: &serde_json::Map<String, Value>, port: u16) -> BannerInfo {
    BannerInfo {
        raw_banner: extract_raw_banner(data),
        service: identify_service(data, port),
        protocol: "tcp".to_string(),
        version: extract_module_version(data),
        confidence: determine_confidence(data),
        metadata: data.clone(),
    }
}

/// Probe modules whose presence in a document identifies the service.
const MODULE_SERVICES: &[(&str, &str)] = &[
    ("http", "http"),
    ("https", "https"),
    ("ssh", "ssh"),
    ("ftp", "ftp"),
    ("smtp", "smtp"),
    ("pop3", "pop3"),
    ("imap", "imap"),
    ("telnet", "telnet"),
    ("tls", "tls"),
    ("mysql", "mysql"),
    ("postgres", "postgresql"),
    ("redis", "redis"),
    ("mongodb", "mongodb"),
    ("oracle", "oracle"),
    ("mssql", "mssql"),
    ("elasticsearch", "elasticsearch"),
    ("memcached", "memcached"),
    ("couchdb", "couchdb"),
];

fn identify_service(data: &serde_json::Map<String, Value>, port: u16) -> String {
    for (module, service) in MODULE_SERVICES {
        if data.contains_key(*module) {
            return (*service).to_string();
        }
    }
    detect::identify_service(port, "")
}

fn determine_confidence(data: &serde_json::Map<String, Value>) -> Confidence {
    if data
        .keys()
        .any(|k| k != "banner" && k != "ip" && k != "domain")
    {
        return Confidence::Probe;
    }
    if let Some(banner) = data.get("banner").and_then(Value::as_str) {
        if banner.trim().len() > 5 {
            return Confidence::Banner;
        }
    }
    Confidence::Port
}

fn extract_raw_banner(data: &serde_json::Map<String, Value>) -> String {
    if let Some(banner) = data.get("banner").and_then(Value::as_str) {
        return banner.trim().to_string();
    }
    if let Some(status) = lookup_str(data, &["http", "response", "status"]) {
        return format!("HTTP {status}");
    }
    if let Some(banner) = lookup_str(data, &["ssh", "server_banner"]) {
        return banner.trim().to_string();
    }
    if let Some(version) = lookup_str(data, &["tls", "handshake_log", "server_hello", "version"]) {
        return format!("TLS {version}");
    }
    serde_json::to_string(data).unwrap_or_else(|_| "No banner available".to_string())
}

fn extract_module_version(data: &serde_json::Map<String, Value>) -> String {
    for (module, value) in data {
        let Some(module_data) = value.as_object() else {
            continue;
        };
        let version = version_from_module(module, module_data);
        if !version.is_empty() {
            return version;
        }
    }
    if let Some(banner) = data.get("banner").and_then(Value::as_str) {
        return detect::extract_version(banner);
    }
    String::new()
}

fn version_from_module(module: &str, data: &serde_json::Map<String, Value>) -> String {
    match module {
        "http" => lookup_str(data, &["response", "headers", "server"])
            .map(detect::extract_version)
            .unwrap_or_default(),
        "ssh" => data
            .get("server_banner")
            .and_then(Value::as_str)
            .map(detect::extract_version)
            .unwrap_or_default(),
        "tls" => lookup_str(data, &["handshake_log", "server_hello", "version"])
            .map(str::to_string)
            .unwrap_or_default(),
        "elasticsearch" => {
            if let Some(number) = lookup_str(data, &["version", "number"]) {
                return number.to_string();
            }
            banner_version(data)
        }
        "memcached" => {
            if let Some(version) = direct_version(data) {
                return version;
            }
            if let Some(version) = lookup_str(data, &["stats", "version"]) {
                return version.to_string();
            }
            banner_version(data)
        }
        "couchdb" => {
            if let Some(version) = direct_version(data) {
                return version;
            }
            if let Some(body) = lookup_str(data, &["response", "body"]) {
                if let Ok(Value::Object(info)) = serde_json::from_str::<Value>(body) {
                    if let Some(version) = info.get("version").and_then(Value::as_str) {
                        return version.to_string();
                    }
                }
            }
            banner_version(data)
        }
        "oracle" => {
            if let Some(version) = direct_version(data) {
                return version;
            }
            if let Some(version) = lookup_str(data, &["tns", "version"]) {
                return version.to_string();
            }
            banner_version(data)
        }
        "mssql" => {
            if let Some(version) = direct_version(data) {
                return version;
            }
            if let Some(version) = lookup_str(data, &["browser", "version"]) {
                return version.to_string();
            }
            banner_version(data)
        }
        // remaining modules carry their evidence in a banner field
        _ => banner_version(data),
    }
}

fn direct_version(data: &serde_json::Map<String, Value>) -> Option<String> {
    data.get("version")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn banner_version(data: &serde_json::Map<String, Value>) -> String {
    data.get("banner")
        .and_then(Value::as_str)
        .map(detect::extract_version)
        .unwrap_or_default()
}

fn lookup_str<'a>(data: &'a serde_json::Map<String, Value>, path: &[&str]) -> Option<&'a str> {
    let (first, rest) = path.split_first()?;
    let mut current = data.get(*first)?;
    for key in rest {
        current = current.get(*key)?;
    }
    current.as_str()
}
