use anyhow::{anyhow, bail, Context, Result};
use dragnet_common::mem::{MemoryQueue, MemoryStore};
use dragnet_common::{ScanConfig, IP_QUEUE};
use dragnet_engine::{EngineConfig, ScanEngine};
use dragnet_generator::{is_valid_public, BatchDispatcher, IpGenerator};
use dragnet_probe::{BannerCoordinator, ProbePool, ZgrabExecutor};
use dragnet_scanner::{validate_ip, Scanner};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;

pub struct ScanArgs {
    pub targets: String,
    pub ports: Option<String>,
    pub connect_timeout: u64,
    pub banner_timeout: u64,
    pub ping_timeout: u64,
    pub concurrency: usize,
    pub probe_concurrency: usize,
    pub max_retries: u32,
    pub no_ping: bool,
    pub no_banner: bool,
}

/// Enumerate addresses, chunk them into batch messages and print each
/// message as one JSON line. The broker adapter consumes the same shape.
pub async fn run_generate(
    count: usize,
    batch_size: usize,
    seed: Option<u32>,
    start: Option<String>,
) -> Result<()> {
    let bus = MemoryQueue::new();
    let dispatcher = BatchDispatcher::new(Arc::new(bus.clone()), IP_QUEUE);

    let messages = match start {
        Some(start) => {
            let start: Ipv4Addr = start
                .parse()
                .with_context(|| format!("invalid starting address: {start}"))?;
            dispatcher
                .dispatch_sequential(start, count, batch_size)
                .await?
        }
        None => {
            let seed = seed.unwrap_or_else(clock_seed);
            info!(seed, "random mode");
            let mut generator = IpGenerator::new(seed);
            dispatcher
                .dispatch_random(&mut generator, count, batch_size)
                .await?
        }
    };

    for message in &messages {
        println!("{}", serde_json::to_string(message)?);
    }
    info!(batches = messages.len(), addresses = count, "generation finished");
    Ok(())
}

/// Scan targets directly and print one JSON result per line.
pub async fn run_scan(args: ScanArgs) -> Result<()> {
    let targets = parse_targets(&args.targets)?;

    let mut config = ScanConfig {
        ping_timeout: Duration::from_millis(args.ping_timeout),
        connect_timeout: Duration::from_millis(args.connect_timeout),
        banner_timeout: Duration::from_millis(args.banner_timeout),
        max_retries: args.max_retries,
        outer_concurrency: args.concurrency,
        probe_pool_concurrency: args.probe_concurrency,
        enable_ping: !args.no_ping,
        enable_banner: !args.no_banner,
        ..ScanConfig::default()
    };
    if let Some(ports) = &args.ports {
        config.port_override = parse_ports(ports)?;
    }

    let scanner = build_scanner(config);

    for target in targets {
        let result = scanner.scan_ip(&target, "", "dragnet-cli").await;
        println!("{}", serde_json::to_string(&result)?);
    }

    let stats = scanner.stats();
    info!(
        scanned = stats.total_scanned,
        failed = stats.failed_scans,
        "scan finished"
    );
    Ok(())
}

/// Full local run: generate, dispatch onto the in-process bus, consume with
/// the engine and report the statistics.
pub async fn run_pipeline(
    count: usize,
    batch_size: usize,
    seed: Option<u32>,
    concurrency: usize,
    no_ping: bool,
    no_banner: bool,
) -> Result<()> {
    let bus = MemoryQueue::new();
    let store = MemoryStore::new();

    let seed = seed.unwrap_or_else(clock_seed);
    info!(seed, count, batch_size, "starting local pipeline");

    let dispatcher = BatchDispatcher::new(Arc::new(bus.clone()), IP_QUEUE);
    let mut generator = IpGenerator::new(seed);
    let messages = dispatcher
        .dispatch_random(&mut generator, count, batch_size)
        .await?;
    info!(batches = messages.len(), "batches dispatched");

    let config = ScanConfig {
        outer_concurrency: concurrency,
        enable_ping: !no_ping,
        enable_banner: !no_banner,
        ..ScanConfig::default()
    };
    let pool = Arc::new(ProbePool::new(
        config.probe_pool_concurrency,
        config.banner_timeout,
        Arc::new(ZgrabExecutor::new()),
    ));
    let coordinator = Arc::new(BannerCoordinator::new(
        pool.clone(),
        &config.priority_ports,
        config.banner_timeout,
    ));
    let scanner = Scanner::new(config, coordinator);

    let engine = ScanEngine::new(
        scanner,
        pool,
        Arc::new(bus.clone()),
        Some(Arc::new(store.clone())),
        EngineConfig::default(),
    );
    engine
        .start()
        .await
        .map_err(|e| anyhow!("failed to start engine: {e}"))?;

    let total = count as u64;
    loop {
        let stats = engine.stats();
        if stats.total_scanned >= total {
            break;
        }
        info!(scanned = stats.total_scanned, of = total, "pipeline progress");
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    engine.stop().await;

    let stats = engine.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    info!(persisted = store.len().await, "pipeline finished");
    Ok(())
}

fn build_scanner(config: ScanConfig) -> Scanner {
    let pool = Arc::new(ProbePool::new(
        config.probe_pool_concurrency,
        config.banner_timeout,
        Arc::new(ZgrabExecutor::new()),
    ));
    let coordinator = Arc::new(BannerCoordinator::new(
        pool,
        &config.priority_ports,
        config.banner_timeout,
    ));
    Scanner::new(config, coordinator)
}

fn clock_seed() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos().wrapping_add(d.as_secs() as u32))
        .unwrap_or(0)
}

/// Split a comma-separated target list, validating each address against the
/// dotted-quad grammar and the excluded public ranges.
fn parse_targets(targets: &str) -> Result<Vec<String>> {
    let mut parsed = Vec::new();
    for token in targets.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        validate_ip(token).map_err(|e| anyhow!("{e}"))?;
        let addr: Ipv4Addr = token
            .parse()
            .with_context(|| format!("invalid IPv4 address: {token}"))?;
        if !is_valid_public(addr) && !addr.is_loopback() {
            bail!("address {token} is in an excluded range");
        }
        if !parsed.iter().any(|t| t == token) {
            parsed.push(token.to_string());
        }
    }
    if parsed.is_empty() {
        bail!("no targets specified");
    }
    Ok(parsed)
}

/// Parses a port string like "80,443,1000-1010" into a vector of u16 ports
fn parse_ports(ports_str: &str) -> Result<Vec<u16>> {
    let mut ports = Vec::new();

    for part in ports_str.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start, end)) = part.split_once('-') {
            let start: u16 = start
                .trim()
                .parse()
                .with_context(|| format!("invalid start port: {start}"))?;
            let end: u16 = end
                .trim()
                .parse()
                .with_context(|| format!("invalid end port: {end}"))?;
            if start > end {
                bail!("invalid range: start > end");
            }
            ports.extend(start..=end);
        } else {
            let port: u16 = part.parse().with_context(|| format!("invalid port: {part}"))?;
            ports.push(port);
        }
    }

    if ports.is_empty() {
        bail!("no ports specified");
    }
    Ok(ports)
}
