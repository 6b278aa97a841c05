//! dragnet-common — shared types and contracts.
//!
//! This crate provides the data model, error taxonomy and collaborator
//! traits used across the dragnet pipeline crates: the generator, the probe
//! subsystem, the scanner and the scan engine.

pub mod error;
pub mod mem;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{DragnetError, DragnetResult};
pub use traits::{Acknowledger, Delivery, MessageQueue, ResultStore};
pub use types::{
    BannerInfo, BatchMessage, Confidence, EnrichmentMessage, Port, PortStatus, ScanConfig,
    ScanResult, ScanResultMessage, ScanStats, ScanStatus, ServiceAnalysisMessage,
};

/// Default name of the ingress queue carrying generator batches.
pub const IP_QUEUE: &str = "ip_queue";
/// Default name of the full-result egress queue.
pub const SCAN_RESULT_QUEUE: &str = "scan_result_queue";
/// Default name of the liveness enrichment queue.
pub const ENRICHMENT_QUEUE: &str = "enrichment_queue";
/// Default name of the open-ports service analysis queue.
pub const SERVICE_ANALYSIS_QUEUE: &str = "service_analysis_queue";

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
