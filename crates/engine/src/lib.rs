//! dragnet-engine — batch consumption and result fan-out.
//!
//! Stage B of the pipeline: consume generator batches off the ingress
//! queue, schedule per-IP scans with bounded concurrency and emit every
//! result to the three downstream queues and the document store.

pub mod engine;
pub mod sinks;

pub use engine::{EngineConfig, ScanEngine};
pub use sinks::{SinkFanout, SinkQueues};
