//! dragnet-generator — candidate address enumeration and batch dispatch.
//!
//! Stage A of the pipeline: enumerate valid public IPv4 addresses (random
//! permutation sampling or a sequential walk) and publish them in bounded
//! batches onto the ingress queue.

pub mod dispatch;
pub mod enumerate;
pub mod permute;

pub use dispatch::BatchDispatcher;
pub use enumerate::{is_valid_public, sequential, IpGenerator, EXCLUDED_RANGES};
pub use permute::Permutation;
