//! dragnet-scanner — reachability probing and per-IP scan composition.

pub mod ping;
pub mod scan;
pub mod tcp;

pub use ping::{validate_ip, Pinger, PingOutcome};
pub use scan::Scanner;
pub use tcp::PortProber;
