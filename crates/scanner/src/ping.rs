//! Host reachability probing via the system ICMP facility.
//!
//! The target is validated against a strict dotted-quad grammar before any
//! external command runs. A host that answers "unreachable" or loses every
//! packet is a successful negative answer, not an error; only deadline
//! expiry and a missing ping binary surface as errors.

use dragnet_common::{DragnetError, DragnetResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

static DOTTED_QUAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,3}\.){3}\d{1,3}$").unwrap());

/// Strict dotted-quad validation: four octets, each 0..=255.
pub fn validate_ip(ip: &str) -> DragnetResult<()> {
    if !DOTTED_QUAD.is_match(ip) {
        return Err(DragnetError::InvalidTarget(format!(
            "invalid IPv4 address format: {ip}"
        )));
    }
    for octet in ip.split('.') {
        match octet.parse::<u16>() {
            Ok(value) if value <= 255 => {}
            _ => {
                return Err(DragnetError::InvalidTarget(format!(
                    "octet out of range in {ip}"
                )));
            }
        }
    }
    Ok(())
}

/// Liveness answer with the measured round trip.
#[derive(Debug, Clone, Copy)]
pub struct PingOutcome {
    pub is_up: bool,
    pub duration: Duration,
}

/// Deadline-bounded wrapper around the host `ping` binary.
#[derive(Debug, Clone, Copy)]
pub struct Pinger {
    deadline: Duration,
}

impl Pinger {
    #[must_use]
    pub const fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    /// Check whether `ip` answers a single ping within the deadline.
    pub async fn ping(&self, ip: &str) -> DragnetResult<PingOutcome> {
        validate_ip(ip)?;

        let wait_secs = self.deadline.as_secs().max(1);
        let mut cmd = Command::new("ping");
        cmd.arg("-c")
            .arg("1")
            .arg("-W")
            .arg(wait_secs.to_string())
            .arg(ip)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let start = Instant::now();
        let output = match timeout(self.deadline, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                return Err(DragnetError::Environment(
                    "ping command not available".to_string(),
                ));
            }
            Ok(Err(e)) => return Err(DragnetError::Io(e)),
            Err(_) => {
                return Err(DragnetError::Timeout(format!("ping timed out for {ip}")));
            }
        };
        let duration = start.elapsed();

        let stdout = String::from_utf8_lossy(&output.stdout);
        let is_up = analyze_ping_output(output.status.success(), &stdout)?;
        debug!(ip, is_up, ?duration, "ping finished");

        Ok(PingOutcome { is_up, duration })
    }
}

/// Classify the ping exit status and output.
///
/// Unreachable and full packet loss are negative answers; anything else
/// unexplained from a failing run is a network error.
fn analyze_ping_output(success: bool, stdout: &str) -> DragnetResult<bool> {
    if success {
        return Ok(true);
    }
    if stdout.contains("100% packet loss") || stdout.contains("Destination Host Unreachable") {
        return Ok(false);
    }
    Err(DragnetError::Network(format!(
        "ping failed: {}",
        stdout.lines().last().unwrap_or("no output").trim()
    )))
}
