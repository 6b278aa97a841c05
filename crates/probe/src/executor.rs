//! External protocol-probe execution.
//!
//! The worker pool is oblivious to how probes run; this seam lets tests
//! inject a fake while production binds to the real probe binary.

use async_trait::async_trait;
use dragnet_common::{DragnetError, DragnetResult};
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Runs one protocol probe against `(ip, port)` and returns its raw output:
/// one JSON document per module, newline separated.
#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    async fn execute(
        &self,
        ip: &str,
        port: u16,
        modules: &[&str],
        deadline: Duration,
    ) -> DragnetResult<String>;
}

/// Production executor wrapping the `zgrab2` binary.
pub struct ZgrabExecutor {
    binary: String,
}

impl ZgrabExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: "zgrab2".to_string(),
        }
    }

    #[must_use]
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for ZgrabExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProbeExecutor for ZgrabExecutor {
    async fn execute(
        &self,
        ip: &str,
        port: u16,
        modules: &[&str],
        deadline: Duration,
    ) -> DragnetResult<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--output-file")
            .arg("-")
            .arg("--targets")
            .arg(format!("{ip}:{port}"))
            .arg("--port")
            .arg(port.to_string())
            .arg("--timeout")
            .arg(format!("{}s", deadline.as_secs().max(1)));
        for module in modules {
            cmd.arg(format!("--{module}"));
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        debug!(ip, port, ?modules, "spawning probe");

        let output = match timeout(deadline, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                return Err(DragnetError::Environment(format!(
                    "probe binary {} not available",
                    self.binary
                )));
            }
            Ok(Err(e)) => return Err(DragnetError::Io(e)),
            Err(_) => {
                return Err(DragnetError::Timeout(format!(
                    "probe timed out for {ip}:{port}"
                )));
            }
        };

        if !output.status.success() {
            return Err(DragnetError::Network(format!(
                "probe exited with {} for {ip}:{port}",
                output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
