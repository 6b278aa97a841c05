//! TCP connect probing of a single `(ip, port)`.

use dragnet_common::{DragnetError, DragnetResult, Port, PortStatus};
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Timed full-connect prober.
///
/// Refusal means closed and is final; a connect deadline with no answer is
/// reported as filtered. Any other I/O error propagates so the caller's
/// retry discipline can decide.
#[derive(Debug, Clone, Copy)]
pub struct PortProber {
    connect_deadline: Duration,
}

impl PortProber {
    #[must_use]
    pub const fn new(connect_deadline: Duration) -> Self {
        Self { connect_deadline }
    }

    /// Attempt one timed connect and classify the port.
    pub async fn probe(&self, ip: &str, port: u16) -> DragnetResult<Port> {
        let addr: IpAddr = ip
            .parse()
            .map_err(|_| DragnetError::InvalidTarget(format!("invalid IP address: {ip}")))?;
        let addr = SocketAddr::new(addr, port);

        let mut record = Port::new(port);
        let start = Instant::now();

        match timeout(self.connect_deadline, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                record.status = PortStatus::Open;
                record.response_time = start.elapsed();
                drop(stream);
                debug!(ip, port, "port open");
            }
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                record.status = PortStatus::Closed;
                record.response_time = start.elapsed();
                debug!(ip, port, "port closed");
            }
            Ok(Err(e)) => return Err(DragnetError::Io(e)),
            Err(_) => {
                record.status = PortStatus::Filtered;
                record.response_time = start.elapsed();
                debug!(ip, port, "port filtered (connect deadline)");
            }
        }

        Ok(record)
    }
}
