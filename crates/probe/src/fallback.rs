//! Minimal line-read banner grab.
//!
//! The last resort when a port takes the plain path or the structured probe
//! fails: open a connection, poke it with a CRLF and read whatever single
//! line comes back. An empty read is not a failure; it degrades the result
//! to port-only confidence.

use crate::detect;
use dragnet_common::{BannerInfo, DragnetResult};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

const READ_BUFFER: usize = 512;

/// Read one banner line from `ip:port`.
///
/// Connect and write errors propagate; a silent or empty peer yields a
/// port-only [`BannerInfo`].
pub async fn line_read_banner(ip: &str, port: u16, deadline: Duration) -> DragnetResult<BannerInfo> {
    let mut stream = timeout(deadline, TcpStream::connect((ip, port)))
        .await
        .map_err(|_| {
            dragnet_common::DragnetError::Timeout(format!("banner connect to {ip}:{port}"))
        })??;

    // Minimal probe; enough to wake up chatty line protocols.
    stream.write_all(b"\r\n").await?;

    let mut buf = vec![0u8; READ_BUFFER];
    let read = match timeout(deadline, stream.read(&mut buf)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            debug!(ip, port, error = %e, "banner read error");
            0
        }
        Err(_) => 0,
    };

    if read == 0 {
        return Ok(BannerInfo::port_only(detect::identify_service(port, "")));
    }

    let text = String::from_utf8_lossy(&buf[..read]);
    let line = text.lines().next().unwrap_or("").trim().to_string();
    if line.is_empty() {
        return Ok(BannerInfo::port_only(detect::identify_service(port, "")));
    }

    let version = detect::extract_version(&line);
    let service = detect::identify_service(port, &line);
    Ok(BannerInfo::from_line(line, service, version))
}
