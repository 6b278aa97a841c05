//! Port-to-probe-module selection.
//!
//! Well-known ports map to an ordered list of protocol probe modules; the
//! generic `banner` module always trails as a fallback. Ports absent from
//! the table get the generic module alone.

/// Probe modules to run for a port, in preference order.
#[must_use]
pub fn modules_for_port(port: u16) -> &'static [&'static str] {
    match port {
        21 => &["ftp", "banner"],
        22 => &["ssh", "banner"],
        23 => &["telnet", "banner"],
        25 => &["smtp", "banner"],
        // DNS has no dedicated probe module
        53 => &["banner"],
        80 => &["http", "banner"],
        110 => &["pop3", "banner"],
        143 => &["imap", "banner"],
        443 => &["http", "tls", "banner"],
        993 => &["imap", "tls", "banner"],
        995 => &["pop3", "tls", "banner"],
        1433 | 1434 => &["mssql", "banner"],
        1521 | 1526 => &["oracle", "banner"],
        3306..=3309 => &["mysql", "banner"],
        // RDP has no dedicated probe module
        3389 => &["banner"],
        5432..=5435 => &["postgres", "banner"],
        5984 | 5985 => &["couchdb", "banner"],
        6378..=6381 => &["redis", "banner"],
        8080 => &["http", "banner"],
        8443 => &["http", "tls", "banner"],
        9200 | 9300 => &["elasticsearch", "banner"],
        11210 | 11211 => &["memcached", "banner"],
        27017..=27020 => &["mongodb", "banner"],
        _ => &["banner"],
    }
}

/// Ports that take the structured probe path even outside the configured
/// priority set.
#[must_use]
pub fn is_common_probe_port(port: u16) -> bool {
    matches!(
        port,
        21 | 22 | 23 | 25 | 80 | 110 | 143 | 443 | 993 | 995 | 3306 | 5432 | 6379 | 27017 | 8080
            | 8443
    )
}

/// Probe-pool priority for a port.
#[must_use]
pub fn probe_priority(port: u16) -> u8 {
    match port {
        80 | 443 | 22 => 3,
        21 | 25 | 3306 | 5432 => 2,
        _ => 1,
    }
}
