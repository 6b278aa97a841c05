//! Service identification and version extraction from banner text.

use once_cell::sync::Lazy;
use regex::Regex;

/// Database-aware version patterns, tried first.
static DB_VERSION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(?:oracle|oracle\s*database)\s*([0-9]+\.[0-9]+(?:\.[0-9]+)?(?:\.[0-9]+)?)",
        r"(?i)oracle\s*([0-9]+g(?:\s*r[0-9]+)?)",
        r"(?i)(?:microsoft\s*sql\s*server|sql\s*server)\s*([0-9]+\.[0-9]+(?:\.[0-9]+)?(?:\.[0-9]+)?)",
        r"(?i)sql\s*server\s*([0-9]{4})",
        r"(?i)elasticsearch\s*([0-9]+\.[0-9]+(?:\.[0-9]+)?)",
        r"(?i)memcached\s*([0-9]+\.[0-9]+(?:\.[0-9]+)?)",
        r"(?i)(?:couchdb|apache\s*couchdb)\s*([0-9]+\.[0-9]+(?:\.[0-9]+)?)",
        r"(?i)(?:mysql|postgresql|redis|mongodb)\s*([0-9]+\.[0-9]+(?:\.[0-9]+)?)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// General version patterns, tried after the database pass.
static GENERAL_VERSION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(?:version|v|ver)\s*[:\s]*([0-9]+\.[0-9]+(?:\.[0-9]+)?(?:\.[0-9]+)?)",
        r"(?i)(?:openssh|ssh)\s*([0-9]+\.[0-9]+(?:\.[0-9]+)?)",
        r"(?i)(?:apache|nginx|iis)\s*[/\s]*([0-9]+\.[0-9]+(?:\.[0-9]+)?)",
        r"(?i)(?:ubuntu|debian|centos|redhat|fedora)\s*([0-9]+\.[0-9]+(?:\.[0-9]+)?)",
        r"(?i)([0-9]+\.[0-9]+(?:\.[0-9]+)?(?:\.[0-9]+)?)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Pull a version token out of banner text. Database-aware patterns win over
/// the general ones; first match wins within a pass. Empty string when
/// nothing matches.
#[must_use]
pub fn extract_version(banner: &str) -> String {
    for re in DB_VERSION_PATTERNS.iter().chain(GENERAL_VERSION_PATTERNS.iter()) {
        if let Some(captures) = re.captures(banner) {
            if let Some(version) = captures.get(1) {
                return version.as_str().trim().to_string();
            }
        }
    }
    String::new()
}

/// Service name for a well-known port.
#[must_use]
pub fn service_for_port(port: u16) -> Option<&'static str> {
    let service = match port {
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 => "smtp",
        53 => "dns",
        80 => "http",
        110 => "pop3",
        143 => "imap",
        443 => "https",
        993 => "imaps",
        995 => "pop3s",
        1433 | 1434 => "mssql",
        1521 | 1526 => "oracle",
        3306..=3309 => "mysql",
        3389 => "rdp",
        5432..=5435 => "postgresql",
        5984 | 5985 => "couchdb",
        6378..=6381 => "redis",
        8080 => "http-proxy",
        8443 => "https-alt",
        9200 | 9300 => "elasticsearch",
        11210 | 11211 => "memcached",
        27017..=27020 => "mongodb",
        _ => return None,
    };
    Some(service)
}

/// Scan banner text for known protocol words.
#[must_use]
pub fn service_from_tokens(banner: &str) -> Option<&'static str> {
    let lower = banner.to_lowercase();
    let service = if lower.contains("ssh") {
        "ssh"
    } else if lower.contains("ftp") {
        "ftp"
    } else if lower.contains("http") {
        "http"
    } else if lower.contains("smtp") {
        "smtp"
    } else if lower.contains("mysql") {
        "mysql"
    } else if lower.contains("postgresql") {
        "postgresql"
    } else if lower.contains("redis") {
        "redis"
    } else if lower.contains("mongodb") {
        "mongodb"
    } else {
        return None;
    };
    Some(service)
}

/// Identify a service: port table first, then banner tokens, else "unknown".
#[must_use]
pub fn identify_service(port: u16, banner: &str) -> String {
    service_for_port(port)
        .or_else(|| service_from_tokens(banner))
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_prefix_forms() {
        assert_eq!(extract_version("Widget version 2.4.1 ready"), "2.4.1");
        assert_eq!(extract_version("v1.2"), "1.2");
        assert_eq!(extract_version("ver: 10.0.19041"), "10.0.19041");
    }

    #[test]
    fn database_patterns_take_precedence() {
        assert_eq!(extract_version("MySQL 8.0.33 on x86_64"), "8.0.33");
        assert_eq!(extract_version("PostgreSQL 15.3 (Debian 12.2)"), "15.3");
        assert_eq!(extract_version("Oracle Database 19.3.0"), "19.3.0");
        assert_eq!(extract_version("oracle 11g r2"), "11g r2");
        assert_eq!(extract_version("SQL Server 2019"), "2019");
        assert_eq!(extract_version("memcached 1.6.21"), "1.6.21");
        assert_eq!(extract_version("Apache CouchDB 3.3.2"), "3.3.2");
    }

    #[test]
    fn web_server_patterns() {
        assert_eq!(extract_version("Server: nginx/1.24.0"), "1.24.0");
        assert_eq!(extract_version("Apache 2.4.57 (Unix)"), "2.4.57");
    }

    #[test]
    fn ssh_banner_yields_protocol_version() {
        // The bare dotted-decimal pattern picks up the protocol number.
        assert_eq!(extract_version("SSH-2.0-OpenSSH_8.2"), "2.0");
    }

    #[test]
    fn no_version_is_empty() {
        assert_eq!(extract_version("hello there"), "");
        assert_eq!(extract_version(""), "");
    }

    #[test]
    fn port_table_lookup() {
        assert_eq!(service_for_port(22), Some("ssh"));
        assert_eq!(service_for_port(443), Some("https"));
        assert_eq!(service_for_port(3307), Some("mysql"));
        assert_eq!(service_for_port(5433), Some("postgresql"));
        assert_eq!(service_for_port(27019), Some("mongodb"));
        assert_eq!(service_for_port(31337), None);
    }

    #[test]
    fn token_scan() {
        assert_eq!(service_from_tokens("220 ProFTPD ready"), Some("ftp"));
        assert_eq!(service_from_tokens("SSH-2.0-OpenSSH"), Some("ssh"));
        assert_eq!(service_from_tokens("totally opaque"), None);
    }

    #[test]
    fn identify_cascade() {
        assert_eq!(identify_service(22, ""), "ssh");
        assert_eq!(identify_service(31337, "redis 7.0"), "redis");
        assert_eq!(identify_service(31337, "???"), "unknown");
    }
}
