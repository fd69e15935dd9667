//! Address parsing/validation shared by `ForwardAgent` and `ForwardRule`

use std::net::IpAddr;

/// True if `host` is a valid IPv4/IPv6 literal or an RFC-1123 hostname
/// (labels of 1-63 alphanumerics/hyphens, not starting/ending with a hyphen,
/// joined by dots, 253 characters total at most).
pub fn is_valid_host(host: &str) -> bool {
    if host.parse::<IpAddr>().is_ok() {
        return true;
    }
    is_valid_hostname(host)
}

fn is_valid_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    host.split('.').all(is_valid_label)
}

fn is_valid_label(label: &str) -> bool {
    if label.is_empty() || label.len() > 63 {
        return false;
    }
    let bytes = label.as_bytes();
    if bytes[0] == b'-' || bytes[bytes.len() - 1] == b'-' {
        return false;
    }
    bytes
        .iter()
        .all(|&b| b.is_ascii_alphanumeric() || b == b'-')
}

/// True if `host` is the IPv4/IPv6 loopback address or the literal `localhost`.
pub fn is_loopback(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.parse::<IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}
