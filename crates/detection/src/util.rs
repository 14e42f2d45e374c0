//! Address and domain helpers.

use std::net::IpAddr;

/// Whether an address belongs to internal address space: RFC 1918,
/// loopback, link-local, or an IPv6 unique-local/loopback address.
pub fn is_internal(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00
        }
    }
}

/// All labels of a domain except the trailing TLD label, concatenated.
/// `"xk2jq9.evil.com"` becomes `"xk2jq9evil"`.
pub fn domain_without_tld(domain: &str) -> String {
    let trimmed = domain.trim_end_matches('.');
    let labels: Vec<&str> = trimmed.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() <= 1 {
        return labels.concat();
    }
    labels[..labels.len() - 1].concat()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_address_classes() {
        for ip in ["10.0.0.5", "192.168.1.1", "172.16.9.9", "127.0.0.1", "169.254.0.1", "fd00::1", "::1"] {
            assert!(is_internal(&ip.parse().unwrap()), "{} should be internal", ip);
        }
        for ip in ["8.8.8.8", "203.0.113.7", "172.32.0.1", "2001:db8::1"] {
            assert!(!is_internal(&ip.parse().unwrap()), "{} should be external", ip);
        }
    }

    #[test]
    fn tld_label_is_stripped() {
        assert_eq!(domain_without_tld("example.com"), "example");
        assert_eq!(domain_without_tld("a.b.example.co"), "abexample");
        assert_eq!(domain_without_tld("localhost"), "localhost");
        assert_eq!(domain_without_tld(""), "");
    }
}
