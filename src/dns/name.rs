//! Domain name helpers shared by the zone engine.
//!
//! Names are handled as text in presentation form. Everything that is compared
//! (zone names, location keys, query names) goes through [`normalize`] first:
//! lowercase with exactly one trailing dot.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::common::{MAX_LABEL_LEN, MAX_NAME_LEN, name_wire_len, split_labels};

/// Append the root label if it is missing
pub fn fqdn(name: &str) -> String {
    let name = name.trim();
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}

/// Lowercase, fully qualified form used for every comparison
pub fn normalize(name: &str) -> String {
    fqdn(name).to_ascii_lowercase()
}

/// Number of labels, not counting the root
pub fn label_count(name: &str) -> usize {
    split_labels(name).len()
}

/// Whether `name` equals `zone` or sits below it. Both must be normalized.
pub fn is_subdomain(name: &str, zone: &str) -> bool {
    if zone == "." {
        return true;
    }
    name == zone
        || (name.len() > zone.len()
            && name.ends_with(zone)
            && name.as_bytes()[name.len() - zone.len() - 1] == b'.')
}

/// Name relative to `zone`: "" for the apex, "www" for "www.<zone>".
/// Both must be normalized; returns None when `name` is outside the zone.
pub fn relative_to(name: &str, zone: &str) -> Option<String> {
    if !is_subdomain(name, zone) {
        return None;
    }
    if name == zone {
        return Some(String::new());
    }
    if zone == "." {
        return Some(name.trim_end_matches('.').to_string());
    }
    Some(name[..name.len() - zone.len() - 1].to_string())
}

/// Qualify a stored host name against its zone.
/// "@" and "" mean the apex, names ending in a dot are already absolute.
pub fn qualify(host: &str, zone: &str) -> String {
    let host = host.trim();
    if host.is_empty() || host == "@" {
        return zone.to_string();
    }
    if host.ends_with('.') {
        return host.to_ascii_lowercase();
    }
    if zone == "." {
        return normalize(host);
    }
    format!("{}.{}", host.to_ascii_lowercase(), zone)
}

/// Check that a qualified name can be encoded: no empty labels, labels of at
/// most 63 bytes, at most 255 bytes in total.
pub fn check_wire(name: &str) -> Result<(), String> {
    for label in split_labels(name) {
        if label.is_empty() {
            return Err(format!("empty label in {}", name));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(format!("label longer than {} bytes in {}", MAX_LABEL_LEN, name));
        }
    }
    if name_wire_len(name) > MAX_NAME_LEN {
        return Err(format!("{} is longer than {} bytes", name, MAX_NAME_LEN));
    }
    Ok(())
}

/// Decode a reverse-lookup name ("5.113.0.203.in-addr.arpa.") into its address
pub fn reverse_to_addr(name: &str) -> Option<IpAddr> {
    let name = normalize(name);

    if let Some(rest) = name.strip_suffix(".in-addr.arpa.") {
        let octets: Vec<&str> = rest.split('.').collect();
        if octets.len() != 4 {
            return None;
        }
        let mut bytes = [0u8; 4];
        for (i, octet) in octets.iter().rev().enumerate() {
            bytes[i] = octet.parse().ok()?;
        }
        return Some(IpAddr::V4(Ipv4Addr::from(bytes)));
    }

    if let Some(rest) = name.strip_suffix(".ip6.arpa.") {
        let nibbles: Vec<&str> = rest.split('.').collect();
        if nibbles.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 16];
        for (i, nibble) in nibbles.iter().rev().enumerate() {
            if nibble.len() != 1 {
                return None;
            }
            let value = u8::from_str_radix(nibble, 16).ok()?;
            if i % 2 == 0 {
                bytes[i / 2] = value << 4;
            } else {
                bytes[i / 2] |= value;
            }
        }
        return Some(IpAddr::V6(Ipv6Addr::from(bytes)));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("WWW.Example.ORG"), "www.example.org.");
        assert_eq!(normalize("example.org."), "example.org.");
    }

    #[test]
    fn test_check_wire() {
        assert!(check_wire("www.example.org.").is_ok());
        assert!(check_wire("*.wild.example.org.").is_ok());
        assert!(check_wire(".").is_ok());
        assert!(check_wire("a..b.example.org.").is_err());
        assert!(check_wire(&format!("{}.example.org.", "x".repeat(64))).is_err());

        let long = format!("{}.", vec!["y".repeat(60); 5].join("."));
        assert!(check_wire(&long).is_err());
    }

    #[test]
    fn test_is_subdomain_respects_label_boundaries() {
        assert!(is_subdomain("www.example.org.", "example.org."));
        assert!(is_subdomain("example.org.", "example.org."));
        assert!(!is_subdomain("badexample.org.", "example.org."));
        assert!(!is_subdomain("org.", "example.org."));
        assert!(is_subdomain("anything.", "."));
    }

    #[test]
    fn test_relative_to() {
        assert_eq!(relative_to("example.org.", "example.org."), Some(String::new()));
        assert_eq!(
            relative_to("a.b.example.org.", "example.org."),
            Some("a.b".to_string())
        );
        assert_eq!(relative_to("example.com.", "example.org."), None);
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("ns1", "example.org."), "ns1.example.org.");
        assert_eq!(qualify("@", "example.org."), "example.org.");
        assert_eq!(qualify("Mail.Other.NET.", "example.org."), "mail.other.net.");
    }

    #[test]
    fn test_reverse_to_addr() {
        assert_eq!(
            reverse_to_addr("5.113.0.203.in-addr.arpa."),
            Some("203.0.113.5".parse().unwrap())
        );
        assert_eq!(
            reverse_to_addr(
                "1.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.0.8.b.d.0.1.0.0.2.ip6.arpa."
            ),
            Some("2001:db8::1".parse().unwrap())
        );
        assert_eq!(reverse_to_addr("www.example.org."), None);
        assert_eq!(reverse_to_addr("1.2.3.in-addr.arpa."), None);
    }
}
