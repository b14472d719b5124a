//! IP address classification for outbound fetches.
//!
//! Every decision is a pure function of the address. Anything that is not a
//! globally routable unicast address is disallowed, and unparseable input is
//! disallowed too.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::IpNet;

pub const REASON_METADATA: &str = "cloud metadata endpoint";

/// Metadata service addresses. Never exempted by the SSRF allowlist.
const METADATA_ADDRS: [IpAddr; 3] = [
    IpAddr::V4(Ipv4Addr::new(169, 254, 169, 254)),
    IpAddr::V4(Ipv4Addr::new(100, 100, 100, 200)),
    IpAddr::V6(Ipv6Addr::new(0xfd00, 0xec2, 0, 0, 0, 0, 0, 0x254)),
];

/// Why `ip` must not be fetched, or `None` when it is a public address.
#[must_use]
pub fn classify(ip: &IpAddr) -> Option<&'static str> {
    if is_metadata(ip) {
        return Some(REASON_METADATA);
    }
    match ip {
        IpAddr::V4(v4) => classify_v4(*v4),
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return classify(&IpAddr::V4(v4));
            }
            if v6.is_unique_local() {
                return Some("unique-local address");
            }
            // fec0::/10
            if (v6.segments()[0] & 0xffc0) == 0xfec0 {
                return Some("site-local address");
            }
            classify_v6(*v6)
        },
    }
}

#[must_use]
pub fn is_disallowed(ip: &IpAddr) -> bool {
    classify(ip).is_some()
}

/// Parse and classify a textual address. Unparseable input is disallowed.
#[must_use]
pub fn is_disallowed_literal(s: &str) -> bool {
    let s = s.trim();
    let s = s
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(s);
    match s.parse::<IpAddr>() {
        Ok(ip) => is_disallowed(&ip),
        Err(_) => true,
    }
}

/// Check if an IP is covered by an SSRF allowlist entry.
#[must_use]
pub fn is_ssrf_allowed(ip: &IpAddr, allowlist: &[IpNet]) -> bool {
    allowlist.iter().any(|net| net.contains(ip))
}

/// Like [`classify`], but addresses inside `allowlist` are exempt from the
/// generic rules. Metadata endpoints stay blocked.
#[must_use]
pub fn classify_with_allowlist(ip: &IpAddr, allowlist: &[IpNet]) -> Option<&'static str> {
    let reason = classify(ip)?;
    if reason != REASON_METADATA && is_ssrf_allowed(ip, allowlist) {
        return None;
    }
    Some(reason)
}

fn is_metadata(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => METADATA_ADDRS.contains(&IpAddr::V4(v4)),
            None => METADATA_ADDRS.contains(ip),
        },
        IpAddr::V4(_) => METADATA_ADDRS.contains(ip),
    }
}

fn classify_v4(ip: Ipv4Addr) -> Option<&'static str> {
    let [a, b, c, _] = ip.octets();
    let reason = match (a, b, c) {
        (0, ..) => "this-network address",
        (10, ..) => "private network",
        (172, 16..=31, _) => "private network",
        (192, 168, _) => "private network",
        (127, ..) => "loopback address",
        (169, 254, _) => "link-local address",
        // 100.64.0.0/10
        (100, 64..=127, _) => "shared address space",
        (192, 0, 0) => "IETF protocol assignment",
        (192, 0, 2) | (198, 51, 100) | (203, 0, 113) => "documentation range",
        (198, 18..=19, _) => "benchmarking range",
        (224..=239, ..) => "multicast address",
        (240..=255, ..) => "reserved address",
        _ => return None,
    };
    Some(reason)
}

fn classify_v6(ip: Ipv6Addr) -> Option<&'static str> {
    let segments = ip.segments();
    if ip.is_unspecified() {
        return Some("unspecified address");
    }
    if ip.is_loopback() {
        return Some("loopback address");
    }
    if ip.is_unicast_link_local() {
        return Some("link-local address");
    }
    if ip.is_multicast() {
        return Some("multicast address");
    }
    if segments[0] == 0x2001 && segments[1] == 0x0db8 {
        return Some("documentation range");
    }
    // 2001::/23
    if segments[0] == 0x2001 && segments[1] < 0x0200 {
        return Some("IETF protocol assignment");
    }
    // Outside 2000::/3 covers IPv4-compatible and NAT64 prefixes too.
    if (segments[0] & 0xe000) != 0x2000 {
        return Some("reserved address");
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("127.0.0.1")]
    #[case("127.255.255.254")]
    #[case("10.0.0.1")]
    #[case("172.16.0.1")]
    #[case("172.31.255.255")]
    #[case("192.168.1.1")]
    #[case("169.254.1.1")]
    #[case("0.0.0.0")]
    #[case("0.1.2.3")]
    #[case("100.64.0.1")]
    #[case("100.127.255.255")]
    #[case("192.0.0.8")]
    #[case("192.0.2.10")]
    #[case("198.51.100.7")]
    #[case("203.0.113.9")]
    #[case("198.18.0.1")]
    #[case("224.0.0.1")]
    #[case("239.255.255.250")]
    #[case("240.0.0.1")]
    #[case("255.255.255.255")]
    fn disallowed_v4(#[case] addr: &str) {
        let ip: IpAddr = addr.parse().unwrap();
        assert!(is_disallowed(&ip), "{addr} should be disallowed");
    }

    #[rstest]
    #[case("::1")]
    #[case("::")]
    #[case("fe80::1")]
    #[case("fc00::1")]
    #[case("fd12:3456::1")]
    #[case("fec0::1")]
    #[case("ff02::1")]
    #[case("ff05::2")]
    #[case("2001:db8::1")]
    #[case("2001::1")]
    #[case("64:ff9b::a00:1")]
    #[case("::a00:1")]
    #[case("::ffff:127.0.0.1")]
    #[case("::ffff:10.0.0.1")]
    #[case("::ffff:192.168.1.1")]
    fn disallowed_v6(#[case] addr: &str) {
        let ip: IpAddr = addr.parse().unwrap();
        assert!(is_disallowed(&ip), "{addr} should be disallowed");
    }

    #[rstest]
    #[case("8.8.8.8")]
    #[case("1.1.1.1")]
    #[case("208.67.222.222")]
    #[case("151.101.193.140")]
    #[case("172.32.0.1")]
    #[case("100.128.0.1")]
    #[case("2001:4860:4860::8888")]
    #[case("2606:4700:4700::1111")]
    #[case("::ffff:8.8.8.8")]
    fn public_addresses_allowed(#[case] addr: &str) {
        let ip: IpAddr = addr.parse().unwrap();
        assert_eq!(classify(&ip), None, "{addr} should be allowed");
    }

    #[rstest]
    #[case("169.254.169.254")]
    #[case("100.100.100.200")]
    #[case("fd00:ec2::254")]
    #[case("::ffff:169.254.169.254")]
    fn metadata_endpoints(#[case] addr: &str) {
        let ip: IpAddr = addr.parse().unwrap();
        assert_eq!(classify(&ip), Some(REASON_METADATA));
    }

    #[rstest]
    #[case("not.an.ip")]
    #[case("300.300.300.300")]
    #[case("192.168.1")]
    #[case("")]
    #[case("::gggg")]
    fn malformed_literals_fail_closed(#[case] input: &str) {
        assert!(is_disallowed_literal(input), "{input:?} should fail closed");
    }

    #[test]
    fn literal_parsing_accepts_brackets() {
        assert!(is_disallowed_literal("[::1]"));
        assert!(!is_disallowed_literal("[2606:4700:4700::1111]"));
        assert!(!is_disallowed_literal(" 8.8.8.8 "));
    }

    #[test]
    fn allowlist_exempts_generic_rules() {
        let allowlist: Vec<IpNet> = vec!["127.0.0.0/8".parse().unwrap()];
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(is_ssrf_allowed(&ip, &allowlist));
        assert_eq!(classify_with_allowlist(&ip, &allowlist), None);

        let other: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(
            classify_with_allowlist(&other, &allowlist),
            Some("private network")
        );
    }

    #[test]
    fn allowlist_never_exempts_metadata() {
        let allowlist: Vec<IpNet> = vec!["169.254.0.0/16".parse().unwrap()];
        let ip: IpAddr = "169.254.169.254".parse().unwrap();
        assert_eq!(
            classify_with_allowlist(&ip, &allowlist),
            Some(REASON_METADATA)
        );
        let link_local: IpAddr = "169.254.1.1".parse().unwrap();
        assert_eq!(classify_with_allowlist(&link_local, &allowlist), None);
    }
}
