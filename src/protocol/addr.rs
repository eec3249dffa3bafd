//! IP address classification.
//!
//! Classes are tested in a fixed order and the first match wins:
//! loopback, broadcast, private, multicast, reserved, unspecified,
//! link-local, public. "Private" is the IANA special-purpose set, not just
//! RFC 1918, so unspecified and link-local addresses report as private.

use super::ParseError;
use serde::Serialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressClass {
    Loopback,
    Broadcast,
    Private,
    Multicast,
    Reserved,
    Unspecified,
    LinkLocal,
    Public,
}

impl AddressClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressClass::Loopback => "loopback",
            AddressClass::Broadcast => "broadcast",
            AddressClass::Private => "private",
            AddressClass::Multicast => "multicast",
            AddressClass::Reserved => "reserved",
            AddressClass::Unspecified => "unspecified",
            AddressClass::LinkLocal => "link-local",
            AddressClass::Public => "public",
        }
    }
}

impl fmt::Display for AddressClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify(addr: IpAddr) -> AddressClass {
    match addr {
        IpAddr::V4(v4) => classify_v4(v4),
        IpAddr::V6(v6) => classify_v6(v6),
    }
}

/// Classify an address given in textual form.
pub fn classify_str(text: &str) -> Result<AddressClass, ParseError> {
    text.trim()
        .parse::<IpAddr>()
        .map(classify)
        .map_err(|_| ParseError::InvalidAddress(text.to_string()))
}

/// Special-purpose IPv4 blocks reported as private (IANA registry).
const PRIVATE_V4: [(u32, u32); 14] = [
    (0x0000_0000, 8),  // 0.0.0.0/8
    (0x0a00_0000, 8),  // 10.0.0.0/8
    (0x7f00_0000, 8),  // 127.0.0.0/8
    (0xa9fe_0000, 16), // 169.254.0.0/16
    (0xac10_0000, 12), // 172.16.0.0/12
    (0xc000_0000, 29), // 192.0.0.0/29
    (0xc000_00aa, 31), // 192.0.0.170/31
    (0xc000_0200, 24), // 192.0.2.0/24
    (0xc0a8_0000, 16), // 192.168.0.0/16
    (0xc612_0000, 15), // 198.18.0.0/15
    (0xc633_6400, 24), // 198.51.100.0/24
    (0xcb00_7100, 24), // 203.0.113.0/24
    (0xf000_0000, 4),  // 240.0.0.0/4
    (0xffff_ffff, 32), // 255.255.255.255/32
];

/// Special-purpose IPv6 blocks reported as private. IPv4-mapped addresses
/// are judged by the embedded IPv4 address instead.
const PRIVATE_V6: [(u128, u32); 9] = [
    (1, 128),                               // ::1/128
    (0, 128),                               // ::/128
    (0x0100_0000_0000_0000_u128 << 64, 64), // 100::/64
    (0x2001_0000_0000_0000_u128 << 64, 23), // 2001::/23
    (0x2001_0002_0000_0000_u128 << 64, 48), // 2001:2::/48
    (0x2001_0db8_0000_0000_u128 << 64, 32), // 2001:db8::/32
    (0x2001_0010_0000_0000_u128 << 64, 28), // 2001:10::/28
    (0xfc00_0000_0000_0000_u128 << 64, 7),  // fc00::/7
    (0xfe80_0000_0000_0000_u128 << 64, 10), // fe80::/10
];

fn in_v4_block(addr: u32, (net, len): (u32, u32)) -> bool {
    let mask = u32::MAX.checked_shl(32 - len).unwrap_or(0);
    addr & mask == net
}

fn in_v6_block(addr: u128, (net, len): (u128, u32)) -> bool {
    let mask = u128::MAX.checked_shl(128 - len).unwrap_or(0);
    addr & mask == net
}

fn is_private_v4(addr: Ipv4Addr) -> bool {
    let bits = u32::from(addr);
    PRIVATE_V4.iter().any(|block| in_v4_block(bits, *block))
}

fn is_private_v6(addr: Ipv6Addr) -> bool {
    if let Some(v4) = addr.to_ipv4_mapped() {
        return is_private_v4(v4);
    }
    let bits = u128::from(addr);
    PRIVATE_V6.iter().any(|block| in_v6_block(bits, *block))
}

fn classify_v4(addr: Ipv4Addr) -> AddressClass {
    if addr.is_loopback() {
        AddressClass::Loopback
    } else if addr.is_broadcast() {
        AddressClass::Broadcast
    } else if is_private_v4(addr) {
        AddressClass::Private
    } else if addr.is_multicast() {
        AddressClass::Multicast
    } else if addr.octets()[0] >= 240 {
        AddressClass::Reserved
    } else if addr.is_unspecified() {
        AddressClass::Unspecified
    } else if addr.is_link_local() {
        AddressClass::LinkLocal
    } else {
        AddressClass::Public
    }
}

fn classify_v6(addr: Ipv6Addr) -> AddressClass {
    let first = addr.segments()[0];
    let global_unicast = first & 0xe000 == 0x2000;
    // fe80::/10 and fec0::/10
    let local_unicast = first & 0xff80 == 0xfe80;

    if addr.is_loopback() {
        AddressClass::Loopback
    } else if is_private_v6(addr) {
        AddressClass::Private
    } else if addr.is_multicast() {
        AddressClass::Multicast
    } else if !(global_unicast || local_unicast) {
        AddressClass::Reserved
    } else if addr.is_unspecified() {
        AddressClass::Unspecified
    } else if first & 0xffc0 == 0xfe80 {
        AddressClass::LinkLocal
    } else {
        AddressClass::Public
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_classes() {
        let cases = [
            ("127.0.0.1", AddressClass::Loopback),
            ("255.255.255.255", AddressClass::Broadcast),
            ("192.168.1.1", AddressClass::Private),
            ("10.0.0.1", AddressClass::Private),
            ("172.16.5.4", AddressClass::Private),
            ("224.0.0.251", AddressClass::Multicast),
            ("8.8.8.8", AddressClass::Public),
            ("100.64.0.1", AddressClass::Public),
            ("172.32.0.1", AddressClass::Public),
        ];
        for (text, class) in cases {
            assert_eq!(classify_str(text).unwrap(), class, "{}", text);
        }
    }

    #[test]
    fn ipv4_special_purpose_blocks_are_private() {
        for text in [
            "0.0.0.0",
            "0.1.2.3",
            "169.254.10.20",
            "240.0.0.1",
            "192.0.0.5",
            "192.0.0.171",
            "192.0.2.1",
            "198.19.255.1",
            "198.51.100.7",
            "203.0.113.9",
        ] {
            assert_eq!(classify_str(text).unwrap(), AddressClass::Private, "{}", text);
        }
        assert_eq!(classify_str("192.0.0.8").unwrap(), AddressClass::Public);
    }

    #[test]
    fn ipv6_classes() {
        let cases = [
            ("::1", AddressClass::Loopback),
            ("ff02::1", AddressClass::Multicast),
            ("4000::1", AddressClass::Reserved),
            ("::1.2.3.4", AddressClass::Reserved),
            ("::ffff:8.8.8.8", AddressClass::Reserved),
            ("fec0::1", AddressClass::Public),
            ("2001:4860:4860::8888", AddressClass::Public),
        ];
        for (text, class) in cases {
            assert_eq!(classify_str(text).unwrap(), class, "{}", text);
        }
    }

    #[test]
    fn ipv6_special_purpose_blocks_are_private() {
        for text in [
            "::",
            "fd12:3456::1",
            "fe80::1",
            "100::1",
            "2001:db8::1",
            "2001:1ff::1",
            "2001:2::5",
            "2001:1f::1",
            "::ffff:192.168.0.1",
        ] {
            assert_eq!(classify_str(text).unwrap(), AddressClass::Private, "{}", text);
        }
        assert_eq!(classify_str("100:0:0:1::1").unwrap(), AddressClass::Reserved);
    }

    #[test]
    fn invalid_text() {
        assert_eq!(
            classify_str("999.1.1.1").unwrap_err(),
            ParseError::InvalidAddress("999.1.1.1".to_string())
        );
        assert!(classify_str("not-an-ip").is_err());
    }

    #[test]
    fn display_names() {
        assert_eq!(AddressClass::LinkLocal.to_string(), "link-local");
        assert_eq!(
            serde_json::to_string(&AddressClass::LinkLocal).unwrap(),
            "\"link-local\""
        );
    }
}
