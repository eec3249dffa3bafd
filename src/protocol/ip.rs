//! Version-dispatched network layer: IPv4 or IPv6 by the top nibble of the
//! first byte.

use super::ipv4::{Ipv4Header, Ipv4Record, IPV4_MIN_HEADER_LEN};
use super::ipv6::{Ipv6Header, Ipv6Record, IPV6_HEADER_LEN};
use super::{IpProtocol, Layer, ParseError};
use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

#[derive(Debug)]
pub enum NetworkHeader<'a> {
    Ipv4(Ipv4Header<'a>),
    Ipv6(Ipv6Header<'a>),
}

/// Parse an IP packet. Anything under 20 bytes is rejected before the
/// version is looked at.
pub fn parse(packet: &[u8]) -> Result<NetworkHeader<'_>, ParseError> {
    if packet.len() < IPV4_MIN_HEADER_LEN {
        return Err(ParseError::TooShort {
            layer: Layer::Ip,
            expected: IPV4_MIN_HEADER_LEN,
            actual: packet.len(),
        });
    }

    match packet[0] >> 4 {
        4 => Ipv4Header::parse(packet).map(NetworkHeader::Ipv4),
        6 => Ipv6Header::parse(packet).map(NetworkHeader::Ipv6),
        other => Err(ParseError::UnsupportedVersion(other)),
    }
}

impl<'a> NetworkHeader<'a> {
    #[inline]
    pub fn version(&self) -> u8 {
        match self {
            NetworkHeader::Ipv4(_) => 4,
            NetworkHeader::Ipv6(_) => 6,
        }
    }

    #[inline]
    pub fn src_ip(&self) -> IpAddr {
        match self {
            NetworkHeader::Ipv4(hdr) => IpAddr::V4(hdr.src_addr()),
            NetworkHeader::Ipv6(hdr) => IpAddr::V6(hdr.src_addr()),
        }
    }

    #[inline]
    pub fn dst_ip(&self) -> IpAddr {
        match self {
            NetworkHeader::Ipv4(hdr) => IpAddr::V4(hdr.dst_addr()),
            NetworkHeader::Ipv6(hdr) => IpAddr::V6(hdr.dst_addr()),
        }
    }

    /// IPv4 protocol field or IPv6 next header.
    #[inline]
    pub fn protocol(&self) -> IpProtocol {
        match self {
            NetworkHeader::Ipv4(hdr) => hdr.protocol(),
            NetworkHeader::Ipv6(hdr) => hdr.next_header(),
        }
    }

    #[inline]
    pub fn header_len(&self) -> usize {
        match self {
            NetworkHeader::Ipv4(hdr) => hdr.header_len(),
            NetworkHeader::Ipv6(_) => IPV6_HEADER_LEN,
        }
    }

    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        match self {
            NetworkHeader::Ipv4(hdr) => hdr.payload(),
            NetworkHeader::Ipv6(hdr) => hdr.payload(),
        }
    }

    /// Payload bounded by the header's own length field.
    #[inline]
    pub fn datagram_payload(&self) -> &'a [u8] {
        match self {
            NetworkHeader::Ipv4(hdr) => hdr.datagram_payload(),
            NetworkHeader::Ipv6(hdr) => hdr.datagram_payload(),
        }
    }

    /// True for IPv4 fragments other than the first one. Those carry no
    /// transport header.
    #[inline]
    pub fn is_later_fragment(&self) -> bool {
        match self {
            NetworkHeader::Ipv4(hdr) => hdr.fragment_offset() != 0,
            NetworkHeader::Ipv6(_) => false,
        }
    }

    pub fn record(&self) -> IpRecord {
        match self {
            NetworkHeader::Ipv4(hdr) => IpRecord::V4(hdr.record()),
            NetworkHeader::Ipv6(hdr) => IpRecord::V6(hdr.record()),
        }
    }
}

impl<'a> fmt::Display for NetworkHeader<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkHeader::Ipv4(hdr) => write!(f, "IPv4 {}", hdr),
            NetworkHeader::Ipv6(hdr) => write!(f, "IPv6 {}", hdr),
        }
    }
}

/// Either header's record. Both carry a `version` field, so the JSON is
/// self-describing without a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum IpRecord {
    V4(Ipv4Record),
    V6(Ipv6Record),
}

impl IpRecord {
    pub fn src_ip(&self) -> &str {
        match self {
            IpRecord::V4(rec) => &rec.src_ip,
            IpRecord::V6(rec) => &rec.src_ip,
        }
    }

    pub fn dst_ip(&self) -> &str {
        match self {
            IpRecord::V4(rec) => &rec.dst_ip,
            IpRecord::V6(rec) => &rec.dst_ip,
        }
    }

    pub fn protocol_name(&self) -> &'static str {
        match self {
            IpRecord::V4(rec) => rec.protocol_name,
            IpRecord::V6(rec) => rec.protocol_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_by_version() {
        let mut v4 = vec![0u8; 20];
        v4[0] = 0x45;
        v4[9] = 17;
        let hdr = parse(&v4).unwrap();
        assert_eq!(hdr.version(), 4);
        assert_eq!(hdr.protocol(), IpProtocol::Udp);
        assert_eq!(hdr.header_len(), 20);

        let mut v6 = vec![0u8; 40];
        v6[0] = 0x60;
        v6[6] = 6;
        let hdr = parse(&v6).unwrap();
        assert_eq!(hdr.version(), 6);
        assert_eq!(hdr.protocol(), IpProtocol::Tcp);
        assert_eq!(hdr.header_len(), 40);
        assert!(!hdr.is_later_fragment());
    }

    #[test]
    fn short_packets_fail_before_version_check() {
        for len in 0..20 {
            let pkt = vec![0x95u8; len];
            assert!(matches!(
                parse(&pkt),
                Err(ParseError::TooShort { expected: 20, .. })
            ));
        }
    }

    #[test]
    fn short_ipv6_is_too_short() {
        let mut pkt = vec![0u8; 30];
        pkt[0] = 0x60;
        assert!(matches!(
            parse(&pkt),
            Err(ParseError::TooShort { expected: 40, actual: 30, .. })
        ));
    }

    #[test]
    fn unsupported_versions() {
        for version in [0u8, 1, 5, 7, 15] {
            let mut pkt = vec![0u8; 40];
            pkt[0] = version << 4 | 5;
            assert_eq!(parse(&pkt).unwrap_err(), ParseError::UnsupportedVersion(version));
        }
    }

    #[test]
    fn record_accessors() {
        let mut v4 = vec![0u8; 20];
        v4[0] = 0x45;
        v4[9] = 6;
        v4[12..16].copy_from_slice(&[192, 168, 1, 1]);
        v4[16..20].copy_from_slice(&[10, 0, 0, 1]);
        let record = parse(&v4).unwrap().record();
        assert_eq!(record.src_ip(), "192.168.1.1");
        assert_eq!(record.dst_ip(), "10.0.0.1");
        assert_eq!(record.protocol_name(), "TCP");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["version"], 4);
        assert_eq!(json["header_length"], 20);
    }
}
