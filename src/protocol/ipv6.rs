//! Zero-copy IPv6 header parser.
//!
//! IPv6 fixed header layout (40 bytes):
//!   0                   1                   2                   3
//!   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |Version| Traffic Class |           Flow Label                  |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |         Payload Length        |  Next Header  |   Hop Limit   |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                         Source Address                        |
//!  |                          (128 bits)                           |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                      Destination Address                      |
//!  |                          (128 bits)                           |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!
//! Extension headers are not walked; they stay in the payload.

use super::addr::{self, AddressClass};
use super::{IpProtocol, Layer, ParseError};
use serde::Serialize;
use std::fmt;
use std::net::{IpAddr, Ipv6Addr};

/// IPv6 fixed header length
pub const IPV6_HEADER_LEN: usize = 40;

/// Zero-copy IPv6 header.
#[derive(Debug)]
pub struct Ipv6Header<'a> {
    data: &'a [u8],
}

impl<'a> Ipv6Header<'a> {
    /// Parse an IPv6 header from a byte slice.
    pub fn parse(data: &'a [u8]) -> Result<Self, ParseError> {
        if data.len() < IPV6_HEADER_LEN {
            return Err(ParseError::TooShort {
                layer: Layer::Ip,
                expected: IPV6_HEADER_LEN,
                actual: data.len(),
            });
        }

        let version = (data[0] >> 4) & 0x0F;
        if version != 6 {
            return Err(ParseError::UnsupportedVersion(version));
        }

        Ok(Ipv6Header { data })
    }

    /// IP version (always 6).
    #[inline]
    pub fn version(&self) -> u8 {
        (self.data[0] >> 4) & 0x0F
    }

    /// Traffic class (8 bits).
    #[inline]
    pub fn traffic_class(&self) -> u8 {
        ((self.data[0] & 0x0F) << 4) | ((self.data[1] >> 4) & 0x0F)
    }

    /// Flow label (20 bits).
    #[inline]
    pub fn flow_label(&self) -> u32 {
        ((self.data[1] & 0x0F) as u32) << 16 | (self.data[2] as u32) << 8 | self.data[3] as u32
    }

    /// Payload length (not including the 40-byte fixed header).
    #[inline]
    pub fn payload_length(&self) -> u16 {
        u16::from_be_bytes([self.data[4], self.data[5]])
    }

    /// Next header protocol number.
    #[inline]
    pub fn next_header(&self) -> IpProtocol {
        IpProtocol::from(self.data[6])
    }

    /// Hop limit (analogous to IPv4 TTL).
    #[inline]
    pub fn hop_limit(&self) -> u8 {
        self.data[7]
    }

    #[inline]
    pub fn src_addr(&self) -> Ipv6Addr {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&self.data[8..24]);
        Ipv6Addr::from(octets)
    }

    #[inline]
    pub fn dst_addr(&self) -> Ipv6Addr {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&self.data[24..40]);
        Ipv6Addr::from(octets)
    }

    /// Everything after the fixed header.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.data[IPV6_HEADER_LEN..]
    }

    /// Payload clamped to the declared payload length.
    #[inline]
    pub fn datagram_payload(&self) -> &'a [u8] {
        let payload_len = self.payload_length() as usize;
        let available = self.data.len() - IPV6_HEADER_LEN;
        let end = IPV6_HEADER_LEN + payload_len.min(available);
        &self.data[IPV6_HEADER_LEN..end]
    }

    pub fn record(&self) -> Ipv6Record {
        let next = self.next_header();
        Ipv6Record {
            version: 6,
            traffic_class: self.traffic_class(),
            flow_label: self.flow_label(),
            payload_length: self.payload_length(),
            next_header: next.as_u8(),
            protocol_name: next.name(),
            hop_limit: self.hop_limit(),
            src_ip: self.src_addr().to_string(),
            dst_ip: self.dst_addr().to_string(),
            src_type: addr::classify(IpAddr::V6(self.src_addr())),
            dst_type: addr::classify(IpAddr::V6(self.dst_addr())),
            payload_size: self.payload().len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ipv6Record {
    pub version: u8,
    pub traffic_class: u8,
    pub flow_label: u32,
    pub payload_length: u16,
    pub next_header: u8,
    pub protocol_name: &'static str,
    pub hop_limit: u8,
    pub src_ip: String,
    pub dst_ip: String,
    pub src_type: AddressClass,
    pub dst_type: AddressClass,
    pub payload_size: usize,
}

impl<'a> fmt::Display for Ipv6Header<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} next_hdr={} hop_limit={} len={}",
            self.src_addr(),
            self.dst_addr(),
            self.next_header(),
            self.hop_limit(),
            self.payload_length()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_ipv6_header() -> Vec<u8> {
        let mut pkt = vec![0u8; 40];
        pkt[0] = 0x6a; // version 6, traffic class high nibble 0xa
        pkt[1] = 0xb1; // traffic class low nibble 0xb, flow label 0x1....
        pkt[2] = 0x23;
        pkt[3] = 0x45;
        pkt[5] = 0x04; // payload length 4
        pkt[6] = 6; // next header TCP
        pkt[7] = 64;
        // 2001:db8::1
        pkt[8] = 0x20;
        pkt[9] = 0x01;
        pkt[10] = 0x0d;
        pkt[11] = 0xb8;
        pkt[23] = 0x01;
        // 2001:db8::2
        pkt[24] = 0x20;
        pkt[25] = 0x01;
        pkt[26] = 0x0d;
        pkt[27] = 0xb8;
        pkt[39] = 0x02;
        pkt
    }

    #[test]
    fn parse_valid_ipv6() {
        let mut pkt = make_ipv6_header();
        pkt.extend_from_slice(b"data");
        let hdr = Ipv6Header::parse(&pkt).unwrap();
        assert_eq!(hdr.version(), 6);
        assert_eq!(hdr.traffic_class(), 0xab);
        assert_eq!(hdr.flow_label(), 0x12345);
        assert_eq!(hdr.payload_length(), 4);
        assert_eq!(hdr.next_header(), IpProtocol::Tcp);
        assert_eq!(hdr.hop_limit(), 64);
        assert_eq!(hdr.src_addr(), "2001:db8::1".parse::<Ipv6Addr>().unwrap());
        assert_eq!(hdr.dst_addr(), "2001:db8::2".parse::<Ipv6Addr>().unwrap());
        assert_eq!(hdr.payload(), b"data");

        let record = hdr.record();
        assert_eq!(record.src_ip, "2001:db8::1");
        assert_eq!(record.protocol_name, "TCP");
        assert_eq!(record.payload_size, 4);
    }

    #[test]
    fn payload_is_everything_after_fixed_header() {
        for extra in [0usize, 1, 4, 17, 100] {
            let mut pkt = make_ipv6_header();
            pkt.extend(std::iter::repeat(0xaa).take(extra));
            let hdr = Ipv6Header::parse(&pkt).unwrap();
            assert_eq!(hdr.payload().len(), pkt.len() - 40);
            assert_eq!(hdr.datagram_payload().len(), extra.min(4));
        }
    }

    #[test]
    fn reject_too_short() {
        let pkt = make_ipv6_header();
        assert_eq!(
            Ipv6Header::parse(&pkt[..39]).unwrap_err(),
            ParseError::TooShort {
                layer: Layer::Ip,
                expected: 40,
                actual: 39
            }
        );
    }

    #[test]
    fn reject_wrong_version() {
        let mut pkt = make_ipv6_header();
        pkt[0] = 0x45;
        assert_eq!(
            Ipv6Header::parse(&pkt).unwrap_err(),
            ParseError::UnsupportedVersion(4)
        );
    }
}
