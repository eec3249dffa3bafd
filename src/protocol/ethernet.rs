//! Zero-copy Ethernet frame parser.
//!
//! An Ethernet frame has the following layout:
//!   - Destination MAC: 6 bytes
//!   - Source MAC:      6 bytes
//!   - EtherType:       2 bytes
//!   - Payload:         variable
//!
//! With an 802.1Q tag the EtherType field holds 0x8100 and is followed by a
//! 2-byte tag control field (VLAN ID in the low 12 bits) and the inner
//! EtherType at offset 16.

use super::{EtherType, Layer, ParseError};
use serde::Serialize;
use std::fmt;

/// Minimum Ethernet header length (no VLAN tags)
pub const ETH_HEADER_LEN: usize = 14;

/// Header length when a single 802.1Q tag is present.
pub const VLAN_HEADER_LEN: usize = 18;

pub const BROADCAST_MAC: [u8; 6] = [0xff; 6];

/// Zero-copy Ethernet header that borrows from the packet buffer.
#[derive(Debug)]
pub struct EthernetHeader<'a> {
    data: &'a [u8],
}

impl<'a> EthernetHeader<'a> {
    /// Parse an Ethernet header from a raw byte slice.
    /// Returns an error if there aren't enough bytes.
    pub fn parse(data: &'a [u8]) -> Result<Self, ParseError> {
        if data.len() < ETH_HEADER_LEN {
            return Err(ParseError::TooShort {
                layer: Layer::Ethernet,
                expected: ETH_HEADER_LEN,
                actual: data.len(),
            });
        }
        let hdr = EthernetHeader { data };
        if hdr.is_vlan_tagged() && data.len() < VLAN_HEADER_LEN {
            return Err(ParseError::TooShort {
                layer: Layer::Ethernet,
                expected: VLAN_HEADER_LEN,
                actual: data.len(),
            });
        }
        Ok(hdr)
    }

    /// Destination MAC address as a 6-byte slice.
    #[inline]
    pub fn dst_mac(&self) -> &'a [u8] {
        &self.data[0..6]
    }

    /// Source MAC address as a 6-byte slice.
    #[inline]
    pub fn src_mac(&self) -> &'a [u8] {
        &self.data[6..12]
    }

    #[inline]
    pub fn is_broadcast(&self) -> bool {
        self.dst_mac() == &BROADCAST_MAC[..]
    }

    /// Group bit of the first destination octet, broadcast excluded.
    #[inline]
    pub fn is_multicast(&self) -> bool {
        self.data[0] & 0x01 == 1 && !self.is_broadcast()
    }

    /// Outer EtherType field.
    #[inline]
    pub fn ether_type(&self) -> EtherType {
        EtherType::from(self.ether_type_raw())
    }

    /// Raw EtherType as u16.
    #[inline]
    pub fn ether_type_raw(&self) -> u16 {
        u16::from_be_bytes([self.data[12], self.data[13]])
    }

    #[inline]
    pub fn is_vlan_tagged(&self) -> bool {
        self.ether_type_raw() == EtherType::VlanTagged.as_u16()
    }

    /// 12-bit VLAN ID, present only on 802.1Q frames.
    #[inline]
    pub fn vlan_id(&self) -> Option<u16> {
        if self.is_vlan_tagged() {
            Some(u16::from_be_bytes([self.data[14], self.data[15]]) & 0x0FFF)
        } else {
            None
        }
    }

    /// EtherType carried inside the 802.1Q tag.
    #[inline]
    pub fn inner_ether_type(&self) -> Option<EtherType> {
        if self.is_vlan_tagged() {
            Some(EtherType::from(u16::from_be_bytes([
                self.data[16],
                self.data[17],
            ])))
        } else {
            None
        }
    }

    /// EtherType of the network-layer payload, looking through a VLAN tag.
    #[inline]
    pub fn network_ether_type(&self) -> EtherType {
        self.inner_ether_type().unwrap_or_else(|| self.ether_type())
    }

    /// Everything after the outer 14-byte header. On tagged frames this still
    /// starts with the 4 tag bytes.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.data[ETH_HEADER_LEN..]
    }

    /// The network-layer bytes, past the VLAN tag if there is one.
    #[inline]
    pub fn network_payload(&self) -> &'a [u8] {
        if self.is_vlan_tagged() {
            &self.data[VLAN_HEADER_LEN..]
        } else {
            self.payload()
        }
    }

    /// Total length of the Ethernet frame (header + payload).
    #[inline]
    pub fn total_len(&self) -> usize {
        self.data.len()
    }

    pub fn record(&self) -> EthernetRecord {
        let ether_type = self.ether_type();
        let inner = self.inner_ether_type();
        EthernetRecord {
            dst_mac: format_mac(self.dst_mac()),
            src_mac: format_mac(self.src_mac()),
            is_broadcast: self.is_broadcast(),
            is_multicast: self.is_multicast(),
            ethertype: ether_type.as_u16(),
            ethertype_name: ether_type.name(),
            is_vlan_tagged: self.is_vlan_tagged(),
            vlan_id: self.vlan_id(),
            inner_ethertype: inner.map(|et| et.as_u16()),
            inner_ethertype_name: inner.map(|et| et.name()),
            payload_size: self.payload().len(),
        }
    }
}

/// Named fields of an Ethernet header, for presentation and export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EthernetRecord {
    pub dst_mac: String,
    pub src_mac: String,
    pub is_broadcast: bool,
    pub is_multicast: bool,
    pub ethertype: u16,
    pub ethertype_name: &'static str,
    pub is_vlan_tagged: bool,
    pub vlan_id: Option<u16>,
    pub inner_ethertype: Option<u16>,
    pub inner_ethertype_name: Option<&'static str>,
    pub payload_size: usize,
}

/// Parse a frame into its record form.
pub fn parse(frame: &[u8]) -> Result<EthernetRecord, ParseError> {
    EthernetHeader::parse(frame).map(|hdr| hdr.record())
}

/// Format octets as xx:xx:xx:xx:xx:xx. Any length is accepted.
pub fn format_mac(mac: &[u8]) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parse xx:xx:xx:xx:xx:xx (either case) into six octets.
pub fn parse_mac(text: &str) -> Result<[u8; 6], ParseError> {
    let invalid = || ParseError::InvalidMac(text.to_string());
    let mut mac = [0u8; 6];
    let mut parts = text.split(':');
    for octet in mac.iter_mut() {
        let part = parts.next().ok_or_else(invalid)?;
        if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
    }
    if parts.next().is_some() {
        return Err(invalid());
    }
    Ok(mac)
}

impl<'a> fmt::Display for EthernetHeader<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} [{}]",
            format_mac(self.src_mac()),
            format_mac(self.dst_mac()),
            self.ether_type()
        )?;
        if let Some(vlan) = self.vlan_id() {
            write!(f, " vlan={} inner={}", vlan, self.network_ether_type())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(dst: [u8; 6], ether_type: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = dst.to_vec();
        frame.extend_from_slice(&[0x5f, 0x4e, 0x3d, 0x2c, 0x1b, 0x0a]);
        frame.extend_from_slice(&ether_type.to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn parse_broadcast_ipv4_frame() {
        let frame = frame(BROADCAST_MAC, 0x0800, b"data");
        let eth = EthernetHeader::parse(&frame).unwrap();
        assert!(eth.is_broadcast());
        assert!(!eth.is_multicast());
        assert_eq!(eth.ether_type(), EtherType::Ipv4);
        assert_eq!(eth.payload(), b"data");

        let record = eth.record();
        assert_eq!(record.dst_mac, "ff:ff:ff:ff:ff:ff");
        assert_eq!(record.src_mac, "5f:4e:3d:2c:1b:0a");
        assert_eq!(record.ethertype_name, "IPv4");
        assert_eq!(record.payload_size, 4);
        assert!(!record.is_vlan_tagged);
        assert_eq!(record.vlan_id, None);
        assert_eq!(record.inner_ethertype, None);
    }

    #[test]
    fn multicast_uses_group_bit() {
        for first in [0x01, 0x03, 0x33] {
            let frame = frame([first, 0x00, 0x5e, 0x00, 0x00, 0x01], 0x86DD, b"");
            let eth = EthernetHeader::parse(&frame).unwrap();
            assert!(eth.is_multicast(), "first octet {:#04x}", first);
            assert!(!eth.is_broadcast());
        }
        let frame = frame([0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e], 0x0800, b"");
        assert!(!EthernetHeader::parse(&frame).unwrap().is_multicast());
    }

    #[test]
    fn reject_too_short_frame() {
        for len in 0..ETH_HEADER_LEN {
            let data = vec![0u8; len];
            assert_eq!(
                EthernetHeader::parse(&data).unwrap_err(),
                ParseError::TooShort {
                    layer: Layer::Ethernet,
                    expected: ETH_HEADER_LEN,
                    actual: len
                }
            );
        }
    }

    #[test]
    fn mac_strings_are_always_17_chars() {
        let data: Vec<u8> = (0u8..14).map(|b| b.wrapping_mul(37)).collect();
        let record = parse(&data).unwrap();
        assert_eq!(record.dst_mac.len(), 17);
        assert_eq!(record.src_mac.len(), 17);
    }

    #[test]
    fn vlan_tag_is_decoded_but_payload_starts_at_14() {
        // TCI 0xA00A: priority 5, VLAN 10
        let frame = frame(
            [0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e],
            0x8100,
            &[0xA0, 0x0A, 0x86, 0xDD, 0xde, 0xad],
        );
        let eth = EthernetHeader::parse(&frame).unwrap();
        assert!(eth.is_vlan_tagged());
        assert_eq!(eth.vlan_id(), Some(10));
        assert_eq!(eth.inner_ether_type(), Some(EtherType::Ipv6));
        assert_eq!(eth.network_ether_type(), EtherType::Ipv6);
        assert_eq!(eth.payload().len(), 6);
        assert_eq!(eth.network_payload(), &[0xde_u8, 0xad][..]);

        let record = eth.record();
        assert_eq!(record.ethertype_name, "802.1Q");
        assert_eq!(record.inner_ethertype_name, Some("IPv6"));
    }

    #[test]
    fn truncated_vlan_tag_is_too_short() {
        let frame = frame([0u8; 6], 0x8100, &[0x00, 0x01]);
        assert!(matches!(
            EthernetHeader::parse(&frame),
            Err(ParseError::TooShort { expected: 18, .. })
        ));
    }

    #[test]
    fn mac_text_round_trip() {
        for text in ["00:1a:2b:3c:4d:5e", "ff:ff:ff:ff:ff:ff", "01:00:5e:00:00:01"] {
            assert_eq!(format_mac(&parse_mac(text).unwrap()), text);
        }
        assert_eq!(parse_mac("AA:BB:CC:DD:EE:FF").unwrap(), [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
    }

    #[test]
    fn format_mac_short_input() {
        assert_eq!(format_mac(&[0xde, 0xad]), "de:ad");
        assert_eq!(format_mac(&[]), "");
    }

    #[test]
    fn reject_malformed_mac_text() {
        for text in [
            "",
            "00:11:22:33:44",
            "00:11:22:33:44:55:66",
            "0:11:22:33:44:55",
            "zz:11:22:33:44:55",
            "+f:11:22:33:44:55",
        ] {
            assert!(parse_mac(text).is_err(), "{:?}", text);
        }
    }
}
