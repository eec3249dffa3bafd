//! Zero-copy IPv4 header parser.
//!
//! IPv4 header layout (20-60 bytes):
//!   0                   1                   2                   3
//!   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |Version|  IHL  |Type of Service|          Total Length         |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |         Identification        |Flags|      Fragment Offset    |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |  Time to Live |    Protocol   |         Header Checksum       |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                       Source Address                          |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                    Destination Address                        |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                    Options                    |    Padding    |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!
//! Options are a TLV walk: kind 0 ends the list, kind 1 is a one-byte no-op,
//! every other kind is followed by a length byte covering kind + length + data.

use super::addr::{self, AddressClass};
use super::{IpProtocol, Layer, ParseError};
use serde::Serialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// Minimum IPv4 header length (no options)
pub const IPV4_MIN_HEADER_LEN: usize = 20;

const OPT_END: u8 = 0;
const OPT_NOP: u8 = 1;

/// One entry of the IPv4 option list. No-op options have no length or data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ipv4Option<'a> {
    pub kind: u8,
    pub length: Option<u8>,
    pub data: &'a [u8],
}

/// Zero-copy IPv4 header.
#[derive(Debug)]
pub struct Ipv4Header<'a> {
    data: &'a [u8],
    header_len: usize,
    options: Vec<Ipv4Option<'a>>,
}

impl<'a> Ipv4Header<'a> {
    /// Parse an IPv4 header from a byte slice.
    pub fn parse(data: &'a [u8]) -> Result<Self, ParseError> {
        if data.len() < IPV4_MIN_HEADER_LEN {
            return Err(ParseError::TooShort {
                layer: Layer::Ip,
                expected: IPV4_MIN_HEADER_LEN,
                actual: data.len(),
            });
        }

        let version = (data[0] >> 4) & 0x0F;
        if version != 4 {
            return Err(ParseError::UnsupportedVersion(version));
        }

        let ihl = data[0] & 0x0F;
        let header_len = ihl as usize * 4;

        if header_len < IPV4_MIN_HEADER_LEN {
            return Err(ParseError::InvalidHeaderLength {
                layer: Layer::Ip,
                words: ihl,
            });
        }

        if data.len() < header_len {
            return Err(ParseError::TooShort {
                layer: Layer::Ip,
                expected: header_len,
                actual: data.len(),
            });
        }

        let flags = (data[6] >> 5) & 0x07;
        if flags & 0b100 != 0 {
            return Err(ParseError::InvalidFlags(flags));
        }

        let options = parse_options(&data[..header_len])?;

        Ok(Ipv4Header {
            data,
            header_len,
            options,
        })
    }

    /// IP version (always 4).
    #[inline]
    pub fn version(&self) -> u8 {
        (self.data[0] >> 4) & 0x0F
    }

    /// Internet Header Length in 32-bit words.
    #[inline]
    pub fn ihl(&self) -> u8 {
        self.data[0] & 0x0F
    }

    /// Header length in bytes.
    #[inline]
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Type of Service / DSCP + ECN.
    #[inline]
    pub fn tos(&self) -> u8 {
        self.data[1]
    }

    /// Total length of the IP packet (header + payload) in bytes.
    #[inline]
    pub fn total_length(&self) -> u16 {
        u16::from_be_bytes([self.data[2], self.data[3]])
    }

    /// Identification field (used for fragmentation reassembly).
    #[inline]
    pub fn identification(&self) -> u16 {
        u16::from_be_bytes([self.data[4], self.data[5]])
    }

    /// Flags (3 bits): Reserved, Don't Fragment, More Fragments.
    #[inline]
    pub fn flags(&self) -> u8 {
        (self.data[6] >> 5) & 0x07
    }

    /// Don't Fragment flag.
    #[inline]
    pub fn dont_fragment(&self) -> bool {
        (self.data[6] >> 6) & 1 == 1
    }

    /// More Fragments flag.
    #[inline]
    pub fn more_fragments(&self) -> bool {
        (self.data[6] >> 5) & 1 == 1
    }

    /// A packet with more fragments pending counts as a fragment.
    #[inline]
    pub fn is_fragment(&self) -> bool {
        self.more_fragments()
    }

    /// Fragment offset in bytes (the wire field counts 8-byte units).
    #[inline]
    pub fn fragment_offset(&self) -> u16 {
        u16::from_be_bytes([self.data[6] & 0x1F, self.data[7]]) * 8
    }

    /// Time to Live.
    #[inline]
    pub fn ttl(&self) -> u8 {
        self.data[8]
    }

    /// Protocol number.
    #[inline]
    pub fn protocol(&self) -> IpProtocol {
        IpProtocol::from(self.data[9])
    }

    /// Protocol number as raw u8.
    #[inline]
    pub fn protocol_raw(&self) -> u8 {
        self.data[9]
    }

    /// Header checksum, as read. Never verified.
    #[inline]
    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.data[10], self.data[11]])
    }

    /// Source IP address.
    #[inline]
    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.data[12], self.data[13], self.data[14], self.data[15])
    }

    /// Destination IP address.
    #[inline]
    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.data[16], self.data[17], self.data[18], self.data[19])
    }

    /// Parsed options, in wire order.
    #[inline]
    pub fn options(&self) -> &[Ipv4Option<'a>] {
        &self.options
    }

    /// Everything after the header, including any link-layer padding.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.data[self.header_len..]
    }

    /// Payload clamped to `total_length - header_len`, so Ethernet padding
    /// on short frames is not mistaken for upper-layer data.
    #[inline]
    pub fn datagram_payload(&self) -> &'a [u8] {
        let total = self.total_length() as usize;
        let payload_len = total.saturating_sub(self.header_len);
        let available = self.data.len() - self.header_len;
        let end = self.header_len + payload_len.min(available);
        &self.data[self.header_len..end]
    }

    pub fn record(&self) -> Ipv4Record {
        let protocol = self.protocol();
        Ipv4Record {
            version: 4,
            ihl: self.ihl(),
            header_length: self.header_len,
            tos: self.tos(),
            total_length: self.total_length(),
            id: self.identification(),
            flags: FragmentFlags {
                df: self.dont_fragment(),
                mf: self.more_fragments(),
            },
            is_fragment: self.is_fragment(),
            fragment_offset: self.fragment_offset(),
            ttl: self.ttl(),
            protocol: protocol.as_u8(),
            protocol_name: protocol.name(),
            checksum: self.checksum(),
            src_ip: self.src_addr().to_string(),
            dst_ip: self.dst_addr().to_string(),
            src_type: addr::classify(IpAddr::V4(self.src_addr())),
            dst_type: addr::classify(IpAddr::V4(self.dst_addr())),
            options: self
                .options
                .iter()
                .map(|opt| Ipv4OptionRecord {
                    kind: opt.kind,
                    length: opt.length,
                    data: opt.data.to_vec(),
                })
                .collect(),
            payload_size: self.payload().len(),
        }
    }
}

fn parse_options(header: &[u8]) -> Result<Vec<Ipv4Option<'_>>, ParseError> {
    let mut options = Vec::new();
    let mut offset = IPV4_MIN_HEADER_LEN;

    while offset < header.len() {
        match header[offset] {
            OPT_END => break,
            OPT_NOP => {
                options.push(Ipv4Option {
                    kind: OPT_NOP,
                    length: None,
                    data: &[],
                });
                offset += 1;
            }
            kind => {
                let length = *header.get(offset + 1).ok_or(ParseError::OptionParse {
                    offset,
                    reason: "missing length byte",
                })?;
                let end = offset + length as usize;
                if length < 2 {
                    return Err(ParseError::OptionParse {
                        offset,
                        reason: "length shorter than kind and length bytes",
                    });
                }
                if end > header.len() {
                    return Err(ParseError::OptionParse {
                        offset,
                        reason: "option runs past end of header",
                    });
                }
                options.push(Ipv4Option {
                    kind,
                    length: Some(length),
                    data: &header[offset + 2..end],
                });
                offset = end;
            }
        }
    }

    Ok(options)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FragmentFlags {
    pub df: bool,
    pub mf: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ipv4OptionRecord {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u8>,
    pub data: Vec<u8>,
}

/// Named fields of an IPv4 header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ipv4Record {
    pub version: u8,
    pub ihl: u8,
    pub header_length: usize,
    pub tos: u8,
    pub total_length: u16,
    pub id: u16,
    pub flags: FragmentFlags,
    pub is_fragment: bool,
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub protocol_name: &'static str,
    pub checksum: u16,
    pub src_ip: String,
    pub dst_ip: String,
    pub src_type: AddressClass,
    pub dst_type: AddressClass,
    pub options: Vec<Ipv4OptionRecord>,
    pub payload_size: usize,
}

impl<'a> fmt::Display for Ipv4Header<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} proto={} ttl={} len={}",
            self.src_addr(),
            self.dst_addr(),
            self.protocol(),
            self.ttl(),
            self.total_length()
        )?;
        if self.more_fragments() || self.fragment_offset() != 0 {
            write!(f, " frag@{}", self.fragment_offset())?;
        }
        Ok(())
    }
}
