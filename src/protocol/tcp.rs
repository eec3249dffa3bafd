//! Zero-copy TCP header parser.
//!
//! TCP header layout (20-60 bytes):
//!   0                   1                   2                   3
//!   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |          Source Port          |       Destination Port        |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                        Sequence Number                       |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                    Acknowledgment Number                     |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |  Data |           |U|A|P|R|S|F|                               |
//!  | Offset| Reserved  |R|C|S|S|Y|I|            Window             |
//!  |       |           |G|K|H|T|N|N|                               |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |           Checksum            |         Urgent Pointer        |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                    Options                    |    Padding    |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!
//! Only the first option is decoded: its kind at byte 20 and a 16-bit value
//! at bytes 22-23.

use super::{Layer, ParseError};
use serde::Serialize;
use std::fmt;

/// Minimum TCP header length (no options)
pub const TCP_MIN_HEADER_LEN: usize = 20;

/// TCP flags bitmask constants
pub mod flags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;
}

/// The six control bits, decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TcpFlags {
    pub urg: bool,
    pub ack: bool,
    pub psh: bool,
    pub rst: bool,
    pub syn: bool,
    pub fin: bool,
}

impl TcpFlags {
    /// Decode the low six bits of the flags byte.
    pub fn from_bits(bits: u8) -> Self {
        TcpFlags {
            urg: bits & flags::URG != 0,
            ack: bits & flags::ACK != 0,
            psh: bits & flags::PSH != 0,
            rst: bits & flags::RST != 0,
            syn: bits & flags::SYN != 0,
            fin: bits & flags::FIN != 0,
        }
    }

    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        for (set, bit) in [
            (self.urg, flags::URG),
            (self.ack, flags::ACK),
            (self.psh, flags::PSH),
            (self.rst, flags::RST),
            (self.syn, flags::SYN),
            (self.fin, flags::FIN),
        ] {
            if set {
                bits |= bit;
            }
        }
        bits
    }

    pub fn is_empty(&self) -> bool {
        self.bits() == 0
    }
}

impl fmt::Display for TcpFlags {
    /// Formats like "[SYN, ACK]".
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (self.syn, "SYN"),
            (self.ack, "ACK"),
            (self.fin, "FIN"),
            (self.rst, "RST"),
            (self.psh, "PSH"),
            (self.urg, "URG"),
        ];
        let parts: Vec<&str> = names
            .iter()
            .filter(|(set, _)| *set)
            .map(|(_, name)| *name)
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpOptionKind {
    EndOfOptions,
    NoOp,
    Mss,
    WindowScale,
    SackPermitted,
    Sack,
    Unknown(u8),
}

impl From<u8> for TcpOptionKind {
    fn from(value: u8) -> Self {
        match value {
            0 => TcpOptionKind::EndOfOptions,
            1 => TcpOptionKind::NoOp,
            2 => TcpOptionKind::Mss,
            3 => TcpOptionKind::WindowScale,
            4 => TcpOptionKind::SackPermitted,
            5 => TcpOptionKind::Sack,
            other => TcpOptionKind::Unknown(other),
        }
    }
}

impl TcpOptionKind {
    pub fn code(&self) -> &'static str {
        match self {
            TcpOptionKind::EndOfOptions => "EOO",
            TcpOptionKind::NoOp => "NOP",
            TcpOptionKind::Mss => "MSS",
            TcpOptionKind::WindowScale => "WSCALE",
            TcpOptionKind::SackPermitted => "SACKOK",
            TcpOptionKind::Sack => "SACK",
            TcpOptionKind::Unknown(_) => "UNKNOWN",
        }
    }
}

/// The single decoded option of a header longer than 20 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpOption {
    pub kind: TcpOptionKind,
    pub value: u16,
}

impl fmt::Display for TcpOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind.code(), self.value)
    }
}

/// Zero-copy TCP header.
#[derive(Debug)]
pub struct TcpHeader<'a> {
    data: &'a [u8],
    header_len: usize,
}

impl<'a> TcpHeader<'a> {
    /// Parse a TCP header from a byte slice.
    ///
    /// A data offset below five words is `InvalidHeaderLength`, which
    /// [`ParseError::is_fatal`] reports as unrecoverable for the segment.
    pub fn parse(data: &'a [u8]) -> Result<Self, ParseError> {
        if data.len() < TCP_MIN_HEADER_LEN {
            return Err(ParseError::TooShort {
                layer: Layer::Tcp,
                expected: TCP_MIN_HEADER_LEN,
                actual: data.len(),
            });
        }

        let data_offset = (data[12] >> 4) & 0x0F;
        let header_len = data_offset as usize * 4;

        if header_len < TCP_MIN_HEADER_LEN {
            return Err(ParseError::InvalidHeaderLength {
                layer: Layer::Tcp,
                words: data_offset,
            });
        }

        if data.len() < header_len {
            return Err(ParseError::TooShort {
                layer: Layer::Tcp,
                expected: header_len,
                actual: data.len(),
            });
        }

        Ok(TcpHeader { data, header_len })
    }

    #[inline]
    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.data[0], self.data[1]])
    }

    #[inline]
    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes([self.data[2], self.data[3]])
    }

    #[inline]
    pub fn sequence_number(&self) -> u32 {
        u32::from_be_bytes([self.data[4], self.data[5], self.data[6], self.data[7]])
    }

    #[inline]
    pub fn ack_number(&self) -> u32 {
        u32::from_be_bytes([self.data[8], self.data[9], self.data[10], self.data[11]])
    }

    /// Data offset in 32-bit words.
    #[inline]
    pub fn data_offset(&self) -> u8 {
        (self.data[12] >> 4) & 0x0F
    }

    /// Header length in bytes.
    #[inline]
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Raw flags byte.
    #[inline]
    pub fn flags_raw(&self) -> u8 {
        self.data[13]
    }

    #[inline]
    pub fn flags(&self) -> TcpFlags {
        TcpFlags::from_bits(self.data[13])
    }

    #[inline]
    pub fn window_size(&self) -> u16 {
        u16::from_be_bytes([self.data[14], self.data[15]])
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.data[16], self.data[17]])
    }

    #[inline]
    pub fn urgent_pointer(&self) -> u16 {
        u16::from_be_bytes([self.data[18], self.data[19]])
    }

    /// Raw option bytes (if any).
    #[inline]
    pub fn options_raw(&self) -> &'a [u8] {
        &self.data[TCP_MIN_HEADER_LEN..self.header_len]
    }

    /// First option, present only when the header is longer than 20 bytes.
    pub fn option(&self) -> Option<TcpOption> {
        if self.header_len <= TCP_MIN_HEADER_LEN {
            return None;
        }
        Some(TcpOption {
            kind: TcpOptionKind::from(self.data[20]),
            value: u16::from_be_bytes([self.data[22], self.data[23]]),
        })
    }

    /// Payload after the TCP header.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.data[self.header_len..]
    }

    pub fn record(&self) -> TcpRecord {
        let flags = self.flags();
        TcpRecord {
            src_port: self.src_port(),
            dst_port: self.dst_port(),
            src_service: service_name(self.src_port()),
            dst_service: service_name(self.dst_port()),
            seq_num: self.sequence_number(),
            ack_num: self.ack_number(),
            header_length: self.header_len,
            flags,
            window_size: self.window_size(),
            checksum: self.checksum(),
            urgent_pointer: self.urgent_pointer(),
            options: self.option().map(|opt| opt.to_string()).into_iter().collect(),
            is_control_packet: is_control_packet(&flags),
            payload_size: self.payload().len(),
        }
    }
}

/// Named fields of a TCP header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TcpRecord {
    pub src_port: u16,
    pub dst_port: u16,
    pub src_service: String,
    pub dst_service: String,
    pub seq_num: u32,
    pub ack_num: u32,
    pub header_length: usize,
    pub flags: TcpFlags,
    pub window_size: u16,
    pub checksum: u16,
    pub urgent_pointer: u16,
    pub options: Vec<String>,
    pub is_control_packet: bool,
    pub payload_size: usize,
}

/// Parse a segment into its record form.
pub fn parse(segment: &[u8]) -> Result<TcpRecord, ParseError> {
    TcpHeader::parse(segment).map(|hdr| hdr.record())
}

/// Well-known service for a port, or `PORT-<n>`.
pub fn service_name(port: u16) -> String {
    let name = match port {
        21 => "FTP",
        22 => "SSH",
        23 => "Telnet",
        25 => "SMTP",
        53 => "DNS",
        80 => "HTTP",
        443 => "HTTPS",
        3306 => "MySQL",
        3389 => "RDP",
        5985 | 5986 => "WSMan",
        _ => return format!("PORT-{}", port),
    };
    name.to_string()
}

/// True when any of the six control bits is set.
pub fn is_control_packet(flags: &TcpFlags) -> bool {
    flags.syn || flags.fin || flags.rst || flags.urg || flags.ack || flags.psh
}

impl<'a> fmt::Display for TcpHeader<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            ":{} -> :{} {} seq={} ack={} win={}",
            self.src_port(),
            self.dst_port(),
            self.flags(),
            self.sequence_number(),
            self.ack_number(),
            self.window_size()
        )?;
        if let Some(opt) = self.option() {
            write!(f, " opt={}", opt)?;
        }
        Ok(())
    }
}
