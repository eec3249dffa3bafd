pub mod addr;
pub mod ethernet;
pub mod ip;
pub mod ipv4;
pub mod ipv6;
pub mod tcp;

use serde::Serialize;
use std::fmt;

pub use ip::NetworkHeader;

/// EtherType values the dissector knows by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtherType {
    Ipv4,
    Ipv6,
    Arp,
    VlanTagged,
    Mpls,
    PppoeDiscovery,
    PppoeSession,
    Unknown(u16),
}

impl From<u16> for EtherType {
    fn from(value: u16) -> Self {
        match value {
            0x0800 => EtherType::Ipv4,
            0x86DD => EtherType::Ipv6,
            0x0806 => EtherType::Arp,
            0x8100 => EtherType::VlanTagged,
            0x8847 => EtherType::Mpls,
            0x8863 => EtherType::PppoeDiscovery,
            0x8864 => EtherType::PppoeSession,
            other => EtherType::Unknown(other),
        }
    }
}

impl EtherType {
    pub fn as_u16(&self) -> u16 {
        match self {
            EtherType::Ipv4 => 0x0800,
            EtherType::Ipv6 => 0x86DD,
            EtherType::Arp => 0x0806,
            EtherType::VlanTagged => 0x8100,
            EtherType::Mpls => 0x8847,
            EtherType::PppoeDiscovery => 0x8863,
            EtherType::PppoeSession => 0x8864,
            EtherType::Unknown(v) => *v,
        }
    }

    /// Protocol name as shown in records. Unlisted values are all "Unknown".
    pub fn name(&self) -> &'static str {
        match self {
            EtherType::Ipv4 => "IPv4",
            EtherType::Ipv6 => "IPv6",
            EtherType::Arp => "ARP",
            EtherType::VlanTagged => "802.1Q",
            EtherType::Mpls => "MPLS",
            EtherType::PppoeDiscovery => "PPPoE Discovery",
            EtherType::PppoeSession => "PPPoE Session",
            EtherType::Unknown(_) => "Unknown",
        }
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// IP protocol numbers (IPv4 protocol field / IPv6 next header).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpProtocol {
    Icmp,
    Tcp,
    Udp,
    Reserved,
    Unknown(u8),
}

impl From<u8> for IpProtocol {
    fn from(value: u8) -> Self {
        match value {
            1 => IpProtocol::Icmp,
            6 => IpProtocol::Tcp,
            17 => IpProtocol::Udp,
            255 => IpProtocol::Reserved,
            other => IpProtocol::Unknown(other),
        }
    }
}

impl IpProtocol {
    pub fn as_u8(&self) -> u8 {
        match self {
            IpProtocol::Icmp => 1,
            IpProtocol::Tcp => 6,
            IpProtocol::Udp => 17,
            IpProtocol::Reserved => 255,
            IpProtocol::Unknown(v) => *v,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IpProtocol::Icmp => "ICMP",
            IpProtocol::Tcp => "TCP",
            IpProtocol::Udp => "UDP",
            IpProtocol::Reserved => "Reserved",
            IpProtocol::Unknown(_) => "Unknown",
        }
    }
}

impl fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Protocol layer a parse error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Ethernet,
    Ip,
    Tcp,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Ethernet => write!(f, "Ethernet frame"),
            Layer::Ip => write!(f, "IP packet"),
            Layer::Tcp => write!(f, "TCP segment"),
        }
    }
}

/// Errors from protocol parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Not enough bytes for the layer's header
    TooShort {
        layer: Layer,
        expected: usize,
        actual: usize,
    },
    /// IP version nibble other than 4 or 6
    UnsupportedVersion(u8),
    /// IPv4 reserved flag bit set (carries the 3-bit flags field)
    InvalidFlags(u8),
    /// IHL or TCP data offset below 5 words
    InvalidHeaderLength { layer: Layer, words: u8 },
    /// Malformed IPv4 option list
    OptionParse { offset: usize, reason: &'static str },
    /// Text that is not a colon-hex MAC address
    InvalidMac(String),
    /// Text that is not an IPv4/IPv6 address
    InvalidAddress(String),
}

impl ParseError {
    /// True when the error aborts the unit being dissected outright. Only a
    /// TCP data offset below the minimum is treated this way.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ParseError::InvalidHeaderLength {
                layer: Layer::Tcp,
                ..
            }
        )
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::TooShort {
                layer,
                expected,
                actual,
            } => {
                write!(f, "{} too short: need {} bytes, got {}", layer, expected, actual)
            }
            ParseError::UnsupportedVersion(v) => {
                write!(f, "unsupported IP version {} (only 4 and 6)", v)
            }
            ParseError::InvalidFlags(flags) => {
                write!(f, "reserved IPv4 flag bit set (flags=0b{:03b})", flags)
            }
            ParseError::InvalidHeaderLength { layer, words } => {
                write!(f, "{} header length too small: {} words (min 5)", layer, words)
            }
            ParseError::OptionParse { offset, reason } => {
                write!(f, "bad IPv4 option at offset {}: {}", offset, reason)
            }
            ParseError::InvalidMac(text) => write!(f, "invalid MAC address: {:?}", text),
            ParseError::InvalidAddress(text) => write!(f, "invalid IP address: {:?}", text),
        }
    }
}

impl std::error::Error for ParseError {}

/// A frame dissected down to the transport layer, borrowing the frame bytes.
#[derive(Debug)]
pub struct DissectedPacket<'a> {
    pub ethernet: ethernet::EthernetHeader<'a>,
    pub network: Option<NetworkHeader<'a>>,
    pub transport: Option<tcp::TcpHeader<'a>>,
    /// Set when the IP packet carried TCP but the segment did not parse.
    pub transport_error: Option<ParseError>,
    /// Bytes above the deepest layer that parsed.
    pub payload: &'a [u8],
}

/// Serializable view of a dissected frame, one optional section per layer.
#[derive(Debug, Clone, Serialize)]
pub struct PacketRecord {
    pub ethernet: ethernet::EthernetRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<ip::IpRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp: Option<tcp::TcpRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<'a> DissectedPacket<'a> {
    pub fn record(&self) -> PacketRecord {
        PacketRecord {
            ethernet: self.ethernet.record(),
            ip: self.network.as_ref().map(|net| net.record()),
            tcp: self.transport.as_ref().map(|hdr| hdr.record()),
            error: self.transport_error.as_ref().map(|err| err.to_string()),
        }
    }
}

/// Dissect a raw link-layer frame: Ethernet, then IPv4/IPv6, then TCP.
///
/// Ethernet and IP errors are returned. A TCP error is kept on the result in
/// `transport_error` so the caller can report it and move on to the next
/// frame. Later IPv4 fragments are never handed to the TCP parser.
pub fn dissect(frame: &[u8]) -> Result<DissectedPacket<'_>, ParseError> {
    let eth = ethernet::EthernetHeader::parse(frame)?;
    let l3_data = eth.network_payload();

    let network = match eth.network_ether_type() {
        EtherType::Ipv4 | EtherType::Ipv6 => Some(ip::parse(l3_data)?),
        _ => None,
    };

    let (transport, transport_error, payload) = match &network {
        Some(net) if net.protocol() == IpProtocol::Tcp && !net.is_later_fragment() => {
            match tcp::TcpHeader::parse(net.datagram_payload()) {
                Ok(hdr) => {
                    let payload = hdr.payload();
                    (Some(hdr), None, payload)
                }
                Err(err) => {
                    tracing::debug!(error = %err, fatal = err.is_fatal(), "tcp segment rejected");
                    (None, Some(err), net.datagram_payload())
                }
            }
        }
        Some(net) => (None, None, net.payload()),
        None => (None, None, l3_data),
    };

    Ok(DissectedPacket {
        ethernet: eth,
        network,
        transport,
        transport_error,
        payload,
    })
}

#[cfg(test)]
pub(crate) mod test_frames {
    //! Hand-built frames shared by the protocol and connection tests.

    pub const CLIENT_MAC: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
    pub const SERVER_MAC: [u8; 6] = [0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb];

    /// Ethernet + IPv4 (no options) + TCP (no options) + payload.
    pub fn tcp_ipv4_frame(
        src_ip: [u8; 4],
        dst_ip: [u8; 4],
        src_port: u16,
        dst_port: u16,
        seq: u32,
        ack: u32,
        flags: u8,
        payload: &[u8],
    ) -> Vec<u8> {
        let mut pkt = Vec::with_capacity(54 + payload.len());
        pkt.extend_from_slice(&SERVER_MAC);
        pkt.extend_from_slice(&CLIENT_MAC);
        pkt.extend_from_slice(&[0x08, 0x00]);

        let total_len = (20 + 20 + payload.len()) as u16;
        pkt.extend_from_slice(&[0x45, 0x00]);
        pkt.extend_from_slice(&total_len.to_be_bytes());
        pkt.extend_from_slice(&[0x00, 0x01, 0x40, 0x00, 64, 6, 0x00, 0x00]);
        pkt.extend_from_slice(&src_ip);
        pkt.extend_from_slice(&dst_ip);

        pkt.extend_from_slice(&src_port.to_be_bytes());
        pkt.extend_from_slice(&dst_port.to_be_bytes());
        pkt.extend_from_slice(&seq.to_be_bytes());
        pkt.extend_from_slice(&ack.to_be_bytes());
        pkt.extend_from_slice(&[0x50, flags, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00]);
        pkt.extend_from_slice(payload);
        pkt
    }
}
