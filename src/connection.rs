use crate::protocol::tcp::TcpFlags;
use crate::protocol::DissectedPacket;
use ahash::AHashMap;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::net::IpAddr;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Endpoint {
    pub ip: IpAddr,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Directional flow key. Displays as `src:port-dst:port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionKey {
    pub src: Endpoint,
    pub dst: Endpoint,
}

impl ConnectionKey {
    pub fn new(src: Endpoint, dst: Endpoint) -> Self {
        ConnectionKey { src, dst }
    }

    /// The same flow seen from the other side.
    pub fn reversed(&self) -> Self {
        ConnectionKey {
            src: self.dst,
            dst: self.src,
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.src, self.dst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TcpState {
    Closed,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    Closing,
    TimeWait,
}

impl TcpState {
    /// State after one segment. `is_source` is true when the segment travels
    /// from the endpoint that opened the connection entry.
    ///
    /// RST always lands in `Closed`. Any other input that matches no row
    /// leaves the state where it is.
    pub fn next(self, flags: &TcpFlags, is_source: bool) -> TcpState {
        if flags.rst {
            return TcpState::Closed;
        }

        // ACK with neither SYN nor FIN
        let pure_ack = flags.ack && !flags.syn && !flags.fin;
        // FIN with neither SYN nor ACK
        let pure_fin = flags.fin && !flags.syn && !flags.ack;

        match self {
            TcpState::Closed if flags.syn && !flags.ack && is_source => TcpState::SynSent,
            TcpState::Closed if flags.syn && flags.ack && !is_source => TcpState::SynReceived,
            TcpState::SynSent if flags.syn && !is_source => TcpState::SynReceived,
            TcpState::SynReceived if pure_ack => TcpState::Established,
            TcpState::Established if flags.fin && is_source => TcpState::FinWait1,
            TcpState::FinWait1 if pure_ack && !is_source => TcpState::FinWait2,
            TcpState::FinWait1 if pure_fin && !is_source => TcpState::Closing,
            TcpState::FinWait2 if pure_ack && is_source => TcpState::TimeWait,
            TcpState::FinWait2 if pure_fin && !is_source => TcpState::TimeWait,
            TcpState::Closing if pure_ack && !is_source => TcpState::TimeWait,
            state => state,
        }
    }

    /// `Closed` and `TimeWait` count as inactive.
    pub fn is_active(&self) -> bool {
        !matches!(self, TcpState::Closed | TcpState::TimeWait)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TcpState::Closed => "CLOSED",
            TcpState::SynSent => "SYN_SENT",
            TcpState::SynReceived => "SYN_RECEIVED",
            TcpState::Established => "ESTABLISHED",
            TcpState::FinWait1 => "FIN_WAIT_1",
            TcpState::FinWait2 => "FIN_WAIT_2",
            TcpState::Closing => "CLOSING",
            TcpState::TimeWait => "TIME_WAIT",
        }
    }
}

impl fmt::Display for TcpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Sent,
    Received,
}

/// One tracked TCP conversation.
///
/// Timestamps are seconds since the epoch as delivered by the packet source.
#[derive(Debug, Clone)]
pub struct Connection {
    pub src: Endpoint,
    pub dst: Endpoint,
    pub state: TcpState,
    /// Projected next sequence number of the source side.
    pub seq_num: u64,
    /// Projected next acknowledgment number of the source side.
    pub ack_num: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub payload_bytes_sent: u64,
    pub payload_bytes_received: u64,
    pub start_time: f64,
    pub last_activity: f64,
}

impl Connection {
    pub fn new(src: Endpoint, dst: Endpoint, ts: f64) -> Self {
        Connection {
            src,
            dst,
            state: TcpState::Closed,
            seq_num: 0,
            ack_num: 0,
            bytes_sent: 0,
            bytes_received: 0,
            packets_sent: 0,
            packets_received: 0,
            payload_bytes_sent: 0,
            payload_bytes_received: 0,
            start_time: ts,
            last_activity: ts,
        }
    }

    pub fn key(&self) -> ConnectionKey {
        ConnectionKey::new(self.src, self.dst)
    }

    pub fn update_state(&mut self, flags: &TcpFlags, is_source: bool) {
        self.state = self.state.next(flags, is_source);
    }

    pub fn update_statistics(&mut self, packet_size: u64, payload_size: u64, is_source: bool) {
        if is_source {
            self.bytes_sent += packet_size;
            self.payload_bytes_sent += payload_size;
            self.packets_sent += 1;
        } else {
            self.bytes_received += packet_size;
            self.payload_bytes_received += payload_size;
            self.packets_received += 1;
        }
    }

    /// Project next sequence/ack numbers from the source side's point of
    /// view. No wraparound at 2^32 and no reordering detection.
    pub fn update_sequence_numbers(&mut self, seq: u32, ack: u32, payload_size: u64, is_source: bool) {
        if is_source {
            self.seq_num = seq as u64 + payload_size;
            self.ack_num = ack as u64;
        } else {
            self.seq_num = ack as u64;
            self.ack_num = seq as u64 + payload_size;
        }
    }

    pub fn touch(&mut self, ts: f64) {
        self.last_activity = ts;
    }

    pub fn duration(&self) -> f64 {
        self.last_activity - self.start_time
    }

    pub fn idle_time(&self, now: f64) -> f64 {
        now - self.last_activity
    }

    /// Bytes per second in one direction; zero until the connection has a
    /// positive duration.
    pub fn throughput(&self, direction: Direction) -> f64 {
        let duration = self.duration();
        if duration <= 0.0 {
            return 0.0;
        }
        let bytes = match direction {
            Direction::Sent => self.bytes_sent,
            Direction::Received => self.bytes_received,
        };
        bytes as f64 / duration
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes_sent + self.bytes_received
    }

    pub fn total_packets(&self) -> u64 {
        self.packets_sent + self.packets_received
    }

    /// Service behind the destination port.
    pub fn service(&self) -> &'static str {
        match self.dst.port {
            80 => "HTTP",
            443 => "HTTPS",
            21 => "FTP",
            22 => "SSH",
            23 => "TELNET",
            25 => "SMTP",
            53 => "DNS",
            _ => "UNKNOWN",
        }
    }

    pub fn snapshot(&self, now: f64) -> ConnectionSnapshot {
        ConnectionSnapshot {
            key: self.key().to_string(),
            src_ip: self.src.ip,
            src_port: self.src.port,
            dst_ip: self.dst.ip,
            dst_port: self.dst.port,
            state: self.state,
            service: self.service(),
            active: self.is_active(),
            seq_num: self.seq_num,
            ack_num: self.ack_num,
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
            packets_sent: self.packets_sent,
            packets_received: self.packets_received,
            payload_bytes_sent: self.payload_bytes_sent,
            payload_bytes_received: self.payload_bytes_received,
            bytes_total: self.total_bytes(),
            packets_total: self.total_packets(),
            start_time: self.start_time,
            last_activity: self.last_activity,
            duration: self.duration(),
            idle_time: self.idle_time(now),
            send_throughput: self.throughput(Direction::Sent),
            receive_throughput: self.throughput(Direction::Received),
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}] sent={}B/{}p recv={}B/{}p",
            self.key(),
            self.state,
            self.service(),
            self.bytes_sent,
            self.packets_sent,
            self.bytes_received,
            self.packets_received
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    pub key: String,
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    pub state: TcpState,
    pub service: &'static str,
    pub active: bool,
    pub seq_num: u64,
    pub ack_num: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub payload_bytes_sent: u64,
    pub payload_bytes_received: u64,
    pub bytes_total: u64,
    pub packets_total: u64,
    pub start_time: f64,
    pub last_activity: f64,
    pub duration: f64,
    pub idle_time: f64,
    pub send_throughput: f64,
    pub receive_throughput: f64,
}

/// What one segment did to the table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Key the entry is stored under (the direction of its first segment).
    pub key: ConnectionKey,
    pub is_source: bool,
    pub created: bool,
    pub previous: TcpState,
    pub state: TcpState,
    pub flags: TcpFlags,
}

impl Observation {
    pub fn transitioned(&self) -> bool {
        self.previous != self.state
    }
}

/// Connections keyed by the direction of the first segment seen.
#[derive(Debug)]
pub struct ConnectionTable {
    connections: AHashMap<ConnectionKey, Connection>,
    idle_timeout_secs: f64,
    max_connections: usize,
    last_prune: f64,
}

impl ConnectionTable {
    /// `idle_timeout_secs` of 0 and `max_connections` of 0 disable eviction.
    pub fn new(idle_timeout_secs: f64, max_connections: usize) -> Self {
        ConnectionTable {
            connections: AHashMap::new(),
            idle_timeout_secs,
            max_connections,
            last_prune: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Entry for a segment travelling `src -> dst`, whichever way it was
    /// first seen.
    pub fn get(&self, src: Endpoint, dst: Endpoint) -> Option<&Connection> {
        let key = ConnectionKey::new(src, dst);
        self.connections
            .get(&key)
            .or_else(|| self.connections.get(&key.reversed()))
    }

    /// Feed one dissected frame. Returns `None` unless it carried a TCP
    /// segment.
    pub fn observe(&mut self, ts: f64, wire_len: u64, packet: &DissectedPacket<'_>) -> Option<Observation> {
        let net = packet.network.as_ref()?;
        let hdr = packet.transport.as_ref()?;

        let src = Endpoint {
            ip: net.src_ip(),
            port: hdr.src_port(),
        };
        let dst = Endpoint {
            ip: net.dst_ip(),
            port: hdr.dst_port(),
        };

        let forward = ConnectionKey::new(src, dst);
        let (key, is_source) = if self.connections.contains_key(&forward) {
            (forward, true)
        } else if self.connections.contains_key(&forward.reversed()) {
            (forward.reversed(), false)
        } else {
            (forward, true)
        };

        let mut created = false;
        let conn = self.connections.entry(key).or_insert_with(|| {
            created = true;
            Connection::new(src, dst, ts)
        });

        let flags = hdr.flags();
        let payload_size = hdr.payload().len() as u64;
        let previous = conn.state;

        conn.update_state(&flags, is_source);
        conn.update_statistics(wire_len, payload_size, is_source);
        conn.update_sequence_numbers(hdr.sequence_number(), hdr.ack_number(), payload_size, is_source);
        conn.touch(ts);

        if created {
            tracing::debug!(connection = %key, service = conn.service(), "new connection");
        }
        if previous != conn.state {
            tracing::debug!(
                connection = %key,
                from = %previous,
                to = %conn.state,
                flags = %flags,
                "tcp state change"
            );
        }

        Some(Observation {
            key,
            is_source,
            created,
            previous,
            state: conn.state,
            flags,
        })
    }

    /// Drop idle connections and trim the table to its size limit. Runs at
    /// most once per second of capture time; returns how many were removed.
    pub fn maybe_expire(&mut self, now: f64) -> usize {
        if now - self.last_prune < 1.0 {
            return 0;
        }
        self.last_prune = now;

        let mut removed = 0;
        if self.idle_timeout_secs > 0.0 {
            let timeout = self.idle_timeout_secs;
            self.connections.retain(|_, conn| {
                let keep = conn.idle_time(now) <= timeout;
                if !keep {
                    removed += 1;
                }
                keep
            });
        }

        if self.max_connections > 0 && self.connections.len() > self.max_connections {
            let mut entries: Vec<(ConnectionKey, f64)> = self
                .connections
                .iter()
                .map(|(key, conn)| (*key, conn.last_activity))
                .collect();
            entries.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
            let excess = self.connections.len() - self.max_connections;
            for (key, _) in entries.into_iter().take(excess) {
                if self.connections.remove(&key).is_some() {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            tracing::debug!(removed, remaining = self.connections.len(), "expired connections");
        }
        removed
    }

    /// All connections, largest byte count first.
    pub fn snapshot(&self, now: f64) -> Vec<ConnectionSnapshot> {
        let mut connections: Vec<ConnectionSnapshot> = self
            .connections
            .values()
            .map(|conn| conn.snapshot(now))
            .collect();
        connections.sort_by(|a, b| b.bytes_total.cmp(&a.bytes_total));
        connections
    }

    pub fn active_count(&self) -> usize {
        self.connections.values().filter(|conn| conn.is_active()).count()
    }
}

pub fn write_connections_json(
    path: &Path,
    connections: &[ConnectionSnapshot],
) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, connections)?;
    Ok(())
}

pub fn write_connections_csv(
    path: &Path,
    connections: &[ConnectionSnapshot],
) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_csv(&mut writer, connections)?;
    writer.flush()?;
    Ok(())
}

fn write_csv<W: Write>(writer: &mut W, connections: &[ConnectionSnapshot]) -> std::io::Result<()> {
    writeln!(
        writer,
        "src_ip,src_port,dst_ip,dst_port,state,service,bytes_sent,bytes_received,packets_sent,packets_received,payload_bytes_sent,payload_bytes_received,start_time,last_activity,duration,idle_time,send_throughput,receive_throughput"
    )?;
    for conn in connections {
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{},{},{},{},{:.6},{:.6},{:.6},{:.6},{:.3},{:.3}",
            csv_escape(&conn.src_ip.to_string()),
            conn.src_port,
            csv_escape(&conn.dst_ip.to_string()),
            conn.dst_port,
            conn.state,
            conn.service,
            conn.bytes_sent,
            conn.bytes_received,
            conn.packets_sent,
            conn.packets_received,
            conn.payload_bytes_sent,
            conn.payload_bytes_received,
            conn.start_time,
            conn.last_activity,
            conn.duration,
            conn.idle_time,
            conn.send_throughput,
            conn.receive_throughput
        )?;
    }
    Ok(())
}

/// Quote a CSV field when it contains a comma, quote, or newline.
fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
