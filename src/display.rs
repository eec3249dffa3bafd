//! Text output for the CLI.
//!
//! One line per frame, one line per rejected frame, and the connection
//! table when the capture ends.

use crate::connection::{ConnectionSnapshot, Observation};
use crate::protocol::{self, tcp, DissectedPacket};

/// Build the one-line summary of a dissected frame.
pub fn format_packet_summary(
    index: u64,
    timestamp: f64,
    packet: &DissectedPacket<'_>,
    observation: Option<&Observation>,
) -> String {
    let mut summary = format!(
        "#{:<6} {} Eth: {}",
        index,
        format_timestamp(timestamp),
        packet.ethernet
    );

    if let Some(net) = &packet.network {
        summary.push_str(&format!(" | {}", net));
    }

    if let Some(hdr) = &packet.transport {
        summary.push_str(&format!(
            " | TCP {} ({} -> {})",
            hdr,
            tcp::service_name(hdr.src_port()),
            tcp::service_name(hdr.dst_port())
        ));
    }

    if let Some(err) = &packet.transport_error {
        summary.push_str(&format!(" | TCP rejected: {}", err));
    }

    if let Some(obs) = observation {
        if obs.transitioned() {
            summary.push_str(&format!(" | {} -> {}", obs.previous, obs.state));
        } else {
            summary.push_str(&format!(" | {}", obs.state));
        }
    }

    if !packet.payload.is_empty() {
        summary.push_str(&format!(" | payload: {} bytes", packet.payload.len()));
    }

    summary
}

/// Print a one-line summary of a dissected frame.
pub fn print_packet_summary(
    index: u64,
    timestamp: f64,
    packet: &DissectedPacket<'_>,
    observation: Option<&Observation>,
) {
    println!("{}", format_packet_summary(index, timestamp, packet, observation));
}

/// Print the frame's record as a single JSON line.
pub fn print_packet_json(index: u64, timestamp: f64, packet: &DissectedPacket<'_>) {
    let line = serde_json::json!({
        "index": index,
        "ts": timestamp,
        "packet": packet.record(),
    });
    println!("{}", line);
}

/// Format a pcap timestamp (seconds since epoch) into a readable time.
fn format_timestamp(ts: f64) -> String {
    let secs = ts as u64;
    let micros = ((ts - secs as f64) * 1_000_000.0) as u32;

    // HH:MM:SS.micros, UTC
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    format!("{:02}:{:02}:{:02}.{:06}", hours, minutes, seconds, micros)
}

/// Print a compact one-line summary for a frame that failed to dissect.
pub fn print_parse_error(index: u64, timestamp: f64, data_len: usize, error: &protocol::ParseError) {
    println!(
        "#{:<6} {} [PARSE ERROR] {} bytes: {}",
        index,
        format_timestamp(timestamp),
        data_len,
        error
    );
}

pub fn format_connection_table(connections: &[ConnectionSnapshot]) -> String {
    let mut out = format!(
        "{:<47} {:<12} {:<7} {:>10} {:>10} {:>9} {:>9}\n",
        "Connection", "State", "Service", "Sent", "Received", "Duration", "Idle"
    );
    out.push_str(&"-".repeat(110));
    out.push('\n');
    for conn in connections {
        out.push_str(&format!(
            "{:<47} {:<12} {:<7} {:>10} {:>10} {:>8.2}s {:>8.2}s\n",
            conn.key,
            conn.state.as_str(),
            conn.service,
            format_bytes(conn.bytes_sent),
            format_bytes(conn.bytes_received),
            conn.duration,
            conn.idle_time
        ));
    }
    out
}

pub fn print_connection_table(connections: &[ConnectionSnapshot]) {
    if connections.is_empty() {
        println!("No TCP connections observed.");
        return;
    }
    print!("{}", format_connection_table(connections));
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionTable;
    use crate::protocol::dissect;
    use crate::protocol::tcp::flags::{ACK, SYN};
    use crate::protocol::test_frames::tcp_ipv4_frame;

    #[test]
    fn summary_shows_layers_and_state_change() {
        let frame = tcp_ipv4_frame([10, 0, 0, 1], [10, 0, 0, 2], 50000, 22, 1, 0, SYN, b"");
        let pkt = dissect(&frame).unwrap();
        let mut table = ConnectionTable::new(0.0, 0);
        let obs = table.observe(3661.5, frame.len() as u64, &pkt);

        let line = format_packet_summary(7, 3661.5, &pkt, obs.as_ref());
        assert!(line.starts_with("#7      01:01:01.500000 Eth: "), "{}", line);
        assert!(line.contains("IPv4 10.0.0.1 -> 10.0.0.2 proto=TCP"), "{}", line);
        assert!(line.contains("[SYN]"), "{}", line);
        assert!(line.contains("(PORT-50000 -> SSH)"), "{}", line);
        assert!(line.contains("CLOSED -> SYN_SENT"), "{}", line);
        assert!(!line.contains("payload"), "{}", line);
    }

    #[test]
    fn summary_reports_rejected_tcp() {
        let mut frame = tcp_ipv4_frame([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, 0, 0, ACK, b"");
        frame[14 + 20 + 12] = 0x20;
        let pkt = dissect(&frame).unwrap();
        let line = format_packet_summary(1, 0.0, &pkt, None);
        assert!(line.contains("TCP rejected: TCP segment header length too small"), "{}", line);
    }

    #[test]
    fn connection_table_rows() {
        let mut table = ConnectionTable::new(0.0, 0);
        let frame = tcp_ipv4_frame([10, 0, 0, 1], [10, 0, 0, 2], 50000, 443, 1, 0, SYN, b"");
        let pkt = dissect(&frame).unwrap();
        table.observe(0.0, frame.len() as u64, &pkt);

        let text = format_connection_table(&table.snapshot(2.0));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].starts_with("10.0.0.1:50000-10.0.0.2:443"));
        assert!(lines[2].contains("SYN_SENT"));
        assert!(lines[2].contains("HTTPS"));
        assert!(lines[2].contains("54 B"));
    }

    #[test]
    fn byte_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }
}
