use clap::Parser;
use std::path::PathBuf;

/// tcpmon: Ethernet/IP/TCP dissector and TCP connection state monitor
#[derive(Parser, Debug)]
#[command(name = "tcpmon", version, about)]
pub struct Cli {
    /// Network interface to capture on (e.g., "en0", "eth0").
    /// If not specified, the default interface is used.
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Read frames from a pcap file instead of a live interface
    #[arg(short, long, conflicts_with = "interface")]
    pub read: Option<PathBuf>,

    /// Raw BPF filter expression; overrides --protocol/--port/--host
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Protocols for the built filter (repeatable, default: tcp)
    #[arg(long = "protocol", value_name = "PROTO")]
    pub protocols: Vec<String>,

    /// Only capture traffic on this port
    #[arg(long)]
    pub port: Option<u16>,

    /// Only capture traffic to or from this host
    #[arg(long)]
    pub host: Option<String>,

    /// Maximum number of frames to process (0 = unlimited)
    #[arg(short = 'c', long)]
    pub count: Option<u64>,

    /// Stop after this many seconds (0 = unlimited)
    #[arg(short = 'd', long)]
    pub duration: Option<u64>,

    /// Snapshot length (max bytes per packet to capture)
    #[arg(short, long)]
    pub snaplen: Option<i32>,

    /// Read timeout in milliseconds for the capture handle
    #[arg(short = 't', long)]
    pub timeout_ms: Option<i32>,

    /// Capture in promiscuous mode
    #[arg(long, conflicts_with = "no_promiscuous")]
    pub promiscuous: bool,

    /// Do not put the interface in promiscuous mode
    #[arg(long)]
    pub no_promiscuous: bool,

    /// TOML config file; command-line values take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print one JSON record per frame
    #[arg(long)]
    pub json: bool,

    /// Suppress per-frame output
    #[arg(short, long)]
    pub quiet: bool,

    /// Print the connection table when the capture ends
    #[arg(long)]
    pub connections: bool,

    /// Write captured frames to a pcap file
    #[arg(long)]
    pub write_pcap: Option<PathBuf>,

    /// Export connections as JSON at exit
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Export connections as CSV at exit
    #[arg(long)]
    pub export_csv: Option<PathBuf>,

    /// Evict connections idle for this many seconds (0 = never)
    #[arg(long)]
    pub idle_timeout: Option<f64>,

    /// Maximum tracked connections (0 = unlimited)
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// List available network interfaces and exit
    #[arg(short, long)]
    pub list_interfaces: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_filter_options() {
        let cli = Cli::try_parse_from([
            "tcpmon", "-i", "eth0", "--protocol", "tcp", "--protocol", "udp", "--port", "80",
            "--host", "10.0.0.1", "-c", "50", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.interface.as_deref(), Some("eth0"));
        assert_eq!(cli.protocols, vec!["tcp", "udp"]);
        assert_eq!(cli.port, Some(80));
        assert_eq!(cli.count, Some(50));
        assert_eq!(cli.verbose, 2);
        assert!(cli.read.is_none());
    }

    #[test]
    fn read_conflicts_with_interface() {
        assert!(Cli::try_parse_from(["tcpmon", "-i", "eth0", "-r", "trace.pcap"]).is_err());
    }
}
