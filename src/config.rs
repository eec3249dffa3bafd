use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

fn empty_path_none<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<PathBuf>::deserialize(deserializer)?;
    Ok(opt.filter(|path| !path.as_os_str().is_empty()))
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "config io error: {}", err),
            ConfigError::Parse(err) => write!(f, "config parse error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub run: RunConfig,
    pub output: OutputConfig,
    pub tracking: TrackingConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(ConfigError::Parse)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub interface: Option<String>,
    #[serde(deserialize_with = "empty_path_none")]
    pub read_file: Option<PathBuf>,
    pub promiscuous: bool,
    pub snaplen: i32,
    pub timeout_ms: i32,
    /// Raw BPF expression; replaces the one built from protocols/port/host.
    pub filter: Option<String>,
    pub protocols: Vec<String>,
    pub port: Option<u16>,
    pub host: Option<String>,
    /// Frames buffered between the capture thread and the processing loop.
    pub channel_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            interface: None,
            read_file: None,
            promiscuous: true,
            snaplen: 65535,
            timeout_ms: 100,
            filter: None,
            protocols: vec!["tcp".to_string()],
            port: None,
            host: None,
            channel_capacity: 4096,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Stop after this many frames (0 = unlimited).
    pub count: u64,
    /// Stop after this many seconds (0 = unlimited).
    pub duration_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// One JSON record per frame instead of the text summary.
    pub json: bool,
    pub quiet: bool,
    /// Print the connection table at exit.
    pub connections: bool,
    #[serde(deserialize_with = "empty_path_none")]
    pub write_pcap: Option<PathBuf>,
    #[serde(deserialize_with = "empty_path_none")]
    pub export_json: Option<PathBuf>,
    #[serde(deserialize_with = "empty_path_none")]
    pub export_csv: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Evict connections idle longer than this (0 = never).
    pub idle_timeout_secs: f64,
    /// Cap on tracked connections (0 = unlimited).
    pub max_connections: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        TrackingConfig {
            idle_timeout_secs: 0.0,
            max_connections: 100_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.capture.protocols, vec!["tcp".to_string()]);
        assert_eq!(config.capture.snaplen, 65535);
        assert_eq!(config.run.count, 0);
        assert_eq!(config.tracking.idle_timeout_secs, 0.0);
        assert_eq!(config.tracking.max_connections, 100_000);
        assert!(config.output.export_json.is_none());
    }

    #[test]
    fn partial_sections() {
        let raw = r#"
            [capture]
            interface = "eth0"
            protocols = ["tcp", "udp"]
            port = 443

            [run]
            duration_secs = 30

            [output]
            export_csv = "conns.csv"
            write_pcap = ""

            [tracking]
            idle_timeout_secs = 120.0
        "#;
        let config = Config::from_toml(raw).unwrap();
        assert_eq!(config.capture.interface.as_deref(), Some("eth0"));
        assert_eq!(config.capture.port, Some(443));
        assert_eq!(config.capture.protocols.len(), 2);
        assert!(config.capture.promiscuous);
        assert_eq!(config.run.duration_secs, 30);
        assert_eq!(config.output.export_csv, Some(PathBuf::from("conns.csv")));
        assert!(config.output.write_pcap.is_none());
        assert_eq!(config.tracking.idle_timeout_secs, 120.0);
        assert_eq!(config.tracking.max_connections, 100_000);
    }

    #[test]
    fn bad_toml_is_parse_error() {
        assert!(matches!(
            Config::from_toml("[capture]\nsnaplen = \"big\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Config::load(Path::new("/nonexistent/tcpmon.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
