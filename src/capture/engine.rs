//! Opens a pcap handle on a live interface or a savefile.

use pcap::{Activated, Capture, Device};
use std::fmt;
use std::path::PathBuf;

/// Errors from the capture engine.
#[derive(Debug)]
pub enum CaptureError {
    /// Failed to find a suitable network device.
    NoDevice(String),
    /// pcap error.
    Pcap(pcap::Error),
    /// The capture thread could not be started or panicked.
    Thread(String),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::NoDevice(msg) => write!(f, "no capture device: {}", msg),
            CaptureError::Pcap(e) => write!(f, "pcap error: {}", e),
            CaptureError::Thread(msg) => write!(f, "capture thread: {}", msg),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<pcap::Error> for CaptureError {
    fn from(e: pcap::Error) -> Self {
        CaptureError::Pcap(e)
    }
}

/// Where frames come from and how the handle is opened.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub interface: Option<String>,
    /// Read a pcap file instead of a live interface.
    pub read_file: Option<PathBuf>,
    pub promiscuous: bool,
    pub snaplen: i32,
    pub timeout_ms: i32,
    pub filter: Option<String>,
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
        }
    }
}

impl CaptureConfig {
    /// Human-readable name of the source, for banners and logs.
    pub fn source_name(&self) -> String {
        match (&self.read_file, &self.interface) {
            (Some(path), _) => format!("file {}", path.display()),
            (None, Some(name)) => name.clone(),
            (None, None) => "(default)".to_string(),
        }
    }
}

/// List all available network interfaces.
pub fn list_interfaces() -> Result<Vec<Device>, CaptureError> {
    Device::list().map_err(CaptureError::Pcap)
}

/// Open the configured source and apply its BPF filter.
pub fn open_capture(config: &CaptureConfig) -> Result<Capture<dyn Activated>, CaptureError> {
    let mut cap: Capture<dyn Activated> = match &config.read_file {
        Some(path) => Capture::from_file(path).map_err(CaptureError::Pcap)?.into(),
        None => open_live(config)?.into(),
    };

    if let Some(filter) = &config.filter {
        cap.filter(filter, true).map_err(CaptureError::Pcap)?;
    }

    tracing::info!(
        source = %config.source_name(),
        promiscuous = config.promiscuous,
        snaplen = config.snaplen,
        filter = config.filter.as_deref().unwrap_or("none"),
        "capture started"
    );

    Ok(cap)
}

fn open_live(config: &CaptureConfig) -> Result<Capture<pcap::Active>, CaptureError> {
    let device = match &config.interface {
        Some(name) => {
            let devices = Device::list().map_err(CaptureError::Pcap)?;
            devices
                .into_iter()
                .find(|d| d.name == *name)
                .ok_or_else(|| CaptureError::NoDevice(format!("interface '{}' not found", name)))?
        }
        None => Device::lookup()
            .map_err(CaptureError::Pcap)?
            .ok_or_else(|| CaptureError::NoDevice("no default device found".into()))?,
    };

    let cap = Capture::from_device(device)
        .map_err(CaptureError::Pcap)?
        .promisc(config.promiscuous)
        .snaplen(config.snaplen)
        .timeout(config.timeout_ms)
        .open()
        .map_err(CaptureError::Pcap)?;
    Ok(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_name_prefers_file() {
        let mut config = CaptureConfig {
            interface: Some("eth0".into()),
            ..CaptureConfig::default()
        };
        assert_eq!(config.source_name(), "eth0");
        config.read_file = Some(PathBuf::from("trace.pcap"));
        assert_eq!(config.source_name(), "file trace.pcap");
        assert_eq!(CaptureConfig::default().source_name(), "(default)");
    }

    #[test]
    fn missing_savefile_is_a_pcap_error() {
        let config = CaptureConfig {
            read_file: Some(PathBuf::from("/nonexistent/tcpmon-test.pcap")),
            ..CaptureConfig::default()
        };
        assert!(matches!(open_capture(&config), Err(CaptureError::Pcap(_))));
    }
}
