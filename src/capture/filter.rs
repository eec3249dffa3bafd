//! BPF filter expressions built from protocol/port/host options.

/// Protocol list plus optional port and host, joined with `and`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub protocols: Vec<String>,
    pub port: Option<u16>,
    pub host: Option<String>,
}

impl Default for FilterSpec {
    fn default() -> Self {
        FilterSpec {
            protocols: vec!["tcp".to_string()],
            port: None,
            host: None,
        }
    }
}

impl FilterSpec {
    /// `(tcp or udp) and port 80 and host 10.0.0.1`. An empty protocol list
    /// falls back to `tcp`.
    pub fn build(&self) -> String {
        let protocols = if self.protocols.is_empty() {
            "tcp".to_string()
        } else {
            self.protocols.join(" or ")
        };

        let mut parts = vec![format!("({})", protocols)];
        if let Some(port) = self.port {
            parts.push(format!("port {}", port));
        }
        if let Some(host) = self.host.as_deref().filter(|h| !h.is_empty()) {
            parts.push(format!("host {}", host));
        }
        parts.join(" and ")
    }
}

/// An explicit raw expression wins over the built one.
pub fn resolve(raw: Option<&str>, spec: &FilterSpec) -> String {
    match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => raw.to_string(),
        None => spec.build(),
    }
}
