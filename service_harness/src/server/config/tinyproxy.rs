use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::server::types::ServiceSpec;

/// Settings rendered into `tinyproxy.conf`. Listen address and port come
/// from the [`ServiceSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TinyproxyConfig {
    /// Client addresses allowed to use the proxy.
    pub allow: Vec<IpAddr>,
    pub timeout_secs: u32,
    pub max_clients: u32,
    /// Only understood by older tinyproxy releases.
    pub start_servers: Option<u32>,
}

impl Default for TinyproxyConfig {
    fn default() -> Self {
        Self {
            allow: vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
            timeout_secs: 600,
            max_clients: 100,
            start_servers: None,
        }
    }
}

impl TinyproxyConfig {
    pub fn render(&self, spec: &ServiceSpec) -> String {
        let mut lines = vec![
            format!("Port {}", spec.port),
            format!("Listen {}", spec.address),
        ];
        lines.extend(self.allow.iter().map(|a| format!("Allow {a}")));
        lines.push(format!("Timeout {}", self.timeout_secs));
        lines.push(format!("MaxClients {}", self.max_clients));
        if let Some(n) = self.start_servers {
            lines.push(format!("StartServers {n}"));
        }
        lines.push("LogLevel Info".into());
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_directives_in_order() {
        let spec = ServiceSpec::builder()
            .executable("tinyproxy")
            .port(10088)
            .build()
            .unwrap();
        let conf = TinyproxyConfig::default().render(&spec);
        assert_eq!(
            conf,
            "Port 10088\nListen 127.0.0.1\nAllow 127.0.0.1\nTimeout 600\nMaxClients 100\nLogLevel Info\n"
        );
    }

    #[test]
    fn optional_and_repeated_directives() {
        let spec = ServiceSpec::builder()
            .executable("tinyproxy")
            .port(3128)
            .build()
            .unwrap();
        let conf = TinyproxyConfig {
            allow: vec!["127.0.0.1".parse().unwrap(), "::1".parse().unwrap()],
            start_servers: Some(5),
            ..Default::default()
        }
        .render(&spec);
        assert!(conf.contains("Allow 127.0.0.1\nAllow ::1\n"));
        assert!(conf.contains("StartServers 5\n"));
    }
}
