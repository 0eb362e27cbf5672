//! Harness defaults
//! ================
//!
//! Where the server binaries live and which address and host name fixtures
//! use, persisted with `confy`. Each fixture still gets its own
//! [`ServiceSpec`]; this only supplies the values that are the same for a
//! whole test suite.
//!
//! Environment overrides, applied by [`HarnessConfig::with_env_overrides`]:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `SERVICE_HARNESS_NGINX` | `nginx` |
//! | `SERVICE_HARNESS_TINYPROXY` | `tinyproxy` |
//! | `SERVICE_HARNESS_PROXY_PY` | `proxy_py` |
//! | `SERVICE_HARNESS_OPENSSL` | `openssl` |
//! | `SERVICE_HARNESS_HOST` | `host` |

use std::{
    net::{IpAddr, Ipv4Addr},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{HarnessError, HarnessResult},
    server::types::{ProtocolMode, ServiceSpec},
};

pub const APP_NAME: &str = "service_harness";
pub const ENV_NGINX: &str = "SERVICE_HARNESS_NGINX";
pub const ENV_TINYPROXY: &str = "SERVICE_HARNESS_TINYPROXY";
pub const ENV_PROXY_PY: &str = "SERVICE_HARNESS_PROXY_PY";
pub const ENV_OPENSSL: &str = "SERVICE_HARNESS_OPENSSL";
pub const ENV_HOST: &str = "SERVICE_HARNESS_HOST";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub nginx: PathBuf,
    pub tinyproxy: PathBuf,
    pub proxy_py: PathBuf,
    pub openssl: PathBuf,
    pub address: IpAddr,
    pub host: String,
    pub start_timeout_secs: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            nginx: PathBuf::from("/usr/sbin/nginx"),
            tinyproxy: PathBuf::from("/usr/bin/tinyproxy"),
            proxy_py: PathBuf::from("proxy"),
            openssl: PathBuf::from("openssl"),
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            host: "localhost".into(),
            start_timeout_secs: 5,
        }
    }
}

impl HarnessConfig {
    /// Reads `path`, or the per-user config file when `None`. A missing file
    /// is created with defaults.
    pub fn load(path: Option<&Path>) -> HarnessResult<Self> {
        let loaded = match path {
            Some(p) => confy::load_path(p).map_err(|e| {
                HarnessError::file_system(
                    "loading confy configuration file",
                    p,
                    std::io::Error::other(e.to_string()),
                )
            })?,
            None => confy::load(APP_NAME, None).map_err(|e| {
                HarnessError::file_system(
                    "loading confy configuration file",
                    "confy derives path",
                    std::io::Error::other(e.to_string()),
                )
            })?,
        };
        Ok(loaded)
    }

    pub fn store(&self, path: &Path) -> HarnessResult<()> {
        confy::store_path(path, self).map_err(|e| {
            HarnessError::file_system(
                "saving confy configuration file",
                path,
                std::io::Error::other(e.to_string()),
            )
        })
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var_os(key))
    }

    fn with_overrides_from(mut self, get: impl Fn(&str) -> Option<std::ffi::OsString>) -> Self {
        let non_empty = |key: &str| get(key).filter(|v| !v.is_empty());
        if let Some(v) = non_empty(ENV_NGINX) {
            self.nginx = v.into();
        }
        if let Some(v) = non_empty(ENV_TINYPROXY) {
            self.tinyproxy = v.into();
        }
        if let Some(v) = non_empty(ENV_PROXY_PY) {
            self.proxy_py = v.into();
        }
        if let Some(v) = non_empty(ENV_OPENSSL) {
            self.openssl = v.into();
        }
        if let Some(v) = non_empty(ENV_HOST) {
            self.host = v.to_string_lossy().into_owned();
        }
        self
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    /// `validate_config` turns on the `nginx -t` pre-flight.
    pub fn httpd_spec(
        &self,
        port: u16,
        mode: ProtocolMode,
        validate_config: bool,
    ) -> HarnessResult<ServiceSpec> {
        ServiceSpec::builder()
            .executable(self.nginx.clone())
            .address(self.address)
            .port(port)
            .host(self.host.clone())
            .mode(mode)
            .start_timeout(self.start_timeout())
            .validate_config(validate_config)
            .keygen_executable(self.openssl.clone())
            .build()
    }

    pub fn proxy_spec(&self, port: u16) -> HarnessResult<ServiceSpec> {
        self.plain_spec(self.tinyproxy.clone(), port)
    }

    pub fn proxy_py_spec(&self, port: u16) -> HarnessResult<ServiceSpec> {
        self.plain_spec(self.proxy_py.clone(), port)
    }

    fn plain_spec(&self, executable: PathBuf, port: u16) -> HarnessResult<ServiceSpec> {
        ServiceSpec::builder()
            .executable(executable)
            .address(self.address)
            .port(port)
            .host(self.host.clone())
            .start_timeout(self.start_timeout())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn load_creates_then_reads_file() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("harness.toml");
        let cfg = HarnessConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg, HarnessConfig::default());
        assert!(path.is_file());

        let custom = HarnessConfig {
            nginx: "/opt/nginx/sbin/nginx".into(),
            start_timeout_secs: 9,
            ..Default::default()
        };
        custom.store(&path).unwrap();
        assert_eq!(HarnessConfig::load(Some(&path)).unwrap(), custom);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("harness.toml");
        std::fs::write(&path, "host = \"fixture.local\"\n").unwrap();
        let cfg = HarnessConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.host, "fixture.local");
        assert_eq!(cfg.nginx, HarnessConfig::default().nginx);
    }

    #[test]
    fn overrides_replace_non_empty_values() {
        let env: HashMap<&str, &str> = [
            (ENV_NGINX, "/custom/nginx"),
            (ENV_OPENSSL, ""),
            (ENV_PROXY_PY, "/venv/bin/proxy"),
            (ENV_HOST, "ci.local"),
        ]
        .into_iter()
        .collect();
        let cfg = HarnessConfig::default().with_overrides_from(|k| env.get(k).map(|v| std::ffi::OsString::from(*v)));
        assert_eq!(cfg.nginx, PathBuf::from("/custom/nginx"));
        assert_eq!(cfg.openssl, PathBuf::from("openssl"));
        assert_eq!(cfg.tinyproxy, PathBuf::from("/usr/bin/tinyproxy"));
        assert_eq!(cfg.proxy_py, PathBuf::from("/venv/bin/proxy"));
        assert_eq!(cfg.host, "ci.local");
    }

    #[test]
    fn specs_from_config() {
        let cfg = HarnessConfig::default();
        let httpd = cfg.httpd_spec(8443, ProtocolMode::Tls, true).unwrap();
        assert_eq!(httpd.base_url(), "https://localhost:8443");
        assert!(httpd.validate_config);
        assert_eq!(httpd.keygen_executable, PathBuf::from("openssl"));
        let proxy = cfg.proxy_spec(3128).unwrap();
        assert_eq!(proxy.executable, PathBuf::from("/usr/bin/tinyproxy"));
        assert_eq!(proxy.listen_addr(), "127.0.0.1:3128");
        assert!(cfg.httpd_spec(0, ProtocolMode::Plain, false).is_err());
        let proxy_py = cfg.proxy_py_spec(8899).unwrap();
        assert_eq!(proxy_py.executable, PathBuf::from("proxy"));
    }
}
