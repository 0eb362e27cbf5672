//! Server Types – Service Spec
//! ===========================
//!
//! Immutable per-instance configuration for one harnessed server. A spec is
//! built once through its `bon` builder and validated by `build()`; nothing in
//! the harness reads ambient globals, so two fixtures with two specs never
//! share a port, host name or scratch directory.

use std::{
    net::{IpAddr, Ipv4Addr},
    path::PathBuf,
    time::Duration,
};

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::{
    error::{HarnessError, HarnessResult},
    server::process::ReadinessStrategy,
};

/// Plain HTTP or HTTP over TLS.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolMode {
    #[default]
    Plain,
    Tls,
}

impl ProtocolMode {
    pub fn scheme(self) -> &'static str {
        match self {
            Self::Plain => "http",
            Self::Tls => "https",
        }
    }
}

impl std::fmt::Display for ProtocolMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Upper bound on how long `start()` waits for the readiness signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct StartTimeout(pub Duration);

impl Default for StartTimeout {
    fn default() -> Self {
        StartTimeout(Duration::from_secs(5))
    }
}

impl From<Duration> for StartTimeout {
    fn from(value: Duration) -> Self {
        StartTimeout(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(derive(Debug, Clone), on(String, into), on(PathBuf, into), finish_fn(vis = "", name = build_internal))]
pub struct ServiceSpec {
    /// Server binary, either a path or a name looked up on `PATH`.
    pub executable: PathBuf,

    /// Interface the server binds to.
    #[builder(default = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub address: IpAddr,

    /// Listening port. Use [`crate::reserve_ephemeral_port`] to pick one.
    pub port: u16,

    /// Name used in the base URL, as `server_name` and as the certificate CN.
    #[builder(default = String::from("localhost"))]
    pub host: String,

    #[builder(default)]
    pub mode: ProtocolMode,

    #[builder(default, into)]
    pub start_timeout: StartTimeout,

    /// Run the server's own config check before launching it.
    #[builder(default)]
    pub validate_config: bool,

    /// Tool used to mint the self-signed certificate in TLS mode.
    #[builder(default = PathBuf::from("openssl"))]
    pub keygen_executable: PathBuf,

    /// Overrides the backend's default readiness strategy.
    pub readiness: Option<ReadinessStrategy>,

    /// Name used for log lines and thread names. Defaults to the backend name.
    pub label: Option<String>,
}

impl<S: service_spec_builder::IsComplete> ServiceSpecBuilder<S> {
    pub fn build(self) -> HarnessResult<ServiceSpec> {
        let spec = self.build_internal();
        spec.validate()?;
        Ok(spec)
    }
}

impl ServiceSpec {
    pub(crate) fn validate(&self) -> HarnessResult<()> {
        if self.executable.as_os_str().is_empty() {
            return Err(HarnessError::InvalidConfig {
                field: "executable",
                reason: "cannot be empty".into(),
            });
        }
        if self.port == 0 {
            return Err(HarnessError::InvalidConfig {
                field: "port",
                reason: "must be a concrete port, not 0".into(),
            });
        }
        if self.host.is_empty() {
            return Err(HarnessError::InvalidConfig {
                field: "host",
                reason: "cannot be empty".into(),
            });
        }
        if let Some(bad) = self
            .host
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')))
        {
            return Err(HarnessError::InvalidConfig {
                field: "host",
                reason: format!("unsupported character {bad:?} in {:?}", self.host),
            });
        }
        if self.start_timeout.0.is_zero() {
            return Err(HarnessError::InvalidConfig {
                field: "start_timeout",
                reason: "must be greater than zero".into(),
            });
        }
        if let Some(label) = &self.label {
            if label.is_empty() || label.contains(char::is_whitespace) {
                return Err(HarnessError::InvalidConfig {
                    field: "label",
                    reason: format!("{label:?} must be a non-empty single word"),
                });
            }
        }
        Ok(())
    }

    /// `<scheme>://<host>:<port>` as the client sees it.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.mode.scheme(), self.host, self.port)
    }

    /// `<address>:<port>` rendered for a `listen` directive.
    pub fn listen_addr(&self) -> String {
        std::net::SocketAddr::new(self.address, self.port).to_string()
    }
}

impl std::fmt::Display for ServiceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use std::fmt::Write;
        writeln!(f, "ServiceSpec:")?;
        let mut indented = indenter::indented(f).with_str("   ");
        writeln!(indented, "Executable: {}", self.executable.display())?;
        writeln!(indented, "Listen: {}", self.listen_addr())?;
        writeln!(indented, "Base URL: {}", self.base_url())?;
        writeln!(indented, "Start timeout: {:?}", self.start_timeout.0)?;
        writeln!(indented, "Validate config: {}", self.validate_config)?;
        if let Some(readiness) = &self.readiness {
            writeln!(indented, "Readiness: {readiness:?}")?;
        }
        Ok(())
    }
}
