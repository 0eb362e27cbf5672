//! Server – Backends
//! =================
//!
//! The seam between the generic [`ServiceHandle`](super::handle::ServiceHandle)
//! lifecycle and a concrete server binary. A backend knows how to lay out its
//! scratch area, how to invoke the binary and what "ready" looks like on its
//! output; the handle owns everything else.

use std::ffi::OsString;

use crate::{
    error::{HarnessError, HarnessResult},
    server::{
        config::{payload, tls, NginxConfig, TinyproxyConfig},
        process::ReadinessStrategy,
        types::{ProtocolMode, RouteTable, ScratchArea, ServiceSpec},
    },
};

pub trait ServiceBackend: std::fmt::Debug + Send {
    /// Short name used for labels and scratch prefixes.
    fn name(&self) -> &'static str;

    fn config_file_name(&self) -> &'static str;

    fn base_url(&self, spec: &ServiceSpec) -> String;

    /// Default readiness check; a spec may override it.
    fn readiness(&self) -> ReadinessStrategy;

    /// Rejects specs this backend cannot honour.
    fn validate_spec(&self, _spec: &ServiceSpec) -> HarnessResult<()> {
        Ok(())
    }

    /// Writes config and any supporting files into `scratch`.
    fn prepare(&self, spec: &ServiceSpec, scratch: &ScratchArea) -> HarnessResult<()>;

    fn launch_args(&self, spec: &ServiceSpec, scratch: &ScratchArea) -> Vec<OsString>;

    /// Arguments for a config-check run, if the binary has one.
    fn preflight_args(&self, _spec: &ServiceSpec, _scratch: &ScratchArea) -> Option<Vec<OsString>> {
        None
    }
}

/// Static web server with scripted routes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nginx {
    pub routes: RouteTable,
}

impl Nginx {
    pub const READY_MARKER: &'static str = "start worker process";

    pub fn new(routes: RouteTable) -> Self {
        Self { routes }
    }

    /// Serves the document root plus [`RouteTable::standard`].
    pub fn standard() -> Self {
        Self::new(RouteTable::standard())
    }
}

impl ServiceBackend for Nginx {
    fn name(&self) -> &'static str {
        "nginx"
    }

    fn config_file_name(&self) -> &'static str {
        "nginx.conf"
    }

    fn base_url(&self, spec: &ServiceSpec) -> String {
        spec.base_url()
    }

    fn readiness(&self) -> ReadinessStrategy {
        ReadinessStrategy::marker(Self::READY_MARKER)
    }

    fn prepare(&self, spec: &ServiceSpec, scratch: &ScratchArea) -> HarnessResult<()> {
        if spec.mode == ProtocolMode::Tls {
            tls::provision(spec, scratch)?;
        }
        payload::write_payloads(scratch)?;
        let conf = NginxConfig::new(spec, scratch, &self.routes).render();
        crate::trace!("nginx config:\n{conf}");
        scratch.write(&scratch.config_path(), conf)
    }

    fn launch_args(&self, _spec: &ServiceSpec, scratch: &ScratchArea) -> Vec<OsString> {
        vec![
            "-p".into(),
            scratch.path().into(),
            "-c".into(),
            scratch.config_path().into(),
        ]
    }

    fn preflight_args(&self, spec: &ServiceSpec, scratch: &ScratchArea) -> Option<Vec<OsString>> {
        let mut args: Vec<OsString> = vec!["-t".into(), "-q".into()];
        args.extend(self.launch_args(spec, scratch));
        Some(args)
    }
}

/// Forward HTTP proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tinyproxy {
    pub config: TinyproxyConfig,
}

impl Tinyproxy {
    pub const READY_MARKER: &'static str = "Accepting connections";

    pub fn new(config: TinyproxyConfig) -> Self {
        Self { config }
    }
}

impl ServiceBackend for Tinyproxy {
    fn name(&self) -> &'static str {
        "tinyproxy"
    }

    fn config_file_name(&self) -> &'static str {
        "tinyproxy.conf"
    }

    /// Proxies are addressed by IP, never by virtual host name.
    fn base_url(&self, spec: &ServiceSpec) -> String {
        format!("http://{}", spec.listen_addr())
    }

    fn readiness(&self) -> ReadinessStrategy {
        ReadinessStrategy::marker(Self::READY_MARKER)
    }

    fn validate_spec(&self, spec: &ServiceSpec) -> HarnessResult<()> {
        if spec.mode == ProtocolMode::Tls {
            return Err(HarnessError::InvalidConfig {
                field: "mode",
                reason: "tinyproxy does not terminate TLS".into(),
            });
        }
        if self.config.allow.is_empty() {
            return Err(HarnessError::InvalidConfig {
                field: "allow",
                reason: "at least one client address is required".into(),
            });
        }
        Ok(())
    }

    fn prepare(&self, spec: &ServiceSpec, scratch: &ScratchArea) -> HarnessResult<()> {
        let conf = self.config.render(spec);
        crate::trace!("tinyproxy config:\n{conf}");
        scratch.write(&scratch.config_path(), conf)
    }

    fn launch_args(&self, _spec: &ServiceSpec, scratch: &ScratchArea) -> Vec<OsString> {
        vec!["-d".into(), "-c".into(), scratch.config_path().into()]
    }
}

/// Forward HTTP proxy implemented by `proxy.py`, configured entirely by flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyPy;

impl ProxyPy {
    pub const READY_MARKER: &'static str = "Started ";
}

impl ServiceBackend for ProxyPy {
    fn name(&self) -> &'static str {
        "proxy.py"
    }

    /// Nothing is written under this name; the scratch area only serves as
    /// working directory.
    fn config_file_name(&self) -> &'static str {
        "proxy.py.args"
    }

    fn base_url(&self, spec: &ServiceSpec) -> String {
        format!("http://{}", spec.listen_addr())
    }

    fn readiness(&self) -> ReadinessStrategy {
        ReadinessStrategy::marker(Self::READY_MARKER)
    }

    fn validate_spec(&self, spec: &ServiceSpec) -> HarnessResult<()> {
        if spec.mode == ProtocolMode::Tls {
            return Err(HarnessError::InvalidConfig {
                field: "mode",
                reason: "proxy.py is run as a plain HTTP proxy".into(),
            });
        }
        Ok(())
    }

    fn prepare(&self, _spec: &ServiceSpec, _scratch: &ScratchArea) -> HarnessResult<()> {
        Ok(())
    }

    fn launch_args(&self, spec: &ServiceSpec, _scratch: &ScratchArea) -> Vec<OsString> {
        vec![
            format!("--host={}", spec.address).into(),
            format!("--port={}", spec.port).into(),
            "--threadless".into(),
            "--log-level=DEBUG".into(),
            "--log-file=/dev/stdout".into(),
        ]
    }
}
