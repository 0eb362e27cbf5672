//! Server – Handle
//! ===============
//!
//! Public lifecycle object for one harnessed server.
//!
//! ```text
//!  Idle ──start()──▶ Running ──stop() / Drop──▶ Stopped
//!    │                                            ▲
//!    └──── failed start() or stop() ──────────────┘
//! ```
//!
//! A handle is single-use: `start()` from `Running` or `Stopped` fails with
//! [`HarnessError::AlreadyStarted`]. `stop()` is idempotent, never fails and is
//! also run by `Drop`, so a panicking test still tears its fixture down.
//!
//! ### Scoped acquisition
//! * [`ServiceHandle::launch`] / [`ServiceHandle::run_scoped`]: blocking.
//! * [`ServiceHandle::launch_async`] / [`ServiceHandle::run_scoped_async`]:
//!   the same blocking work behind an `async fn`. Startup is short and
//!   bounded, so nothing is handed to a runtime and the library stays
//!   executor-agnostic.

use std::{future::Future, path::Path};

use serde::Serialize;

use super::{
    backend::{Nginx, ProxyPy, ServiceBackend, Tinyproxy},
    config,
    process::{ProcessState, ProcessSupervisor},
    types::{ProtocolMode, ScratchArea, ServiceSpec},
};
use crate::error::{HarnessError, HarnessResult};

pub type Httpd = ServiceHandle<Nginx>;
pub type ForwardProxy = ServiceHandle<Tinyproxy>;
pub type ProxyPyServer = ServiceHandle<ProxyPy>;

/// Owned, cloneable view of where a running service can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceEndpoint {
    pub label: String,
    pub base_url: String,
    pub host: String,
    pub port: u16,
    pub mode: ProtocolMode,
}

impl ServiceEndpoint {
    /// `path` resolved against the base URL.
    pub fn url(&self, path: &str) -> HarnessResult<url::Url> {
        join_url(&self.base_url, path)
    }
}

impl std::fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.label, self.base_url)
    }
}

#[derive(Debug)]
enum HandleState {
    Idle,
    Running {
        supervisor: ProcessSupervisor,
        scratch: ScratchArea,
    },
    Stopped,
}

#[derive(Debug)]
pub struct ServiceHandle<B: ServiceBackend> {
    backend: B,
    spec: ServiceSpec,
    label: String,
    state: HandleState,
    span: tracing::Span,
}

impl<B: ServiceBackend> ServiceHandle<B> {
    /// Checks `spec` against the backend; nothing is spawned yet.
    ///
    /// The spec is validated again here, so one edited or deserialized after
    /// `build()` is held to the same rules.
    pub fn new(backend: B, spec: ServiceSpec) -> HarnessResult<Self> {
        spec.validate()?;
        backend.validate_spec(&spec)?;
        let label = spec
            .label
            .clone()
            .unwrap_or_else(|| format!("{}-{}", backend.name(), spec.port));
        let span = tracing::info_span!("service", label = %label, port = spec.port);
        Ok(Self {
            backend,
            spec,
            label,
            state: HandleState::Idle,
            span,
        })
    }

    /// Scratch area, config, optional pre-flight, spawn, bounded readiness
    /// wait. Returns once the server is ready or the attempt is fully
    /// cleaned up.
    pub fn start(&mut self) -> HarnessResult<()> {
        let _entered = self.span.enter();
        if !matches!(self.state, HandleState::Idle) {
            return Err(HarnessError::AlreadyStarted {
                service: self.label.clone(),
            });
        }
        self.state = HandleState::Stopped;

        crate::info!("starting {} ({})", self.label, self.backend.base_url(&self.spec));
        crate::debug!("{}", self.spec);
        let scratch = ScratchArea::new(self.backend.name(), self.backend.config_file_name())?;
        match self.boot(&scratch) {
            Ok(supervisor) => {
                crate::info!("{} is up at {}", self.label, self.base_url());
                self.state = HandleState::Running {
                    supervisor,
                    scratch,
                };
                Ok(())
            }
            Err(e) => {
                crate::error!("{} failed to start: {e}", self.label);
                scratch.close();
                Err(e)
            }
        }
    }

    fn boot(&self, scratch: &ScratchArea) -> HarnessResult<ProcessSupervisor> {
        self.backend.prepare(&self.spec, scratch)?;

        if self.spec.validate_config {
            if let Some(args) = self.backend.preflight_args(&self.spec, scratch) {
                config::run_checked("config check", &self.spec.executable, args, scratch.path())?;
            }
        }

        let mut supervisor = ProcessSupervisor::spawn(
            self.label.clone(),
            &self.spec.executable,
            self.backend.launch_args(&self.spec, scratch),
            scratch.path(),
        )?;
        let strategy = self
            .spec
            .readiness
            .clone()
            .unwrap_or_else(|| self.backend.readiness());
        // on failure the supervisor has already killed the process group
        supervisor.wait_ready(&strategy, self.spec.start_timeout.0)?;
        Ok(supervisor)
    }

    /// Kills the server and removes its scratch area. Safe in any state.
    pub fn stop(&mut self) {
        let _entered = self.span.enter();
        match std::mem::replace(&mut self.state, HandleState::Stopped) {
            HandleState::Running {
                mut supervisor,
                scratch,
            } => {
                crate::info!("stopping {}", self.label);
                supervisor.terminate();
                scratch.close();
            }
            HandleState::Idle | HandleState::Stopped => (),
        }
    }

    /// Builds and starts a handle in one step.
    pub fn launch(backend: B, spec: ServiceSpec) -> HarnessResult<Self> {
        let mut handle = Self::new(backend, spec)?;
        handle.start()?;
        Ok(handle)
    }

    /// Runs `f` against a started service and stops it afterwards, on panic
    /// too.
    pub fn run_scoped<T>(
        backend: B,
        spec: ServiceSpec,
        f: impl FnOnce(&ServiceEndpoint) -> T,
    ) -> HarnessResult<T> {
        let mut handle = Self::launch(backend, spec)?;
        let out = f(&handle.endpoint());
        handle.stop();
        Ok(out)
    }

    pub async fn start_async(&mut self) -> HarnessResult<()> {
        self.start()
    }

    pub async fn stop_async(&mut self) {
        self.stop()
    }

    pub async fn launch_async(backend: B, spec: ServiceSpec) -> HarnessResult<Self> {
        Self::launch(backend, spec)
    }

    pub async fn run_scoped_async<F, Fut, T>(backend: B, spec: ServiceSpec, f: F) -> HarnessResult<T>
    where
        F: FnOnce(ServiceEndpoint) -> Fut,
        Fut: Future<Output = T>,
    {
        let mut handle = Self::launch_async(backend, spec).await?;
        let out = f(handle.endpoint()).await;
        handle.stop_async().await;
        Ok(out)
    }

    /// Available before `start()`.
    pub fn base_url(&self) -> String {
        self.backend.base_url(&self.spec)
    }

    pub fn url(&self, path: &str) -> HarnessResult<url::Url> {
        join_url(&self.base_url(), path)
    }

    pub fn endpoint(&self) -> ServiceEndpoint {
        ServiceEndpoint {
            label: self.label.clone(),
            base_url: self.base_url(),
            host: self.spec.host.clone(),
            port: self.spec.port,
            mode: self.spec.mode,
        }
    }

    /// `true` while started and the server process is still alive.
    pub fn is_running(&self) -> bool {
        matches!(
            &self.state,
            HandleState::Running { supervisor, .. }
                if supervisor.state() == ProcessState::Draining && supervisor.is_alive()
        )
    }

    pub fn pid(&self) -> Option<u32> {
        match &self.state {
            HandleState::Running { supervisor, .. } => supervisor.pid(),
            _ => None,
        }
    }

    /// Scratch directory of the running service.
    pub fn scratch_path(&self) -> Option<&Path> {
        match &self.state {
            HandleState::Running { scratch, .. } => Some(scratch.path()),
            _ => None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: ServiceBackend> Drop for ServiceHandle<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<B: ServiceBackend> std::fmt::Display for ServiceHandle<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            HandleState::Idle => "idle",
            HandleState::Running { .. } => "running",
            HandleState::Stopped => "stopped",
        };
        write!(f, "{} {{ {}, {state} }}", self.label, self.base_url())
    }
}

fn join_url(base: &str, path: &str) -> HarnessResult<url::Url> {
    url::Url::parse(base)
        .and_then(|u| u.join(path))
        .map_err(|e| HarnessError::InvalidConfig {
            field: "url",
            reason: format!("cannot join {path:?} onto {base}: {e}"),
        })
}
