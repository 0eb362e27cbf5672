//! service_harness – throwaway network servers for HTTP client test suites
//! =======================================================================
//!
//! Spins up real `nginx` and `tinyproxy` processes (plus an in-process
//! "blackhole" listener) on demand, each with its own scratch directory,
//! generated config and, for TLS, a freshly minted self-signed certificate.
//! `start()` blocks until the server says it is ready and `stop()` (or
//! `Drop`) kills the whole process group and removes every file it wrote.
//!
//! ## Fixtures
//! | Type                  | Binary      | Ready when the output contains |
//! |-----------------------|-------------|--------------------------------|
//! | [`Httpd`]             | `nginx`     | `start worker process`         |
//! | [`ForwardProxy`]      | `tinyproxy` | `Accepting connections`        |
//! | [`ProxyPyServer`]     | `proxy.py`  | `Started `                     |
//! | [`BlackholeListener`] | –           | `start()` returns              |
//!
//! ---
//!
//! ```rust,no_run
//! use service_harness::*;
//!
//! fn main() -> HarnessResult<()> {
//!     let port = reserve_ephemeral_port("127.0.0.1".parse().unwrap())?;
//!     let spec = ServiceSpec::builder()
//!         .executable("/usr/sbin/nginx")
//!         .port(port)
//!         .mode(ProtocolMode::Tls)
//!         .build()?;
//!
//!     Httpd::run_scoped(Nginx::standard(), spec, |endpoint| {
//!         println!("serving {}", endpoint.base_url);
//!         // point the client under test at endpoint.url("/redirect")
//!     })?;
//!     Ok(())
//! }
//! ```
//!
//! ```sh,no_run
//! cargo run --bin service-harness-cli -- httpd --tls --validate
//! cargo run --bin service-harness-cli -- blackhole --port 10000
//! ```
//!
//! ---
//!
//! ## How It Works
//!
//! ```text
//! ServiceHandle::start()
//!       │
//!       ├─→ ScratchArea           (temp dir, removed on stop)
//!       ├─→ ServiceBackend        (config, payloads, TLS material)
//!       ├─→ pre-flight            (`nginx -t`, optional)
//!       └─→ ProcessSupervisor     (spawn, own process group)
//!                 │
//!                 ├─→ watcher thread   → ReadinessGate
//!                 └─→ drain thread     → keeps the pipe empty
//! ```

#[cfg(not(unix))]
compile_error!("service_harness supervises process groups and only builds on unix targets");

#[allow(unused_imports)]
use tracing::{Level, debug, error, info, span, trace, warn};

pub mod blackhole;
pub mod config;
pub mod error;
pub mod logging;
pub mod port;
pub mod server;

pub use blackhole::BlackholeListener;
pub use config::HarnessConfig;
pub use error::{HarnessError, HarnessResult};
pub use logging::{LoggingConfig, LoggingConfigTrait};
pub use port::reserve_ephemeral_port;
pub use server::{
    backend::{Nginx, ProxyPy, ServiceBackend, Tinyproxy},
    config::TinyproxyConfig,
    handle::*,
    process::{ProcessError, ReadinessStrategy},
    types::*,
};
