//! Service Harness CLI
//! ===================
//!
//! Runs one fixture in the foreground so a client can be pointed at it by
//! hand. The fixture is started, its base URL printed, and everything is torn
//! down again on Ctrl-C.
//!
//! ## Typical usage
//! ```text
//! # nginx with the standard routes on an ephemeral port
//! $ service-harness-cli httpd
//!
//! # HTTPS with a fresh self-signed certificate, config checked first
//! $ service-harness-cli httpd --tls --validate --host local.example.test
//!
//! # forward proxy and a listener that never answers
//! $ service-harness-cli proxy --port 3128
//! $ service-harness-cli proxy-py --port 8899
//! $ service-harness-cli blackhole --port 10000
//! ```

// cargo run --bin service-harness-cli -- httpd --tls

use std::{net::IpAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use service_harness::*;

#[derive(Debug, Parser)]
#[command(name = "service-harness-cli", version)]
struct Cli {
    #[command(flatten)]
    common: Common,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Args)]
struct Common {
    /// Harness defaults file (TOML); built-in defaults when omitted
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Listening port; an ephemeral one is reserved when omitted
    #[arg(long, short = 'p', global = true)]
    port: Option<u16>,

    /// Interface to bind
    #[arg(long, global = true)]
    address: Option<IpAddr>,

    /// Host name used in URLs and the certificate CN
    #[arg(long, global = true)]
    host: Option<String>,

    /// Log server output and spawned commands
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Static web server (nginx)
    Httpd {
        /// Serve HTTPS with a generated self-signed certificate
        #[arg(long)]
        tls: bool,

        /// Run `nginx -t` on the generated config before starting
        #[arg(long)]
        validate: bool,

        /// nginx binary, overriding the config file
        #[arg(long, value_name = "PATH")]
        executable: Option<PathBuf>,
    },

    /// Forward HTTP proxy (tinyproxy)
    Proxy {
        /// tinyproxy binary, overriding the config file
        #[arg(long, value_name = "PATH")]
        executable: Option<PathBuf>,
    },

    /// Forward HTTP proxy (proxy.py)
    ProxyPy {
        /// proxy.py entry point, overriding the config file
        #[arg(long, value_name = "PATH")]
        executable: Option<PathBuf>,
    },

    /// Accepts connections and never answers
    Blackhole,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> HarnessResult<()> {
    let logging = if cli.common.verbose {
        LoggingConfig::new().log_level_debug()
    } else {
        LoggingConfig::new().log_level_info()
    };
    logging.install_global()?;

    let mut cfg = match &cli.common.config {
        Some(path) => HarnessConfig::load(Some(path))?,
        None => HarnessConfig::default(),
    }
    .with_env_overrides();
    if let Some(address) = cli.common.address {
        cfg.address = address;
    }
    if let Some(host) = cli.common.host.clone() {
        cfg.host = host;
    }

    match cli.cmd {
        Cmd::Httpd {
            tls,
            validate,
            executable,
        } => {
            if let Some(exe) = executable {
                cfg.nginx = exe;
            }
            let port = resolve_port(cli.common.port, &cfg)?;
            let mode = if tls {
                ProtocolMode::Tls
            } else {
                ProtocolMode::Plain
            };
            let spec = cfg.httpd_spec(port, mode, validate)?;
            let server = Httpd::launch(Nginx::standard(), spec)?;
            serve_until_interrupted(&server.endpoint().to_string())?;
        }
        Cmd::Proxy { executable } => {
            if let Some(exe) = executable {
                cfg.tinyproxy = exe;
            }
            let port = resolve_port(cli.common.port, &cfg)?;
            let proxy = ForwardProxy::launch(Tinyproxy::default(), cfg.proxy_spec(port)?)?;
            serve_until_interrupted(&proxy.endpoint().to_string())?;
        }
        Cmd::ProxyPy { executable } => {
            if let Some(exe) = executable {
                cfg.proxy_py = exe;
            }
            let port = resolve_port(cli.common.port, &cfg)?;
            let proxy = ProxyPyServer::launch(ProxyPy, cfg.proxy_py_spec(port)?)?;
            serve_until_interrupted(&proxy.endpoint().to_string())?;
        }
        Cmd::Blackhole => {
            let mut blackhole =
                BlackholeListener::new(cfg.address, cli.common.port.unwrap_or(0)).host(cfg.host);
            blackhole.start()?;
            serve_until_interrupted(&format!("blackhole at {}", blackhole.base_url()))?;
        }
    }

    println!("fixture stopped");
    Ok(())
}

fn resolve_port(requested: Option<u16>, cfg: &HarnessConfig) -> HarnessResult<u16> {
    match requested {
        Some(port) => Ok(port),
        None => reserve_ephemeral_port(cfg.address),
    }
}

fn serve_until_interrupted(what: &str) -> HarnessResult<()> {
    println!("running: {what}");
    println!("Press Ctrl-C to stop.");

    let (tx, rx) = std::sync::mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| HarnessError::Internal(format!("Failed to set Ctrl-C handler: {e}")))?;

    let _ = rx.recv();
    Ok(())
}
