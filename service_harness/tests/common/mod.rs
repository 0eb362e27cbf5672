//! Shared helpers for the integration-test suite.
#![allow(dead_code)]

use std::{
    net::{IpAddr, Ipv4Addr},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    time::Duration,
};

use service_harness::*;

pub const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Writes an executable `/bin/sh` script standing in for a server binary.
pub fn fake_exe(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Like [`fake_exe`], but the script first writes its working directory,
/// which is the fixture's scratch area, to `<dir>/<name>.cwd`.
pub fn recording_exe(dir: &Path, name: &str, body: &str) -> PathBuf {
    let body = format!("pwd > \"{}/{name}.cwd\"\n{body}", dir.display());
    fake_exe(dir, name, &body)
}

/// Scratch directory recorded by a [`recording_exe`] script.
pub fn recorded_cwd(dir: &Path, name: &str) -> PathBuf {
    let cwd = std::fs::read_to_string(dir.join(format!("{name}.cwd")))
        .unwrap_or_else(|e| panic!("{name} never ran: {e}"));
    PathBuf::from(cwd.trim())
}

/// Fake nginx: fails `-t` when `FAIL_CHECK` exists next to it, otherwise
/// records its PID and prints the worker marker.
pub fn fake_nginx(dir: &Path) -> PathBuf {
    let body = format!(
        r#"if [ "$1" = "-t" ]; then
  if [ -e "{dir}/FAIL_CHECK" ]; then
    echo "nginx: [emerg] unknown directive" >&2
    exit 1
  fi
  exit 0
fi
echo $$ > "{dir}/nginx.pid"
echo "nginx: start worker process 4242"
exec sleep 30"#,
        dir = dir.display()
    );
    recording_exe(dir, "nginx", &body)
}

/// Fake `openssl req` that writes placeholder key and certificate files.
pub fn fake_openssl(dir: &Path) -> PathBuf {
    let body = r#"while [ $# -gt 0 ]; do
  case "$1" in
    -keyout) shift; echo key > "$1" ;;
    -out) shift; echo cert > "$1" ;;
  esac
  shift
done"#;
    fake_exe(dir, "openssl", body)
}

pub fn failing_openssl(dir: &Path) -> PathBuf {
    recording_exe(dir, "openssl", "echo 'unable to load config' >&2\nexit 1")
}

pub fn spec_for(executable: &Path, mode: ProtocolMode) -> ServiceSpec {
    spec_with(executable, mode, None, false)
}

pub fn spec_with(
    executable: &Path,
    mode: ProtocolMode,
    keygen: Option<PathBuf>,
    validate_config: bool,
) -> ServiceSpec {
    ServiceSpec::builder()
        .executable(executable)
        .port(reserve_ephemeral_port(LOOPBACK).unwrap())
        .mode(mode)
        .start_timeout(Duration::from_secs(5))
        .validate_config(validate_config)
        .maybe_keygen_executable(keygen)
        .build()
        .unwrap()
}

pub fn recorded_pid(dir: &Path) -> Option<u32> {
    std::fs::read_to_string(dir.join("nginx.pid"))
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

pub fn pid_alive(pid: u32) -> bool {
    service_harness::server::process::pid_alive(pid).unwrap()
}

/// Real binaries come from the harness defaults plus `SERVICE_HARNESS_*`.
pub fn real_config() -> HarnessConfig {
    HarnessConfig::default().with_env_overrides()
}

/// Plain HTTP agent that reports 4xx/5xx as responses and never follows
/// redirects.
pub fn http_agent() -> ureq::Agent {
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .max_redirects(0)
        .timeout_global(Some(Duration::from_secs(5)))
        .build()
        .into()
}

/// HTTPS agent that accepts the self-signed certificate.
pub fn insecure_agent() -> ureq::Agent {
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .max_redirects(0)
        .timeout_global(Some(Duration::from_secs(5)))
        .tls_config(
            ureq::tls::TlsConfig::builder()
                .disable_verification(true)
                .build(),
        )
        .build()
        .into()
}
