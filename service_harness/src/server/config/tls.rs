use crate::{
    error::HarnessResult,
    server::types::{ScratchArea, ServiceSpec},
};

/// Days the self-signed certificate stays valid.
pub const CERT_VALID_DAYS: u32 = 1;

/// Subject for the self-signed certificate; only `CN` varies.
pub fn subject(host: &str) -> String {
    format!("/C=US/ST=Test/L=Test/O=Service Harness/OU=Testing/CN={host}")
}

/// Writes `cert.pem` and `key.pem` into the scratch area by running
/// `openssl req -x509`. Must complete before any server is spawned.
pub fn provision(spec: &ServiceSpec, scratch: &ScratchArea) -> HarnessResult<()> {
    let days = CERT_VALID_DAYS.to_string();
    let subject = subject(&spec.host);
    let key = scratch.key_path();
    let cert = scratch.cert_path();
    let args: [&std::ffi::OsStr; 14] = [
        "req".as_ref(),
        "-x509".as_ref(),
        "-newkey".as_ref(),
        "rsa:2048".as_ref(),
        "-nodes".as_ref(),
        "-days".as_ref(),
        days.as_ref(),
        "-keyout".as_ref(),
        key.as_os_str(),
        "-out".as_ref(),
        cert.as_os_str(),
        "-subj".as_ref(),
        subject.as_ref(),
        "-batch".as_ref(),
    ];
    super::run_checked(
        "certificate generation",
        &spec.keygen_executable,
        args,
        scratch.path(),
    )?;
    crate::info!("self-signed certificate for {} at {}", spec.host, cert.display());
    Ok(())
}
