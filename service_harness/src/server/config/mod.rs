//! Server – Config
//! ===============
//!
//! Everything written into a [`ScratchArea`](crate::server::types::ScratchArea)
//! before a server process is launched: config text, payload files and TLS
//! material. Rendering is pure string building; only `payload` and `tls`
//! touch the filesystem.

pub mod nginx;
pub mod payload;
pub mod tinyproxy;
pub mod tls;

pub use nginx::NginxConfig;
pub use tinyproxy::TinyproxyConfig;

use std::{ffi::OsStr, path::Path, process::Command};

use crate::{
    error::{HarnessError, HarnessResult},
    server::process::ProcessError,
};

/// Runs a short-lived helper (key generation, config check) to completion.
///
/// A binary that cannot be started is a launch error; a non-zero exit is a
/// [`HarnessError::ConfigValidation`] carrying both output streams.
pub(crate) fn run_checked<I, S>(
    stage: &'static str,
    executable: &Path,
    args: I,
    cwd: &Path,
) -> HarnessResult<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(executable);
    cmd.args(args).current_dir(cwd);
    crate::debug!("{stage}: running {cmd:?}");
    let out = cmd
        .output()
        .map_err(|e| ProcessError::launch(executable, e))?;
    if out.status.success() {
        return Ok(());
    }
    let err = HarnessError::ConfigValidation {
        stage,
        status: out.status.to_string(),
        stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
    };
    crate::error!("{err}");
    Err(err)
}
