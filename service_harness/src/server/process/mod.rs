pub mod error;
pub mod gate;
pub mod kill;
pub mod readiness;
pub mod supervisor;

pub use error::*;
pub use gate::*;
pub use kill::*;
pub use readiness::*;
pub use supervisor::*;

const FORCE_KILL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);
const DRAIN_BUFFER_BYTES: usize = 8 * 1024;

#[cfg(test)]
// Shared test utilities for process management
pub(crate) mod tests_helpers {
    use std::{
        os::unix::fs::PermissionsExt,
        path::{Path, PathBuf},
    };

    /// Writes an executable `/bin/sh` script into `dir` and returns its path.
    pub fn fake_exe(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    pub fn long_script() -> &'static str {
        "echo booting\necho 'ready: start worker process'\nexec sleep 30"
    }

    pub fn short_script() -> &'static str {
        "echo booting\nexit 3"
    }
}
