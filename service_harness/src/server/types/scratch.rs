use std::path::{Path, PathBuf};

use crate::error::{HarnessError, HarnessResult};

/// Temporary directory owned by exactly one running service.
///
/// Layout:
///
/// ```text
/// <tmp>/<service>-XXXXXX/
///   <service>.conf   generated config
///   data/            document root (payload files)
///   cert.pem         TLS only
///   key.pem          TLS only
/// ```
#[derive(Debug)]
pub struct ScratchArea {
    dir: tempfile::TempDir,
    config_file: String,
}

impl ScratchArea {
    pub fn new(service: &str, config_file: impl Into<String>) -> HarnessResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{service}-"))
            .tempdir()
            .map_err(|e| HarnessError::file_system("create scratch directory", std::env::temp_dir(), e))?;
        crate::debug!("scratch area at {}", dir.path().display());
        Ok(Self {
            dir,
            config_file: config_file.into(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join(&self.config_file)
    }

    pub fn doc_root(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    pub fn cert_path(&self) -> PathBuf {
        self.dir.path().join("cert.pem")
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.path().join("key.pem")
    }

    pub fn write(&self, path: &Path, contents: impl AsRef<[u8]>) -> HarnessResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HarnessError::file_system("create directory", parent, e))?;
        }
        std::fs::write(path, contents).map_err(|e| HarnessError::file_system("write file", path, e))
    }

    /// Deletes the directory tree. Failures are logged, never returned.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => crate::debug!("removed scratch area {}", path.display()),
            Err(e) => crate::warn!("failed to remove scratch area {}: {e}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_and_cleanup() {
        let scratch = ScratchArea::new("nginx", "nginx.conf").unwrap();
        let root = scratch.path().to_path_buf();
        assert!(root
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("nginx-"));
        assert_eq!(scratch.config_path(), root.join("nginx.conf"));
        assert_eq!(scratch.doc_root(), root.join("data"));

        scratch
            .write(&scratch.doc_root().join("index.html"), "<html></html>")
            .unwrap();
        assert!(root.join("data/index.html").is_file());

        scratch.close();
        assert!(!root.exists());
    }

    #[test]
    fn areas_are_distinct() {
        let a = ScratchArea::new("svc", "a.conf").unwrap();
        let b = ScratchArea::new("svc", "a.conf").unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn close_after_external_removal_only_warns() {
        let scratch = ScratchArea::new("svc", "svc.conf").unwrap();
        std::fs::remove_dir_all(scratch.path()).unwrap();
        scratch.close();
    }
}
