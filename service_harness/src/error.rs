// top-level error for the public API

#[derive(serde::Serialize, Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(transparent)]
    Process(#[from] crate::server::process::error::ProcessError),

    /// A generated artefact was rejected before the server was launched:
    /// either the key-generation tool or the server's own config check
    /// exited non-zero. Captured output is kept verbatim.
    #[error("{stage} failed ({status}):\nstdout: {stdout}\nstderr: {stderr}")]
    ConfigValidation {
        /// `"certificate generation"` or `"config check"`.
        stage: &'static str,
        status: String,
        stdout: String,
        stderr: String,
    },

    #[error("invalid {field}: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("{service} was already started; handles are single-use")]
    AlreadyStarted { service: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("{operation} failed for '{path}'")]
    FileSystem {
        operation: &'static str,
        path: std::path::PathBuf,
        #[source]
        #[serde(serialize_with = "std_io_error_to_string")]
        source: std::io::Error,
    },
}

pub type HarnessResult<T> = std::result::Result<T, HarnessError>;

impl HarnessError {
    pub fn file_system(
        operation: &'static str,
        path: impl Into<std::path::PathBuf>,
        err: impl Into<std::io::Error>,
    ) -> Self {
        Self::FileSystem {
            operation,
            path: path.into(),
            source: err.into(),
        }
    }

    /// `true` for the two readiness failures a fixture may want to tell apart
    /// from configuration mistakes.
    pub fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            Self::Process(
                crate::server::process::error::ProcessError::StartupTimeout { .. }
                    | crate::server::process::error::ProcessError::StartupFailed { .. }
            )
        )
    }
}

pub(crate) fn std_io_error_to_string<S>(e: &impl std::fmt::Display, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(&e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::process::error::ProcessError;

    #[test]
    fn errors_serialize_to_json() {
        let err = HarnessError::file_system(
            "write config",
            "/tmp/nowhere/nginx.conf",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["FileSystem"]["operation"], "write config");
        assert_eq!(json["FileSystem"]["source"], "gone");
    }

    #[test]
    fn startup_failures_are_classified() {
        let timeout: HarnessError = ProcessError::StartupTimeout {
            service: "nginx".into(),
            elapsed: std::time::Duration::from_secs(5),
        }
        .into();
        let failed: HarnessError = ProcessError::StartupFailed {
            service: "nginx".into(),
            reason: "terminated prematurely".into(),
        }
        .into();
        let invalid = HarnessError::InvalidConfig {
            field: "host",
            reason: "cannot be empty".into(),
        };
        assert!(timeout.is_startup_failure());
        assert!(failed.is_startup_failure());
        assert!(!invalid.is_startup_failure());
    }

    #[test]
    fn config_validation_message_carries_output() {
        let err = HarnessError::ConfigValidation {
            stage: "config check",
            status: "exit status: 1".into(),
            stdout: String::new(),
            stderr: "nginx: [emerg] unknown directive".into(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("config check failed"));
        assert!(msg.contains("unknown directive"));
    }
}
