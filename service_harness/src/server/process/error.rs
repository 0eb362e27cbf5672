#[derive(serde::Serialize, Debug, thiserror::Error)]
pub enum ProcessError {
    /// The executable could not be started at all (missing, not executable).
    #[error("failed to launch {executable:?}: {source}")]
    Launch {
        executable: std::path::PathBuf,
        #[source]
        #[serde(serialize_with = "crate::error::std_io_error_to_string")]
        source: std::io::Error,
    },

    /// The readiness condition was not met before the deadline.
    #[error("{service} did not become ready within {elapsed:?}")]
    StartupTimeout {
        service: String,
        elapsed: std::time::Duration,
    },

    /// The process reported failure, or exited, before becoming ready.
    #[error("{service} failed to start: {reason}")]
    StartupFailed { service: String, reason: String },

    /// OS rejected a pipe, kill, wait or similar operation.
    #[error("failed to {action} process: {source}")]
    CommandFailed {
        action: &'static str,
        #[source]
        #[serde(serialize_with = "crate::error::std_io_error_to_string")]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// We tried an operation the current user is not allowed to perform.
    #[error("insufficient privilege to {action}: {source}")]
    PermissionDenied {
        action: &'static str,
        #[source]
        #[serde(serialize_with = "crate::error::std_io_error_to_string")]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

pub type Result<T> = std::result::Result<T, ProcessError>;

impl ProcessError {
    pub(crate) fn launch(executable: &std::path::Path, source: std::io::Error) -> Self {
        Self::Launch {
            executable: executable.to_path_buf(),
            source,
        }
    }
}
