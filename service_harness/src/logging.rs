use std::path::PathBuf;

use tracing_subscriber::{layer::SubscriberExt, Layer};

use crate::error::{HarnessError, HarnessResult};

/// Console (and optionally rolling-file) `tracing` output for harness runs.
///
/// Library code only emits events; installing a subscriber is left to the
/// test binary or the CLI.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: tracing::Level,
    pub logging_enabled: bool,
    pub logger_name: String,
    /// Directory for hourly log files; `None` logs to stdout only.
    pub log_dir: Option<PathBuf>,
    pub _tracing_guard: Option<std::sync::Arc<tracing::subscriber::DefaultGuard>>,
}

impl LoggingConfig {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: tracing::Level::INFO,
            logging_enabled: true,
            logger_name: "service_harness".to_string(),
            log_dir: None,
            _tracing_guard: None,
        }
    }
}

impl LoggingConfig {
    /// Installs the subscriber for the current thread until `self` is dropped.
    pub fn load_logger(&mut self) -> HarnessResult<()> {
        self._tracing_guard = if self.logging_enabled {
            let subscriber = self.create_subscriber()?;
            Some(std::sync::Arc::new(tracing::subscriber::set_default(
                subscriber,
            )))
        } else {
            None
        };
        Ok(())
    }

    /// Installs the subscriber process-wide so watcher and drain threads log
    /// too. Fails if another global subscriber is already set.
    pub fn install_global(&self) -> HarnessResult<()> {
        if !self.logging_enabled {
            return Ok(());
        }
        let subscriber = self.create_subscriber()?;
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| HarnessError::Internal(format!("logger already installed: {e}")))
    }

    fn create_subscriber(&self) -> HarnessResult<impl tracing::Subscriber + Send + Sync> {
        let filter = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(self.level.into())
            .from_env_lossy();

        let file_layer = match &self.log_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)
                    .map_err(|e| HarnessError::file_system("create log directory", dir, e))?;
                let appender = tracing_appender::rolling::RollingFileAppender::builder()
                    .rotation(tracing_appender::rolling::Rotation::HOURLY)
                    .max_log_files(6)
                    .filename_prefix(&self.logger_name)
                    .filename_suffix("log")
                    .build(dir)
                    .map_err(|e| HarnessError::Internal(format!("log file appender: {e}")))?;
                Some(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_ansi(false)
                        .with_writer(appender)
                        .boxed(),
                )
            }
            None => None,
        };

        let terminal_layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(std::io::stdout);

        Ok(tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(terminal_layer))
    }
}

pub trait LoggingConfigTrait {
    fn logging_config_mut(&mut self) -> &mut LoggingConfig;

    fn logging_enabled(mut self, enabled: bool) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().logging_enabled = enabled;
        self
    }

    fn logger_name<S: Into<String>>(mut self, logger_name: S) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().logger_name = logger_name.into();
        self
    }

    fn log_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().log_dir = Some(dir.into());
        self
    }

    /// Sets the log level to TRACE. Includes the rendered server configs.
    fn log_level_trace(mut self) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().level = tracing::Level::TRACE;
        self
    }

    /// Sets the log level to DEBUG.
    ///
    /// Server output lines and spawned command lines are logged at this level.
    fn log_level_debug(mut self) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().level = tracing::Level::DEBUG;
        self
    }

    /// Sets the log level to INFO: start, ready and stop milestones.
    fn log_level_info(mut self) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().level = tracing::Level::INFO;
        self
    }

    /// Sets the log level to WARN.
    ///
    /// Cleanup problems (a process that outlived SIGKILL, a scratch directory
    /// that could not be removed) are reported here and never as errors.
    fn log_level_warn(mut self) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().level = tracing::Level::WARN;
        self
    }

    fn log_level_error(mut self) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().level = tracing::Level::ERROR;
        self
    }
}

impl LoggingConfigTrait for LoggingConfig {
    fn logging_config_mut(&mut self) -> &mut LoggingConfig {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fluent_setters() {
        let cfg = LoggingConfig::new()
            .log_level_debug()
            .logger_name("fixture")
            .log_dir("/tmp/harness-logs");
        assert_eq!(cfg.level, tracing::Level::DEBUG);
        assert_eq!(cfg.logger_name, "fixture");
        assert_eq!(cfg.log_dir, Some(PathBuf::from("/tmp/harness-logs")));
    }

    #[test]
    fn every_level_setter_applies() {
        let levels = [
            (LoggingConfig::new().log_level_trace(), tracing::Level::TRACE),
            (LoggingConfig::new().log_level_info(), tracing::Level::INFO),
            (LoggingConfig::new().log_level_warn(), tracing::Level::WARN),
            (LoggingConfig::new().log_level_error(), tracing::Level::ERROR),
        ];
        for (cfg, level) in levels {
            assert_eq!(cfg.level, level);
        }
        assert!(!LoggingConfig::new().logging_enabled(false).logging_enabled);
    }

    #[test]
    fn scoped_logger_writes_files() {
        let td = tempfile::tempdir().unwrap();
        let mut cfg = LoggingConfig::new().log_level_trace().log_dir(td.path());
        cfg.load_logger().unwrap();
        crate::info!("hello from the logging test");
        drop(cfg);
        let files: Vec<_> = std::fs::read_dir(td.path()).unwrap().collect();
        assert!(!files.is_empty());
    }

    #[test]
    fn disabled_logger_installs_nothing() {
        let mut cfg = LoggingConfig::new().logging_enabled(false);
        cfg.load_logger().unwrap();
        assert!(cfg._tracing_guard.is_none());
    }
}
