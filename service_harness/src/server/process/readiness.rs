use std::{
    io::{BufRead, BufReader, Read},
    time::Duration,
};

use super::gate::GateSignal;

/// How a supervisor decides that a freshly spawned server is usable.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ReadinessStrategy {
    /// Ready once a line of output contains this substring.
    MarkerMatch(String),
    /// Ready once this much time has passed. Nothing is checked; a port that
    /// is not yet bound still counts as ready.
    FixedDelay(Duration),
}

impl ReadinessStrategy {
    pub fn marker(substring: impl Into<String>) -> Self {
        Self::MarkerMatch(substring.into())
    }

    /// Runs on the watcher thread. Resolves `signal` exactly once and hands
    /// the reader back so the remaining output can be drained.
    pub(crate) fn watch<R: Read>(
        &self,
        mut reader: BufReader<R>,
        signal: GateSignal,
    ) -> Option<BufReader<R>> {
        match self {
            Self::FixedDelay(delay) => {
                std::thread::sleep(*delay);
                signal.ready();
                Some(reader)
            }
            Self::MarkerMatch(marker) => {
                let mut line = Vec::new();
                loop {
                    line.clear();
                    match reader.read_until(b'\n', &mut line) {
                        Ok(0) => {
                            signal.failed("terminated prematurely");
                            return None;
                        }
                        Ok(_) => {
                            let text = String::from_utf8_lossy(&line);
                            crate::debug!("{}", text.trim_end());
                            if text.contains(marker.as_str()) {
                                signal.ready();
                                return Some(reader);
                            }
                        }
                        Err(e) => {
                            signal.failed(format!("reading output failed: {e}"));
                            return None;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::process::{error::ProcessError, gate::ReadinessGate};

    fn run(strategy: ReadinessStrategy, output: &'static str) -> Result<(), ProcessError> {
        let (signal, waiter) = ReadinessGate::channel("test");
        let reader = BufReader::new(output.as_bytes());
        let _ = strategy.watch(reader, signal);
        waiter.await_ready(Duration::from_millis(50))
    }

    #[test]
    fn marker_found_mid_stream() {
        let out = "nginx: starting\n2024/01/01 [notice] 1#1: start worker process 7\nmore\n";
        assert!(run(ReadinessStrategy::marker("start worker process"), out).is_ok());
    }

    #[test]
    fn marker_on_final_unterminated_line() {
        assert!(run(ReadinessStrategy::marker("Accepting connections"), "Accepting connections").is_ok());
    }

    #[test]
    fn eof_before_marker_fails() {
        let err = run(ReadinessStrategy::marker("never"), "a\nb\n").unwrap_err();
        match err {
            ProcessError::StartupFailed { reason, .. } => assert_eq!(reason, "terminated prematurely"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn fixed_delay_signals_even_on_empty_output() {
        assert!(run(ReadinessStrategy::FixedDelay(Duration::from_millis(5)), "").is_ok());
    }

    #[test]
    fn reader_is_returned_positioned_after_marker() {
        let (signal, _waiter) = ReadinessGate::channel("test");
        let reader = BufReader::new("one\nREADY\ntail\n".as_bytes());
        let mut rest = ReadinessStrategy::marker("READY").watch(reader, signal).unwrap();
        let mut tail = String::new();
        rest.read_to_string(&mut tail).unwrap();
        assert_eq!(tail, "tail\n");
    }

    #[test]
    fn strategy_serializes() {
        let json = serde_json::to_string(&ReadinessStrategy::marker("x")).unwrap();
        assert_eq!(json, r#"{"MarkerMatch":"x"}"#);
    }
}
