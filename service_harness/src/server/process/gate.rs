//! Server Process - Readiness Gate
//! ===============================
//!
//! A one-shot hand-off between the thread that watches a server's output and
//! the thread that started it.
//!
//! ```text
//!  watcher thread                       starter thread
//!  ──────────────                       ──────────────
//!  GateSignal::ready()   ──┐
//!          or              ├─ sync_channel(1) ─▶ GateWaiter::await_ready(timeout)
//!  GateSignal::failed(r) ──┘                         │
//!  (drop without signal) ── disconnect ─────────────▶ StartupFailed
//!                                       deadline ───▶ StartupTimeout
//! ```
//!
//! Both signalling methods take `self`, so a gate can be resolved at most once
//! and never both ready and failed. The waiter blocks on the channel; there is
//! no polling loop.

use std::{
    sync::mpsc::{Receiver, RecvTimeoutError, SyncSender},
    time::{Duration, Instant},
};

use super::error::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Ready,
    Failed(String),
}

/// Constructor namespace for the two gate halves.
pub struct ReadinessGate;

impl ReadinessGate {
    /// `label` names the service in the errors produced by the waiter.
    pub fn channel(label: impl Into<String>) -> (GateSignal, GateWaiter) {
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        (
            GateSignal { tx },
            GateWaiter {
                label: label.into(),
                rx,
            },
        )
    }
}

/// Signalling half, owned by the watcher.
#[derive(Debug)]
pub struct GateSignal {
    tx: SyncSender<GateOutcome>,
}

impl GateSignal {
    pub fn ready(self) {
        // the waiter may already have timed out and gone away
        let _ = self.tx.send(GateOutcome::Ready);
    }

    pub fn failed(self, reason: impl Into<String>) {
        let _ = self.tx.send(GateOutcome::Failed(reason.into()));
    }
}

/// Waiting half, owned by the starter.
#[derive(Debug)]
pub struct GateWaiter {
    label: String,
    rx: Receiver<GateOutcome>,
}

impl GateWaiter {
    pub fn await_ready(self, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        match self.rx.recv_timeout(timeout) {
            Ok(GateOutcome::Ready) => Ok(()),
            Ok(GateOutcome::Failed(reason)) => Err(ProcessError::StartupFailed {
                service: self.label,
                reason,
            }),
            Err(RecvTimeoutError::Timeout) => Err(ProcessError::StartupTimeout {
                service: self.label,
                elapsed: started.elapsed(),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(ProcessError::StartupFailed {
                service: self.label,
                reason: "readiness watcher exited without reporting".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_before_wait() {
        let (signal, waiter) = ReadinessGate::channel("svc");
        signal.ready();
        assert!(waiter.await_ready(Duration::from_millis(10)).is_ok());
    }

    #[test]
    fn ready_from_another_thread() {
        let (signal, waiter) = ReadinessGate::channel("svc");
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            signal.ready();
        });
        let started = Instant::now();
        waiter.await_ready(Duration::from_secs(5)).unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        t.join().unwrap();
    }

    #[test]
    fn failure_carries_reason() {
        let (signal, waiter) = ReadinessGate::channel("svc");
        signal.failed("terminated prematurely");
        match waiter.await_ready(Duration::from_millis(10)) {
            Err(ProcessError::StartupFailed { service, reason }) => {
                assert_eq!(service, "svc");
                assert_eq!(reason, "terminated prematurely");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn deadline_elapses() {
        let (_signal, waiter) = ReadinessGate::channel("svc");
        let started = Instant::now();
        match waiter.await_ready(Duration::from_millis(100)) {
            Err(ProcessError::StartupTimeout { elapsed, .. }) => {
                assert!(elapsed >= Duration::from_millis(100));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn dropped_signal_is_a_failure_not_a_timeout() {
        let (signal, waiter) = ReadinessGate::channel("svc");
        drop(signal);
        assert!(matches!(
            waiter.await_ready(Duration::from_secs(5)),
            Err(ProcessError::StartupFailed { .. })
        ));
    }

    #[test]
    fn signalling_after_waiter_is_gone_does_not_panic() {
        let (signal, waiter) = ReadinessGate::channel("svc");
        drop(waiter);
        signal.ready();
    }
}
