//! Server Process - Supervisor
//! ===========================
//!
//! Owns exactly one external server process from spawn to reap.
//!
//! ```text
//!  spawn() ──▶ Spawned ──wait_ready()──▶ Ready ──▶ Draining ──terminate()──▶ Terminated
//!                 │                                                  ▲
//!                 └──────────────── terminate() / Drop ──────────────┘
//! ```
//!
//! * The child leads a new process group and lives until [`terminate`] or
//!   `Drop`, whichever thread spawned it.
//! * stdout and stderr share one pipe so readiness markers are found no matter
//!   which stream the server logs to.
//! * `<label>-watcher` scans the pipe until the gate resolves, then
//!   `<label>-drain` keeps reading so the child never blocks on a full pipe.
//! * [`terminate`] kills the whole group and reaps with a
//!   bounded wait. It never fails; problems are logged as warnings.
//!
//! [`terminate`]: ProcessSupervisor::terminate

use std::{
    ffi::OsStr,
    fs::File,
    io::{BufRead, BufReader},
    os::{
        fd::OwnedFd,
        unix::process::CommandExt,
    },
    path::Path,
    process::{Child, Command, Stdio},
    thread::JoinHandle,
    time::{Duration, Instant},
};

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
use nix::fcntl::OFlag;
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use wait_timeout::ChildExt;

use super::{error::*, gate::ReadinessGate, kill::*, readiness::ReadinessStrategy, *};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ProcessState {
    Spawned,
    Ready,
    Draining,
    Terminated,
}

#[derive(Debug)]
pub struct ProcessSupervisor {
    label: String,
    child: Option<Child>,
    /// Read end of the merged output pipe, until the watcher takes it.
    output: Option<BufReader<File>>,
    drain: Option<JoinHandle<()>>,
    state: ProcessState,
    span: tracing::Span,
}

impl ProcessSupervisor {
    /// Launches `executable` with `args`, working directory `cwd`.
    ///
    /// A missing or non-executable binary is reported as
    /// [`ProcessError::Launch`].
    pub fn spawn<I, S>(
        label: impl Into<String>,
        executable: &Path,
        args: I,
        cwd: &Path,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let label = label.into();
        let (read_end, write_end) = output_pipe()?;

        let child = {
            let stderr_end = write_end
                .try_clone()
                .map_err(|e| ProcessError::CommandFailed {
                    action: "duplicate output pipe for",
                    source: e.into(),
                })?;

            let mut cmd = Command::new(executable);
            cmd.args(args)
                .current_dir(cwd)
                .stdin(Stdio::null())
                .stdout(Stdio::from(write_end))
                .stderr(Stdio::from(stderr_end))
                .process_group(0);

            crate::debug!("{label}: spawning {cmd:?}");
            cmd.spawn().map_err(|e| ProcessError::launch(executable, e))?
            // `cmd` drops here, closing the parent's copies of the write end
        };

        crate::info!("{label}: spawned PID {}", child.id());
        Ok(Self {
            label,
            child: Some(child),
            output: Some(BufReader::new(File::from(read_end))),
            drain: None,
            state: ProcessState::Spawned,
            span: tracing::Span::current(),
        })
    }

    /// Blocks until `strategy` reports the server ready, or `timeout` passes.
    ///
    /// On any error the process group has already been terminated when this
    /// returns.
    pub fn wait_ready(&mut self, strategy: &ReadinessStrategy, timeout: Duration) -> Result<()> {
        let Some(output) = self.output.take() else {
            return Err(ProcessError::StartupFailed {
                service: self.label.clone(),
                reason: format!("readiness already awaited (state {:?})", self.state),
            });
        };

        let (signal, waiter) = ReadinessGate::channel(self.label.clone());
        let watcher = {
            let strategy = strategy.clone();
            let span = self.span.clone();
            std::thread::Builder::new()
                .name(format!("{}-watcher", self.label))
                .spawn(move || {
                    let _entered = span.enter();
                    strategy.watch(output, signal)
                })
                .map_err(|e| ProcessError::CommandFailed {
                    action: "spawn readiness watcher for",
                    source: e.into(),
                })
        };
        let watcher = match watcher {
            Ok(w) => w,
            Err(e) => {
                self.terminate();
                return Err(e);
            }
        };

        let started = Instant::now();
        if let Err(e) = waiter.await_ready(timeout) {
            crate::warn!("{}: not ready after {:?}: {e}", self.label, started.elapsed());
            // killing the group closes the pipe, which ends the watcher
            self.terminate();
            drop(watcher);
            return Err(e);
        }
        self.state = ProcessState::Ready;
        crate::info!("{}: ready after {:?}", self.label, started.elapsed());

        let output = match watcher.join() {
            Ok(Some(output)) => output,
            Ok(None) | Err(_) => {
                self.terminate();
                return Err(ProcessError::StartupFailed {
                    service: self.label.clone(),
                    reason: "readiness watcher lost the output stream".into(),
                });
            }
        };

        if let ReadinessStrategy::FixedDelay(_) = strategy {
            if let Some(status) = self.exit_status() {
                self.terminate();
                return Err(ProcessError::StartupFailed {
                    service: self.label.clone(),
                    reason: format!("exited during startup ({status})"),
                });
            }
        }

        self.start_drain(output)
    }

    fn start_drain(&mut self, mut output: BufReader<File>) -> Result<()> {
        let span = self.span.clone();
        let label = self.label.clone();
        let handle = std::thread::Builder::new()
            .name(format!("{}-drain", self.label))
            .spawn(move || {
                let _entered = span.enter();
                let mut line = Vec::with_capacity(DRAIN_BUFFER_BYTES);
                loop {
                    line.clear();
                    match output.read_until(b'\n', &mut line) {
                        Ok(0) => break,
                        Ok(_) => {
                            crate::debug!("{label}: {}", String::from_utf8_lossy(&line).trim_end())
                        }
                        Err(e) => {
                            crate::debug!("{label}: output closed: {e}");
                            break;
                        }
                    }
                }
            });
        match handle {
            Ok(h) => {
                self.drain = Some(h);
                self.state = ProcessState::Draining;
                Ok(())
            }
            Err(e) => {
                self.terminate();
                Err(ProcessError::CommandFailed {
                    action: "spawn output drain for",
                    source: e.into(),
                })
            }
        }
    }

    /// Kills the process group and reaps the child. Safe to call repeatedly.
    pub fn terminate(&mut self) {
        self.output = None;
        let Some(mut child) = self.child.take() else {
            self.state = ProcessState::Terminated;
            return;
        };
        let pid = child.id();

        // the leader may be gone while workers in its group are not
        if let Err(e) = kill_process_group(pid) {
            crate::warn!("{}: failed to kill process group {pid}: {e}", self.label);
            if let Err(e) = child.kill() {
                crate::warn!("{}: failed to kill PID {pid}: {e}", self.label);
            }
        }

        match child.wait_timeout(FORCE_KILL_TIMEOUT) {
            Ok(Some(status)) => crate::info!("{}: PID {pid} stopped ({status})", self.label),
            Ok(None) => crate::warn!(
                "{}: PID {pid} still running {FORCE_KILL_TIMEOUT:?} after SIGKILL",
                self.label
            ),
            Err(e) => crate::warn!("{}: failed to reap PID {pid}: {e}", self.label),
        }

        if let Some(drain) = self.drain.take() {
            let deadline = Instant::now() + FORCE_KILL_TIMEOUT;
            while !drain.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }
            if drain.is_finished() {
                let _ = drain.join();
            } else {
                crate::warn!("{}: output pipe still open after stop", self.label);
            }
        }
        self.state = ProcessState::Terminated;
    }

    fn exit_status(&mut self) -> Option<std::process::ExitStatus> {
        self.child.as_mut().and_then(|c| c.try_wait().ok().flatten())
    }

    /// `true` while the child has neither exited nor been terminated.
    pub fn is_alive(&self) -> bool {
        self.pid().is_some_and(|pid| pid_alive(pid).unwrap_or(false))
    }

    /// `None` once terminated.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn output_pipe() -> Result<(OwnedFd, OwnedFd)> {
    let failed = |e: nix::Error| ProcessError::CommandFailed {
        action: "create output pipe for",
        source: e.into(),
    };
    // the child receives dup2'd copies; the originals must not leak into it
    // or into a concurrent spawn on another thread
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    {
        nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(failed)
    }
    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
    {
        use std::os::fd::AsFd;

        let (r, w) = nix::unistd::pipe().map_err(failed)?;
        for fd in [&r, &w] {
            fcntl(fd.as_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(failed)?;
        }
        Ok((r, w))
    }
}
