//! Server Process - Kill
//! =====================
//!
//! Signal helpers for servers launched by [`super::ProcessSupervisor`].
//!
//! Every supervised child leads its own process group (PGID = PID), so a
//! single `killpg` reaches nginx's master *and* its workers. Targets that are
//! already gone (`ESRCH`) count as success.

use nix::{
    errno::Errno,
    sys::signal::{kill, killpg, Signal},
    unistd::Pid,
};

use super::error::*;

/// Sends `SIGKILL` to every member of the process group `pgid`.
pub fn kill_process_group(pgid: u32) -> Result<()> {
    match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),

        Err(Errno::EPERM) => Err(ProcessError::PermissionDenied {
            action: "send SIGKILL to process group",
            source: "operation not permitted".into(),
        }),

        Err(e) => Err(ProcessError::CommandFailed {
            action: "send SIGKILL to process group",
            source: e.into(),
        }),
    }
}

/// `Ok(false)` for PIDs the kernel no longer knows and for zombies.
pub fn pid_alive(pid: u32) -> Result<bool> {
    match kill(Pid::from_raw(pid as i32), None) {
        Err(Errno::ESRCH) => return Ok(false),
        Err(Errno::EPERM) => {
            return Err(ProcessError::PermissionDenied {
                action: "check process with signal 0",
                source: "operation not permitted".into(),
            });
        }
        Err(e) => {
            return Err(ProcessError::CommandFailed {
                action: "check process with signal 0",
                source: e.into(),
            });
        }
        Ok(()) => (),
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{pid}/status")) {
            if status
                .lines()
                .find(|l| l.starts_with("State:"))
                .and_then(|l| l.split_whitespace().nth(1))
                == Some("Z")
            {
                return Ok(false);
            }
        }
    }

    Ok(true)
}
