//! Reaping workers.

use std::io;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::ProcError;
use crate::types::Pid;

/// How a reaped worker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// `_exit(code)`.
    Code(i32),
    /// Terminated by this signal.
    Signaled(i32),
}

impl ExitStatus {
    /// Decode a raw `waitpid` status word.
    ///
    /// Stop/continue reports are never requested, so anything that is not a
    /// signal death is read as an exit code.
    fn from_raw(raw: libc::c_int) -> Self {
        if libc::WIFSIGNALED(raw) {
            Self::Signaled(libc::WTERMSIG(raw))
        } else {
            Self::Code(libc::WEXITSTATUS(raw))
        }
    }

    pub fn success(&self) -> bool {
        *self == Self::Code(0)
    }

    pub fn code(&self) -> Option<i32> {
        match *self {
            Self::Code(code) => Some(code),
            Self::Signaled(_) => None,
        }
    }

    pub fn signal(&self) -> Option<i32> {
        match *self {
            Self::Signaled(sig) => Some(sig),
            Self::Code(_) => None,
        }
    }
}

/// One `waitpid` call, retried on EINTR. `Ok(None)` means still running
/// (only possible with `WNOHANG`).
fn waitpid(pid: Pid, flags: libc::c_int) -> Result<Option<ExitStatus>, ProcError> {
    let mut raw: libc::c_int = 0;
    loop {
        match unsafe { libc::waitpid(pid.as_raw(), &mut raw, flags) } {
            0 => return Ok(None),
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::Interrupted {
                    return Err(ProcError::Wait(err));
                }
            }
            _ => return Ok(Some(ExitStatus::from_raw(raw))),
        }
    }
}

/// Reap `pid` if it has exited, without blocking.
pub fn try_wait(pid: Pid) -> Result<Option<ExitStatus>, ProcError> {
    waitpid(pid, libc::WNOHANG)
}

/// Block until `pid` exits and reap it.
pub fn wait(pid: Pid) -> Result<ExitStatus, ProcError> {
    loop {
        if let Some(status) = waitpid(pid, 0)? {
            return Ok(status);
        }
    }
}

/// Reap `pid` within `timeout`, checking every `interval`.
///
/// Returns `Ok(None)` if it is still running at the deadline.
pub fn wait_timeout(
    pid: Pid,
    timeout: Duration,
    interval: Duration,
) -> Result<Option<ExitStatus>, ProcError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = try_wait(pid)? {
            return Ok(Some(status));
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        thread::sleep(interval.min(remaining));
    }
}
