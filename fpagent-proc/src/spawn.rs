//! Forked worker spawning.

use std::collections::BTreeMap;
use std::ffi::CString;
use std::io;
use std::os::fd::RawFd;
use std::panic::{self, AssertUnwindSafe};

use crate::error::ProcError;
use crate::signal::Signal;
use crate::types::Pid;

/// Exit code used when the worker body panics, matching Rust's own.
const DEFAULT_PANIC_EXIT_CODE: i32 = 101;

/// Upper bound for the descriptor sweep when /proc is unavailable.
const FALLBACK_MAX_FD: RawFd = 4096;

/// Highest signal number whose disposition is reset in the worker.
const MAX_SIGNAL: libc::c_int = 64;

/// Specification for forking a worker process.
pub struct SpawnSpec {
    /// Descriptors (besides stdio) the worker keeps open.
    pub keep_fds: Vec<RawFd>,
    /// Environment overrides applied in the worker before it runs.
    pub env: BTreeMap<String, String>,
    /// Exit code used if the worker body panics.
    pub panic_exit_code: i32,
    /// Signals the worker ignores.
    pub ignore_signals: Vec<Signal>,
}

impl SpawnSpec {
    /// Create an empty SpawnSpec.
    pub fn new() -> Self {
        Self {
            keep_fds: Vec::new(),
            env: BTreeMap::new(),
            panic_exit_code: DEFAULT_PANIC_EXIT_CODE,
            ignore_signals: Vec::new(),
        }
    }

    /// Keep a descriptor open in the worker.
    pub fn keep_fd(mut self, fd: RawFd) -> Self {
        self.keep_fds.push(fd);
        self
    }

    /// Set one environment variable in the worker.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the exit code used when the worker body panics.
    pub fn panic_exit_code(mut self, code: i32) -> Self {
        self.panic_exit_code = code;
        self
    }

    /// Ignore a signal in the worker.
    pub fn ignore_signal(mut self, signal: Signal) -> Self {
        self.ignore_signals.push(signal);
        self
    }
}

impl Default for SpawnSpec {
    fn default() -> Self {
        Self::new()
    }
}

/// Fork a worker process that runs `worker` and exits with its return value.
///
/// This function:
/// 1. Validates the environment overrides
/// 2. Forks the process
/// 3. In the child: closes inherited descriptors except stdio and
///    `keep_fds`, resets caught signals to their default action, ignores
///    `ignore_signals`, applies the environment, runs `worker`, then
///    `_exit`s
/// 4. In the parent: drops `worker` (and everything it captured) and
///    returns the child's pid
///
/// The child never returns into the caller's code and never runs the
/// parent's atexit handlers or destructors.
pub fn spawn_worker<F>(spec: SpawnSpec, worker: F) -> Result<Pid, ProcError>
where
    F: FnOnce() -> i32,
{
    let env_cstrings: Vec<(CString, CString)> = spec
        .env
        .iter()
        .map(|(k, v)| {
            if k.is_empty() || k.contains('=') {
                return Err(ProcError::InvalidEnv(k.clone()));
            }
            let key = CString::new(k.as_bytes()).map_err(|e| ProcError::InvalidEnv(e.to_string()))?;
            let val = CString::new(v.as_bytes()).map_err(|e| ProcError::InvalidEnv(e.to_string()))?;
            Ok((key, val))
        })
        .collect::<Result<_, _>>()?;

    let pid = unsafe { libc::fork() };

    if pid < 0 {
        return Err(ProcError::Fork(io::Error::last_os_error()));
    }

    if pid == 0 {
        // === CHILD PROCESS ===
        // Errors here must exit the child, not return.

        close_inherited_fds(&spec.keep_fds);
        reset_signal_handlers();
        for signal in &spec.ignore_signals {
            unsafe { libc::signal(signal.to_libc(), libc::SIG_IGN) };
        }

        for (key, val) in &env_cstrings {
            unsafe {
                libc::setenv(key.as_ptr(), val.as_ptr(), 1);
            }
        }

        let code = panic::catch_unwind(AssertUnwindSafe(worker)).unwrap_or(spec.panic_exit_code);

        unsafe { libc::_exit(code) };
    }

    // === PARENT PROCESS ===
    // Releases whatever the worker captured, e.g. the write end of a pipe.
    drop(worker);

    tracing::debug!(pid, "worker forked");

    Ok(Pid::new(pid))
}

/// Close every descriptor above stderr that is not in `keep`.
///
/// A forked worker otherwise holds on to whatever its parent had open,
/// including pipe ends of sibling workers, which would delay their
/// end-of-stream.
fn close_inherited_fds(keep: &[RawFd]) {
    let should_close = |fd: RawFd| fd > libc::STDERR_FILENO && !keep.contains(&fd);

    match std::fs::read_dir("/proc/self/fd") {
        Ok(entries) => {
            // Collect first: the directory handle is itself one of the entries.
            let fds: Vec<RawFd> = entries
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
                .collect();
            for fd in fds.into_iter().filter(|fd| should_close(*fd)) {
                unsafe { libc::close(fd) };
            }
        }
        Err(_) => {
            for fd in (0..FALLBACK_MAX_FD).filter(|fd| should_close(*fd)) {
                unsafe { libc::close(fd) };
            }
        }
    }
}

/// Restore the default action of every signal the parent catches.
///
/// Handlers installed by the parent (an async runtime's, for instance)
/// would otherwise run in the worker against state it does not own.
/// Ignored signals stay ignored.
fn reset_signal_handlers() {
    for signo in 1..=MAX_SIGNAL {
        let mut current: libc::sigaction = unsafe { std::mem::zeroed() };
        if unsafe { libc::sigaction(signo, std::ptr::null(), &mut current) } != 0 {
            continue;
        }
        if current.sa_sigaction == libc::SIG_DFL || current.sa_sigaction == libc::SIG_IGN {
            continue;
        }
        unsafe { libc::signal(signo, libc::SIG_DFL) };
    }
}
