//! Signal delivery and the worker-side termination watcher.

use std::io;
use std::mem::MaybeUninit;
use std::thread;

use crate::error::ProcError;
use crate::types::Pid;

/// Signals that can be sent to processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Interrupt (Ctrl+C).
    Int,
    /// Terminate (cooperative).
    Term,
    /// Kill (cannot be caught).
    Kill,
    /// Custom signal number.
    Custom(i32),
}

impl Signal {
    /// Convert to libc signal number.
    pub fn to_libc(self) -> libc::c_int {
        match self {
            Signal::Int => libc::SIGINT,
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
            Signal::Custom(n) => n,
        }
    }
}

/// Send a signal to a specific process.
pub fn signal_pid(pid: Pid, sig: Signal) -> Result<(), ProcError> {
    let ret = unsafe { libc::kill(pid.0, sig.to_libc()) };
    if ret != 0 {
        return Err(ProcError::Signal(io::Error::last_os_error()));
    }
    Ok(())
}

fn signal_set(sig: Signal) -> libc::sigset_t {
    let mut set = MaybeUninit::<libc::sigset_t>::uninit();
    unsafe {
        libc::sigemptyset(set.as_mut_ptr());
        libc::sigaddset(set.as_mut_ptr(), sig.to_libc());
        set.assume_init()
    }
}

/// Run `cleanup` and `_exit(exit_code)` when this process receives `sig`.
///
/// Blocks `sig` on the calling thread and starts a watcher thread that
/// waits for it synchronously, so `cleanup` runs as ordinary code rather
/// than inside an async signal handler. Threads spawned afterwards inherit
/// the mask. Intended for forked workers, which are single-threaded when
/// they call this.
pub fn exit_on_signal<F>(sig: Signal, exit_code: i32, cleanup: F) -> Result<(), ProcError>
where
    F: FnOnce() + Send + 'static,
{
    let set = signal_set(sig);

    let ret = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut()) };
    if ret != 0 {
        return Err(ProcError::SignalMask(io::Error::from_raw_os_error(ret)));
    }

    thread::Builder::new()
        .name("termination-watch".into())
        .spawn(move || {
            let mut received: libc::c_int = 0;
            loop {
                let ret = unsafe { libc::sigwait(&set, &mut received) };
                if ret == 0 {
                    break;
                }
                if ret != libc::EINTR {
                    tracing::error!(error = %io::Error::from_raw_os_error(ret), "sigwait failed");
                    return;
                }
            }
            tracing::info!(signal = received, "termination requested");
            cleanup();
            unsafe { libc::_exit(exit_code) };
        })
        .map_err(ProcError::Watcher)?;

    Ok(())
}
