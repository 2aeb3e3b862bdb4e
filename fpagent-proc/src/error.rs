//! Process primitive error types.

use std::io;

/// Errors that can occur while creating, signalling or reaping a worker.
#[derive(Debug, thiserror::Error)]
pub enum ProcError {
    /// pipe() failed.
    #[error("pipe creation failed: {0}")]
    Pipe(#[source] io::Error),

    /// fcntl() on a pipe end failed.
    #[error("failed to configure descriptor: {0}")]
    Fcntl(#[source] io::Error),

    /// Reading from the record channel failed.
    #[error("channel read failed: {0}")]
    Read(#[source] io::Error),

    /// Writing to the record channel failed.
    #[error("channel write failed: {0}")]
    Write(#[source] io::Error),

    /// fork() failed.
    #[error("fork failed: {0}")]
    Fork(#[source] io::Error),

    /// kill() failed.
    #[error("signal failed: {0}")]
    Signal(#[source] io::Error),

    /// pthread_sigmask() or sigwait() failed.
    #[error("signal mask update failed: {0}")]
    SignalMask(#[source] io::Error),

    /// waitpid() failed.
    #[error("waitpid failed: {0}")]
    Wait(#[source] io::Error),

    /// Spawning the termination watcher thread failed.
    #[error("failed to start termination watcher: {0}")]
    Watcher(#[source] io::Error),

    /// Environment key or value contains a null byte or '='.
    #[error("invalid environment entry: {0}")]
    InvalidEnv(String),
}
