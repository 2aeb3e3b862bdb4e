//! Fixed-size record channel from a worker to its controller.
//!
//! The read end is non-blocking so that a controller can poll it from a
//! request loop; the write end blocks, which is fine for records a few
//! bytes long. Both ends are close-on-exec.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use crate::error::ProcError;

/// Result of a single non-blocking read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome<const N: usize> {
    /// A complete record was read.
    Record([u8; N]),
    /// Nothing available yet (would block or interrupted).
    Empty,
    /// The write end is closed and the pipe is drained.
    Closed,
}

/// Read end of a record pipe, owned by the controller.
pub struct RecordReader<const N: usize> {
    file: File,
    buf: [u8; N],
    filled: usize,
}

/// Write end of a record pipe, owned by the worker.
pub struct RecordWriter<const N: usize> {
    file: File,
}

/// Allocate a record pipe carrying `N`-byte records.
pub fn record_pipe<const N: usize>() -> Result<(RecordReader<N>, RecordWriter<N>), ProcError> {
    let mut fds: [libc::c_int; 2] = [-1; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        return Err(ProcError::Pipe(io::Error::last_os_error()));
    }

    // Safety: pipe succeeded, so both fds are valid and owned by us
    let read_end = unsafe { OwnedFd::from_raw_fd(fds[0]) };
    let write_end = unsafe { OwnedFd::from_raw_fd(fds[1]) };

    set_fd_flag(read_end.as_raw_fd(), libc::F_GETFD, libc::F_SETFD, libc::FD_CLOEXEC)?;
    set_fd_flag(write_end.as_raw_fd(), libc::F_GETFD, libc::F_SETFD, libc::FD_CLOEXEC)?;
    set_fd_flag(read_end.as_raw_fd(), libc::F_GETFL, libc::F_SETFL, libc::O_NONBLOCK)?;

    Ok((
        RecordReader {
            file: File::from(read_end),
            buf: [0u8; N],
            filled: 0,
        },
        RecordWriter {
            file: File::from(write_end),
        },
    ))
}

fn set_fd_flag(
    fd: RawFd,
    get: libc::c_int,
    set: libc::c_int,
    flag: libc::c_int,
) -> Result<(), ProcError> {
    let flags = unsafe { libc::fcntl(fd, get) };
    if flags < 0 {
        return Err(ProcError::Fcntl(io::Error::last_os_error()));
    }
    if unsafe { libc::fcntl(fd, set, flags | flag) } < 0 {
        return Err(ProcError::Fcntl(io::Error::last_os_error()));
    }
    Ok(())
}

impl<const N: usize> RecordReader<N> {
    /// Try to read one record without blocking.
    ///
    /// A record split across reads is buffered until it is complete, so a
    /// caller only ever sees whole records.
    pub fn read(&mut self) -> Result<ReadOutcome<N>, ProcError> {
        loop {
            match self.file.read(&mut self.buf[self.filled..]) {
                Ok(0) => {
                    if self.filled > 0 {
                        tracing::warn!(bytes = self.filled, "discarding partial record at end of stream");
                        self.filled = 0;
                    }
                    return Ok(ReadOutcome::Closed);
                }
                Ok(n) => {
                    self.filled += n;
                    if self.filled == N {
                        self.filled = 0;
                        return Ok(ReadOutcome::Record(self.buf));
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) =>
                {
                    return Ok(ReadOutcome::Empty);
                }
                Err(e) => return Err(ProcError::Read(e)),
            }
        }
    }
}

impl<const N: usize> RecordWriter<N> {
    /// Write one record, blocking until it is fully written.
    pub fn write(&mut self, record: &[u8; N]) -> Result<(), ProcError> {
        self.file.write_all(record).map_err(ProcError::Write)
    }
}

impl<const N: usize> AsRawFd for RecordReader<N> {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl<const N: usize> AsFd for RecordReader<N> {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl<const N: usize> AsRawFd for RecordWriter<N> {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl<const N: usize> AsFd for RecordWriter<N> {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}
