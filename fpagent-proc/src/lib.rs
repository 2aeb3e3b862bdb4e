//! Process isolation primitives for the fingerprint agent.
//!
//! This crate wraps the handful of Unix syscalls the agent needs to run an
//! enrollment in a separate process: a fixed-record pipe, `fork`, signal
//! delivery, a synchronous termination watcher and `waitpid`.
//!
//! # Example
//!
//! ```no_run
//! use std::os::fd::AsRawFd;
//! use fpagent_proc::{record_pipe, spawn_worker, try_wait, ReadOutcome, SpawnSpec};
//!
//! let (mut reader, mut writer) = record_pipe::<4>().unwrap();
//! let spec = SpawnSpec::new().keep_fd(writer.as_raw_fd());
//!
//! let pid = spawn_worker(spec, move || {
//!     let _ = writer.write(&7i32.to_ne_bytes());
//!     0
//! })
//! .unwrap();
//!
//! if let ReadOutcome::Record(bytes) = reader.read().unwrap() {
//!     println!("worker said {}", i32::from_ne_bytes(bytes));
//! }
//! if let Some(status) = try_wait(pid).unwrap() {
//!     println!("worker exited with: {:?}", status);
//! }
//! ```

mod error;
mod pipe;
mod signal;
mod spawn;
mod types;
mod wait;

pub use error::ProcError;
pub use pipe::{record_pipe, ReadOutcome, RecordReader, RecordWriter};
pub use signal::{exit_on_signal, signal_pid, Signal};
pub use spawn::{spawn_worker, SpawnSpec};
pub use types::Pid;
pub use wait::{try_wait, wait, wait_timeout, ExitStatus};
