//! Worker exit-code convention.
//!
//! Exit codes are the only channel of truth about how a worker ended. They
//! are the same for every backend: 0 is success, local failures use
//! dedicated codes at the top of the byte range.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::SetupFailure;

/// How a worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerExit {
    /// Enrollment completed and the artifact was saved.
    Success,
    /// The scanning library could not be initialized.
    InitFailed,
    /// No scanning device was found.
    NoDevice,
    /// The device could not be opened.
    OpenFailed,
    /// Enrollment completed but saving the artifact failed.
    SaveFailed,
    /// The worker was cancelled or killed by a signal.
    Terminated,
    /// Enrollment failed (device reported failure, or a step errored).
    EnrollFailed,
    /// Any other code, e.g. from a worker built against a newer table.
    Other(u8),
}

impl WorkerExit {
    pub const SUCCESS: u8 = 0;
    pub const INIT_FAILED: u8 = 200;
    pub const NO_DEVICE: u8 = 201;
    pub const OPEN_FAILED: u8 = 202;
    pub const SAVE_FAILED: u8 = 203;
    pub const TERMINATED: u8 = 254;
    pub const ENROLL_FAILED: u8 = 255;

    /// The process exit code for this outcome.
    pub fn code(&self) -> u8 {
        match self {
            Self::Success => Self::SUCCESS,
            Self::InitFailed => Self::INIT_FAILED,
            Self::NoDevice => Self::NO_DEVICE,
            Self::OpenFailed => Self::OPEN_FAILED,
            Self::SaveFailed => Self::SAVE_FAILED,
            Self::Terminated => Self::TERMINATED,
            Self::EnrollFailed => Self::ENROLL_FAILED,
            Self::Other(code) => *code,
        }
    }

    /// Decode a process exit code.
    pub fn from_code(code: u8) -> Self {
        match code {
            Self::SUCCESS => Self::Success,
            Self::INIT_FAILED => Self::InitFailed,
            Self::NO_DEVICE => Self::NoDevice,
            Self::OPEN_FAILED => Self::OpenFailed,
            Self::SAVE_FAILED => Self::SaveFailed,
            Self::TERMINATED => Self::Terminated,
            Self::ENROLL_FAILED => Self::EnrollFailed,
            other => Self::Other(other),
        }
    }

    /// The exit used when setup fails with `failure`.
    pub fn from_setup(failure: SetupFailure) -> Self {
        match failure {
            SetupFailure::Init => Self::InitFailed,
            SetupFailure::NoDevice => Self::NoDevice,
            SetupFailure::Open => Self::OpenFailed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<WorkerExit> for i32 {
    fn from(exit: WorkerExit) -> Self {
        i32::from(exit.code())
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("Fingerprint acquired successfully."),
            Self::InitFailed => f.write_str("Initialization failed."),
            Self::NoDevice => f.write_str("No devices detected."),
            Self::OpenFailed => f.write_str("Device could not be opened."),
            Self::SaveFailed => f.write_str("Storing the fingerprint failed."),
            Self::Terminated => f.write_str("Canceled."),
            Self::EnrollFailed => f.write_str("Could not acquire fingerprint."),
            Self::Other(code) => write!(f, "Worker exited with code {code}."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(WorkerExit::Success.code(), 0);
        assert_eq!(WorkerExit::InitFailed.code(), 200);
        assert_eq!(WorkerExit::NoDevice.code(), 201);
        assert_eq!(WorkerExit::OpenFailed.code(), 202);
        assert_eq!(WorkerExit::SaveFailed.code(), 203);
        assert_eq!(WorkerExit::Terminated.code(), 254);
        assert_eq!(WorkerExit::EnrollFailed.code(), 255);
    }

    #[test]
    fn test_from_code_covers_every_byte() {
        for code in 0..=u8::MAX {
            assert_eq!(WorkerExit::from_code(code).code(), code);
        }
        assert_eq!(WorkerExit::from_code(1), WorkerExit::Other(1));
    }

    #[test]
    fn test_setup_failures_map_to_distinct_exits() {
        let exits = [
            WorkerExit::from_setup(SetupFailure::Init),
            WorkerExit::from_setup(SetupFailure::NoDevice),
            WorkerExit::from_setup(SetupFailure::Open),
        ];
        assert_eq!(exits, [WorkerExit::InitFailed, WorkerExit::NoDevice, WorkerExit::OpenFailed]);
        assert!(exits.iter().all(|e| !e.is_success()));
    }

    #[test]
    fn test_into_i32() {
        assert_eq!(i32::from(WorkerExit::Terminated), 254);
    }
}
