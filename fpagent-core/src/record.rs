//! Status records and the step vocabulary they encode.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One progress update from a worker, as it travels over the channel.
///
/// The payload is a single backend-specific integer: either a library step
/// code or a setup-failure sentinel. Use [`crate::Backend::classify`] to
/// interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusRecord(pub i32);

impl StatusRecord {
    /// Encoded size on the wire.
    pub const SIZE: usize = std::mem::size_of::<i32>();

    pub fn new(code: i32) -> Self {
        Self(code)
    }

    pub fn code(&self) -> i32 {
        self.0
    }

    /// Encode for the channel (native byte order; both ends share a host).
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        self.0.to_ne_bytes()
    }

    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self(i32::from_ne_bytes(bytes))
    }
}

impl fmt::Display for StatusRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why the device wants another swipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryReason {
    /// Scan did not succeed, no specific reason.
    Generic,
    /// Swipe was too short.
    TooShort,
    /// Finger was not centered on the sensor.
    CenterFinger,
    /// Finger must be removed from the sensor first.
    RemoveFinger,
}

/// Outcome of one enrollment step, without any artifact payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "step", content = "reason")]
pub enum StepCode {
    /// Enrollment finished; a template was produced.
    Complete,
    /// Enrollment failed terminally.
    Fail,
    /// One enroll stage passed; more swipes needed.
    Pass,
    /// The swipe was rejected; try again.
    Retry(RetryReason),
}

impl StepCode {
    /// Returns true if no further steps follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Fail)
    }
}

/// Local setup failures reported before any enrollment step runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupFailure {
    /// The scanning library could not be initialized.
    Init,
    /// No scanning device was found.
    NoDevice,
    /// The device could not be opened.
    Open,
}

/// Interpretation of a record's code under a given backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RecordKind {
    Step { step: StepCode },
    Setup { failure: SetupFailure },
    Unknown,
}
