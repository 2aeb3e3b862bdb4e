//! Device capability boundary.
//!
//! A scanning library is consumed through [`DeviceCapability`]. The worker
//! creates one capability per enrollment through a [`DeviceProvider`],
//! wraps it in a [`CapabilitySession`] and drives it step by step.

#[cfg(feature = "libfprint")]
pub mod fprint;
pub mod scripted;
mod session;

use std::path::Path;

use fpagent_core::{RetryReason, StepCode};

pub use session::{CapabilitySession, Teardown};

/// A device found during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    /// Backend-specific identifier, passed back to [`DeviceCapability::open`].
    pub id: String,
    /// Human-readable driver name.
    pub driver: String,
}

/// Enrolled template blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceArtifact(Vec<u8>);

impl DeviceArtifact {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Outcome of one enrollment step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Retry(RetryReason),
    Pass,
    Fail,
    Complete(DeviceArtifact),
}

impl StepResult {
    /// The step outcome without its payload.
    pub fn code(&self) -> StepCode {
        match self {
            Self::Retry(reason) => StepCode::Retry(*reason),
            Self::Pass => StepCode::Pass,
            Self::Fail => StepCode::Fail,
            Self::Complete(_) => StepCode::Complete,
        }
    }
}

/// Teardown routine of a capability; runs at most once.
pub type Releaser = Box<dyn FnOnce() + Send>;

/// Errors reported by a device capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The capability could not be created or initialized.
    #[error("initialization failed: {0}")]
    Init(String),

    /// Device discovery failed.
    #[error("device discovery failed: {0}")]
    Discovery(String),

    /// Opening the device failed.
    #[error("could not open device: {0}")]
    Open(String),

    /// An enrollment step failed at the library level.
    #[error("enroll step failed: {0}")]
    Step(String),
}

/// Saving the artifact failed with a library error code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("saving artifact failed with code {code}: {message}")]
pub struct SaveError {
    /// Raw (usually negative) library return value.
    pub code: i32,
    pub message: String,
}

/// A scanning library binding, used from a single worker process.
pub trait DeviceCapability {
    /// Initialize the library.
    fn init(&mut self) -> Result<(), DeviceError>;

    /// List attached devices. An empty list means none were found.
    fn discover_devices(&mut self) -> Result<Vec<DeviceHandle>, DeviceError>;

    /// Open a discovered device for enrollment.
    fn open(&mut self, device: &DeviceHandle) -> Result<(), DeviceError>;

    /// Run one (blocking) enrollment step.
    fn enroll_step(&mut self) -> Result<StepResult, DeviceError>;

    /// Persist the enrolled artifact to `target`.
    fn save_artifact(&mut self, artifact: &DeviceArtifact, target: &Path) -> Result<(), SaveError>;

    /// The routine that releases everything this capability acquired.
    ///
    /// It may be called from another thread while a step is in progress,
    /// and must be safe to call before `init`.
    fn releaser(&self) -> Releaser;
}

/// Creates capabilities; one per enrollment, inside the worker.
pub trait DeviceProvider: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    fn capability(&self) -> Result<Box<dyn DeviceCapability>, DeviceError>;
}
