//! The enrollment worker.
//!
//! Runs inside the forked child. Drives one device capability through
//! setup and the enrollment steps, reports every outcome as a status
//! record, and returns the exit code the child terminates with.

use std::path::{Path, PathBuf};

use fpagent_core::{Backend, SetupFailure, StatusRecord, StepCode, WorkerExit};
use fpagent_proc::{exit_on_signal, RecordWriter, Signal};

use crate::device::{CapabilitySession, DeviceArtifact, DeviceCapability, DeviceProvider, StepResult};

/// Write end of the status channel.
pub type StatusWriter = RecordWriter<{ StatusRecord::SIZE }>;

/// What one worker has to do.
#[derive(Debug, Clone)]
pub struct WorkerJob {
    pub target: PathBuf,
    pub backend: Backend,
}

struct Reporter {
    channel: StatusWriter,
    backend: Backend,
}

impl Reporter {
    fn emit(&mut self, record: StatusRecord) {
        if let Err(e) = self.channel.write(&record.to_bytes()) {
            tracing::error!(code = record.code(), error = %e, "failed to report status");
        }
    }

    fn step(&mut self, step: StepCode) {
        self.emit(self.backend.step_record(step));
    }

    fn setup_failed(&mut self, failure: SetupFailure) -> WorkerExit {
        self.emit(self.backend.setup_record(failure));
        WorkerExit::from_setup(failure)
    }
}

/// Run one enrollment and return how the worker should exit.
///
/// The device is released before this returns, and also when the worker
/// is asked to terminate while a step is blocking.
pub fn run(provider: &dyn DeviceProvider, channel: StatusWriter, job: &WorkerJob) -> WorkerExit {
    let mut reporter = Reporter {
        channel,
        backend: job.backend,
    };

    let device = match provider.capability() {
        Ok(device) => device,
        Err(e) => {
            tracing::error!(provider = provider.name(), error = %e, "could not create device capability");
            return reporter.setup_failed(SetupFailure::Init);
        }
    };

    let mut session = CapabilitySession::acquire(device);
    let teardown = session.teardown();
    if let Err(e) = exit_on_signal(Signal::Term, WorkerExit::Terminated.into(), move || teardown.run()) {
        tracing::error!(error = %e, "failed to install termination handler");
    }

    let exit = enroll(session.device(), &mut reporter, &job.target);
    drop(session);

    tracing::debug!(code = exit.code(), "worker finished");
    exit
}

fn enroll(device: &mut dyn DeviceCapability, reporter: &mut Reporter, target: &Path) -> WorkerExit {
    if let Err(e) = device.init() {
        tracing::error!(error = %e, "initialization failed");
        return reporter.setup_failed(SetupFailure::Init);
    }

    let devices = match device.discover_devices() {
        Ok(devices) => devices,
        Err(e) => {
            tracing::error!(error = %e, "device discovery failed");
            Vec::new()
        }
    };
    let Some(handle) = devices.first() else {
        tracing::error!("no devices detected");
        return reporter.setup_failed(SetupFailure::NoDevice);
    };
    tracing::info!(device = %handle.id, driver = %handle.driver, "found device");

    if let Err(e) = device.open(handle) {
        tracing::error!(error = %e, "could not open device");
        return reporter.setup_failed(SetupFailure::Open);
    }
    tracing::info!("device opened, starting enrollment");

    loop {
        let step = match device.enroll_step() {
            Ok(step) => step,
            Err(e) => {
                tracing::error!(error = %e, "enroll step failed");
                reporter.step(StepCode::Fail);
                return WorkerExit::EnrollFailed;
            }
        };
        let code = step.code();
        reporter.step(code);

        if let StepResult::Complete(artifact) = step {
            return save(device, &artifact, target);
        }
        if code.is_terminal() {
            tracing::warn!(step = ?code, "enrollment failed");
            return WorkerExit::EnrollFailed;
        }
    }
}

fn save(device: &mut dyn DeviceCapability, artifact: &DeviceArtifact, target: &Path) -> WorkerExit {
    match device.save_artifact(artifact, target) {
        Ok(()) => {
            tracing::info!(target = %target.display(), "enrollment complete");
            WorkerExit::Success
        }
        Err(e) => {
            tracing::error!(code = e.code, error = %e, "could not save enrolled template");
            WorkerExit::SaveFailed
        }
    }
}
