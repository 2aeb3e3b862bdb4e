//! Enrollment controller.
//!
//! Owns at most one enrollment session: the worker's pid, the read end of
//! its status channel, and what is known about its exit. All operations
//! except [`Controller::exit_status`] return promptly.
//!
//! ```text
//! Idle --begin--> Running --exit observed--> Completed(code)
//!                    |                              |
//!                    +--cancel--> Killed            |
//!                                   |               |
//!                                   +--exit_status--+--> Idle
//! ```

use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fpagent_core::{Backend, RecordKind, SessionState, StatusRecord, StatusUpdate, SwipeCounters, WorkerExit};
use fpagent_proc::{
    record_pipe, signal_pid, spawn_worker, try_wait, wait, wait_timeout, ExitStatus, Pid, ProcError,
    ReadOutcome, RecordReader, Signal, SpawnSpec,
};

use crate::device::DeviceProvider;
use crate::worker::{self, WorkerJob};

/// Default time a worker gets to exit after SIGTERM.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Default interval between reap attempts while waiting.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_millis(50);

/// Environment variable the worker's storage root is passed in by default.
pub const DEFAULT_STORAGE_ENV: &str = "HOME";

type StatusReader = RecordReader<{ StatusRecord::SIZE }>;

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Code table used to encode and classify records.
    pub backend: Backend,
    /// How long cancel waits after SIGTERM before SIGKILL.
    pub grace_period: Duration,
    /// Reap polling interval during cancel.
    pub reap_interval: Duration,
    /// Variable set to the target's parent directory in the worker, if any.
    pub storage_env: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            grace_period: DEFAULT_GRACE_PERIOD,
            reap_interval: DEFAULT_REAP_INTERVAL,
            storage_env: Some(DEFAULT_STORAGE_ENV.to_string()),
        }
    }
}

/// Errors returned by controller operations.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// No session exists.
    #[error("enrollment not initialized")]
    NotInitialized,

    /// begin was called while a worker is running.
    #[error("an enrollment is already running")]
    AlreadyRunning,

    /// begin was called without a usable target.
    #[error("invalid enrollment target: {0:?}")]
    InvalidTarget(PathBuf),

    /// Creating the channel or the worker failed.
    #[error(transparent)]
    Proc(#[from] ProcError),
}

/// Result of [`Controller::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No new record; the worker may still be running.
    Nothing,
    /// The next record, in write order.
    Update(StatusUpdate),
    /// All records have been delivered and the worker has exited.
    Exited,
}

/// What a non-blocking look at the worker found.
enum WorkerCheck {
    NoUpdate,
    Update(StatusRecord),
    Exited(u8),
}

struct EnrollmentSession {
    worker: Pid,
    channel: Option<StatusReader>,
    target: PathBuf,
    exit_code: Option<u8>,
    status: SessionState,
    swipes: SwipeCounters,
}

/// Map a reaped status to the worker exit code convention.
fn exit_code(status: ExitStatus) -> u8 {
    match status {
        ExitStatus::Code(code) => u8::try_from(code).unwrap_or(WorkerExit::ENROLL_FAILED),
        ExitStatus::Signaled(signal) => {
            tracing::info!(signal, "worker was killed by a signal");
            WorkerExit::TERMINATED
        }
    }
}

impl EnrollmentSession {
    fn record_exit(&mut self, code: u8) {
        self.exit_code = Some(code);
        if self.status == SessionState::Running {
            self.status = SessionState::Completed(code);
        }
        tracing::info!(pid = %self.worker, code, "worker exited");
    }

    /// Reap the worker without blocking.
    fn try_reap(&mut self) -> Option<u8> {
        if let Some(code) = self.exit_code {
            return Some(code);
        }
        match try_wait(self.worker) {
            Ok(Some(status)) => {
                let code = exit_code(status);
                self.record_exit(code);
                Some(code)
            }
            Ok(None) => None,
            Err(e) => {
                // The worker is gone without a status we can read.
                tracing::error!(pid = %self.worker, error = %e, "failed to reap worker");
                self.record_exit(WorkerExit::ENROLL_FAILED);
                Some(WorkerExit::ENROLL_FAILED)
            }
        }
    }

    /// Next record if one is buffered, otherwise whether the worker exited.
    ///
    /// Exit is only reported once the channel is drained and closed, so no
    /// record written before the worker exited is lost.
    fn check_worker(&mut self) -> WorkerCheck {
        if let Some(channel) = self.channel.as_mut() {
            match channel.read() {
                Ok(ReadOutcome::Record(bytes)) => {
                    return WorkerCheck::Update(StatusRecord::from_bytes(bytes));
                }
                Ok(ReadOutcome::Empty) => return WorkerCheck::NoUpdate,
                Ok(ReadOutcome::Closed) => {}
                Err(e) => {
                    tracing::error!(error = %e, "failed to read worker status");
                    return WorkerCheck::NoUpdate;
                }
            }
        }

        match self.try_reap() {
            Some(code) => WorkerCheck::Exited(code),
            None => WorkerCheck::NoUpdate,
        }
    }
}

/// Runs enrollments in isolated workers, one at a time.
pub struct Controller {
    config: ControllerConfig,
    provider: Arc<dyn DeviceProvider>,
    session: Option<EnrollmentSession>,
}

impl Controller {
    pub fn new(config: ControllerConfig, provider: Arc<dyn DeviceProvider>) -> Self {
        Self {
            config,
            provider,
            session: None,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Idle, |session| session.status)
    }

    /// Start an enrollment that stores its result at `target`.
    ///
    /// A finished session whose exit status was never collected is
    /// discarded.
    pub fn begin(&mut self, target: impl AsRef<Path>) -> Result<(), ControllerError> {
        let target = target.as_ref();
        if target.as_os_str().is_empty() {
            return Err(ControllerError::InvalidTarget(target.to_path_buf()));
        }

        if let Some(session) = &self.session {
            if session.status.is_active() {
                tracing::warn!(pid = %session.worker, "enrollment already running");
                return Err(ControllerError::AlreadyRunning);
            }
            tracing::info!(
                target = %session.target.display(),
                state = ?session.status,
                "discarding finished enrollment"
            );
            self.session = None;
        }

        let (reader, writer) = record_pipe::<{ StatusRecord::SIZE }>()?;

        let mut spec = SpawnSpec::new()
            .keep_fd(writer.as_raw_fd())
            .panic_exit_code(WorkerExit::EnrollFailed.into())
            // Ctrl+C on the terminal is for the controller to act on.
            .ignore_signal(Signal::Int);
        if let Some(var) = &self.config.storage_env {
            if let Some(dir) = target.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                spec = spec.env(var.as_str(), dir.to_string_lossy());
            }
        }

        let provider = Arc::clone(&self.provider);
        let job = WorkerJob {
            target: target.to_path_buf(),
            backend: self.config.backend,
        };
        let pid = spawn_worker(spec, move || worker::run(provider.as_ref(), writer, &job).into())?;

        tracing::info!(
            %pid,
            target = %target.display(),
            backend = %self.config.backend,
            device = self.provider.name(),
            "enrollment started"
        );

        self.session = Some(EnrollmentSession {
            worker: pid,
            channel: Some(reader),
            target: target.to_path_buf(),
            exit_code: None,
            status: SessionState::Running,
            swipes: SwipeCounters::default(),
        });
        Ok(())
    }

    /// Return the next status record, if any. Never blocks.
    pub fn poll(&mut self) -> Result<PollOutcome, ControllerError> {
        let backend = self.config.backend;
        let session = self.session.as_mut().ok_or(ControllerError::NotInitialized)?;

        match session.check_worker() {
            WorkerCheck::NoUpdate => Ok(PollOutcome::Nothing),
            WorkerCheck::Exited(_) => Ok(PollOutcome::Exited),
            WorkerCheck::Update(record) => {
                let kind = backend.classify(record);
                session.swipes.observe(kind);
                match kind {
                    RecordKind::Setup { failure } => {
                        tracing::warn!(?failure, code = record.code(), "worker setup failed");
                    }
                    RecordKind::Unknown => {
                        tracing::warn!(code = record.code(), "unknown status record");
                    }
                    RecordKind::Step { step } => {
                        tracing::debug!(?step, code = record.code(), "enroll step");
                    }
                }
                Ok(PollOutcome::Update(StatusUpdate {
                    record,
                    kind,
                    swipes: backend.reports_swipe_counters().then_some(session.swipes),
                }))
            }
        }
    }

    /// Stop the running worker: SIGTERM, then SIGKILL after the grace period.
    ///
    /// Returns once the worker has been reaped. Cancelling a session whose
    /// worker already finished changes nothing.
    pub fn cancel(&mut self) -> Result<(), ControllerError> {
        let grace_period = self.config.grace_period;
        let reap_interval = self.config.reap_interval;
        let session = self.session.as_mut().ok_or(ControllerError::NotInitialized)?;

        if !session.status.is_active() {
            tracing::debug!(state = ?session.status, "worker not running, nothing to cancel");
            return Ok(());
        }

        let code = match session.exit_code {
            Some(code) => code,
            None => terminate(session.worker, grace_period, reap_interval)
                .map_or(WorkerExit::TERMINATED, exit_code),
        };
        session.exit_code = Some(code);
        session.status = SessionState::Killed;
        tracing::info!(pid = %session.worker, code, "enrollment cancelled");
        Ok(())
    }

    /// Returns true once the worker has terminated. Never blocks.
    ///
    /// Records the worker wrote before exiting stay available to `poll`.
    pub fn check_exited(&mut self) -> Result<bool, ControllerError> {
        let session = self.session.as_mut().ok_or(ControllerError::NotInitialized)?;
        Ok(session.try_reap().is_some())
    }

    /// Collect the worker's exit code and end the session.
    ///
    /// Blocks until the worker exits if it is still running.
    pub fn exit_status(&mut self) -> Result<u8, ControllerError> {
        let mut session = self.session.take().ok_or(ControllerError::NotInitialized)?;
        // Unread records must not leave the worker blocked on a full pipe.
        session.channel = None;

        let code = match session.exit_code {
            Some(code) => code,
            None => match wait(session.worker) {
                Ok(status) => exit_code(status),
                Err(e) => {
                    tracing::error!(pid = %session.worker, error = %e, "failed to wait for worker");
                    WorkerExit::ENROLL_FAILED
                }
            },
        };

        tracing::info!(
            target = %session.target.display(),
            code,
            "enrollment finished: {}",
            WorkerExit::from_code(code)
        );
        Ok(code)
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.exit_code.is_some() || !session.status.is_active() {
            return;
        }
        if session.try_reap().is_some() {
            return;
        }

        tracing::warn!(pid = %session.worker, "killing enrollment worker on shutdown");
        if let Err(e) = signal_pid(session.worker, Signal::Kill) {
            tracing::warn!(pid = %session.worker, error = %e, "failed to kill worker");
        }
        if let Err(e) = wait(session.worker) {
            tracing::warn!(pid = %session.worker, error = %e, "failed to reap worker");
        }
    }
}

/// SIGTERM `pid`, wait up to `grace_period`, then SIGKILL and reap.
///
/// Returns `None` only if the worker could not be reaped at all.
fn terminate(pid: Pid, grace_period: Duration, reap_interval: Duration) -> Option<ExitStatus> {
    tracing::info!(%pid, "terminating enrollment worker");
    if let Err(e) = signal_pid(pid, Signal::Term) {
        tracing::warn!(%pid, error = %e, "failed to send SIGTERM");
    }

    match wait_timeout(pid, grace_period, reap_interval) {
        Ok(Some(status)) => return Some(status),
        Ok(None) => {
            tracing::warn!(%pid, ?grace_period, "worker still alive after grace period, killing it");
        }
        Err(e) => tracing::warn!(%pid, error = %e, "failed waiting for worker"),
    }

    if let Err(e) = signal_pid(pid, Signal::Kill) {
        tracing::warn!(%pid, error = %e, "failed to send SIGKILL");
    }
    match wait(pid) {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::error!(%pid, error = %e, "failed to reap worker");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Instant;

    use fpagent_core::{RetryReason, SetupFailure, StepCode};

    use crate::device::scripted::ScriptedProvider;
    use crate::device::{
        DeviceArtifact, DeviceCapability, DeviceError, DeviceHandle, Releaser, SaveError, StepResult,
    };

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn test_config(backend: Backend) -> ControllerConfig {
        ControllerConfig {
            backend,
            grace_period: Duration::from_millis(500),
            reap_interval: Duration::from_millis(10),
            storage_env: None,
        }
    }

    fn controller(script: &str) -> Controller {
        controller_with(script, Backend::Fprint)
    }

    fn controller_with(script: &str, backend: Backend) -> Controller {
        let provider = ScriptedProvider::new(script.parse().unwrap());
        Controller::new(test_config(backend), Arc::new(provider))
    }

    /// Poll until the worker has exited, collecting every update.
    fn poll_to_exit(controller: &mut Controller) -> Vec<StatusUpdate> {
        let deadline = Instant::now() + TIMEOUT;
        let mut updates = Vec::new();
        loop {
            match controller.poll().unwrap() {
                PollOutcome::Update(update) => updates.push(update),
                PollOutcome::Exited => return updates,
                PollOutcome::Nothing => {
                    assert!(Instant::now() < deadline, "worker did not exit");
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
        }
    }

    /// Poll until the next update arrives.
    fn next_update(controller: &mut Controller) -> StatusUpdate {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            match controller.poll().unwrap() {
                PollOutcome::Update(update) => return update,
                PollOutcome::Exited => panic!("worker exited"),
                PollOutcome::Nothing => {
                    assert!(Instant::now() < deadline, "no update");
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
        }
    }

    fn codes(updates: &[StatusUpdate]) -> Vec<i32> {
        updates.iter().map(StatusUpdate::code).collect()
    }

    #[test]
    fn test_operations_without_session() {
        let mut controller = controller("complete");

        assert!(matches!(controller.poll(), Err(ControllerError::NotInitialized)));
        assert!(matches!(controller.check_exited(), Err(ControllerError::NotInitialized)));
        assert!(matches!(controller.exit_status(), Err(ControllerError::NotInitialized)));
        assert!(matches!(controller.cancel(), Err(ControllerError::NotInitialized)));
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[test]
    fn test_begin_rejects_empty_target() {
        let mut controller = controller("complete");
        assert!(matches!(controller.begin(""), Err(ControllerError::InvalidTarget(_))));
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[test]
    fn test_no_device_reports_sentinel_then_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller("no-device");

        controller.begin(dir.path().join("user.tmpl")).unwrap();
        assert_eq!(controller.state(), SessionState::Running);

        let updates = poll_to_exit(&mut controller);
        assert_eq!(codes(&updates), vec![201]);
        assert_eq!(
            updates[0].kind,
            RecordKind::Setup {
                failure: SetupFailure::NoDevice
            }
        );
        assert_eq!(controller.state(), SessionState::Completed(201));

        assert_eq!(controller.exit_status().unwrap(), 201);
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[test]
    fn test_successful_enrollment() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("user.tmpl");
        let mut controller = controller("pass,pass,pass,complete");

        controller.begin(&target).unwrap();
        let updates = poll_to_exit(&mut controller);

        assert_eq!(codes(&updates), vec![3, 3, 3, 1]);
        assert_eq!(controller.poll().unwrap(), PollOutcome::Exited);
        assert_eq!(controller.exit_status().unwrap(), 0);
        assert!(target.exists());
    }

    #[test]
    fn test_setup_and_save_failures() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("user.tmpl");

        for (script, expected) in [
            ("init-fail", WorkerExit::INIT_FAILED),
            ("open-fail", WorkerExit::OPEN_FAILED),
            ("complete,save-fail", WorkerExit::SAVE_FAILED),
            ("pass,fail", WorkerExit::ENROLL_FAILED),
            ("pass,error", WorkerExit::ENROLL_FAILED),
        ] {
            let mut controller = controller(script);
            controller.begin(&target).unwrap();
            poll_to_exit(&mut controller);
            assert_eq!(controller.exit_status().unwrap(), expected, "script {script}");
        }
        assert!(!target.exists());
    }

    #[test]
    fn test_records_arrive_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut script = Vec::new();
        for _ in 0..50 {
            script.push("retry");
            script.push("pass");
        }
        script.push("complete");
        let mut controller = controller_with(&script.join(","), Backend::ThinkFinger);

        controller.begin(dir.path().join("user.bir")).unwrap();
        let updates = poll_to_exit(&mut controller);

        let mut expected: Vec<i32> = std::iter::repeat([6, 5]).take(50).flatten().collect();
        expected.push(7);
        assert_eq!(codes(&updates), expected);

        let last = updates.last().unwrap();
        assert_eq!(last.swipes, Some(SwipeCounters { success: 50, failed: 50 }));
        assert_eq!(controller.exit_status().unwrap(), 0);
    }

    #[test]
    fn test_fprint_does_not_report_counters() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller("center,complete");

        controller.begin(dir.path().join("user.tmpl")).unwrap();
        let updates = poll_to_exit(&mut controller);

        assert_eq!(
            updates[0].kind,
            RecordKind::Step {
                step: StepCode::Retry(RetryReason::CenterFinger)
            }
        );
        assert!(updates.iter().all(|u| u.swipes.is_none()));
        controller.exit_status().unwrap();
    }

    #[test]
    fn test_second_begin_rejected_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller("hang");

        controller.begin(dir.path().join("a")).unwrap();
        assert!(matches!(
            controller.begin(dir.path().join("b")),
            Err(ControllerError::AlreadyRunning)
        ));
        assert_eq!(controller.state(), SessionState::Running);

        controller.cancel().unwrap();
        assert_eq!(controller.exit_status().unwrap(), WorkerExit::TERMINATED);
    }

    #[test]
    fn test_cancel_mid_enrollment() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("released");
        let mut controller = controller(&format!("pass,hang,marker={}", marker.display()));

        controller.begin(dir.path().join("user.tmpl")).unwrap();
        assert_eq!(next_update(&mut controller).code(), 3);

        let started = Instant::now();
        controller.cancel().unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(controller.state(), SessionState::Killed);
        assert!(controller.check_exited().unwrap());

        // A second cancel is a no-op.
        controller.cancel().unwrap();
        assert_eq!(controller.state(), SessionState::Killed);

        assert_eq!(controller.exit_status().unwrap(), WorkerExit::TERMINATED);
        assert!(marker.exists(), "device was not released on termination");
    }

    #[test]
    fn test_cancel_escalates_to_kill() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller("hang,slow-release=5000");
        controller.config.grace_period = Duration::from_millis(100);

        controller.begin(dir.path().join("user.tmpl")).unwrap();
        // Let the worker install its termination handler.
        std::thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        controller.cancel().unwrap();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(controller.state(), SessionState::Killed);
        assert_eq!(controller.exit_status().unwrap(), WorkerExit::TERMINATED);
    }

    #[test]
    fn test_cancel_after_exit_keeps_code() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller("no-device");

        controller.begin(dir.path().join("user.tmpl")).unwrap();
        poll_to_exit(&mut controller);
        controller.cancel().unwrap();

        assert_eq!(controller.state(), SessionState::Completed(201));
        assert_eq!(controller.exit_status().unwrap(), 201);
    }

    #[test]
    fn test_check_exited_keeps_pending_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller("pass,complete");

        controller.begin(dir.path().join("user.tmpl")).unwrap();
        let deadline = Instant::now() + TIMEOUT;
        while !controller.check_exited().unwrap() {
            assert!(Instant::now() < deadline, "worker did not exit");
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(controller.state(), SessionState::Completed(0));

        assert_eq!(codes(&poll_to_exit(&mut controller)), vec![3, 1]);
        assert_eq!(controller.exit_status().unwrap(), 0);
    }

    #[test]
    fn test_exit_status_blocks_until_exit() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller("delay=100,pass,complete");

        controller.begin(dir.path().join("user.tmpl")).unwrap();
        assert_eq!(controller.exit_status().unwrap(), 0);
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(matches!(controller.poll(), Err(ControllerError::NotInitialized)));
    }

    #[test]
    fn test_exit_status_with_unread_records() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("user.tmpl");
        // More records than a pipe buffer holds.
        let mut script = vec!["retry"; 20_000];
        script.push("complete");
        let mut controller = controller(&script.join(","));

        controller.begin(&target).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(controller.exit_status().map_err(|e| e.to_string()));
        });

        let code = rx.recv_timeout(TIMEOUT).expect("exit_status did not return");
        assert_eq!(code.unwrap(), 0);
        assert!(target.exists());
    }

    #[test]
    fn test_begin_discards_uncollected_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller("no-device");

        controller.begin(dir.path().join("a")).unwrap();
        poll_to_exit(&mut controller);

        controller.begin(dir.path().join("b")).unwrap();
        assert_eq!(controller.state(), SessionState::Running);
        assert_eq!(codes(&poll_to_exit(&mut controller)), vec![201]);
        assert_eq!(controller.exit_status().unwrap(), 201);
    }

    /// Completes immediately and saves the storage variable it sees.
    struct StorageEcho;

    impl DeviceCapability for StorageEcho {
        fn init(&mut self) -> Result<(), DeviceError> {
            Ok(())
        }
        fn discover_devices(&mut self) -> Result<Vec<DeviceHandle>, DeviceError> {
            Ok(vec![DeviceHandle {
                id: "echo".to_string(),
                driver: "echo".to_string(),
            }])
        }
        fn open(&mut self, _device: &DeviceHandle) -> Result<(), DeviceError> {
            Ok(())
        }
        fn enroll_step(&mut self) -> Result<StepResult, DeviceError> {
            Ok(StepResult::Complete(DeviceArtifact::new(Vec::new())))
        }
        fn save_artifact(&mut self, _artifact: &DeviceArtifact, target: &Path) -> Result<(), SaveError> {
            let root = std::env::var("FPAGENT_TEST_STORAGE").unwrap_or_default();
            fs::write(target, root).map_err(|e| SaveError {
                code: -1,
                message: e.to_string(),
            })
        }
        fn releaser(&self) -> Releaser {
            Box::new(|| {})
        }
    }

    struct StorageEchoProvider;

    impl DeviceProvider for StorageEchoProvider {
        fn name(&self) -> &'static str {
            "storage-echo"
        }
        fn capability(&self) -> Result<Box<dyn DeviceCapability>, DeviceError> {
            Ok(Box::new(StorageEcho))
        }
    }

    #[test]
    fn test_worker_sees_storage_root() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("user.tmpl");
        let config = ControllerConfig {
            storage_env: Some("FPAGENT_TEST_STORAGE".to_string()),
            ..test_config(Backend::Fprint)
        };
        let mut controller = Controller::new(config, Arc::new(StorageEchoProvider));

        controller.begin(&target).unwrap();
        assert_eq!(controller.exit_status().unwrap(), 0);

        assert_eq!(fs::read_to_string(&target).unwrap(), dir.path().to_string_lossy());
        assert!(std::env::var("FPAGENT_TEST_STORAGE").is_err());
    }

    #[test]
    fn test_drop_kills_running_worker() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = controller("hang");
        controller.begin(dir.path().join("user.tmpl")).unwrap();
        let pid = controller.session.as_ref().unwrap().worker;

        drop(controller);

        // Already reaped by drop.
        assert!(try_wait(pid).is_err());
    }
}
