//! Simulated scanner driven by a textual script.
//!
//! A script is a comma-separated list of tokens:
//!
//! | Token | Effect |
//! |-------|--------|
//! | `init-fail`, `no-device`, `open-fail` | fail the matching setup stage |
//! | `pass`, `fail`, `complete` | one enrollment step with that outcome |
//! | `retry`, `too-short`, `center`, `remove` | one retry step with that reason |
//! | `error` | one step that fails at the library level |
//! | `hang` | one step that never returns |
//! | `save-fail` | saving the artifact fails |
//! | `delay=MS` | sleep before every step |
//! | `slow-release=MS` | sleep while releasing the device |
//! | `marker=PATH` | write `PATH` when the device is released |
//!
//! Running out of steps is a library-level step error.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use fpagent_core::RetryReason;

use super::{
    DeviceArtifact, DeviceCapability, DeviceError, DeviceHandle, DeviceProvider, Releaser,
    SaveError, StepResult,
};

/// Error code reported when a scripted save fails.
const SAVE_FAILED_CODE: i32 = -libc::EIO;

/// One scripted enrollment step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptStep {
    Pass,
    Retry(RetryReason),
    Fail,
    Complete,
    Error,
    Hang,
}

/// Error parsing a device script.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("unknown script token: {0}")]
    UnknownToken(String),

    #[error("invalid duration in {0}")]
    InvalidDuration(String),
}

/// What the simulated scanner does, stage by stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceScript {
    pub init_fails: bool,
    pub no_device: bool,
    pub open_fails: bool,
    pub steps: Vec<ScriptStep>,
    pub save_fails: bool,
    pub step_delay: Duration,
    pub release_delay: Duration,
    pub release_marker: Option<PathBuf>,
}

impl Default for DeviceScript {
    fn default() -> Self {
        Self {
            init_fails: false,
            no_device: false,
            open_fails: false,
            steps: vec![
                ScriptStep::Pass,
                ScriptStep::Pass,
                ScriptStep::Pass,
                ScriptStep::Complete,
            ],
            save_fails: false,
            step_delay: Duration::ZERO,
            release_delay: Duration::ZERO,
            release_marker: None,
        }
    }
}

fn parse_millis(token: &str, value: &str) -> Result<Duration, ScriptError> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ScriptError::InvalidDuration(token.to_string()))
}

impl FromStr for DeviceScript {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut script = DeviceScript {
            steps: Vec::new(),
            ..Default::default()
        };

        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if let Some((key, value)) = token.split_once('=') {
                match key {
                    "delay" => script.step_delay = parse_millis(token, value)?,
                    "slow-release" => script.release_delay = parse_millis(token, value)?,
                    "marker" => script.release_marker = Some(PathBuf::from(value)),
                    _ => return Err(ScriptError::UnknownToken(token.to_string())),
                }
                continue;
            }

            match token {
                "init-fail" => script.init_fails = true,
                "no-device" => script.no_device = true,
                "open-fail" => script.open_fails = true,
                "save-fail" => script.save_fails = true,
                "pass" => script.steps.push(ScriptStep::Pass),
                "fail" => script.steps.push(ScriptStep::Fail),
                "complete" => script.steps.push(ScriptStep::Complete),
                "retry" => script.steps.push(ScriptStep::Retry(RetryReason::Generic)),
                "too-short" => script.steps.push(ScriptStep::Retry(RetryReason::TooShort)),
                "center" => script.steps.push(ScriptStep::Retry(RetryReason::CenterFinger)),
                "remove" => script.steps.push(ScriptStep::Retry(RetryReason::RemoveFinger)),
                "error" => script.steps.push(ScriptStep::Error),
                "hang" => script.steps.push(ScriptStep::Hang),
                other => return Err(ScriptError::UnknownToken(other.to_string())),
            }
        }

        Ok(script)
    }
}

/// Provider handing out [`ScriptedDevice`]s that all follow one script.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    script: DeviceScript,
}

impl ScriptedProvider {
    pub fn new(script: DeviceScript) -> Self {
        Self { script }
    }
}

impl DeviceProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn capability(&self) -> Result<Box<dyn DeviceCapability>, DeviceError> {
        Ok(Box::new(ScriptedDevice::new(self.script.clone())))
    }
}

/// A simulated scanner.
#[derive(Debug)]
pub struct ScriptedDevice {
    script: DeviceScript,
    pending: VecDeque<ScriptStep>,
    passes: u32,
}

impl ScriptedDevice {
    pub fn new(script: DeviceScript) -> Self {
        let pending = script.steps.iter().copied().collect();
        Self {
            script,
            pending,
            passes: 0,
        }
    }

    fn artifact(&self) -> DeviceArtifact {
        DeviceArtifact::new(format!("scripted-template passes={}\n", self.passes).into_bytes())
    }
}

impl DeviceCapability for ScriptedDevice {
    fn init(&mut self) -> Result<(), DeviceError> {
        if self.script.init_fails {
            return Err(DeviceError::Init("scripted init failure".to_string()));
        }
        Ok(())
    }

    fn discover_devices(&mut self) -> Result<Vec<DeviceHandle>, DeviceError> {
        if self.script.no_device {
            return Ok(Vec::new());
        }
        Ok(vec![DeviceHandle {
            id: "scripted-0".to_string(),
            driver: "Scripted sensor".to_string(),
        }])
    }

    fn open(&mut self, device: &DeviceHandle) -> Result<(), DeviceError> {
        if self.script.open_fails {
            return Err(DeviceError::Open(format!("scripted open failure on {}", device.id)));
        }
        Ok(())
    }

    fn enroll_step(&mut self) -> Result<StepResult, DeviceError> {
        if !self.script.step_delay.is_zero() {
            thread::sleep(self.script.step_delay);
        }

        let step = self
            .pending
            .pop_front()
            .ok_or_else(|| DeviceError::Step("script exhausted".to_string()))?;

        match step {
            ScriptStep::Pass => {
                self.passes += 1;
                Ok(StepResult::Pass)
            }
            ScriptStep::Retry(reason) => Ok(StepResult::Retry(reason)),
            ScriptStep::Fail => Ok(StepResult::Fail),
            ScriptStep::Complete => Ok(StepResult::Complete(self.artifact())),
            ScriptStep::Error => Err(DeviceError::Step("scripted device error".to_string())),
            ScriptStep::Hang => loop {
                thread::park();
            },
        }
    }

    fn save_artifact(&mut self, artifact: &DeviceArtifact, target: &Path) -> Result<(), SaveError> {
        if self.script.save_fails {
            return Err(SaveError {
                code: SAVE_FAILED_CODE,
                message: "scripted save failure".to_string(),
            });
        }

        fs::write(target, artifact.as_bytes()).map_err(|e| SaveError {
            code: -e.raw_os_error().unwrap_or(libc::EIO),
            message: format!("{}: {}", target.display(), e),
        })
    }

    fn releaser(&self) -> Releaser {
        let delay = self.script.release_delay;
        let marker = self.script.release_marker.clone();
        Box::new(move || {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            if let Some(marker) = marker {
                if let Err(e) = fs::write(&marker, b"released\n") {
                    tracing::warn!(path = %marker.display(), error = %e, "failed to write release marker");
                }
            }
        })
    }
}
