//! Per-library code tables.
//!
//! Each scanning library reports steps with its own integers, and each
//! agent reserved its own sentinel range for setup failures. The policy is
//! the same everywhere: low codes are library step codes, the sentinels
//! sit above them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::record::{RecordKind, RetryReason, SetupFailure, StatusRecord, StepCode};

mod fprint {
    pub const COMPLETE: i32 = 1;
    pub const FAIL: i32 = 2;
    pub const PASS: i32 = 3;
    pub const RETRY: i32 = 100;
    pub const RETRY_TOO_SHORT: i32 = 101;
    pub const RETRY_CENTER_FINGER: i32 = 102;
    pub const RETRY_REMOVE_FINGER: i32 = 103;

    pub const INIT_FAILED: i32 = 200;
    pub const NO_DEVICES: i32 = 201;
    pub const DEVICE_OPEN_FAILED: i32 = 202;
}

mod thinkfinger {
    pub const SWIPE_SUCCESS: i32 = 5;
    pub const SWIPE_FAILED: i32 = 6;
    pub const ENROLL_SUCCESS: i32 = 7;
    pub const ACQUIRE_FAILED: i32 = 9;

    pub const INIT_FAILED: i32 = 500;
    pub const SET_FILE_FAILED: i32 = 600;
    pub const SET_CALLBACK_FAILED: i32 = 700;
}

/// Scanning library whose code table is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// libfprint: fine-grained retry reasons.
    #[default]
    Fprint,
    /// libthinkfinger: coarse swipe success/failure, reports swipe counters.
    ThinkFinger,
}

/// Error parsing a backend name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown backend: {0}")]
pub struct UnknownBackend(pub String);

impl Backend {
    /// Mount name used in request paths.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fprint => "fprint",
            Self::ThinkFinger => "thinkfinger",
        }
    }

    /// Path component that starts an enrollment.
    pub fn begin_command(&self) -> &'static str {
        match self {
            Self::Fprint => "enroll",
            Self::ThinkFinger => "add-user",
        }
    }

    /// Whether callers expect swipe success/failure counters with updates.
    pub fn reports_swipe_counters(&self) -> bool {
        matches!(self, Self::ThinkFinger)
    }

    /// Encode a step outcome.
    pub fn step_record(&self, step: StepCode) -> StatusRecord {
        let code = match self {
            Self::Fprint => match step {
                StepCode::Complete => fprint::COMPLETE,
                StepCode::Fail => fprint::FAIL,
                StepCode::Pass => fprint::PASS,
                StepCode::Retry(RetryReason::Generic) => fprint::RETRY,
                StepCode::Retry(RetryReason::TooShort) => fprint::RETRY_TOO_SHORT,
                StepCode::Retry(RetryReason::CenterFinger) => fprint::RETRY_CENTER_FINGER,
                StepCode::Retry(RetryReason::RemoveFinger) => fprint::RETRY_REMOVE_FINGER,
            },
            Self::ThinkFinger => match step {
                StepCode::Complete => thinkfinger::ENROLL_SUCCESS,
                StepCode::Fail => thinkfinger::ACQUIRE_FAILED,
                StepCode::Pass => thinkfinger::SWIPE_SUCCESS,
                StepCode::Retry(_) => thinkfinger::SWIPE_FAILED,
            },
        };
        StatusRecord::new(code)
    }

    /// Encode a setup-failure sentinel.
    pub fn setup_record(&self, failure: SetupFailure) -> StatusRecord {
        let code = match (self, failure) {
            (Self::Fprint, SetupFailure::Init) => fprint::INIT_FAILED,
            (Self::Fprint, SetupFailure::NoDevice) => fprint::NO_DEVICES,
            (Self::Fprint, SetupFailure::Open) => fprint::DEVICE_OPEN_FAILED,
            (Self::ThinkFinger, SetupFailure::Init) => thinkfinger::INIT_FAILED,
            (Self::ThinkFinger, SetupFailure::NoDevice) => thinkfinger::SET_FILE_FAILED,
            (Self::ThinkFinger, SetupFailure::Open) => thinkfinger::SET_CALLBACK_FAILED,
        };
        StatusRecord::new(code)
    }

    /// Interpret a record produced under this backend.
    pub fn classify(&self, record: StatusRecord) -> RecordKind {
        let as_step = |step| RecordKind::Step { step };
        let as_setup = |failure| RecordKind::Setup { failure };

        match self {
            Self::Fprint => match record.code() {
                fprint::COMPLETE => as_step(StepCode::Complete),
                fprint::FAIL => as_step(StepCode::Fail),
                fprint::PASS => as_step(StepCode::Pass),
                fprint::RETRY => as_step(StepCode::Retry(RetryReason::Generic)),
                fprint::RETRY_TOO_SHORT => as_step(StepCode::Retry(RetryReason::TooShort)),
                fprint::RETRY_CENTER_FINGER => as_step(StepCode::Retry(RetryReason::CenterFinger)),
                fprint::RETRY_REMOVE_FINGER => as_step(StepCode::Retry(RetryReason::RemoveFinger)),
                fprint::INIT_FAILED => as_setup(SetupFailure::Init),
                fprint::NO_DEVICES => as_setup(SetupFailure::NoDevice),
                fprint::DEVICE_OPEN_FAILED => as_setup(SetupFailure::Open),
                _ => RecordKind::Unknown,
            },
            Self::ThinkFinger => match record.code() {
                thinkfinger::ENROLL_SUCCESS => as_step(StepCode::Complete),
                thinkfinger::ACQUIRE_FAILED => as_step(StepCode::Fail),
                thinkfinger::SWIPE_SUCCESS => as_step(StepCode::Pass),
                thinkfinger::SWIPE_FAILED => as_step(StepCode::Retry(RetryReason::Generic)),
                thinkfinger::INIT_FAILED => as_setup(SetupFailure::Init),
                thinkfinger::SET_FILE_FAILED => as_setup(SetupFailure::NoDevice),
                thinkfinger::SET_CALLBACK_FAILED => as_setup(SetupFailure::Open),
                _ => RecordKind::Unknown,
            },
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fprint" => Ok(Self::Fprint),
            "thinkfinger" => Ok(Self::ThinkFinger),
            other => Err(UnknownBackend(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STEPS: [StepCode; 7] = [
        StepCode::Complete,
        StepCode::Fail,
        StepCode::Pass,
        StepCode::Retry(RetryReason::Generic),
        StepCode::Retry(RetryReason::TooShort),
        StepCode::Retry(RetryReason::CenterFinger),
        StepCode::Retry(RetryReason::RemoveFinger),
    ];

    const ALL_FAILURES: [SetupFailure; 3] =
        [SetupFailure::Init, SetupFailure::NoDevice, SetupFailure::Open];

    #[test]
    fn test_fprint_codes_match_library() {
        let b = Backend::Fprint;
        assert_eq!(b.step_record(StepCode::Complete).code(), 1);
        assert_eq!(b.step_record(StepCode::Fail).code(), 2);
        assert_eq!(b.step_record(StepCode::Pass).code(), 3);
        assert_eq!(b.step_record(StepCode::Retry(RetryReason::TooShort)).code(), 101);
        assert_eq!(b.setup_record(SetupFailure::NoDevice).code(), 201);
    }

    #[test]
    fn test_fprint_classify_is_exact() {
        let b = Backend::Fprint;
        for step in ALL_STEPS {
            assert_eq!(b.classify(b.step_record(step)), RecordKind::Step { step });
        }
        for failure in ALL_FAILURES {
            assert_eq!(b.classify(b.setup_record(failure)), RecordKind::Setup { failure });
        }
    }

    #[test]
    fn test_thinkfinger_collapses_retry_reasons() {
        let b = Backend::ThinkFinger;
        let record = b.step_record(StepCode::Retry(RetryReason::CenterFinger));
        assert_eq!(record.code(), 6);
        assert_eq!(
            b.classify(record),
            RecordKind::Step { step: StepCode::Retry(RetryReason::Generic) }
        );
        assert_eq!(b.setup_record(SetupFailure::Init).code(), 500);
    }

    #[test]
    fn test_sentinels_above_step_codes() {
        for backend in [Backend::Fprint, Backend::ThinkFinger] {
            let max_step = ALL_STEPS
                .iter()
                .map(|s| backend.step_record(*s).code())
                .max()
                .unwrap();
            for failure in ALL_FAILURES {
                assert!(backend.setup_record(failure).code() > max_step);
            }
        }
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(Backend::Fprint.classify(StatusRecord(-3)), RecordKind::Unknown);
        assert_eq!(Backend::ThinkFinger.classify(StatusRecord(1)), RecordKind::Unknown);
    }

    #[test]
    fn test_parse_backend() {
        assert_eq!("fprint".parse::<Backend>().unwrap(), Backend::Fprint);
        assert_eq!("thinkfinger".parse::<Backend>().unwrap(), Backend::ThinkFinger);
        assert!("bogus".parse::<Backend>().is_err());
        assert_eq!(Backend::ThinkFinger.to_string(), "thinkfinger");
        assert_eq!(Backend::ThinkFinger.begin_command(), "add-user");
    }
}
