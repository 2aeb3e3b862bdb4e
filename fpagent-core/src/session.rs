//! Enrollment session state machine types.
//!
//! `Idle → Running → (Completed(code) | Killed) → Idle`

use serde::{Deserialize, Serialize};

use crate::record::{RecordKind, StatusRecord, StepCode};

/// Lifecycle state of the controller's enrollment session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "code")]
pub enum SessionState {
    /// No session; begin may be called.
    Idle,
    /// A worker is (or may still be) alive.
    Running,
    /// The worker exited on its own with this code.
    Completed(u8),
    /// The worker was cancelled.
    Killed,
}

impl SessionState {
    /// Returns true if the session's worker has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Killed)
    }

    /// Returns true if a worker may still be alive.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Swipe counters derived from the records seen so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SwipeCounters {
    pub success: u32,
    pub failed: u32,
}

impl SwipeCounters {
    /// Account for one classified record.
    pub fn observe(&mut self, kind: RecordKind) {
        match kind {
            RecordKind::Step { step: StepCode::Pass } => self.success += 1,
            RecordKind::Step { step: StepCode::Retry(_) } => self.failed += 1,
            _ => {}
        }
    }
}

/// Caller-visible form of one status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub record: StatusRecord,
    pub kind: RecordKind,
    /// Present only for backends that report swipe counters.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub swipes: Option<SwipeCounters>,
}

impl StatusUpdate {
    pub fn code(&self) -> i32 {
        self.record.code()
    }
}
