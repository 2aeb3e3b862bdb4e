//! # fpagent core
//!
//! Pure domain types for the fingerprint enrollment agent.
//!
//! This crate is intentionally **IO-free**: no processes, no pipes, no
//! device access. It defines what travels between a worker and its
//! controller and how to read it:
//!
//! - [`record`] - status records and the step vocabulary
//! - [`backend`] - per-library step codes and setup sentinels
//! - [`exit`] - the worker exit-code convention
//! - [`session`] - controller state machine types

pub mod backend;
pub mod exit;
pub mod record;
pub mod session;

pub use backend::{Backend, UnknownBackend};
pub use exit::WorkerExit;
pub use record::{RecordKind, RetryReason, SetupFailure, StatusRecord, StepCode};
pub use session::{SessionState, StatusUpdate, SwipeCounters};
