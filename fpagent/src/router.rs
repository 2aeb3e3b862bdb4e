//! Path-addressed request router.
//!
//! Maps `(operation, path)` requests from a host onto controller calls.
//! Paths are dotted (`.fprint.state`); the leading mount component is
//! optional.
//!
//! | Request | Result |
//! |---------|--------|
//! | `execute <begin command>` with a target string | `true` if the worker started |
//! | `read state` | `null`, `{}` or `{"state": code, ...}` |
//! | `execute cancel` | `true` |
//! | `read exit_status` | worker exit code |
//! | `read check_exit` | `true` once the worker is gone |
//! | `read` on the root | `"0"` |
//! | `write` | `false` |
//! | `dir`, anything else | `null` |

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use fpagent_core::Backend;

use crate::controller::{Controller, ControllerError, PollOutcome};

/// Request operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Read,
    Write,
    Execute,
    Dir,
}

/// One host request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub op: Op,
    pub path: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
}

/// Response to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub result: Value,
}

pub struct Router {
    controller: Controller,
    backend: Backend,
}

impl Router {
    pub fn new(controller: Controller) -> Self {
        let backend = controller.config().backend;
        Self { controller, backend }
    }

    /// Split a dotted path, dropping empty components and the mount name.
    fn components<'a>(&self, path: &'a str) -> Vec<&'a str> {
        let mut components: Vec<&str> = path.split('.').filter(|c| !c.is_empty()).collect();
        if components.first() == Some(&self.backend.name()) {
            components.remove(0);
        }
        components
    }

    pub fn handle(&mut self, request: &Request) -> Response {
        let components = self.components(&request.path);
        tracing::debug!(op = ?request.op, path = %request.path, state = ?self.controller.state(), "request");

        let result = match (request.op, components.as_slice()) {
            (Op::Read, []) => json!("0"),
            (Op::Read, ["state"]) => self.read_state(),
            (Op::Read, ["check_exit"]) => self.check_exit(),
            (Op::Read, ["exit_status"]) => self.exit_status(),
            (Op::Execute, ["cancel"]) => self.cancel(),
            (Op::Execute, [command]) if *command == self.backend.begin_command() => {
                self.begin(&request.value)
            }
            (Op::Write, _) => Value::Bool(false),
            (Op::Dir, _) => {
                tracing::error!(path = %request.path, "directory listing is not supported");
                Value::Null
            }
            _ => {
                tracing::error!(op = ?request.op, path = %request.path, "unknown path");
                Value::Null
            }
        };
        Response { result }
    }

    fn begin(&mut self, value: &Value) -> Value {
        let target = match value.as_str() {
            Some(target) if !target.is_empty() => target,
            _ => {
                tracing::error!("path to the target file is missing");
                return Value::Bool(false);
            }
        };

        match self.controller.begin(target) {
            Ok(()) => Value::Bool(true),
            Err(e) => {
                tracing::error!(error = %e, "could not start enrollment");
                Value::Bool(false)
            }
        }
    }

    fn read_state(&mut self) -> Value {
        match self.controller.poll() {
            Ok(PollOutcome::Nothing) => json!({}),
            Ok(PollOutcome::Exited) => Value::Null,
            Ok(PollOutcome::Update(update)) => {
                let mut state = json!({ "state": update.code() });
                if let Some(swipes) = update.swipes {
                    state["swipe_success"] = json!(swipes.success);
                    state["swipe_failed"] = json!(swipes.failed);
                }
                state
            }
            Err(ControllerError::NotInitialized) => {
                tracing::error!("enrollment not initialized yet");
                Value::Null
            }
            Err(e) => {
                tracing::error!(error = %e, "reading state failed");
                Value::Null
            }
        }
    }

    fn cancel(&mut self) -> Value {
        match self.controller.cancel() {
            Ok(()) => {}
            Err(ControllerError::NotInitialized) => tracing::debug!("nothing to cancel"),
            Err(e) => tracing::error!(error = %e, "cancel failed"),
        }
        Value::Bool(true)
    }

    fn check_exit(&mut self) -> Value {
        match self.controller.check_exited() {
            Ok(exited) => Value::Bool(exited),
            // Nothing is running, so nothing is left to exit.
            Err(ControllerError::NotInitialized) => Value::Bool(true),
            Err(e) => {
                tracing::error!(error = %e, "checking worker exit failed");
                Value::Bool(false)
            }
        }
    }

    fn exit_status(&mut self) -> Value {
        match self.controller.exit_status() {
            Ok(code) => json!(code),
            Err(e) => {
                tracing::error!(error = %e, "no exit status to collect");
                Value::Null
            }
        }
    }
}
