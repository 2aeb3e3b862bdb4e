//! Command entry points.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use fpagent_core::{RecordKind, RetryReason, StatusUpdate, StepCode, SwipeCounters, WorkerExit};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::interval;

use crate::args::{Args, Command};
use crate::controller::{Controller, PollOutcome};
use crate::router::{Request, Response, Router};

/// Run the agent.
///
/// Returns the exit code to use.
pub async fn run(args: Args) -> Result<i32> {
    let controller = Controller::new(args.controller_config(), args.device_provider());
    let poll_interval = args.poll_interval();

    match args.command {
        None | Some(Command::Serve) => {
            serve(Router::new(controller)).await?;
            Ok(0)
        }
        Some(Command::Enroll { target }) => enroll(controller, &target, poll_interval).await,
    }
}

/// Answer one JSON request per stdin line with one JSON response line.
///
/// Returns when stdin closes; a running worker is killed when the
/// router is dropped.
async fn serve(mut router: Router) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("failed to read request")? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => router.handle(&request),
            Err(e) => {
                tracing::warn!(error = %e, "malformed request");
                Response {
                    result: serde_json::Value::Null,
                }
            }
        };

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await.context("failed to write response")?;
        stdout.flush().await?;
    }

    tracing::debug!("stdin closed");
    Ok(())
}

/// Enroll interactively, printing progress until the worker exits.
async fn enroll(mut controller: Controller, target: &Path, poll_interval: Duration) -> Result<i32> {
    // Installed before the worker exists so an early Ctrl+C still cancels.
    let mut interrupt = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;

    controller
        .begin(target)
        .with_context(|| format!("failed to start enrollment for {}", target.display()))?;
    println!("Swipe your finger on the sensor.");

    let mut ticker = interval(poll_interval);
    let mut swipes = SwipeCounters::default();

    let cancelled = loop {
        tokio::select! {
            _ = interrupt.recv() => break true,
            _ = ticker.tick() => {
                if drain_updates(&mut controller, &mut swipes)? {
                    break false;
                }
            }
        }
    };

    if cancelled {
        tracing::info!("interrupted, cancelling enrollment");
        controller.cancel()?;
    }

    let exit = WorkerExit::from_code(controller.exit_status()?);
    if exit.is_success() {
        println!("{exit}");
    } else {
        eprintln!("{exit}");
    }
    Ok(i32::from(exit))
}

/// Print every pending update. Returns true once the worker has exited.
fn drain_updates(controller: &mut Controller, swipes: &mut SwipeCounters) -> Result<bool> {
    loop {
        match controller.poll()? {
            PollOutcome::Nothing => return Ok(false),
            PollOutcome::Exited => return Ok(true),
            PollOutcome::Update(update) => {
                swipes.observe(update.kind);
                println!("{}", describe(&update, update.swipes.unwrap_or(*swipes)));
            }
        }
    }
}

/// User-facing message for one status update.
fn describe(update: &StatusUpdate, swipes: SwipeCounters) -> String {
    match update.kind {
        RecordKind::Step { step } => match step {
            StepCode::Complete => "Storing data...".to_string(),
            StepCode::Fail => "Acquiring fingerprint failed.".to_string(),
            StepCode::Pass => format!(
                "Enroll stage passed ({} successful swipes). Swipe your finger again.",
                swipes.success
            ),
            StepCode::Retry(reason) => {
                let hint = match reason {
                    RetryReason::Generic => "Swipe your finger again.",
                    RetryReason::TooShort => "The swipe was too short, try again.",
                    RetryReason::CenterFinger => "Center your finger on the sensor and try again.",
                    RetryReason::RemoveFinger => "Remove your finger from the sensor and try again.",
                };
                format!("Scan failed ({} failed swipes). {hint}", swipes.failed)
            }
        },
        RecordKind::Setup { .. } => "Initialization of the fingerprint reader failed.".to_string(),
        RecordKind::Unknown => format!("Unknown device state {}.", update.code()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpagent_core::{Backend, SetupFailure};

    fn update(backend: Backend, step: StepCode) -> StatusUpdate {
        let record = backend.step_record(step);
        StatusUpdate {
            record,
            kind: backend.classify(record),
            swipes: None,
        }
    }

    #[test]
    fn test_describe_steps() {
        let swipes = SwipeCounters { success: 2, failed: 1 };

        assert_eq!(
            describe(&update(Backend::Fprint, StepCode::Pass), swipes),
            "Enroll stage passed (2 successful swipes). Swipe your finger again."
        );
        assert_eq!(
            describe(&update(Backend::Fprint, StepCode::Retry(RetryReason::TooShort)), swipes),
            "Scan failed (1 failed swipes). The swipe was too short, try again."
        );
        assert_eq!(
            describe(&update(Backend::ThinkFinger, StepCode::Complete), swipes),
            "Storing data..."
        );
    }

    #[test]
    fn test_describe_setup_and_unknown() {
        let record = Backend::Fprint.setup_record(SetupFailure::NoDevice);
        let setup = StatusUpdate {
            record,
            kind: Backend::Fprint.classify(record),
            swipes: None,
        };
        assert_eq!(
            describe(&setup, SwipeCounters::default()),
            "Initialization of the fingerprint reader failed."
        );

        let record = fpagent_core::StatusRecord::new(42);
        let unknown = StatusUpdate {
            record,
            kind: RecordKind::Unknown,
            swipes: None,
        };
        assert_eq!(describe(&unknown, SwipeCounters::default()), "Unknown device state 42.");
    }
}
