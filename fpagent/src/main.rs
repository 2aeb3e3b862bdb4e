//! fpagent - fingerprint enrollment agent.
//!
//! Each enrollment:
//! - Runs in a forked worker that owns the scanning device
//! - Reports progress as fixed-size status records over a pipe
//! - Ends with an exit code that says how it went
//! - Can be cancelled; the device is released either way

mod args;
mod controller;
mod device;
mod router;
mod run;
mod worker;

use args::Args;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize logging; stdout carries responses in serve mode.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!(backend = %args.backend, device = ?args.device, "fpagent started");

    let exit_code = match run::run(args).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("fpagent error: {:#}", e);
            1
        }
    };

    std::process::exit(exit_code);
}
