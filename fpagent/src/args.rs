//! CLI argument parsing.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use fpagent_core::Backend;

use crate::controller::{ControllerConfig, DEFAULT_REAP_INTERVAL, DEFAULT_STORAGE_ENV};
use crate::device::scripted::{DeviceScript, ScriptedProvider};
use crate::device::DeviceProvider;

/// Fingerprint enrollment agent - runs enrollment in an isolated worker.
#[derive(Parser, Debug)]
#[command(name = "fpagent", version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Code table: fprint or thinkfinger
    #[arg(long, default_value = "fprint", global = true)]
    pub backend: Backend,

    /// Scanning device implementation
    #[arg(long, value_enum, default_value_t = DeviceKind::Scripted, global = true)]
    pub device: DeviceKind,

    /// Script for the scripted device (comma-separated steps)
    #[arg(long, default_value = "pass,pass,pass,complete", global = true)]
    pub script: DeviceScript,

    /// Milliseconds a cancelled worker gets before it is killed
    #[arg(long, default_value = "3000", global = true)]
    pub grace_period_ms: u64,

    /// Milliseconds between status polls in `enroll`
    #[arg(long, default_value = "100", global = true)]
    pub poll_interval_ms: u64,

    /// Variable the worker receives the storage root in (empty to disable)
    #[arg(long, default_value = DEFAULT_STORAGE_ENV, global = true)]
    pub storage_env: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Answer JSON-line requests on stdin (default)
    Serve,

    /// Enroll one finger interactively
    Enroll {
        /// Where the enrolled template is stored
        #[arg(long, value_name = "PATH")]
        target: PathBuf,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Simulated scanner following --script
    Scripted,
    /// System libfprint
    #[cfg(feature = "libfprint")]
    Libfprint,
}

impl Args {
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            backend: self.backend,
            grace_period: Duration::from_millis(self.grace_period_ms),
            reap_interval: DEFAULT_REAP_INTERVAL,
            storage_env: Some(self.storage_env.clone()).filter(|var| !var.is_empty()),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn device_provider(&self) -> Arc<dyn DeviceProvider> {
        match self.device {
            DeviceKind::Scripted => Arc::new(ScriptedProvider::new(self.script.clone())),
            #[cfg(feature = "libfprint")]
            DeviceKind::Libfprint => Arc::new(crate::device::fprint::FprintProvider),
        }
    }
}
