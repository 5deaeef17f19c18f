//! Command line entry point for `cascor-worker`.

use crate::config::{StartMode, WorkerConfig};
use crate::error::{ConfigError, Result};
use crate::runtime::{ExternalRuntime, DEFAULT_RUNTIME_PROGRAM};
use crate::shutdown::ShutdownSignal;
use crate::worker::RemoteWorker;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How often the driver checks that workers are still alive.
pub const LIVENESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "cascor-worker")]
#[command(about = "Remote candidate training worker for a CasCor manager", long_about = None)]
pub struct Args {
    /// YAML configuration file used as the base before flag overrides
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Manager hostname or IP
    #[arg(long)]
    pub manager_host: Option<String>,

    /// Manager port
    #[arg(long)]
    pub manager_port: Option<u32>,

    /// Shared authentication secret
    #[arg(long)]
    pub authkey: Option<String>,

    /// Number of worker processes
    #[arg(long)]
    pub workers: Option<usize>,

    /// Process start method
    #[arg(long, value_parser = ["forkserver", "spawn", "fork"])]
    pub mp_context: Option<String>,

    /// Seconds to wait for each worker before terminating it
    #[arg(long)]
    pub stop_timeout: Option<u64>,

    #[arg(long, value_enum, ignore_case = true, default_value = "INFO")]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Directory searched for the CasCor runtime before PATH (repeatable)
    #[arg(long)]
    pub cascor_path: Vec<PathBuf>,

    /// Program name of the CasCor runtime
    #[arg(long, default_value = DEFAULT_RUNTIME_PROGRAM)]
    pub runtime: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    #[value(name = "DEBUG")]
    Debug,
    #[value(name = "INFO")]
    Info,
    #[value(name = "WARNING")]
    Warning,
    #[value(name = "ERROR")]
    Error,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl Args {
    /// Configuration file (or defaults) with the flags applied on top.
    pub fn to_config(&self) -> std::result::Result<WorkerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => WorkerConfig::from_file(path)?,
            None => WorkerConfig::default(),
        };

        if let Some(host) = &self.manager_host {
            config.manager_host = host.clone();
        }
        if let Some(port) = self.manager_port {
            config.manager_port = port;
        }
        if let Some(authkey) = &self.authkey {
            config.authkey = authkey.clone();
        }
        if let Some(workers) = self.workers {
            config.num_workers = workers;
        }
        if let Some(mp_context) = &self.mp_context {
            config.mp_context = mp_context.parse::<StartMode>()?.to_string();
        }
        if let Some(secs) = self.stop_timeout {
            config.stop_timeout_secs = secs;
        }

        Ok(config)
    }

    /// Runtime lookup honoring `--runtime` and `--cascor-path`.
    pub fn runtime(&self) -> ExternalRuntime {
        self.cascor_path
            .iter()
            .rev()
            .fold(ExternalRuntime::new(&self.runtime), |runtime, dir| {
                runtime.prepend_search_path(dir)
            })
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
pub fn init_tracing(level: LogLevel, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.directive()));

    let (text, json) = if json {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (
            Some(tracing_subscriber::fmt::layer().with_target(false)),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();
}

/// Connect, start the pool and block until shutdown or until every worker
/// has exited. The worker is always disconnected before returning.
pub async fn run(
    worker: &mut RemoteWorker,
    shutdown: &ShutdownSignal,
    poll: Duration,
) -> Result<()> {
    let outcome = serve(worker, shutdown, poll).await;

    worker.disconnect().await;
    info!("Worker shut down.");

    outcome
}

async fn serve(worker: &mut RemoteWorker, shutdown: &ShutdownSignal, poll: Duration) -> Result<()> {
    worker.connect().await?;
    if shutdown.is_requested() {
        return Ok(());
    }

    worker.start(None).await?;
    info!(
        "Worker running ({} processes) - connected to {}. Press Ctrl+C to stop.",
        worker.worker_count(),
        worker.config().address()
    );

    wait_for_shutdown(worker, shutdown, poll).await;
    Ok(())
}

async fn wait_for_shutdown(worker: &mut RemoteWorker, shutdown: &ShutdownSignal, poll: Duration) {
    loop {
        if shutdown.is_requested() {
            return;
        }
        if !worker.is_running() {
            warn!("All worker processes have exited");
            return;
        }

        tokio::select! {
            _ = shutdown.requested() => {}
            _ = tokio::time::sleep(poll) => {}
        }
    }
}
