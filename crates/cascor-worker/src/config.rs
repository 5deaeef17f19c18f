//! Worker configuration

use crate::error::ConfigError;
use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Prefix of the environment overrides read by [`WorkerConfig::from_env`].
pub const ENV_PREFIX: &str = "CASCOR";

/// The only environment variables [`WorkerConfig::from_env`] consults.
pub const ENV_OVERRIDES: [&str; 5] = [
    "CASCOR_MANAGER_HOST",
    "CASCOR_MANAGER_PORT",
    "CASCOR_AUTHKEY",
    "CASCOR_NUM_WORKERS",
    "CASCOR_MP_CONTEXT",
];

/// How worker processes are created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartMode {
    /// Inherit the environment, run in a separate process group
    #[default]
    Forkserver,
    /// Start from a cleared environment
    Spawn,
    /// Inherit environment and process group
    Fork,
}

impl StartMode {
    pub const ALL: [StartMode; 3] = [StartMode::Forkserver, StartMode::Spawn, StartMode::Fork];

    pub fn as_str(&self) -> &'static str {
        match self {
            StartMode::Forkserver => "forkserver",
            StartMode::Spawn => "spawn",
            StartMode::Fork => "fork",
        }
    }
}

impl fmt::Display for StartMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StartMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StartMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| ConfigError::InvalidStartMode(s.to_string()))
    }
}

/// Connection and process settings for a remote worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Hostname of the training manager
    pub manager_host: String,
    /// Port of the training manager
    pub manager_port: u32,
    /// Shared secret for the manager handshake
    pub authkey: String,
    /// Number of local worker processes
    pub num_workers: usize,
    /// Task queue poll timeout handed to each worker loop
    pub task_queue_timeout_secs: u64,
    /// Per-process wait before a worker is terminated on stop
    pub stop_timeout_secs: u64,
    /// Upper bound on the manager handshake
    pub connect_timeout_secs: u64,
    /// Process start mode: forkserver, spawn or fork
    pub mp_context: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            manager_host: "127.0.0.1".to_string(),
            manager_port: 50000,
            authkey: "juniper".to_string(),
            num_workers: 1,
            task_queue_timeout_secs: 5,
            stop_timeout_secs: 10,
            connect_timeout_secs: 30,
            mp_context: StartMode::default().to_string(),
        }
    }
}

impl WorkerConfig {
    /// Build a configuration from the `CASCOR_*` environment variables.
    ///
    /// Unset variables keep their defaults. Values are not range-checked
    /// here; call [`WorkerConfig::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Same as [`WorkerConfig::from_env`] over an explicit variable set.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let overrides: config::Map<String, String> = vars
            .into_iter()
            .filter(|(key, _)| ENV_OVERRIDES.contains(&key.as_str()))
            .collect();

        let settings = Config::builder()
            .add_source(Environment::with_prefix(ENV_PREFIX).source(Some(overrides)))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Load a YAML configuration file. Missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers < 1 {
            return Err(ConfigError::InvalidWorkerCount(self.num_workers));
        }
        if !(1..=65535).contains(&self.manager_port) {
            return Err(ConfigError::InvalidPort(self.manager_port));
        }
        self.start_mode()?;
        Ok(())
    }

    pub fn start_mode(&self) -> Result<StartMode, ConfigError> {
        self.mp_context.parse()
    }

    /// Manager address as `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.manager_host, self.manager_port)
    }

    pub fn task_queue_timeout(&self) -> Duration {
        Duration::from_secs(self.task_queue_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
