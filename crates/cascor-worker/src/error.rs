use thiserror::Error;

/// Invalid or unreadable worker configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("num_workers must be >= 1, got {0}")]
    InvalidWorkerCount(usize),

    #[error("manager_port must be 1-65535, got {0}")]
    InvalidPort(u32),

    #[error("Invalid mp_context: {0}")]
    InvalidStartMode(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

impl ConfigError {
    /// Configuration field a validation error refers to.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ConfigError::InvalidWorkerCount(_) => Some("num_workers"),
            ConfigError::InvalidPort(_) => Some("manager_port"),
            ConfigError::InvalidStartMode(_) => Some("mp_context"),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::InvalidValue(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to connect to manager at {address}: {source}")]
    Connection {
        address: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("CasCor runtime not found: {0}")]
    DependencyNotFound(String),

    #[error("Not connected. Call connect() first.")]
    NotConnected,

    #[error("Failed to spawn worker process {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, WorkerError>;
