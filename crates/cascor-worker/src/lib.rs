pub mod cli;
pub mod config;
pub mod connector;
pub mod error;
pub mod pool;
pub mod process;
pub mod runtime;
pub mod shutdown;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::{StartMode, WorkerConfig};
pub use error::{ConfigError, Result, WorkerError};
pub use pool::{PoolState, WorkerPool};
pub use process::PidRegistry;
pub use runtime::{ExternalRuntime, Runtime};
pub use shutdown::ShutdownSignal;
pub use worker::RemoteWorker;
