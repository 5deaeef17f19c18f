//! Seams to the external CasCor runtime.
//!
//! The training manager, its queues and the candidate training loop live
//! outside this crate. They are reached only through the traits below, so
//! the supervisor can be driven by the real runtime or by test doubles.

use crate::config::StartMode;
use crate::connector::TcpConnector;
use crate::error::{Result, WorkerError};
use crate::process::ProcessWorkerLoop;
use async_trait::async_trait;
use cascor_protocol::{AuthKey, QueueHandle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Program name of the external runtime looked up on the search path.
pub const DEFAULT_RUNTIME_PROGRAM: &str = "cascor-runtime";

/// A queue owned by the manager.
#[async_trait]
pub trait SharedQueue: Send + Sync {
    /// Serializable handle passed to worker processes
    fn handle(&self) -> &QueueHandle;

    /// Enqueue an item; `None` is the stop sentinel
    async fn put(&self, item: Option<Vec<u8>>) -> anyhow::Result<()>;
}

/// Live session with a training manager.
#[async_trait]
pub trait Manager: Send + Sync {
    async fn get_task_queue(&self) -> anyhow::Result<Arc<dyn SharedQueue>>;

    async fn get_result_queue(&self) -> anyhow::Result<Arc<dyn SharedQueue>>;

    /// Release the session. Must not fail.
    async fn close(&self);
}

#[async_trait]
pub trait ManagerConnector: Send + Sync {
    async fn connect(
        &self,
        address: &str,
        authkey: &AuthKey,
        timeout: Duration,
    ) -> anyhow::Result<Box<dyn Manager>>;
}

/// Arguments every worker process is started with.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub task_queue: QueueHandle,
    pub result_queue: QueueHandle,
    /// Worker runs against a remote manager rather than an in-process one
    pub remote: bool,
    pub authkey: AuthKey,
    pub start_mode: StartMode,
    pub task_queue_timeout: Duration,
}

/// Entry point that starts one worker process.
pub trait WorkerLoop: Send + Sync {
    fn spawn(&self, name: &str, spec: &WorkerSpec) -> std::io::Result<Box<dyn WorkerProcess>>;
}

/// A running worker process.
#[async_trait]
pub trait WorkerProcess: Send {
    fn name(&self) -> &str;

    fn pid(&self) -> Option<u32>;

    /// Queried from the OS on every call.
    fn is_alive(&mut self) -> bool;

    /// Wait up to `timeout` for the process to exit. Returns whether it did.
    async fn join(&mut self, timeout: Duration) -> bool;

    /// Ask the process to exit (SIGTERM for OS processes).
    fn terminate(&mut self) -> std::io::Result<()>;
}

/// Resolves the external collaborators.
///
/// Resolution failures are [`WorkerError::DependencyNotFound`] and are not
/// retried.
pub trait Runtime: Send + Sync {
    fn manager_connector(&self) -> Result<Arc<dyn ManagerConnector>>;

    fn worker_loop(&self) -> Result<Arc<dyn WorkerLoop>>;
}

/// The CasCor runtime installed as an executable.
///
/// Looked up in the extra search directories first, then `PATH`.
#[derive(Debug, Clone)]
pub struct ExternalRuntime {
    program: String,
    search_path: Vec<PathBuf>,
    use_system_path: bool,
}

impl ExternalRuntime {
    pub fn new(program: impl Into<String>) -> Self {
        ExternalRuntime {
            program: program.into(),
            search_path: Vec::new(),
            use_system_path: true,
        }
    }

    /// Search `dir` before every directory added so far.
    pub fn prepend_search_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_path.insert(0, dir.into());
        self
    }

    /// Ignore `PATH` and only use the explicit search directories.
    pub fn without_system_path(mut self) -> Self {
        self.use_system_path = false;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Path of the runtime executable, if installed.
    pub fn locate(&self) -> Option<PathBuf> {
        let program = Path::new(&self.program);
        if program.components().count() > 1 {
            return is_executable(program).then(|| program.to_path_buf());
        }

        let system = if self.use_system_path {
            std::env::var_os("PATH")
                .map(|path| std::env::split_paths(&path).collect::<Vec<_>>())
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        self.search_path
            .iter()
            .chain(system.iter())
            .map(|dir| dir.join(&self.program))
            .find(|candidate| is_executable(candidate))
    }

    fn require(&self) -> Result<PathBuf> {
        self.locate().ok_or_else(|| {
            WorkerError::DependencyNotFound(format!(
                "`{}` is not on --cascor-path or PATH",
                self.program
            ))
        })
    }
}

impl Default for ExternalRuntime {
    fn default() -> Self {
        ExternalRuntime::new(DEFAULT_RUNTIME_PROGRAM)
    }
}

impl Runtime for ExternalRuntime {
    fn manager_connector(&self) -> Result<Arc<dyn ManagerConnector>> {
        self.require()?;
        Ok(Arc::new(TcpConnector))
    }

    fn worker_loop(&self) -> Result<Arc<dyn WorkerLoop>> {
        let program = self.require()?;
        Ok(Arc::new(ProcessWorkerLoop::new(program)))
    }
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
