//! Remote candidate training worker.

use crate::config::{StartMode, WorkerConfig};
use crate::error::{Result, WorkerError};
use crate::pool::{PoolState, WorkerPool};
use crate::process::PidRegistry;
use crate::runtime::{Manager, ManagerConnector, Runtime, SharedQueue, WorkerSpec};
use cascor_protocol::AuthKey;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

type Session = (Box<dyn Manager>, Arc<dyn SharedQueue>, Arc<dyn SharedQueue>);

/// Connects to a CasCor training manager and runs local worker processes
/// against its shared queues.
///
/// ```no_run
/// # async fn run() -> cascor_worker::Result<()> {
/// use cascor_worker::{ExternalRuntime, RemoteWorker, WorkerConfig};
/// use std::sync::Arc;
///
/// let config = WorkerConfig {
///     manager_host: "192.168.1.100".to_string(),
///     ..Default::default()
/// };
/// let mut worker = RemoteWorker::new(config, Arc::new(ExternalRuntime::default()))?;
/// worker.connect().await?;
/// worker.start(None).await?;
/// // Workers process tasks until stopped
/// worker.disconnect().await;
/// # Ok(())
/// # }
/// ```
pub struct RemoteWorker {
    config: WorkerConfig,
    start_mode: StartMode,
    runtime: Arc<dyn Runtime>,
    manager: Option<Box<dyn Manager>>,
    task_queue: Option<Arc<dyn SharedQueue>>,
    result_queue: Option<Arc<dyn SharedQueue>>,
    pool: WorkerPool,
    pids: PidRegistry,
    connected: bool,
}

impl RemoteWorker {
    /// Validates `config`; no connection is made yet.
    pub fn new(config: WorkerConfig, runtime: Arc<dyn Runtime>) -> Result<Self> {
        config.validate()?;
        let start_mode = config.start_mode()?;
        let pids = PidRegistry::default();

        Ok(RemoteWorker {
            config,
            start_mode,
            runtime,
            manager: None,
            task_queue: None,
            result_queue: None,
            pool: WorkerPool::new(pids.clone()),
            pids,
            connected: false,
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Pids of the running workers, for the forced-exit path.
    pub fn pid_registry(&self) -> PidRegistry {
        self.pids.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn pool_state(&self) -> PoolState {
        self.pool.state()
    }

    /// Connect to the manager and fetch both queue handles.
    ///
    /// Not retried: a refused, rejected or timed-out attempt is returned as
    /// [`WorkerError::Connection`].
    pub async fn connect(&mut self) -> Result<()> {
        if self.connected {
            debug!("Already connected to {}", self.config.address());
            return Ok(());
        }

        let connector = self.runtime.manager_connector()?;
        let authkey = AuthKey::from(self.config.authkey.as_str());
        let address = self.config.address();

        let (manager, task_queue, result_queue) = open_session(
            connector.as_ref(),
            &address,
            &authkey,
            self.config.connect_timeout(),
        )
        .await
        .map_err(|source| WorkerError::Connection {
            address: address.clone(),
            source,
        })?;

        self.manager = Some(manager);
        self.task_queue = Some(task_queue);
        self.result_queue = Some(result_queue);
        self.connected = true;

        info!("Connected to manager at {}", address);
        Ok(())
    }

    /// Start worker processes. `count` overrides the configured number when non-zero.
    pub async fn start(&mut self, count: Option<usize>) -> Result<()> {
        if !self.connected {
            return Err(WorkerError::NotConnected);
        }
        let (Some(task_queue), Some(result_queue)) = (&self.task_queue, &self.result_queue) else {
            return Err(WorkerError::NotConnected);
        };

        let n = count.filter(|n| *n > 0).unwrap_or(self.config.num_workers);
        let worker_loop = self.runtime.worker_loop()?;

        let spec = WorkerSpec {
            task_queue: task_queue.handle().clone(),
            result_queue: result_queue.handle().clone(),
            remote: true,
            authkey: AuthKey::from(self.config.authkey.as_str()),
            start_mode: self.start_mode,
            task_queue_timeout: self.config.task_queue_timeout(),
        };

        self.pool.spawn(worker_loop.as_ref(), n, &spec)?;

        info!("Started {} worker processes", self.pool.len());
        Ok(())
    }

    /// Stop all worker processes. `timeout` overrides the configured
    /// per-process wait when non-zero.
    pub async fn stop(&mut self, timeout: Option<Duration>) {
        let wait = timeout
            .filter(|t| !t.is_zero())
            .unwrap_or_else(|| self.config.stop_timeout());

        self.pool.stop(self.task_queue.as_deref(), wait).await;
    }

    /// Stop workers, then drop the manager session. Safe to call repeatedly.
    pub async fn disconnect(&mut self) {
        if !self.pool.is_empty() {
            self.stop(None).await;
        }

        if let Some(manager) = self.manager.take() {
            manager.close().await;
        }
        self.task_queue = None;
        self.result_queue = None;
        self.connected = false;

        info!("Disconnected from manager");
    }

    /// True if any worker process is alive.
    pub fn is_running(&mut self) -> bool {
        self.pool.is_running()
    }

    /// Number of worker processes currently alive.
    pub fn worker_count(&mut self) -> usize {
        self.pool.active_count()
    }
}

async fn open_session(
    connector: &dyn ManagerConnector,
    address: &str,
    authkey: &AuthKey,
    timeout: Duration,
) -> anyhow::Result<Session> {
    let manager = connector.connect(address, authkey, timeout).await?;
    let task_queue = manager.get_task_queue().await?;
    let result_queue = manager.get_result_queue().await?;
    Ok((manager, task_queue, result_queue))
}
