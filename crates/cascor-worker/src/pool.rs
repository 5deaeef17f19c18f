//! Supervisor for the local worker processes.

use crate::error::{Result, WorkerError};
use crate::process::PidRegistry;
use crate::runtime::{SharedQueue, WorkerLoop, WorkerProcess, WorkerSpec};
use std::time::Duration;
use tracing::{error, info, warn};

pub const WORKER_NAME_PREFIX: &str = "CascorRemoteWorker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Idle,
    Running,
    Stopping,
}

/// The set of worker processes consuming the shared task queue.
pub struct WorkerPool {
    processes: Vec<Box<dyn WorkerProcess>>,
    state: PoolState,
    pids: PidRegistry,
}

impl WorkerPool {
    pub fn new(pids: PidRegistry) -> Self {
        WorkerPool {
            processes: Vec::new(),
            state: PoolState::Idle,
            pids,
        }
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    /// Number of tracked processes, alive or not.
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.processes.iter().map(|p| p.name()).collect()
    }

    /// Start `count` processes from `worker_loop`.
    ///
    /// Names continue from the current pool size. On a spawn failure the
    /// processes already started stay tracked.
    pub fn spawn(
        &mut self,
        worker_loop: &dyn WorkerLoop,
        count: usize,
        spec: &WorkerSpec,
    ) -> Result<()> {
        let first = self.processes.len();

        for index in first..first + count {
            let name = format!("{}-{}", WORKER_NAME_PREFIX, index);
            let process = worker_loop
                .spawn(&name, spec)
                .map_err(|source| WorkerError::Spawn {
                    name: name.clone(),
                    source,
                })?;

            if let Some(pid) = process.pid() {
                self.pids.insert(pid);
            }
            self.processes.push(process);
            self.state = PoolState::Running;
        }

        Ok(())
    }

    /// Stop every tracked process.
    ///
    /// Sends one sentinel per process, each put bounded by `timeout`, then
    /// gives each process `timeout` to exit before terminating it. The pool
    /// is empty afterwards no matter how many processes had to be terminated.
    pub async fn stop(&mut self, task_queue: Option<&dyn SharedQueue>, timeout: Duration) {
        if self.processes.is_empty() {
            return;
        }

        self.state = PoolState::Stopping;

        match task_queue {
            Some(queue) => {
                for _ in 0..self.processes.len() {
                    match tokio::time::timeout(timeout, queue.put(None)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => error!("Failed to send sentinel: {:#}", e),
                        Err(_) => error!("Timed out sending sentinel after {:?}", timeout),
                    }
                }
            }
            None => warn!("No task queue available, skipping stop sentinels"),
        }

        for process in self.processes.iter_mut() {
            process.join(timeout).await;

            if process.is_alive() {
                warn!(
                    "Worker {} did not stop gracefully, terminating",
                    process.name()
                );
                if let Err(e) = process.terminate() {
                    error!("Failed to terminate worker {}: {}", process.name(), e);
                }
            } else if let Some(pid) = process.pid() {
                self.pids.remove(pid);
            }
        }

        self.processes.clear();
        self.pids.clear();
        self.state = PoolState::Idle;
        info!("All worker processes stopped");
    }

    /// True if at least one tracked process is alive.
    pub fn is_running(&mut self) -> bool {
        self.active_count() > 0
    }

    /// Number of tracked processes currently alive.
    ///
    /// Pids of processes found dead are dropped from the registry so a
    /// forced shutdown never signals a recycled pid.
    pub fn active_count(&mut self) -> usize {
        let pids = &self.pids;
        self.processes
            .iter_mut()
            .map(|process| {
                let alive = process.is_alive();
                if !alive {
                    if let Some(pid) = process.pid() {
                        pids.remove(pid);
                    }
                }
                alive
            })
            .filter(|alive| *alive)
            .count()
    }
}
