//! Worker processes running the external candidate training loop.

use crate::config::StartMode;
use crate::runtime::{WorkerLoop, WorkerProcess, WorkerSpec};
use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

pub const ENV_TASK_QUEUE: &str = "CASCOR_TASK_QUEUE";
pub const ENV_RESULT_QUEUE: &str = "CASCOR_RESULT_QUEUE";
pub const ENV_AUTHKEY_HEX: &str = "CASCOR_AUTHKEY_HEX";
pub const ENV_WORKER_NAME: &str = "CASCOR_WORKER_NAME";
pub const ENV_TASK_QUEUE_TIMEOUT: &str = "CASCOR_TASK_QUEUE_TIMEOUT";
pub const ENV_MP_CONTEXT: &str = "CASCOR_MP_CONTEXT";

/// Runs `<program> worker-loop [--remote]` once per worker.
pub struct ProcessWorkerLoop {
    program: PathBuf,
}

impl ProcessWorkerLoop {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        ProcessWorkerLoop {
            program: program.into(),
        }
    }

    fn command(&self, name: &str, spec: &WorkerSpec) -> io::Result<Command> {
        let mut command = Command::new(&self.program);
        command.arg("worker-loop");
        if spec.remote {
            command.arg("--remote");
        }

        match spec.start_mode {
            StartMode::Spawn => {
                command.env_clear();
                if let Some(path) = std::env::var_os("PATH") {
                    command.env("PATH", path);
                }
            }
            StartMode::Forkserver => {
                command.process_group(0);
            }
            StartMode::Fork => {}
        }

        command
            .env(ENV_TASK_QUEUE, spec.task_queue.to_json()?)
            .env(ENV_RESULT_QUEUE, spec.result_queue.to_json()?)
            .env(ENV_AUTHKEY_HEX, spec.authkey.to_hex())
            .env(ENV_WORKER_NAME, name)
            .env(
                ENV_TASK_QUEUE_TIMEOUT,
                spec.task_queue_timeout.as_secs().to_string(),
            )
            .env(ENV_MP_CONTEXT, spec.start_mode.as_str())
            .stdin(Stdio::null());

        Ok(command)
    }
}

impl WorkerLoop for ProcessWorkerLoop {
    fn spawn(&self, name: &str, spec: &WorkerSpec) -> io::Result<Box<dyn WorkerProcess>> {
        let child = self.command(name, spec)?.spawn()?;
        debug!(
            "Spawned {} (pid {:?}) from {}",
            name,
            child.id(),
            self.program.display()
        );
        Ok(Box::new(ChildProcess::new(name, child)))
    }
}

/// An OS child process.
///
/// Killed if dropped while still running, unless it was already sent
/// SIGTERM: a terminated worker is left to finish its handler and is
/// reaped in the background.
pub struct ChildProcess {
    name: String,
    pid: Option<u32>,
    child: Child,
    terminated: bool,
}

impl ChildProcess {
    pub fn new(name: impl Into<String>, child: Child) -> Self {
        ChildProcess {
            name: name.into(),
            pid: child.id(),
            child,
            terminated: false,
        }
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if self.terminated {
            return;
        }
        if let Ok(None) = self.child.try_wait() {
            if let Err(e) = self.child.start_kill() {
                warn!("Failed to kill worker {}: {}", self.name, e);
            }
        }
    }
}

#[async_trait]
impl WorkerProcess for ChildProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn is_alive(&mut self) -> bool {
        still_running(&self.name, self.child.try_wait())
    }

    async fn join(&mut self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Worker {} exited with {}", self.name, status);
                true
            }
            Ok(Err(e)) => {
                warn!("Failed to wait for worker {}: {}", self.name, e);
                false
            }
            Err(_) => false,
        }
    }

    fn terminate(&mut self) -> io::Result<()> {
        // id() is None once the child has been reaped
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM)?;
        self.terminated = true;
        Ok(())
    }
}

/// Interpret a liveness poll. A failed poll counts as running so that
/// `stop` still joins and terminates the process.
fn still_running(name: &str, poll: io::Result<Option<ExitStatus>>) -> bool {
    match poll {
        Ok(None) => true,
        Ok(Some(_)) => false,
        Err(e) => {
            warn!("Failed to poll worker {}: {}", name, e);
            true
        }
    }
}

/// Pids of live worker processes, shared with the forced-exit path.
#[derive(Debug, Clone, Default)]
pub struct PidRegistry {
    pids: Arc<Mutex<HashSet<u32>>>,
}

impl PidRegistry {
    pub fn insert(&self, pid: u32) {
        self.pids.lock().insert(pid);
    }

    pub fn remove(&self, pid: u32) {
        self.pids.lock().remove(&pid);
    }

    pub fn clear(&self) {
        self.pids.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.pids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// SIGKILL every registered pid. Returns how many signals were delivered.
    pub fn kill_all(&self) -> usize {
        let pids: Vec<u32> = self.pids.lock().drain().collect();
        pids.into_iter()
            .filter(|pid| signal::kill(Pid::from_raw(*pid as i32), Signal::SIGKILL).is_ok())
            .count()
    }
}
