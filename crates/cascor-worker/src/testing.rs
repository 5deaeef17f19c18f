//! Test doubles for the runtime seams.

use crate::config::StartMode;
use crate::error::{Result, WorkerError};
use crate::runtime::{
    Manager, ManagerConnector, Runtime, SharedQueue, WorkerLoop, WorkerProcess, WorkerSpec,
};
use anyhow::anyhow;
use async_trait::async_trait;
use cascor_protocol::{AuthKey, QueueHandle, QueueName};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn worker_spec() -> WorkerSpec {
    WorkerSpec {
        task_queue: QueueHandle::new("127.0.0.1:50000", QueueName::Tasks),
        result_queue: QueueHandle::new("127.0.0.1:50000", QueueName::Results),
        remote: true,
        authkey: AuthKey::from("juniper"),
        start_mode: StartMode::Forkserver,
        task_queue_timeout: Duration::from_secs(5),
    }
}

#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct MockQueue {
    handle: QueueHandle,
    items: Mutex<Vec<Option<Vec<u8>>>>,
    failures_left: AtomicUsize,
}

impl MockQueue {
    pub fn new(name: QueueName) -> Self {
        MockQueue {
            handle: QueueHandle::new("127.0.0.1:50000", name),
            items: Mutex::new(Vec::new()),
            failures_left: AtomicUsize::new(0),
        }
    }

    pub fn tasks() -> Self {
        Self::new(QueueName::Tasks)
    }

    /// Rejects the first `n` puts.
    pub fn failing_first(n: usize) -> Self {
        let queue = Self::tasks();
        queue.failures_left.store(n, Ordering::SeqCst);
        queue
    }

    pub fn put_count(&self) -> usize {
        self.items.lock().len()
    }

    pub fn items(&self) -> Vec<Option<Vec<u8>>> {
        self.items.lock().clone()
    }
}

#[async_trait]
impl SharedQueue for MockQueue {
    fn handle(&self) -> &QueueHandle {
        &self.handle
    }

    async fn put(&self, item: Option<Vec<u8>>) -> anyhow::Result<()> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(anyhow!("broken pipe"));
        }
        self.items.lock().push(item);
        Ok(())
    }
}

/// Queue whose puts never complete, like a stalled manager.
pub struct HungQueue {
    handle: QueueHandle,
}

impl HungQueue {
    pub fn new() -> Self {
        HungQueue {
            handle: QueueHandle::new("127.0.0.1:50000", QueueName::Tasks),
        }
    }
}

#[async_trait]
impl SharedQueue for HungQueue {
    fn handle(&self) -> &QueueHandle {
        &self.handle
    }

    async fn put(&self, _item: Option<Vec<u8>>) -> anyhow::Result<()> {
        std::future::pending().await
    }
}

pub struct MockManager {
    task_queue: Arc<MockQueue>,
    fail_queues: bool,
    closes: Counter,
}

#[async_trait]
impl Manager for MockManager {
    async fn get_task_queue(&self) -> anyhow::Result<Arc<dyn SharedQueue>> {
        if self.fail_queues {
            return Err(anyhow!("queue lookup refused"));
        }
        Ok(self.task_queue.clone())
    }

    async fn get_result_queue(&self) -> anyhow::Result<Arc<dyn SharedQueue>> {
        Ok(Arc::new(MockQueue::new(QueueName::Results)))
    }

    async fn close(&self) {
        self.closes.bump();
    }
}

/// Connector handing out [`MockManager`]s that share one task queue.
pub struct MockConnector {
    pub task_queue: Arc<MockQueue>,
    pub refuse: bool,
    pub fail_queues: bool,
    pub connects: Counter,
    pub closes: Counter,
    pub last_authkey: Mutex<Option<AuthKey>>,
}

impl MockConnector {
    pub fn new() -> Self {
        MockConnector {
            task_queue: Arc::new(MockQueue::tasks()),
            refuse: false,
            fail_queues: false,
            connects: Counter::default(),
            closes: Counter::default(),
            last_authkey: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ManagerConnector for MockConnector {
    async fn connect(
        &self,
        _address: &str,
        authkey: &AuthKey,
        _timeout: Duration,
    ) -> anyhow::Result<Box<dyn Manager>> {
        self.connects.bump();
        *self.last_authkey.lock() = Some(authkey.clone());
        if self.refuse {
            return Err(anyhow!("connection refused"));
        }
        Ok(Box::new(MockManager {
            task_queue: self.task_queue.clone(),
            fail_queues: self.fail_queues,
            closes: self.closes.clone(),
        }))
    }
}

/// How a [`MockProcess`] reacts to being joined.
#[derive(Debug, Clone, Copy)]
enum Behavior {
    /// Never exits on its own
    Stuck,
    /// Exits when joined
    Cooperative,
}

pub struct MockProcess {
    name: String,
    pid: u32,
    alive: Arc<AtomicBool>,
    behavior: Behavior,
    terminations: Counter,
}

static NEXT_PID: AtomicU32 = AtomicU32::new(10_000);

impl MockProcess {
    fn build(name: &str, alive: bool, behavior: Behavior) -> Self {
        MockProcess {
            name: name.to_string(),
            pid: NEXT_PID.fetch_add(1, Ordering::SeqCst),
            alive: Arc::new(AtomicBool::new(alive)),
            behavior,
            terminations: Counter::default(),
        }
    }

    pub fn alive(name: &str) -> Self {
        Self::build(name, true, Behavior::Stuck)
    }

    pub fn dead(name: &str) -> Self {
        Self::build(name, false, Behavior::Cooperative)
    }

    pub fn exits_on_join(name: &str) -> Self {
        Self::build(name, true, Behavior::Cooperative)
    }

    pub fn terminations(&self) -> Counter {
        self.terminations.clone()
    }

    pub fn liveness(&self) -> Arc<AtomicBool> {
        self.alive.clone()
    }
}

#[async_trait]
impl WorkerProcess for MockProcess {
    fn name(&self) -> &str {
        &self.name
    }

    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn is_alive(&mut self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn join(&mut self, _timeout: Duration) -> bool {
        if let Behavior::Cooperative = self.behavior {
            self.alive.store(false, Ordering::SeqCst);
        }
        !self.alive.load(Ordering::SeqCst)
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.terminations.bump();
        Ok(())
    }
}

/// Worker loop producing [`MockProcess`]es.
#[derive(Default)]
pub struct MockLoop {
    stuck: bool,
    fail_after: Option<usize>,
    spawned: Mutex<Vec<(String, bool)>>,
    liveness: Mutex<Vec<Arc<AtomicBool>>>,
    terminations: Counter,
}

impl MockLoop {
    /// Processes that ignore sentinels.
    pub fn stuck() -> Self {
        MockLoop {
            stuck: true,
            ..Default::default()
        }
    }

    pub fn failing_after(n: usize) -> Self {
        MockLoop {
            fail_after: Some(n),
            ..Default::default()
        }
    }

    pub fn spawned_names(&self) -> Vec<String> {
        self.spawned.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn spawned_remote(&self) -> Vec<bool> {
        self.spawned.lock().iter().map(|(_, r)| *r).collect()
    }

    /// Total terminate calls across every spawned process.
    pub fn terminations(&self) -> usize {
        self.terminations.get()
    }

    /// Make every spawned process report itself exited.
    pub fn kill_all(&self) {
        for alive in self.liveness.lock().iter() {
            alive.store(false, Ordering::SeqCst);
        }
    }
}

impl WorkerLoop for MockLoop {
    fn spawn(&self, name: &str, spec: &WorkerSpec) -> io::Result<Box<dyn WorkerProcess>> {
        let mut spawned = self.spawned.lock();
        if self.fail_after.is_some_and(|n| spawned.len() >= n) {
            return Err(io::Error::new(io::ErrorKind::Other, "fork failed"));
        }
        spawned.push((name.to_string(), spec.remote));

        let mut process = if self.stuck {
            MockProcess::alive(name)
        } else {
            MockProcess::exits_on_join(name)
        };
        process.terminations = self.terminations.clone();
        self.liveness.lock().push(process.liveness());
        Ok(Box::new(process))
    }
}

/// Runtime wired to mock collaborators; `None` means "not installed".
pub struct MockRuntime {
    pub connector: Option<Arc<MockConnector>>,
    pub worker_loop: Option<Arc<MockLoop>>,
}

impl MockRuntime {
    pub fn installed() -> Self {
        MockRuntime {
            connector: Some(Arc::new(MockConnector::new())),
            worker_loop: Some(Arc::new(MockLoop::default())),
        }
    }

    pub fn missing() -> Self {
        MockRuntime {
            connector: None,
            worker_loop: None,
        }
    }
}

impl Runtime for MockRuntime {
    fn manager_connector(&self) -> Result<Arc<dyn ManagerConnector>> {
        match &self.connector {
            Some(connector) => Ok(connector.clone()),
            None => Err(WorkerError::DependencyNotFound("mock runtime".to_string())),
        }
    }

    fn worker_loop(&self) -> Result<Arc<dyn WorkerLoop>> {
        match &self.worker_loop {
            Some(worker_loop) => Ok(worker_loop.clone()),
            None => Err(WorkerError::DependencyNotFound("mock runtime".to_string())),
        }
    }
}
