//! Two-stage shutdown on SIGINT/SIGTERM.
//!
//! The first signal asks the driver to wind down gracefully. A second one
//! kills every registered worker and exits immediately.

use crate::process::PidRegistry;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exit status used when a second signal forces termination.
pub const FORCED_EXIT_CODE: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    Graceful,
    Forced,
}

/// Process-wide shutdown flag.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    received: AtomicUsize,
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one shutdown request and report how far it escalates.
    pub fn request(&self) -> Escalation {
        let previous = self.received.fetch_add(1, Ordering::SeqCst);
        self.token.cancel();
        if previous == 0 {
            Escalation::Graceful
        } else {
            Escalation::Forced
        }
    }

    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been requested.
    pub async fn requested(&self) {
        self.token.cancelled().await
    }

    pub fn signals_received(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }
}

/// Handle one received signal. Returns the escalation so the caller decides
/// whether to exit.
fn on_signal(shutdown: &ShutdownSignal, pids: &PidRegistry) -> Escalation {
    let escalation = shutdown.request();
    match escalation {
        Escalation::Graceful => info!("Shutdown requested (Ctrl+C again to force)"),
        Escalation::Forced => {
            let killed = pids.kill_all();
            warn!("Forced shutdown, killed {} worker processes", killed);
        }
    }
    escalation
}

/// Install the SIGINT/SIGTERM listener.
///
/// Handlers are registered before this returns, so a signal arriving right
/// after the call is not lost.
pub fn listen(shutdown: Arc<ShutdownSignal>, pids: PidRegistry) -> io::Result<JoinHandle<()>> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                received = interrupt.recv() => if received.is_none() { break },
                received = terminate.recv() => if received.is_none() { break },
            }

            if on_signal(&shutdown, &pids) == Escalation::Forced {
                std::process::exit(FORCED_EXIT_CODE);
            }
        }
    }))
}
