use cascor_worker::cli::{self, Args, LIVENESS_POLL_INTERVAL};
use cascor_worker::{shutdown, RemoteWorker, ShutdownSignal};
use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    cli::init_tracing(args.log_level, args.log_json);

    let config = args.to_config()?;
    let mut worker = RemoteWorker::new(config, Arc::new(args.runtime()))?;

    // Handle shutdown signals
    let signal = Arc::new(ShutdownSignal::new());
    shutdown::listen(signal.clone(), worker.pid_registry())?;

    cli::run(&mut worker, &signal, LIVENESS_POLL_INTERVAL).await?;

    Ok(())
}
