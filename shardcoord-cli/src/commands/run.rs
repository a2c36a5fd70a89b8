//! `shardcoord run`: supervise the fleet until told to stop

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use shardcoord_config::ShardcoordConfig;
use shardcoord_execution::{CommandTemplate, Coordinator, ProcessLauncher};
use shardcoord_ipc::ChannelNames;
use shardcoord_resilience::ShutdownSignal;

pub async fn run_command(config: ShardcoordConfig) -> Result<()> {
    let store = shardcoord_storage::connect(&config.store)
        .await
        .context("Failed to connect to the coordination store")?;

    let launcher = Arc::new(ProcessLauncher::new(CommandTemplate::from_config(
        &config.process,
    )));
    let coordinator = Coordinator::new(
        config.coordinator.clone(),
        ChannelNames::new(&config.store.key_prefix),
        store,
        launcher,
    );

    let signals = tokio::spawn(forward_termination(coordinator.clone()));
    let result = coordinator.run().await;
    signals.abort();

    let signal = result.context("Coordinator failed")?;
    info!("Coordinator exited ({} shutdown)", signal);
    Ok(())
}

/// Treat SIGINT/SIGTERM like a die message
async fn forward_termination(coordinator: Coordinator) {
    wait_for_termination().await;
    warn!("Termination signal received; stopping every shard");
    coordinator.shutdown(ShutdownSignal::Graceful);
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = wait_for_ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            wait_for_ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
