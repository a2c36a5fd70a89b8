//! Paced shard launches from the start queue

use tracing::{info, warn};

use crate::coordinator::Coordinator;
use crate::error::ExecutionError;

/// Drain the start queue one shard per `throttle_interval`
///
/// The first time the queue runs dry the initial-fill signal fires; launches
/// after that are restarts and are logged as such.
pub(crate) async fn run_startup_loop(coordinator: Coordinator) {
    let interval = coordinator.config().throttle_interval;
    let mut shutdown = coordinator.shutdown_listener();

    loop {
        while let Some(shard_id) = coordinator.start_queue().try_dequeue() {
            if coordinator.is_shutting_down() {
                return;
            }
            coordinator.waiting_list().remove(shard_id);

            if coordinator.initial_fill_complete() {
                warn!("Auto-restarting shard {}", shard_id);
            } else {
                info!("Starting shard {}", shard_id);
            }

            match coordinator.spawn_shard(shard_id) {
                Ok(()) => {}
                Err(ExecutionError::ShuttingDown) => return,
                Err(e) => coordinator.schedule_retry(shard_id, e),
            }

            if !shutdown.sleep(interval).await {
                return;
            }
        }

        if coordinator.mark_initial_fill() {
            info!("All shards have been started");
        }

        if !shutdown.sleep(interval).await {
            return;
        }
    }
}
