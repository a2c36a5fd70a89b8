//! Staleness sweep and crash detection

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use shardcoord_ipc::ShardId;

use crate::coordinator::{deferred, to_chrono, Coordinator};
use crate::error::CoordinatorResult;

/// What one sweep found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Every record is fresh and every managed process is alive
    Healthy,
    /// Shards restarted because their record went stale
    Stale(Vec<ShardId>),
    /// Shards re-queued because their process is missing or exited
    Crashed(Vec<ShardId>),
}

/// Sweep the fleet every `health_check_interval`, once the initial fill is done
pub(crate) async fn run_health_loop(coordinator: Coordinator) {
    let interval = coordinator.config().health_check_interval;
    let mut shutdown = coordinator.shutdown_listener();

    tokio::select! {
        _ = coordinator.wait_for_initial_fill() => {}
        _ = shutdown.recv() => return,
    }

    loop {
        if let Err(e) = coordinator.sweep(Utc::now()).await {
            error!("Health check failed: {}", e);
        }
        if !shutdown.sleep(interval).await {
            return;
        }
    }
}

impl Coordinator {
    /// Run one health sweep as of `now`
    ///
    /// Stale records take precedence: when any exist, crash detection is
    /// skipped for this sweep. A stale shard is stopped, queued and its record
    /// stamped `now + stale_after * queue_len` so it is not reported again
    /// before its turn in the throttled restart order.
    pub async fn sweep(&self, now: DateTime<Utc>) -> CoordinatorResult<SweepOutcome> {
        let config = self.config();
        let cutoff = now - to_chrono(config.stale_after);

        let stale: Vec<_> = self
            .stats()
            .read_all()
            .await?
            .into_iter()
            .filter(|state| state.shard_id < config.total_shards && state.is_stale(cutoff))
            .collect();

        if stale.is_empty() {
            if !config.crash_detection {
                return Ok(SweepOutcome::Healthy);
            }
            let mut crashed: Vec<ShardId> = Vec::new();
            for shard_id in self.processes().dead_slots() {
                // Failed launches are already waiting out their backoff
                if !config.is_managed(shard_id) || self.spawn_failures(shard_id) > 0 {
                    continue;
                }
                if self.start_queue().enqueue(shard_id) {
                    crashed.push(shard_id);
                }
            }
            if crashed.is_empty() {
                return Ok(SweepOutcome::Healthy);
            }
            info!("Queued {} shards with no live process: {:?}", crashed.len(), crashed);
            return Ok(SweepOutcome::Crashed(crashed));
        }

        let mut restarted = Vec::with_capacity(stale.len());
        for mut state in stale {
            let shard_id = state.shard_id;
            self.stop_shard(shard_id).await;
            self.start_queue().enqueue(shard_id);

            state.last_report_time = deferred(now, config.stale_after, self.start_queue().len());
            if let Err(e) = self.stats().write(&state).await {
                warn!("Failed to defer record of shard {}: {}", shard_id, e);
            }
            warn!(
                "Shard {} is scheduled for a restart because it's unresponsive",
                shard_id
            );
            restarted.push(shard_id);
        }

        Ok(SweepOutcome::Stale(restarted))
    }
}
