//! Fleet coordinator: owns the process table and reacts to control messages

use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use shardcoord_config::CoordinatorConfig;
use shardcoord_ipc::{codec, ChannelNames, ControlMessage, IpcError, ShardId, ShardState};
use shardcoord_resilience::{
    BackoffCalculator, ShutdownCoordinator, ShutdownListener, ShutdownSignal,
};
use shardcoord_storage::{ChannelMessage, CoordinationStore, ShardStatsRepository, Subscription};

use crate::error::{CoordinatorResult, ExecutionError};
use crate::process::{ProcessTable, ShardLauncher};
use crate::queue::StartQueue;
use crate::waiting::WaitingList;
use crate::{health, throttle};

/// Delay before re-subscribing after the control stream ended
const RESUBSCRIBE_INITIAL: Duration = Duration::from_secs(1);
const RESUBSCRIBE_MAX: Duration = Duration::from_secs(30);

/// Supervises `total_shards` worker processes
///
/// Cloning is cheap; every clone drives the same fleet. The startup loop, the
/// health loop and the control listener each run on their own clone.
#[derive(Clone)]
pub struct Coordinator {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) config: CoordinatorConfig,
    pub(crate) names: ChannelNames,
    pub(crate) store: Arc<dyn CoordinationStore>,
    pub(crate) stats: ShardStatsRepository,
    pub(crate) launcher: Arc<dyn ShardLauncher>,
    pub(crate) start_queue: StartQueue,
    pub(crate) waiting_list: WaitingList,
    pub(crate) processes: ProcessTable,
    pub(crate) spawn_backoff: BackoffCalculator,
    pub(crate) spawn_failures: Mutex<HashMap<ShardId, u32>>,
    pub(crate) initial_fill: watch::Sender<bool>,
    pub(crate) shutdown: ShutdownCoordinator,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        names: ChannelNames,
        store: Arc<dyn CoordinationStore>,
        launcher: Arc<dyn ShardLauncher>,
    ) -> Self {
        let stats = ShardStatsRepository::new(store.clone(), &names);
        let processes = ProcessTable::new(config.total_shards);
        let spawn_backoff = BackoffCalculator::new(
            config.spawn_backoff.initial_delay,
            config.spawn_backoff.max_delay,
            config.spawn_backoff.jitter,
        );
        let (initial_fill, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                config,
                names,
                store,
                stats,
                launcher,
                start_queue: StartQueue::new(),
                waiting_list: WaitingList::new(),
                processes,
                spawn_backoff,
                spawn_failures: Mutex::new(HashMap::new()),
                initial_fill,
                shutdown: ShutdownCoordinator::new(),
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn start_queue(&self) -> &StartQueue {
        &self.inner.start_queue
    }

    pub fn waiting_list(&self) -> &WaitingList {
        &self.inner.waiting_list
    }

    pub fn processes(&self) -> &ProcessTable {
        &self.inner.processes
    }

    pub fn stats(&self) -> &ShardStatsRepository {
        &self.inner.stats
    }

    /// Listener that resolves when the coordinator stops
    pub fn shutdown_listener(&self) -> ShutdownListener {
        self.inner.shutdown.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_shutting_down()
    }

    /// Reset the status list and queue every managed shard for its first start
    ///
    /// Shard `i` gets a placeholder stamped `now + boot_stagger * i` so the
    /// health sweep leaves it alone while the throttled boot reaches it.
    pub async fn initialize(&self) -> CoordinatorResult<()> {
        let config = &self.inner.config;
        let now = Utc::now();

        let placeholders: Vec<ShardState> = (0..config.total_shards)
            .map(|shard_id| {
                ShardState::placeholder(
                    shard_id,
                    deferred(now, config.boot_stagger, shard_id as usize),
                )
            })
            .collect();
        self.inner.stats.reset(&placeholders).await?;

        for shard_id in 0..config.total_shards {
            if config.is_managed(shard_id) {
                self.inner.start_queue.enqueue(shard_id);
            } else {
                info!("Shard {} is unmanaged; not launching it at boot", shard_id);
            }
        }

        info!(
            "Initialized {} shard records, {} queued for start",
            config.total_shards,
            self.inner.start_queue.len()
        );
        Ok(())
    }

    /// Dispatch one decoded control message
    pub async fn handle_message(&self, message: ControlMessage) {
        match message {
            ControlMessage::Heartbeat(state) => self.handle_heartbeat(state).await,
            ControlMessage::Restart { shard_id } => self.handle_restart(shard_id).await,
            ControlMessage::Stop { shard_id } => {
                info!("Stopping shard {} on request", shard_id);
                self.stop_shard(shard_id).await;
            }
            ControlMessage::Shutdown => {
                warn!("Received shutdown request; terminating every shard");
                self.shutdown(ShutdownSignal::Forced);
            }
        }
    }

    /// Persist a status report and apply the two-strike escalation policy
    ///
    /// First unhealthy report puts the shard on probation; a second one while
    /// on probation stops it and queues a restart. Any healthy report clears
    /// probation.
    pub async fn handle_heartbeat(&self, state: ShardState) {
        let shard_id = state.shard_id;
        if let Err(e) = self.inner.stats.write(&state).await {
            warn!("Failed to record report from shard {}: {}", shard_id, e);
        }

        if !state.connection_state.is_unhealthy() {
            if self.inner.waiting_list.remove(shard_id) {
                info!("Shard {} recovered ({})", shard_id, state.connection_state);
            }
            return;
        }

        if self.inner.waiting_list.add_if_absent(shard_id) {
            error!(
                "Shard {} reported {}; waiting for its next report",
                shard_id, state.connection_state
            );
            return;
        }

        error!(
            "Shard {} is still {}; scheduling a restart",
            shard_id, state.connection_state
        );
        self.stop_shard(shard_id).await;
        self.inner.start_queue.enqueue(shard_id);
        self.inner.waiting_list.remove(shard_id);
    }

    /// Stop a shard and launch it again immediately, bypassing the start queue
    pub async fn handle_restart(&self, shard_id: ShardId) {
        info!("Restarting shard {} on request", shard_id);
        self.stop_shard(shard_id).await;
        match self.spawn_shard(shard_id) {
            Ok(()) => {}
            Err(ExecutionError::ShuttingDown) => {}
            Err(e) => self.schedule_retry(shard_id, e),
        }
    }

    /// Mark a shard down in the store and terminate its process
    ///
    /// Termination failures are swallowed; the process may already be gone.
    pub async fn stop_shard(&self, shard_id: ShardId) {
        let placeholder = ShardState::placeholder(shard_id, Utc::now());
        if let Err(e) = self.inner.stats.write(&placeholder).await {
            warn!("Failed to reset record of shard {}: {}", shard_id, e);
        }

        if self.inner.processes.release(shard_id) {
            debug!("Terminated process of shard {}", shard_id);
        }
    }

    /// Launch a shard and install it in its slot, replacing any previous process
    pub fn spawn_shard(&self, shard_id: ShardId) -> CoordinatorResult<()> {
        if self.is_shutting_down() {
            return Err(ExecutionError::ShuttingDown);
        }
        let total_shards = self.inner.config.total_shards;
        if shard_id >= total_shards {
            return Err(ExecutionError::ShardOutOfRange {
                shard_id,
                total_shards,
            });
        }

        let process = self.inner.launcher.launch(shard_id)?;
        if let Some(pid) = process.id() {
            debug!("Shard {} running as pid {}", shard_id, pid);
        }
        self.inner.processes.install(shard_id, process);
        self.inner.spawn_failures.lock().remove(&shard_id);
        Ok(())
    }

    /// Re-enqueue a shard whose launch failed, after an exponential delay
    pub(crate) fn schedule_retry(&self, shard_id: ShardId, cause: ExecutionError) {
        let attempt = {
            let mut failures = self.inner.spawn_failures.lock();
            let attempt = failures.entry(shard_id).or_insert(0);
            *attempt += 1;
            *attempt
        };
        let delay = self.inner.spawn_backoff.calculate_delay(attempt);
        error!(
            "Failed to start shard {} (attempt {}): {}; retrying in {:?}",
            shard_id, attempt, cause, delay
        );

        let coordinator = self.clone();
        let mut shutdown = self.shutdown_listener();
        tokio::spawn(async move {
            if shutdown.sleep(delay).await {
                coordinator.inner.start_queue.enqueue(shard_id);
            }
        });
    }

    /// Number of consecutive failed launches for a shard
    pub fn spawn_failures(&self, shard_id: ShardId) -> u32 {
        self.inner
            .spawn_failures
            .lock()
            .get(&shard_id)
            .copied()
            .unwrap_or(0)
    }

    /// Whether the startup loop has drained the boot queue once
    pub fn initial_fill_complete(&self) -> bool {
        *self.inner.initial_fill.borrow()
    }

    /// Resolve once the startup loop has drained the boot queue once
    pub async fn wait_for_initial_fill(&self) {
        let mut receiver = self.inner.initial_fill.subscribe();
        // The sender lives in `inner`, so the channel cannot close under us
        let _ = receiver.wait_for(|filled| *filled).await;
    }

    /// Fire the initial-fill signal; only the first call has an effect
    pub(crate) fn mark_initial_fill(&self) -> bool {
        self.inner.initial_fill.send_if_modified(|filled| {
            if *filled {
                false
            } else {
                *filled = true;
                true
            }
        })
    }

    /// Stop the coordinator and terminate every child process
    pub fn shutdown(&self, signal: ShutdownSignal) {
        if self.inner.shutdown.trigger(signal).is_err() {
            debug!("Shutdown already in progress");
        }
        let killed = self.inner.processes.kill_all();
        if killed > 0 {
            info!("Terminated {} shard processes", killed);
        }
    }

    /// Boot the fleet and supervise it until a shutdown signal arrives
    ///
    /// Returns the signal that stopped the coordinator. Any error on the way
    /// up terminates whatever was already started before it is returned.
    pub async fn run(&self) -> CoordinatorResult<ShutdownSignal> {
        let subscription = match self.start().await {
            Ok(subscription) => subscription,
            Err(e) => {
                self.inner.processes.kill_all();
                return Err(e);
            }
        };

        let mut tasks = JoinSet::new();
        tasks.spawn(throttle::run_startup_loop(self.clone()));
        tasks.spawn(health::run_health_loop(self.clone()));
        tasks.spawn(self.clone().listen(subscription));

        let mut shutdown = self.shutdown_listener();
        let outcome = tokio::select! {
            biased;
            signal = shutdown.recv() => Ok(signal),
            Some(joined) = tasks.join_next() => match self.inner.shutdown.signal() {
                // Background loops return on their own once shutdown fires
                Some(signal) => Ok(signal),
                None => {
                    let reason = match joined {
                        Ok(()) => "background task exited early".to_string(),
                        Err(e) => e.to_string(),
                    };
                    error!("Coordinator task failed: {}", reason);
                    Err(ExecutionError::TaskFailed(reason))
                }
            },
        };

        self.shutdown(ShutdownSignal::Forced);
        tasks.shutdown().await;
        info!("Coordinator stopped");
        outcome
    }

    async fn start(&self) -> CoordinatorResult<Subscription> {
        self.initialize().await?;
        let subscription = self
            .inner
            .store
            .subscribe(&self.inner.names.subscriptions())
            .await?;
        info!(
            "Coordinator for {} shards listening on {:?}",
            self.inner.config.total_shards,
            self.inner.names.subscriptions()
        );
        Ok(subscription)
    }

    /// Consume control messages until shutdown, re-subscribing if the stream ends
    async fn listen(self, mut subscription: Subscription) {
        let mut shutdown = self.shutdown_listener();
        let backoff = BackoffCalculator::exponential(RESUBSCRIBE_INITIAL, RESUBSCRIBE_MAX);
        let mut attempt: u32 = 0;

        loop {
            let next = tokio::select! {
                _ = shutdown.recv() => return,
                next = subscription.next() => next,
            };

            match next {
                Some(message) => {
                    attempt = 0;
                    self.dispatch(message).await;
                }
                None => loop {
                    attempt = attempt.saturating_add(1);
                    let delay = backoff.calculate_delay(attempt);
                    warn!("Control subscription ended; re-subscribing in {:?}", delay);
                    if !shutdown.sleep(delay).await {
                        return;
                    }
                    match self
                        .inner
                        .store
                        .subscribe(&self.inner.names.subscriptions())
                        .await
                    {
                        Ok(fresh) => {
                            info!("Control subscription restored");
                            subscription = fresh;
                            break;
                        }
                        Err(e) => error!("Failed to re-subscribe: {}", e),
                    }
                },
            }
        }
    }

    async fn dispatch(&self, message: ChannelMessage) {
        let decoded = codec::decode(
            &self.inner.names,
            self.inner.config.total_shards,
            &message.channel,
            &message.payload,
        );
        match decoded {
            Ok(Some(control)) => self.handle_message(control).await,
            Ok(None) => {}
            Err(e @ IpcError::ShardOutOfRange { .. }) => {
                warn!("Ignoring message on {}: {}", message.channel, e)
            }
            Err(e) => debug!("Dropping malformed message on {}: {}", message.channel, e),
        }
    }
}

/// Convert a configured duration for timestamp arithmetic
pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::seconds(duration.as_secs().min(i64::MAX as u64 / 1000) as i64)
}

/// Timestamp `now + step * slots`, used to push a record's staleness deadline out
pub(crate) fn deferred(now: DateTime<Utc>, step: Duration, slots: usize) -> DateTime<Utc> {
    let slots = i32::try_from(slots).unwrap_or(i32::MAX);
    to_chrono(step)
        .checked_mul(slots)
        .and_then(|offset| now.checked_add_signed(offset))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{coordinator_with, fleet_config, RecordingLauncher, TEST_PREFIX};
    use shardcoord_ipc::ConnectionState;
    use shardcoord_storage::{ControlPublisher, InMemoryStore};

    fn report(shard_id: ShardId, connection_state: ConnectionState) -> ShardState {
        ShardState {
            shard_id,
            connection_state,
            guild_count: 10,
            last_report_time: Utc::now(),
        }
    }

    /// Initialized fleet with every shard launched and the boot queue drained
    async fn booted(total_shards: u32) -> (Coordinator, Arc<InMemoryStore>, Arc<RecordingLauncher>) {
        let (coordinator, store, launcher) = coordinator_with(fleet_config(total_shards));
        coordinator.initialize().await.unwrap();
        while let Some(shard_id) = coordinator.start_queue().try_dequeue() {
            coordinator.spawn_shard(shard_id).unwrap();
        }
        (coordinator, store, launcher)
    }

    #[tokio::test]
    async fn test_initialize_staggers_placeholders() {
        let mut config = fleet_config(4);
        config.unmanaged_shards = vec![2];
        let (coordinator, _, _) = coordinator_with(config);

        let before = Utc::now();
        coordinator.initialize().await.unwrap();

        let records = coordinator.stats().read_all().await.unwrap();
        assert_eq!(records.len(), 4);
        for (index, record) in records.iter().enumerate() {
            assert_eq!(record.shard_id, index as ShardId);
            assert_eq!(record.connection_state, ConnectionState::Disconnected);
            let offset = record.last_report_time - before;
            assert!(offset >= chrono::Duration::seconds(20 * index as i64));
            assert!(offset < chrono::Duration::seconds(20 * index as i64 + 5));
        }

        let mut queued = Vec::new();
        while let Some(shard_id) = coordinator.start_queue().try_dequeue() {
            queued.push(shard_id);
        }
        assert_eq!(queued, vec![0, 1, 3]);
    }

    #[tokio::test]
    async fn test_healthy_heartbeat_is_recorded() {
        let (coordinator, _, _) = booted(3).await;
        coordinator
            .handle_heartbeat(report(1, ConnectionState::Connected))
            .await;

        let records = coordinator.stats().read_all().await.unwrap();
        assert_eq!(records[1].connection_state, ConnectionState::Connected);
        assert_eq!(records[1].guild_count, 10);
        assert!(coordinator.start_queue().is_empty());
        assert!(!coordinator.waiting_list().contains(1));
    }

    #[tokio::test]
    async fn test_second_unhealthy_report_restarts_shard() {
        let (coordinator, _, launcher) = booted(3).await;

        coordinator
            .handle_heartbeat(report(1, ConnectionState::Disconnected))
            .await;
        assert!(coordinator.waiting_list().contains(1));
        assert!(coordinator.start_queue().is_empty());
        assert!(launcher.probe(1).unwrap().is_alive());

        coordinator
            .handle_heartbeat(report(1, ConnectionState::Disconnecting))
            .await;
        assert!(!coordinator.waiting_list().contains(1));
        assert!(launcher.probe(1).unwrap().was_killed());
        assert!(!coordinator.processes().is_running(1));
        assert_eq!(coordinator.start_queue().try_dequeue(), Some(1));
        assert!(coordinator.start_queue().is_empty());

        let records = coordinator.stats().read_all().await.unwrap();
        assert_eq!(records[1].connection_state, ConnectionState::Disconnected);
        assert_eq!(records[1].guild_count, 0);

        // A fresh strike starts a new probation rather than restarting again
        coordinator
            .handle_heartbeat(report(1, ConnectionState::Disconnected))
            .await;
        assert!(coordinator.waiting_list().contains(1));
        assert!(coordinator.start_queue().is_empty());
    }

    #[tokio::test]
    async fn test_healthy_report_clears_probation() {
        let (coordinator, _, launcher) = booted(2).await;

        coordinator
            .handle_heartbeat(report(0, ConnectionState::Disconnected))
            .await;
        coordinator
            .handle_heartbeat(report(0, ConnectionState::Connecting))
            .await;
        assert!(!coordinator.waiting_list().contains(0));

        coordinator
            .handle_heartbeat(report(0, ConnectionState::Disconnected))
            .await;
        assert!(coordinator.waiting_list().contains(0));
        assert!(coordinator.start_queue().is_empty());
        assert!(launcher.probe(0).unwrap().is_alive());
    }

    #[tokio::test]
    async fn test_unknown_state_counts_as_healthy() {
        let (coordinator, _, _) = booted(2).await;
        coordinator
            .handle_heartbeat(report(1, ConnectionState::Disconnected))
            .await;
        coordinator
            .handle_heartbeat(report(1, ConnectionState::Unknown))
            .await;
        assert!(!coordinator.waiting_list().contains(1));
    }

    #[tokio::test]
    async fn test_restart_bypasses_queue() {
        let (coordinator, _, launcher) = booted(2).await;
        let old = launcher.probe(0).unwrap();

        coordinator
            .handle_message(ControlMessage::Restart { shard_id: 0 })
            .await;

        assert!(old.was_killed());
        assert_eq!(launcher.launch_count(0), 2);
        assert!(launcher.probe(0).unwrap().is_alive());
        assert!(coordinator.processes().is_running(0));
        assert!(coordinator.start_queue().is_empty());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (coordinator, _, launcher) = booted(2).await;

        coordinator
            .handle_message(ControlMessage::Stop { shard_id: 1 })
            .await;
        coordinator.stop_shard(1).await;

        assert!(launcher.probe(1).unwrap().was_killed());
        assert!(!coordinator.processes().is_running(1));
        assert!(coordinator.start_queue().is_empty());
        assert_eq!(launcher.launch_count(1), 1);

        let records = coordinator.stats().read_all().await.unwrap();
        assert_eq!(records[1].connection_state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_shutdown_message_kills_children() {
        let (coordinator, _, launcher) = booted(3).await;

        coordinator.handle_message(ControlMessage::Shutdown).await;

        assert!(coordinator.is_shutting_down());
        for shard_id in 0..3 {
            assert!(launcher.probe(shard_id).unwrap().was_killed());
        }
        assert!(matches!(
            coordinator.spawn_shard(0),
            Err(ExecutionError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn test_spawn_out_of_range() {
        let (coordinator, _, _) = coordinator_with(fleet_config(2));
        assert!(matches!(
            coordinator.spawn_shard(2),
            Err(ExecutionError::ShardOutOfRange {
                shard_id: 2,
                total_shards: 2
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_launch_is_requeued_with_backoff() {
        let (coordinator, _, launcher) = coordinator_with(fleet_config(2));
        launcher.fail_shard(1);

        coordinator.handle_restart(1).await;
        assert_eq!(coordinator.spawn_failures(1), 1);
        assert!(coordinator.start_queue().is_empty());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!coordinator.start_queue().contains(1));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(coordinator.start_queue().contains(1));

        // Second failure doubles the delay
        assert_eq!(coordinator.start_queue().try_dequeue(), Some(1));
        coordinator.handle_restart(1).await;
        assert_eq!(coordinator.spawn_failures(1), 2);
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert!(!coordinator.start_queue().contains(1));
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(coordinator.start_queue().contains(1));

        launcher.heal(1);
        coordinator.spawn_shard(1).unwrap();
        assert_eq!(coordinator.spawn_failures(1), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_boots_at_throttle_pace_and_stops_on_die() {
        let (coordinator, store, launcher) = coordinator_with(fleet_config(3));
        let runner = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.run().await }
        });

        coordinator.wait_for_initial_fill().await;
        assert_eq!(launcher.launched(), vec![0, 1, 2]);
        let times = launcher.launch_times();
        for pair in times.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_secs(6));
        }

        ControlPublisher::new(store.clone(), ChannelNames::new(TEST_PREFIX))
            .send(&ControlMessage::Shutdown)
            .await
            .unwrap();

        let signal = runner.await.unwrap().unwrap();
        assert_eq!(signal, ShutdownSignal::Forced);
        for shard_id in 0..3 {
            assert!(launcher.probe(shard_id).unwrap().was_killed());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_signal_on_every_shutdown() {
        for round in 0..40 {
            let (coordinator, store, launcher) = coordinator_with(fleet_config(2));
            let runner = tokio::spawn({
                let coordinator = coordinator.clone();
                async move { coordinator.run().await }
            });
            coordinator.wait_for_initial_fill().await;

            let expected = if round % 2 == 0 {
                ControlPublisher::new(store.clone(), ChannelNames::new(TEST_PREFIX))
                    .send(&ControlMessage::Shutdown)
                    .await
                    .unwrap();
                ShutdownSignal::Forced
            } else {
                coordinator.shutdown(ShutdownSignal::Graceful);
                ShutdownSignal::Graceful
            };

            let signal = runner.await.unwrap().unwrap();
            assert_eq!(signal, expected, "round {}", round);
            assert!(launcher.probe(0).unwrap().was_killed());
        }
    }

    #[test]
    fn test_deferred_saturates() {
        let now = Utc::now();
        assert_eq!(
            deferred(now, Duration::from_secs(30), 2),
            now + chrono::Duration::seconds(60)
        );
        assert_eq!(
            deferred(now, Duration::from_secs(u64::MAX), usize::MAX),
            DateTime::<Utc>::MAX_UTC
        );
    }
}
