//! End-to-end coordinator scenarios over the in-memory store
//!
//! Every scenario drives a running coordinator only through the control
//! channels, the way workers and operators do in production.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use shardcoord_config::CoordinatorConfig;
use shardcoord_execution::testing::{coordinator_with, fleet_config, RecordingLauncher, TEST_PREFIX};
use shardcoord_execution::{Coordinator, CoordinatorResult, ExecutionError};
use shardcoord_ipc::{ChannelNames, ConnectionState, ControlMessage, ShardState};
use shardcoord_resilience::ShutdownSignal;
use shardcoord_storage::{
    ControlPublisher, CoordinationStore, InMemoryStore, StorageError, StorageResult, Subscription,
};

struct Fleet {
    coordinator: Coordinator,
    store: Arc<InMemoryStore>,
    launcher: Arc<RecordingLauncher>,
    publisher: ControlPublisher,
    runner: JoinHandle<CoordinatorResult<ShutdownSignal>>,
}

impl Fleet {
    /// Start a coordinator and wait until every shard was launched once
    async fn boot(config: CoordinatorConfig) -> Self {
        let (coordinator, store, launcher) = coordinator_with(config);
        let publisher = ControlPublisher::new(store.clone(), ChannelNames::new(TEST_PREFIX));
        let runner = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.run().await }
        });
        coordinator.wait_for_initial_fill().await;

        Self {
            coordinator,
            store,
            launcher,
            publisher,
            runner,
        }
    }

    async fn send(&self, message: ControlMessage) {
        self.publisher.send(&message).await.unwrap();
        // Let the listener drain the bus before asserting
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    async fn report(&self, shard_id: u32, connection_state: ConnectionState, guild_count: u64) {
        self.send(ControlMessage::Heartbeat(ShardState {
            shard_id,
            connection_state,
            guild_count,
            last_report_time: Utc::now(),
        }))
        .await;
    }

    async fn die(self) -> ShutdownSignal {
        self.publisher.send(&ControlMessage::Shutdown).await.unwrap();
        self.runner.await.unwrap().unwrap()
    }
}

#[tokio::test(start_paused = true)]
async fn test_boot_heartbeat_and_die() {
    let fleet = Fleet::boot(fleet_config(3)).await;
    assert_eq!(fleet.launcher.launched(), vec![0, 1, 2]);

    fleet.report(1, ConnectionState::Connected, 77).await;
    let records = fleet.coordinator.stats().read_all().await.unwrap();
    assert_eq!(records[1].connection_state, ConnectionState::Connected);
    assert_eq!(records[1].guild_count, 77);

    let launcher = fleet.launcher.clone();
    assert_eq!(fleet.die().await, ShutdownSignal::Forced);
    for shard_id in 0..3 {
        assert!(launcher.probe(shard_id).unwrap().was_killed());
    }
}

#[tokio::test(start_paused = true)]
async fn test_malformed_payloads_are_dropped() {
    let fleet = Fleet::boot(fleet_config(2)).await;
    let names = ChannelNames::new(TEST_PREFIX);

    for (channel, payload) in [
        (&names.heartbeat, "{not json"),
        (&names.heartbeat, "null"),
        (&names.restart, ""),
        (&names.restart, "99"),
        (&names.stop, "-1"),
    ] {
        fleet.store.publish(channel, payload.to_string()).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!fleet.coordinator.is_shutting_down());
    assert_eq!(fleet.launcher.launched(), vec![0, 1]);

    // The listener is still alive after the garbage
    fleet.report(0, ConnectionState::Connecting, 5).await;
    let records = fleet.coordinator.stats().read_all().await.unwrap();
    assert_eq!(records[0].connection_state, ConnectionState::Connecting);

    fleet.die().await;
}

#[tokio::test(start_paused = true)]
async fn test_two_strikes_trigger_one_throttled_restart() {
    let fleet = Fleet::boot(fleet_config(3)).await;
    let first = fleet.launcher.probe(2).unwrap();

    fleet.report(2, ConnectionState::Disconnected, 0).await;
    assert!(first.is_alive());
    assert!(fleet.coordinator.waiting_list().contains(2));

    fleet.report(2, ConnectionState::Disconnected, 0).await;
    assert!(first.was_killed());
    assert!(!fleet.coordinator.waiting_list().contains(2));

    // The restart goes through the start queue, so it waits for the next tick
    assert_eq!(fleet.launcher.launch_count(2), 1);
    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(fleet.launcher.launch_count(2), 2);
    assert!(fleet.launcher.probe(2).unwrap().is_alive());

    fleet.die().await;
}

#[tokio::test(start_paused = true)]
async fn test_restart_request_is_immediate() {
    let fleet = Fleet::boot(fleet_config(2)).await;
    let first = fleet.launcher.probe(1).unwrap();

    fleet.send(ControlMessage::Restart { shard_id: 1 }).await;

    assert!(first.was_killed());
    assert_eq!(fleet.launcher.launch_count(1), 2);
    assert!(fleet.coordinator.start_queue().is_empty());

    fleet.die().await;
}

#[tokio::test(start_paused = true)]
async fn test_stopped_shard_stays_down_without_crash_detection() {
    let mut config = fleet_config(2);
    config.crash_detection = false;
    let fleet = Fleet::boot(config).await;

    fleet.send(ControlMessage::Stop { shard_id: 0 }).await;
    assert!(fleet.launcher.probe(0).unwrap().was_killed());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(fleet.launcher.launch_count(0), 1);

    fleet.die().await;
}

#[tokio::test(start_paused = true)]
async fn test_crash_detection_relaunches_dead_process() {
    let fleet = Fleet::boot(fleet_config(2)).await;

    fleet.launcher.probe(1).unwrap().exit();

    // One sweep interval plus one throttle tick
    tokio::time::sleep(Duration::from_secs(17)).await;
    assert_eq!(fleet.launcher.launch_count(1), 2);
    assert!(fleet.coordinator.processes().is_running(1));

    fleet.die().await;
}

#[tokio::test(start_paused = true)]
async fn test_unmanaged_shard_is_never_launched_at_boot() {
    let mut config = fleet_config(3);
    config.unmanaged_shards = vec![0];
    let fleet = Fleet::boot(config).await;

    assert_eq!(fleet.launcher.launched(), vec![1, 2]);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(fleet.launcher.launch_count(0), 0);

    fleet.die().await;
}

#[tokio::test(start_paused = true)]
async fn test_terminal_signal_is_graceful() {
    let fleet = Fleet::boot(fleet_config(1)).await;
    fleet.coordinator.shutdown(ShutdownSignal::Graceful);

    let signal = fleet.runner.await.unwrap().unwrap();
    assert_eq!(signal, ShutdownSignal::Graceful);
    assert!(fleet.launcher.probe(0).unwrap().was_killed());
}

/// Store whose pub/sub side is down
struct NoSubscribeStore(InMemoryStore);

#[async_trait]
impl CoordinationStore for NoSubscribeStore {
    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.0.delete(key).await
    }

    async fn push(&self, key: &str, value: String) -> StorageResult<()> {
        self.0.push(key, value).await
    }

    async fn read_all(&self, key: &str) -> StorageResult<Vec<String>> {
        self.0.read_all(key).await
    }

    async fn write_at(&self, key: &str, index: usize, value: String) -> StorageResult<()> {
        self.0.write_at(key, index, value).await
    }

    async fn publish(&self, channel: &str, payload: String) -> StorageResult<()> {
        self.0.publish(channel, payload).await
    }

    async fn subscribe(&self, _channels: &[String]) -> StorageResult<Subscription> {
        Err(StorageError::ConnectionFailed("pub/sub unavailable".to_string()))
    }
}

#[tokio::test]
async fn test_startup_failure_is_reported() {
    let launcher = Arc::new(RecordingLauncher::new());
    let coordinator = Coordinator::new(
        fleet_config(2),
        ChannelNames::new(TEST_PREFIX),
        Arc::new(NoSubscribeStore(InMemoryStore::new())),
        launcher.clone(),
    );

    let err = coordinator.run().await.unwrap_err();
    assert!(matches!(
        err,
        ExecutionError::StoreError(StorageError::ConnectionFailed(_))
    ));
    assert!(launcher.launched().is_empty());
}
