//! In-process stand-ins for shard workers

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

use shardcoord_config::CoordinatorConfig;
use shardcoord_ipc::{ChannelNames, ShardId};
use shardcoord_storage::InMemoryStore;

use crate::coordinator::Coordinator;
use crate::error::{CoordinatorResult, ExecutionError};
use crate::process::{ShardLauncher, ShardProcess};

/// Key prefix used by [`coordinator_with`]
pub const TEST_PREFIX: &str = "test";

/// Coordinator over an in-memory store and a [`RecordingLauncher`]
pub fn coordinator_with(
    config: CoordinatorConfig,
) -> (Coordinator, Arc<InMemoryStore>, Arc<RecordingLauncher>) {
    let store = Arc::new(InMemoryStore::new());
    let launcher = Arc::new(RecordingLauncher::new());
    let coordinator = Coordinator::new(
        config,
        ChannelNames::new(TEST_PREFIX),
        store.clone(),
        launcher.clone(),
    );
    (coordinator, store, launcher)
}

/// Default timings for a fleet of `total_shards`
pub fn fleet_config(total_shards: u32) -> CoordinatorConfig {
    CoordinatorConfig {
        total_shards,
        ..CoordinatorConfig::default()
    }
}

#[derive(Debug, Default)]
struct ProbeState {
    exited: AtomicBool,
    killed: AtomicBool,
}

/// Observes and controls a [`FakeProcess`] after it was handed off
#[derive(Debug, Clone, Default)]
pub struct ProcessProbe {
    state: Arc<ProbeState>,
}

impl ProcessProbe {
    /// Simulate the worker crashing
    pub fn exit(&self) {
        self.state.exited.store(true, Ordering::SeqCst);
    }

    pub fn was_killed(&self) -> bool {
        self.state.killed.load(Ordering::SeqCst)
    }

    pub fn is_alive(&self) -> bool {
        !self.state.exited.load(Ordering::SeqCst)
    }
}

/// A worker that lives until killed or told to exit
#[derive(Debug)]
pub struct FakeProcess {
    probe: ProcessProbe,
    fail_kill: bool,
}

impl FakeProcess {
    pub fn new() -> (Self, ProcessProbe) {
        let probe = ProcessProbe::default();
        (
            Self {
                probe: probe.clone(),
                fail_kill: false,
            },
            probe,
        )
    }

    /// A worker whose termination always errors
    pub fn failing_kill() -> (Self, ProcessProbe) {
        let (mut process, probe) = Self::new();
        process.fail_kill = true;
        (process, probe)
    }
}

impl ShardProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        None
    }

    fn has_exited(&mut self) -> bool {
        !self.probe.is_alive()
    }

    fn terminate(&mut self) -> io::Result<()> {
        if self.fail_kill {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "kill refused"));
        }
        self.probe.state.killed.store(true, Ordering::SeqCst);
        self.probe.state.exited.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Launcher that records every launch and hands out [`FakeProcess`]es
#[derive(Debug, Default)]
pub struct RecordingLauncher {
    launches: Mutex<Vec<(ShardId, Instant)>>,
    probes: Mutex<HashMap<ShardId, ProcessProbe>>,
    failing: Mutex<HashSet<ShardId>>,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every launch of `shard_id` fail until [`Self::heal`] is called
    pub fn fail_shard(&self, shard_id: ShardId) {
        self.failing.lock().insert(shard_id);
    }

    pub fn heal(&self, shard_id: ShardId) {
        self.failing.lock().remove(&shard_id);
    }

    /// Shard ids in launch order
    pub fn launched(&self) -> Vec<ShardId> {
        self.launches.lock().iter().map(|(id, _)| *id).collect()
    }

    /// Launch instants, in launch order
    pub fn launch_times(&self) -> Vec<(ShardId, Instant)> {
        self.launches.lock().clone()
    }

    pub fn launch_count(&self, shard_id: ShardId) -> usize {
        self.launches
            .lock()
            .iter()
            .filter(|(id, _)| *id == shard_id)
            .count()
    }

    /// Probe of the most recent process started for `shard_id`
    pub fn probe(&self, shard_id: ShardId) -> Option<ProcessProbe> {
        self.probes.lock().get(&shard_id).cloned()
    }
}

impl ShardLauncher for RecordingLauncher {
    fn launch(&self, shard_id: ShardId) -> CoordinatorResult<Box<dyn ShardProcess>> {
        if self.failing.lock().contains(&shard_id) {
            return Err(ExecutionError::LaunchFailed {
                shard_id,
                source: io::Error::new(io::ErrorKind::NotFound, "worker binary missing"),
            });
        }

        let (process, probe) = FakeProcess::new();
        self.launches.lock().push((shard_id, Instant::now()));
        self.probes.lock().insert(shard_id, probe);
        Ok(Box::new(process))
    }
}
