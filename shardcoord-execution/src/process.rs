//! Shard worker processes: launch, liveness and termination

use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::Stdio;
use tracing::{debug, warn};

use shardcoord_config::ProcessConfig;
use shardcoord_ipc::ShardId;

use crate::error::{CoordinatorResult, ExecutionError};

/// Handle on a running shard worker
pub trait ShardProcess: Send {
    /// OS process id, if still known
    fn id(&self) -> Option<u32>;

    /// Whether the process has terminated; probing errors count as terminated
    fn has_exited(&mut self) -> bool;

    /// Ask the OS to kill the process without waiting for it
    fn terminate(&mut self) -> std::io::Result<()>;
}

impl ShardProcess for tokio::process::Child {
    fn id(&self) -> Option<u32> {
        tokio::process::Child::id(self)
    }

    fn has_exited(&mut self) -> bool {
        !matches!(self.try_wait(), Ok(None))
    }

    fn terminate(&mut self) -> std::io::Result<()> {
        self.start_kill()
    }
}

/// Starts shard workers
pub trait ShardLauncher: Send + Sync {
    fn launch(&self, shard_id: ShardId) -> CoordinatorResult<Box<dyn ShardProcess>>;
}

/// Worker command line with `{n}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl CommandTemplate {
    pub fn from_config(config: &ProcessConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            working_dir: config.working_dir.clone(),
        }
    }

    /// Render the argument list for one shard
    pub fn render(&self, shard_id: ShardId, coordinator_pid: u32) -> Vec<String> {
        let shard = shard_id.to_string();
        let pid = coordinator_pid.to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{shard_id}", &shard)
                    .replace("{coordinator_pid}", &pid)
                    .replace("{0}", &shard)
                    .replace("{1}", &pid)
                    .replace("{2}", "")
            })
            .collect()
    }
}

/// Launches real OS processes from a [`CommandTemplate`]
pub struct ProcessLauncher {
    template: CommandTemplate,
    coordinator_pid: u32,
}

impl ProcessLauncher {
    pub fn new(template: CommandTemplate) -> Self {
        Self {
            template,
            coordinator_pid: std::process::id(),
        }
    }
}

impl ShardLauncher for ProcessLauncher {
    fn launch(&self, shard_id: ShardId) -> CoordinatorResult<Box<dyn ShardProcess>> {
        let args = self.template.render(shard_id, self.coordinator_pid);
        debug!("Launching shard {}: {} {:?}", shard_id, self.template.command, args);

        let mut command = tokio::process::Command::new(&self.template.command);
        command.args(&args).stdin(Stdio::null());
        if let Some(dir) = &self.template.working_dir {
            command.current_dir(dir);
        }

        let child = command
            .spawn()
            .map_err(|source| ExecutionError::LaunchFailed { shard_id, source })?;
        Ok(Box::new(child))
    }
}

/// One slot per shard id holding the process the coordinator started for it
pub struct ProcessTable {
    slots: Mutex<Vec<Option<Box<dyn ShardProcess>>>>,
}

impl ProcessTable {
    pub fn new(total_shards: u32) -> Self {
        Self {
            slots: Mutex::new((0..total_shards).map(|_| None).collect()),
        }
    }

    /// Store `process` in the slot, terminating whatever occupied it
    pub fn install(&self, shard_id: ShardId, process: Box<dyn ShardProcess>) {
        let previous = {
            let mut slots = self.slots.lock();
            match slots.get_mut(shard_id as usize) {
                Some(slot) => slot.replace(process),
                None => {
                    warn!("Shard {} has no process slot; dropping handle", shard_id);
                    Some(process)
                }
            }
        };
        if let Some(previous) = previous {
            terminate_quietly(shard_id, previous);
        }
    }

    /// Empty the slot and terminate its occupant; returns whether there was one
    pub fn release(&self, shard_id: ShardId) -> bool {
        let previous = self
            .slots
            .lock()
            .get_mut(shard_id as usize)
            .and_then(Option::take);
        match previous {
            Some(process) => {
                terminate_quietly(shard_id, process);
                true
            }
            None => false,
        }
    }

    /// Whether the slot holds a process that is still alive
    pub fn is_running(&self, shard_id: ShardId) -> bool {
        self.slots
            .lock()
            .get_mut(shard_id as usize)
            .and_then(Option::as_mut)
            .map(|process| !process.has_exited())
            .unwrap_or(false)
    }

    /// Shards whose slot is empty or holds an exited process
    pub fn dead_slots(&self) -> Vec<ShardId> {
        let mut slots = self.slots.lock();
        slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Some(process) => process.has_exited().then_some(index as ShardId),
                None => Some(index as ShardId),
            })
            .collect()
    }

    /// Terminate every live process; returns how many slots were occupied
    pub fn kill_all(&self) -> usize {
        let taken: Vec<(ShardId, Box<dyn ShardProcess>)> = self
            .slots
            .lock()
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.take().map(|p| (index as ShardId, p)))
            .collect();
        let count = taken.len();
        for (shard_id, process) in taken {
            terminate_quietly(shard_id, process);
        }
        count
    }
}

fn terminate_quietly(shard_id: ShardId, mut process: Box<dyn ShardProcess>) {
    if process.has_exited() {
        return;
    }
    if let Err(e) = process.terminate() {
        debug!("Failed to terminate shard {} (pid {:?}): {}", shard_id, process.id(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeProcess;

    #[test]
    fn test_render_placeholders() {
        let template = CommandTemplate {
            command: "worker".to_string(),
            args: vec![
                "run".to_string(),
                "--shard={shard_id}".to_string(),
                "{0}".to_string(),
                "{1}".to_string(),
                "{2}".to_string(),
                "--parent={coordinator_pid}".to_string(),
            ],
            working_dir: None,
        };

        assert_eq!(
            template.render(4, 900),
            vec!["run", "--shard=4", "4", "900", "", "--parent=900"]
        );
    }

    #[test]
    fn test_install_replaces_and_kills_previous() {
        let table = ProcessTable::new(2);
        let (first, first_probe) = FakeProcess::new();
        let (second, second_probe) = FakeProcess::new();

        table.install(1, Box::new(first));
        assert!(table.is_running(1));

        table.install(1, Box::new(second));
        assert!(first_probe.was_killed());
        assert!(!second_probe.was_killed());
        assert!(table.is_running(1));
    }

    #[test]
    fn test_release_empty_slot() {
        let table = ProcessTable::new(3);
        assert!(!table.release(2));
        assert!(!table.release(10));
    }

    #[test]
    fn test_dead_slots() {
        let table = ProcessTable::new(3);
        let (alive, _) = FakeProcess::new();
        let (dead, dead_probe) = FakeProcess::new();
        table.install(0, Box::new(alive));
        table.install(2, Box::new(dead));
        dead_probe.exit();

        assert_eq!(table.dead_slots(), vec![1, 2]);
    }

    #[test]
    fn test_kill_all() {
        let table = ProcessTable::new(3);
        let (a, a_probe) = FakeProcess::new();
        let (b, b_probe) = FakeProcess::new();
        table.install(0, Box::new(a));
        table.install(1, Box::new(b));

        assert_eq!(table.kill_all(), 2);
        assert!(a_probe.was_killed());
        assert!(b_probe.was_killed());
        assert_eq!(table.dead_slots(), vec![0, 1, 2]);
    }

    #[test]
    fn test_terminate_error_is_swallowed() {
        let table = ProcessTable::new(1);
        let (process, probe) = FakeProcess::failing_kill();
        table.install(0, Box::new(process));
        assert!(table.release(0));
        assert!(!probe.was_killed());
    }

    #[tokio::test]
    async fn test_launch_missing_binary_fails() {
        let launcher = ProcessLauncher::new(CommandTemplate {
            command: "/nonexistent/shard-worker-binary".to_string(),
            args: vec!["{0}".to_string()],
            working_dir: None,
        });
        let err = launcher.launch(0).err().expect("launch should fail");
        assert!(matches!(err, ExecutionError::LaunchFailed { shard_id: 0, .. }));
    }
}
