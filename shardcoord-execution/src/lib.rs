//! Shard fleet coordinator
//!
//! Launches one worker process per shard, paces launches through a
//! deduplicating [`StartQueue`], escalates unhealthy heartbeats through a
//! two-strike [`WaitingList`] and restarts shards whose status record goes
//! stale or whose process disappears.

pub mod coordinator;
pub mod error;
pub mod health;
pub mod process;
pub mod queue;
pub mod waiting;

mod throttle;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export main types
pub use coordinator::Coordinator;
pub use error::{CoordinatorResult, ExecutionError};
pub use health::SweepOutcome;
pub use process::{CommandTemplate, ProcessLauncher, ProcessTable, ShardLauncher, ShardProcess};
pub use queue::StartQueue;
pub use waiting::WaitingList;
