//! Resilience patterns for the shard coordinator
//!
//! Backoff delay calculation for retried launches and a shutdown signal that
//! every background loop observes.

pub mod backoff;
pub mod shutdown;

// Re-export commonly used types
pub use backoff::BackoffCalculator;
pub use shutdown::{ShutdownCoordinator, ShutdownError, ShutdownListener, ShutdownSignal};
