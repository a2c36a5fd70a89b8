//! Shutdown coordination
//!
//! A single [`ShutdownCoordinator`] fans a shutdown signal out to every
//! background loop. Listeners created after the signal fired still observe it.

use std::time::Duration;
use tokio::sync::watch;
use log::{debug, info};

/// Why the coordinator is shutting down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Operating system signal (SIGINT/SIGTERM)
    Graceful,
    /// Explicit kill request over the control channel
    Forced,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Graceful => write!(f, "graceful"),
            ShutdownSignal::Forced => write!(f, "forced"),
        }
    }
}

/// Shutdown coordinator
pub struct ShutdownCoordinator {
    sender: watch::Sender<Option<ShutdownSignal>>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    /// Subscribe to shutdown signals
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.sender.subscribe(),
        }
    }

    /// Check if shutdown is in progress
    pub fn is_shutting_down(&self) -> bool {
        self.sender.borrow().is_some()
    }

    /// Signal that fired, if any
    pub fn signal(&self) -> Option<ShutdownSignal> {
        *self.sender.borrow()
    }

    /// Fire the shutdown signal; only the first call has an effect
    pub fn trigger(&self, signal: ShutdownSignal) -> Result<(), ShutdownError> {
        let fired = self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(signal);
            true
        });

        if fired {
            info!("Shutdown requested ({})", signal);
            Ok(())
        } else {
            debug!("Ignoring {} shutdown request, shutdown already in progress", signal);
            Err(ShutdownError::AlreadyShuttingDown)
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of the shutdown signal
#[derive(Clone)]
pub struct ShutdownListener {
    receiver: watch::Receiver<Option<ShutdownSignal>>,
}

impl ShutdownListener {
    /// Wait until shutdown is requested
    pub async fn recv(&mut self) -> ShutdownSignal {
        loop {
            if let Some(signal) = *self.receiver.borrow_and_update() {
                return signal;
            }
            if self.receiver.changed().await.is_err() {
                // Coordinator dropped without firing: nothing can drive us any more
                return ShutdownSignal::Forced;
            }
        }
    }

    /// Sleep for `duration`; returns `false` if shutdown fired first
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.recv() => false,
        }
    }
}

/// Shutdown error types
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    /// Shutdown already in progress
    #[error("Shutdown already in progress")]
    AlreadyShuttingDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_once() {
        let coordinator = ShutdownCoordinator::new();
        assert!(!coordinator.is_shutting_down());

        coordinator.trigger(ShutdownSignal::Forced).unwrap();
        assert!(coordinator.is_shutting_down());
        assert_eq!(coordinator.signal(), Some(ShutdownSignal::Forced));

        assert!(matches!(
            coordinator.trigger(ShutdownSignal::Graceful),
            Err(ShutdownError::AlreadyShuttingDown)
        ));
        assert_eq!(coordinator.signal(), Some(ShutdownSignal::Forced));
    }

    #[tokio::test]
    async fn test_late_listener_sees_signal() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.trigger(ShutdownSignal::Graceful).unwrap();

        let mut listener = coordinator.subscribe();
        assert_eq!(listener.recv().await, ShutdownSignal::Graceful);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted_by_shutdown() {
        let coordinator = std::sync::Arc::new(ShutdownCoordinator::new());
        let mut listener = coordinator.subscribe();

        let trigger = coordinator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            trigger.trigger(ShutdownSignal::Forced).unwrap();
        });

        let start = tokio::time::Instant::now();
        assert!(!listener.sleep(Duration::from_secs(60)).await);
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_without_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        let mut listener = coordinator.subscribe();
        assert!(listener.sleep(Duration::from_secs(6)).await);
    }

    #[tokio::test]
    async fn test_dropped_coordinator_releases_listeners() {
        let coordinator = ShutdownCoordinator::new();
        let mut listener = coordinator.subscribe();
        drop(coordinator);
        assert_eq!(listener.recv().await, ShutdownSignal::Forced);
    }
}
