//! Lifecycle and health event definitions and bus.

use bock_common::ContainerId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::HealthConfig;
use crate::monitor::MonitorTarget;
use crate::state::HealthStatus;

/// Container lifecycle events published by the runtime.
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RuntimeEvent {
    /// Container started (or restarted).
    ContainerStarted {
        target: MonitorTarget,
        healthcheck: Option<HealthConfig>,
    },
    /// Container process exited or was stopped.
    ContainerStopped { id: ContainerId },
    /// Container frozen.
    ContainerPaused { id: ContainerId },
    /// Container thawed.
    ContainerResumed { id: ContainerId },
    /// Container removed.
    ContainerDeleted { id: ContainerId },
    /// A signal was delivered to the container's main process.
    ContainerSignaled { id: ContainerId, signal: i32 },
}

/// Events emitted by health monitors.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthEvent {
    /// A probe result moved the container to a new status.
    StatusChanged {
        id: ContainerId,
        from: HealthStatus,
        to: HealthStatus,
        failing_streak: u32,
        timestamp: i64,
    },
}

/// Broadcast bus for events of type `E`.
#[derive(Debug, Clone)]
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::with_capacity(1024)
    }
}

impl<E: Clone> EventBus<E> {
    /// Create a new event bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bus buffering up to `capacity` events per slow subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Publish an event.
    pub fn publish(&self, event: E) {
        // Ignore SendError (no subscribers)
        let _ = self.sender.send(event);
    }
}
