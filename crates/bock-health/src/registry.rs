//! Process-wide monitor registry.
//!
//! Maps container IDs to their monitors. Created once by the daemon and
//! passed to whoever needs it; safe to share across tasks.

use std::sync::Arc;

use bock_common::{BockError, BockResult, ContainerId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::config::HealthConfig;
use crate::events::{EventBus, HealthEvent, RuntimeEvent};
use crate::exec::DynContainerExec;
use crate::monitor::{Monitor, MonitorTarget};
use crate::probe::ProbeExecutor;
use crate::settings::RegistryConfig;
use crate::state::HealthState;

/// What the registry holds for one container.
#[derive(Debug)]
enum Slot {
    Running(Arc<Monitor>),
    /// Told to stop for a pause; the loop may not have exited yet.
    Suspending(Arc<Monitor>),
    /// Paused container: loop stopped, last state kept for inspection.
    Suspended {
        target: MonitorTarget,
        config: HealthConfig,
        state: HealthState,
    },
    /// The monitor could not be spawned.
    Inert { cause: String },
}

/// Registry of running health monitors.
#[derive(Debug)]
pub struct MonitorRegistry {
    slots: DashMap<ContainerId, Slot>,
    executor: ProbeExecutor,
    events: EventBus<HealthEvent>,
    config: RegistryConfig,
}

impl MonitorRegistry {
    /// Create an empty registry probing through `exec`.
    #[must_use]
    pub fn new(exec: DynContainerExec, config: RegistryConfig) -> Self {
        Self {
            slots: DashMap::new(),
            executor: ProbeExecutor::new(exec, config.max_output_bytes),
            events: EventBus::new(),
            config,
        }
    }

    /// Publish status transitions on an existing bus.
    #[must_use]
    pub fn with_events(mut self, events: EventBus<HealthEvent>) -> Self {
        self.events = events;
        self
    }

    /// Bus carrying status transitions of every monitor.
    #[must_use]
    pub fn events(&self) -> &EventBus<HealthEvent> {
        &self.events
    }

    /// Registry settings.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Start monitoring a container.
    ///
    /// Idempotent: if a monitor is already running for the container it is
    /// returned unchanged. A suspended monitor, or one being suspended,
    /// resumes from its last state in a fresh loop.
    ///
    /// # Errors
    ///
    /// - [`BockError::HealthcheckDisabled`] if the test is `NONE` or empty
    /// - [`BockError::InvalidHealthConfig`] if validation fails
    /// - [`BockError::RuntimeUnavailable`] if the task cannot be spawned; the
    ///   container is then reported with status `none` until a later start
    pub fn start(&self, target: MonitorTarget, config: HealthConfig) -> BockResult<Arc<Monitor>> {
        if config.is_disabled() {
            return Err(BockError::HealthcheckDisabled {
                id: target.id.to_string(),
            });
        }
        config.validate()?;

        match self.slots.entry(target.id.clone()) {
            Entry::Occupied(mut occupied) => {
                let initial = match occupied.get() {
                    Slot::Running(monitor) => {
                        tracing::debug!(container_id = %target.id, "Health monitor already running");
                        return Ok(Arc::clone(monitor));
                    }
                    Slot::Suspending(monitor) => monitor.snapshot(),
                    Slot::Suspended { state, .. } => state.clone(),
                    Slot::Inert { .. } => HealthState::starting(self.config.log_capacity),
                };
                let (slot, result) = self.launch(target, config, initial);
                occupied.insert(slot);
                result
            }
            Entry::Vacant(vacant) => {
                let initial = HealthState::starting(self.config.log_capacity);
                let (slot, result) = self.launch(target, config, initial);
                vacant.insert(slot);
                result
            }
        }
    }

    fn launch(
        &self,
        target: MonitorTarget,
        config: HealthConfig,
        initial: HealthState,
    ) -> (Slot, BockResult<Arc<Monitor>>) {
        let id = target.id.clone();
        match Monitor::spawn(target, config, initial, self.executor.clone(), self.events.clone()) {
            Ok(monitor) => (Slot::Running(Arc::clone(&monitor)), Ok(monitor)),
            Err(err) => {
                tracing::error!(container_id = %id, error = %err, "Failed to start health monitor");
                (
                    Slot::Inert {
                        cause: err.to_string(),
                    },
                    Err(err),
                )
            }
        }
    }

    /// Stop monitoring a container and release its state.
    ///
    /// Returns `false` if nothing was registered for `id`.
    pub async fn stop(&self, id: &ContainerId) -> bool {
        let Some((_, slot)) = self.slots.remove(id) else {
            tracing::debug!(container_id = %id, "No health monitor to stop");
            return false;
        };

        if let Slot::Running(monitor) | Slot::Suspending(monitor) = slot {
            let state = monitor.stop(self.config.stop_timeout).await;
            tracing::info!(
                container_id = %id,
                status = %state.status,
                failing_streak = state.failing_streak,
                "Stopped health monitor"
            );
        }
        true
    }

    /// Stop the loop but keep its last state visible, for paused containers.
    ///
    /// Returns `false` unless a monitor was running. A start or resume that
    /// arrives before the loop has exited launches a new loop and wins.
    pub async fn suspend(&self, id: &ContainerId) -> bool {
        let monitor = {
            let Some(mut slot) = self.slots.get_mut(id) else {
                return false;
            };
            let Slot::Running(monitor) = slot.value() else {
                return false;
            };
            let monitor = Arc::clone(monitor);
            monitor.request_stop();
            *slot = Slot::Suspending(Arc::clone(&monitor));
            monitor
        };

        let state = monitor.stop(self.config.stop_timeout).await;

        // Leave the slot alone if it was stopped or replaced meanwhile.
        if let Some(mut slot) = self.slots.get_mut(id) {
            if matches!(slot.value(), Slot::Suspending(current) if Arc::ptr_eq(current, &monitor)) {
                *slot = Slot::Suspended {
                    target: monitor.target().clone(),
                    config: monitor.config().clone(),
                    state,
                };
                tracing::info!(container_id = %id, "Suspended health monitor");
            }
        }
        true
    }

    /// Restart a suspended monitor from its saved state.
    ///
    /// Returns the running monitor, or `None` if nothing was suspended or
    /// running for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`BockError::RuntimeUnavailable`] if the task cannot be spawned.
    pub fn resume(&self, id: &ContainerId) -> BockResult<Option<Arc<Monitor>>> {
        let Some(mut slot) = self.slots.get_mut(id) else {
            return Ok(None);
        };

        let (target, config, state) = match slot.value() {
            Slot::Running(monitor) => return Ok(Some(Arc::clone(monitor))),
            Slot::Suspending(monitor) => (
                monitor.target().clone(),
                monitor.config().clone(),
                monitor.snapshot(),
            ),
            Slot::Suspended {
                target,
                config,
                state,
            } => (target.clone(), config.clone(), state.clone()),
            Slot::Inert { .. } => return Ok(None),
        };

        let (next, result) = self.launch(target, config, state);
        *slot = next;
        result.map(Some)
    }

    /// Current health state, if the container has one.
    #[must_use]
    pub fn get(&self, id: &ContainerId) -> Option<HealthState> {
        let slot = self.slots.get(id)?;
        Some(match slot.value() {
            Slot::Running(monitor) | Slot::Suspending(monitor) => monitor.snapshot(),
            Slot::Suspended { state, .. } => state.clone(),
            Slot::Inert { .. } => HealthState::inert(),
        })
    }

    /// Why a container's monitor is inert, if it is.
    #[must_use]
    pub fn inert_cause(&self, id: &ContainerId) -> Option<String> {
        match self.slots.get(id)?.value() {
            Slot::Inert { cause } => Some(cause.clone()),
            _ => None,
        }
    }

    /// Running monitor for a container.
    #[must_use]
    pub fn monitor(&self, id: &ContainerId) -> Option<Arc<Monitor>> {
        match self.slots.get(id)?.value() {
            Slot::Running(monitor) => Some(Arc::clone(monitor)),
            _ => None,
        }
    }

    /// Ask a running monitor to probe immediately.
    ///
    /// Returns `false` if no monitor is running for `id`.
    pub fn trigger(&self, id: &ContainerId) -> bool {
        self.monitor(id).is_some_and(|monitor| {
            monitor.probe_now();
            true
        })
    }

    /// IDs of every container with registered health state.
    #[must_use]
    pub fn ids(&self) -> Vec<ContainerId> {
        self.slots.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of registered containers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Stop every monitor and clear the registry.
    pub async fn shutdown(&self) {
        let ids = self.ids();
        let stopped = futures::future::join_all(ids.iter().map(|id| self.stop(id)))
            .await
            .into_iter()
            .filter(|stopped| *stopped)
            .count();
        tracing::info!(count = stopped, "Health monitor registry shut down");
    }

    /// Apply one runtime lifecycle event.
    ///
    /// Signals delivered to a container's main process are logged and
    /// otherwise ignored.
    pub async fn handle_lifecycle(&self, event: RuntimeEvent) {
        match event {
            RuntimeEvent::ContainerStarted {
                target,
                healthcheck,
            } => match healthcheck {
                Some(config) if !config.is_disabled() => {
                    if let Err(err) = self.start(target, config) {
                        tracing::warn!(error = %err, "Health monitor not started");
                    }
                }
                _ => tracing::debug!(container_id = %target.id, "No health check configured"),
            },
            RuntimeEvent::ContainerStopped { id } | RuntimeEvent::ContainerDeleted { id } => {
                self.stop(&id).await;
            }
            RuntimeEvent::ContainerPaused { id } => {
                self.suspend(&id).await;
            }
            RuntimeEvent::ContainerResumed { id } => {
                if let Err(err) = self.resume(&id) {
                    tracing::warn!(container_id = %id, error = %err, "Health monitor not resumed");
                }
            }
            RuntimeEvent::ContainerSignaled { id, signal } => {
                tracing::debug!(
                    container_id = %id,
                    signal,
                    "Signal delivered to container, health monitor unaffected"
                );
            }
        }
    }

    /// Follow runtime lifecycle events until the channel closes.
    pub fn watch_lifecycle(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<RuntimeEvent>,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => registry.handle_lifecycle(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Lifecycle event stream lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("Lifecycle event stream closed");
        })
    }
}
