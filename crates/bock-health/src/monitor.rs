//! Health monitor loop.
//!
//! Each monitored container gets one task that sleeps, probes, folds the
//! result into its [`HealthState`] and publishes a snapshot. The task owns
//! the state outright; everyone else sees clones through a watch channel,
//! so a reader never observes a status without its log entry.
//!
//! The loop listens to exactly two inputs besides its timer: a stop flag and
//! a forced-probe notification. Signals delivered to the container's main
//! process are not among them.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bock_common::{BockError, BockResult, ContainerId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::HealthConfig;
use crate::events::{EventBus, HealthEvent};
use crate::exec::ExecRequest;
use crate::probe::{ProbeExecutor, ProbeResult};
use crate::state::{HealthState, HealthStatus};

/// The container a monitor probes, and the context probes run in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorTarget {
    /// Container ID.
    pub id: ContainerId,
    /// Container working directory; probes run there.
    pub working_dir: Option<PathBuf>,
    /// Container environment; probes inherit it.
    #[serde(default)]
    pub env: Vec<(String, String)>,
    /// When the container started. The start period counts from here.
    pub started_at: DateTime<Utc>,
}

impl MonitorTarget {
    /// Target a container that started just now.
    #[must_use]
    pub fn new(id: ContainerId) -> Self {
        Self {
            id,
            working_dir: None,
            env: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the environment.
    #[must_use]
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    /// Set the container start time.
    #[must_use]
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// The exec request a probe of `config` sends for this target.
    #[must_use]
    pub fn exec_request(&self, config: &HealthConfig) -> ExecRequest {
        ExecRequest {
            container_id: self.id.clone(),
            args: config.test.argv(),
            working_dir: self.working_dir.clone(),
            env: self.env.clone(),
        }
    }
}

/// Handle to a running monitor task.
#[derive(Debug)]
pub struct Monitor {
    target: MonitorTarget,
    config: HealthConfig,
    state: watch::Receiver<HealthState>,
    stop: watch::Sender<bool>,
    force: Arc<Notify>,
    task: Mutex<Option<JoinHandle<HealthState>>>,
}

impl Monitor {
    /// Spawn a monitor on the current tokio runtime.
    ///
    /// Zero fields of `config` take their defaults. `initial` is the state
    /// the loop resumes from, normally [`HealthState::starting`].
    ///
    /// # Errors
    ///
    /// Returns [`BockError::RuntimeUnavailable`] when called outside a
    /// tokio runtime.
    pub fn spawn(
        target: MonitorTarget,
        config: HealthConfig,
        initial: HealthState,
        executor: ProbeExecutor,
        events: EventBus<HealthEvent>,
    ) -> BockResult<Arc<Self>> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| BockError::RuntimeUnavailable {
                message: e.to_string(),
            })?;

        let config = config.with_defaults();
        let since_start = (Utc::now() - target.started_at)
            .to_std()
            .unwrap_or_default();
        let grace_deadline = Instant::now() + config.start_period.saturating_sub(since_start);

        let (published, state) = watch::channel(initial.clone());
        let (stop, stop_rx) = watch::channel(false);
        let force = Arc::new(Notify::new());

        let worker = MonitorLoop {
            request: target.exec_request(&config),
            config: config.clone(),
            executor,
            events,
            state: initial,
            published,
            stop: stop_rx,
            force: force.clone(),
            grace_deadline,
        };
        let task = runtime.spawn(worker.run());

        tracing::info!(
            container_id = %target.id.short(),
            test = %config.test,
            interval = %humantime::format_duration(config.interval),
            timeout = %humantime::format_duration(config.timeout),
            retries = config.retries,
            "Started health monitor"
        );

        Ok(Arc::new(Self {
            target,
            config,
            state,
            stop,
            force,
            task: Mutex::new(Some(task)),
        }))
    }

    /// Container ID.
    #[must_use]
    pub fn id(&self) -> &ContainerId {
        &self.target.id
    }

    /// Probe target.
    #[must_use]
    pub fn target(&self) -> &MonitorTarget {
        &self.target
    }

    /// Effective configuration, defaults applied.
    #[must_use]
    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Copy of the state after the most recently processed probe.
    #[must_use]
    pub fn snapshot(&self) -> HealthState {
        self.state.borrow().clone()
    }

    /// Watch state updates as they are published.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<HealthState> {
        self.state.clone()
    }

    /// Cut the current wait short and probe immediately.
    ///
    /// A request made while a probe is in flight runs right after it.
    pub fn probe_now(&self) {
        self.force.notify_one();
    }

    /// Whether the loop task is still alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Tell the loop to exit without waiting for it.
    ///
    /// No result is recorded after this returns.
    pub fn request_stop(&self) {
        self.stop.send_replace(true);
    }

    /// Stop the loop and return its final state.
    ///
    /// Interrupts a pending sleep immediately and abandons an in-flight
    /// probe. If the task does not finish within `timeout` it is aborted
    /// and the last published snapshot is returned.
    pub async fn stop(&self, timeout: Duration) -> HealthState {
        self.request_stop();

        let task = self.task.lock().take();
        let Some(task) = task else {
            return self.snapshot();
        };

        let abort = task.abort_handle();
        match time::timeout(timeout, task).await {
            Ok(Ok(state)) => state,
            Ok(Err(err)) => {
                tracing::warn!(container_id = %self.id(), error = %err, "Health monitor task failed");
                self.snapshot()
            }
            Err(_) => {
                tracing::warn!(
                    container_id = %self.id(),
                    "Health monitor did not stop in time, aborting"
                );
                abort.abort();
                self.snapshot()
            }
        }
    }
}

struct MonitorLoop {
    request: ExecRequest,
    config: HealthConfig,
    executor: ProbeExecutor,
    events: EventBus<HealthEvent>,
    state: HealthState,
    published: watch::Sender<HealthState>,
    stop: watch::Receiver<bool>,
    force: Arc<Notify>,
    grace_deadline: Instant,
}

impl MonitorLoop {
    fn in_grace(&self) -> bool {
        Instant::now() < self.grace_deadline
    }

    fn next_delay(&self) -> Duration {
        if self.state.status == HealthStatus::Starting && self.in_grace() {
            self.config.start_interval
        } else {
            self.config.interval
        }
    }

    async fn run(mut self) -> HealthState {
        loop {
            if *self.stop.borrow() {
                break;
            }

            let delay = self.next_delay();
            tokio::select! {
                biased;
                _ = self.stop.changed() => break,
                () = self.force.notified() => {
                    tracing::debug!(container_id = %self.request.container_id, "Forced health probe");
                }
                () = time::sleep(delay) => {}
            }

            // Grace is judged by when the check started, not when it ended.
            let in_grace = self.in_grace();

            // Stop wins over a probe in flight; dropping the probe kills it.
            let result = tokio::select! {
                biased;
                _ = self.stop.changed() => break,
                result = self.executor.run(&self.request, self.config.timeout) => result,
            };

            self.record(result, in_grace);
        }

        tracing::debug!(container_id = %self.request.container_id, "Health monitor loop exited");
        self.state
    }

    fn record(&mut self, result: ProbeResult, in_grace: bool) {
        let transition = self.state.apply(result, self.config.retries, in_grace);
        self.published.send_replace(self.state.clone());

        let Some(transition) = transition else {
            return;
        };

        tracing::info!(
            container_id = %self.request.container_id,
            from = %transition.from,
            to = %transition.to,
            failing_streak = self.state.failing_streak,
            "Health status changed"
        );
        self.events.publish(HealthEvent::StatusChanged {
            id: self.request.container_id.clone(),
            from: transition.from,
            to: transition.to,
            failing_streak: self.state.failing_streak,
            timestamp: Utc::now().timestamp(),
        });
    }
}
