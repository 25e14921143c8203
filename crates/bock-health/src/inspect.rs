//! Serializable health views for inspection APIs.

use bock_common::ContainerId;
use serde::Serialize;

use crate::probe::ProbeResult;
use crate::registry::MonitorRegistry;
use crate::state::{HealthState, HealthStatus};

/// Value copy of a container's health, in the shape health-watchers poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatusView {
    /// Current status.
    pub status: HealthStatus,
    /// Consecutive counted failures.
    pub failing_streak: u32,
    /// Most recent probe results, oldest first.
    pub log: Vec<ProbeResult>,
}

impl From<&HealthState> for HealthStatusView {
    fn from(state: &HealthState) -> Self {
        Self {
            status: state.status,
            failing_streak: state.failing_streak,
            log: state.log.iter().cloned().collect(),
        }
    }
}

/// Result of inspecting a container's health.
///
/// `NotConfigured` serializes as `null`, distinct from any status.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HealthInspection {
    /// The container has no health check.
    NotConfigured,
    /// Current health.
    Health(HealthStatusView),
}

impl HealthInspection {
    /// Whether a health check is configured.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        matches!(self, Self::Health(_))
    }

    /// Status, if configured.
    #[must_use]
    pub fn status(&self) -> Option<HealthStatus> {
        match self {
            Self::NotConfigured => None,
            Self::Health(view) => Some(view.status),
        }
    }

    /// Health view, if configured.
    #[must_use]
    pub const fn view(&self) -> Option<&HealthStatusView> {
        match self {
            Self::NotConfigured => None,
            Self::Health(view) => Some(view),
        }
    }
}

impl From<Option<HealthState>> for HealthInspection {
    fn from(state: Option<HealthState>) -> Self {
        state.map_or(Self::NotConfigured, |state| Self::Health((&state).into()))
    }
}

impl MonitorRegistry {
    /// Inspect a container's health.
    ///
    /// The view is copied from the last published snapshot, so it is never
    /// torn by a concurrent probe.
    #[must_use]
    pub fn snapshot(&self, id: &ContainerId) -> HealthInspection {
        self.get(id).into()
    }
}
