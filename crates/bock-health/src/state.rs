//! Per-container health state and its transition rules.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::log::HealthLog;
use crate::probe::ProbeResult;

/// Externally visible health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// No monitor is running for this container.
    None,
    /// Inside the start period, or no probe has succeeded yet.
    Starting,
    /// The last probe succeeded.
    Healthy,
    /// At least `retries` consecutive probes failed.
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Starting => write!(f, "starting"),
            Self::Healthy => write!(f, "healthy"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// A status change caused by one probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Status before the probe.
    pub from: HealthStatus,
    /// Status after the probe.
    pub to: HealthStatus,
}

/// Mutable health record owned by a monitor loop.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthState {
    /// Current status.
    pub status: HealthStatus,
    /// Consecutive counted failures since the last success.
    pub failing_streak: u32,
    /// Most recent probe results.
    pub log: HealthLog,
}

impl HealthState {
    /// Fresh state for a newly started container.
    #[must_use]
    pub fn starting(log_capacity: usize) -> Self {
        Self {
            status: HealthStatus::Starting,
            failing_streak: 0,
            log: HealthLog::with_capacity(log_capacity),
        }
    }

    /// Inert state for a container whose monitor could not run.
    #[must_use]
    pub fn inert() -> Self {
        Self {
            status: HealthStatus::None,
            failing_streak: 0,
            log: HealthLog::with_capacity(1),
        }
    }

    /// Fold one probe result into the state.
    ///
    /// `in_grace` is true while the container is inside its start period.
    /// Grace only applies while still `starting`: once a probe has
    /// succeeded every failure counts. The result is always logged.
    pub fn apply(&mut self, result: ProbeResult, retries: u32, in_grace: bool) -> Option<Transition> {
        let from = self.status;

        if result.is_success() {
            self.failing_streak = 0;
            self.status = HealthStatus::Healthy;
        } else if in_grace && self.status == HealthStatus::Starting {
            // Recorded below, not counted.
        } else {
            self.failing_streak = self.failing_streak.saturating_add(1);
            if self.failing_streak >= retries {
                self.status = HealthStatus::Unhealthy;
            }
        }

        self.log.push(result);

        (from != self.status).then_some(Transition {
            from,
            to: self.status,
        })
    }
}
