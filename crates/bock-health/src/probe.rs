//! Probe execution.
//!
//! A probe is one run of the configured health check command. Whatever
//! happens to it (non-zero exit, timeout, exec failure) the caller gets a
//! [`ProbeResult`] back; nothing here returns an error.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time;

use crate::exec::{DynContainerExec, ExecRequest};

/// Exit code recorded for probes that never produced one.
pub const EXIT_PROBE_FAILED: i64 = -1;

/// How a probe ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProbeOutcome {
    /// The command ran to completion; see the exit code.
    Exited,
    /// The command was killed after exceeding the timeout.
    TimedOut,
    /// The command could not be run at all.
    ExecError,
}

/// One probe log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    /// When the probe started.
    pub start: DateTime<Utc>,
    /// When the probe finished or was abandoned.
    pub end: DateTime<Utc>,
    /// Command exit code, or [`EXIT_PROBE_FAILED`].
    pub exit_code: i64,
    /// Truncated combined output, or the failure cause.
    pub output: String,
    /// How the probe ended.
    pub outcome: ProbeOutcome,
}

impl ProbeResult {
    /// A probe whose command exited with `exit_code`.
    #[must_use]
    pub fn exited(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exit_code: i64,
        output: impl Into<String>,
    ) -> Self {
        Self {
            start,
            end,
            exit_code,
            output: output.into(),
            outcome: ProbeOutcome::Exited,
        }
    }

    /// A probe that timed out or could not run.
    #[must_use]
    pub fn failed(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        outcome: ProbeOutcome,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            start,
            end,
            exit_code: EXIT_PROBE_FAILED,
            output: cause.into(),
            outcome,
        }
    }

    /// Whether this probe counts as a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == ProbeOutcome::Exited && self.exit_code == 0
    }

    /// Wall-clock duration of the probe.
    #[must_use]
    pub fn duration(&self) -> Duration {
        (self.end - self.start).to_std().unwrap_or_default()
    }
}

/// Runs probes against an exec backend with a hard timeout.
#[derive(Clone)]
pub struct ProbeExecutor {
    exec: DynContainerExec,
    max_output_bytes: usize,
}

impl std::fmt::Debug for ProbeExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeExecutor")
            .field("max_output_bytes", &self.max_output_bytes)
            .finish_non_exhaustive()
    }
}

impl ProbeExecutor {
    /// Create an executor truncating output to `max_output_bytes`.
    #[must_use]
    pub fn new(exec: DynContainerExec, max_output_bytes: usize) -> Self {
        Self {
            exec,
            max_output_bytes,
        }
    }

    /// Run one probe.
    ///
    /// If `timeout` elapses the exec future is dropped, which kills the
    /// command and anything it spawned, and a [`ProbeOutcome::TimedOut`]
    /// result is returned.
    pub async fn run(&self, request: &ExecRequest, timeout: Duration) -> ProbeResult {
        let start = Utc::now();
        let id = &request.container_id;

        tracing::debug!(container_id = %id, command = ?request.args, "Running health probe");

        match time::timeout(timeout, self.exec.exec(request, self.max_output_bytes)).await {
            Ok(Ok(out)) => {
                let output = truncate_output(&out.output, self.max_output_bytes);
                tracing::debug!(container_id = %id, exit_code = out.exit_code, "Health probe finished");
                ProbeResult::exited(start, Utc::now(), out.exit_code, output)
            }
            Ok(Err(err)) => {
                tracing::warn!(container_id = %id, error = %err, "Health probe could not run");
                ProbeResult::failed(start, Utc::now(), ProbeOutcome::ExecError, err.to_string())
            }
            Err(_) => {
                tracing::warn!(
                    container_id = %id,
                    timeout = %humantime::format_duration(timeout),
                    "Health probe timed out"
                );
                ProbeResult::failed(
                    start,
                    Utc::now(),
                    ProbeOutcome::TimedOut,
                    format!(
                        "Health check exceeded timeout ({})",
                        humantime::format_duration(timeout)
                    ),
                )
            }
        }
    }
}

/// Decode probe output, cutting it to at most `max` bytes on a char boundary.
pub(crate) fn truncate_output(raw: &[u8], max: usize) -> String {
    let mut text = String::from_utf8_lossy(raw).into_owned();
    if text.len() > max {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}
