//! Process-wide monitor settings.

use std::time::Duration;

/// Settings shared by every monitor a registry spawns.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Number of probe results kept per container.
    pub log_capacity: usize,
    /// Probe output is truncated to this many bytes.
    pub max_output_bytes: usize,
    /// How long `stop` waits for a monitor task before aborting it.
    pub stop_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            log_capacity: 5,
            max_output_bytes: 4096,
            stop_timeout: Duration::from_secs(5),
        }
    }
}

impl RegistryConfig {
    /// Set the per-container log capacity. Clamped to at least one entry.
    #[must_use]
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity.max(1);
        self
    }

    /// Set the probe output limit.
    #[must_use]
    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    /// Set the stop timeout.
    #[must_use]
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}
