//! # Bock Health
//!
//! Container health-check monitoring for the Bock runtime.
//!
//! ## Features
//!
//! - **Periodic probes**: one monitor task per container runs the configured
//!   test on its interval, bounded by a timeout
//! - **Docker semantics**: `starting`, `healthy`, `unhealthy` with retries,
//!   start period and start interval
//! - **Bounded history**: the last few probe results per container
//! - **Lifecycle wiring**: monitors follow runtime start, stop, pause and
//!   resume events and ignore signals sent to the container
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use bock_common::ContainerId;
//! use bock_health::{HealthConfig, HostExec, MonitorRegistry, MonitorTarget, RegistryConfig};
//!
//! # async fn example() -> bock_common::BockResult<()> {
//! let registry = MonitorRegistry::new(Arc::new(HostExec::new()), RegistryConfig::default());
//!
//! let id = ContainerId::new("web")?;
//! let config = HealthConfig::shell("curl -fs http://localhost/ || exit 1")
//!     .with_interval(Duration::from_secs(10))
//!     .with_retries(3);
//! registry.start(MonitorTarget::new(id.clone()), config)?;
//!
//! let inspection = registry.snapshot(&id);
//! println!("{}", serde_json::to_string(&inspection)?);
//!
//! registry.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod events;
pub mod exec;
pub mod inspect;
pub mod log;
pub mod monitor;
pub mod probe;
pub mod registry;
pub mod settings;
pub mod state;

#[cfg(test)]
mod test_support;

pub use config::{HealthConfig, HealthTest};
pub use events::{EventBus, HealthEvent, RuntimeEvent};
pub use exec::{ContainerExec, DynContainerExec, ExecOutput, ExecRequest, HostExec, NsenterExec};
pub use inspect::{HealthInspection, HealthStatusView};
pub use monitor::{Monitor, MonitorTarget};
pub use probe::{ProbeExecutor, ProbeOutcome, ProbeResult};
pub use registry::MonitorRegistry;
pub use settings::RegistryConfig;
pub use state::{HealthState, HealthStatus};
