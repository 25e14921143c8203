//! CLI command definitions and handlers.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use bock_common::ContainerId;
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, WrapErr};

use crate::config::{HealthConfig, HealthTest};
use crate::exec::HostExec;
use crate::inspect::HealthStatusView;
use crate::monitor::MonitorTarget;
use crate::probe::ProbeExecutor;
use crate::registry::MonitorRegistry;
use crate::settings::RegistryConfig;
use crate::state::HealthStatus;

/// Container ID reported for host probes.
const HOST_ID: &str = "host";

/// Bock Health - container health-check monitor
#[derive(Parser)]
#[command(name = "bock-health")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Health check commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run one probe and print its result as JSON
    Probe {
        /// Maximum duration of the probe
        #[arg(long, env = "BOCK_HEALTH_TIMEOUT", default_value = "30s", value_parser = humantime::parse_duration)]
        timeout: Duration,

        #[command(flatten)]
        test: TestArgs,
    },

    /// Monitor a command until interrupted
    Watch {
        /// Time between probes
        #[arg(long, env = "BOCK_HEALTH_INTERVAL", value_parser = humantime::parse_duration)]
        interval: Option<Duration>,

        /// Maximum duration of a single probe
        #[arg(long, env = "BOCK_HEALTH_TIMEOUT", value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,

        /// Consecutive failures before reporting unhealthy
        #[arg(long, env = "BOCK_HEALTH_RETRIES")]
        retries: Option<u32>,

        /// Grace period during which failures do not count
        #[arg(long, env = "BOCK_HEALTH_START_PERIOD", value_parser = humantime::parse_duration)]
        start_period: Option<Duration>,

        /// Time between probes during the start period
        #[arg(long, env = "BOCK_HEALTH_START_INTERVAL", value_parser = humantime::parse_duration)]
        start_interval: Option<Duration>,

        /// Print every snapshot as a JSON line instead of transitions
        #[arg(long)]
        json: bool,

        /// Exit once this status is reached
        #[arg(long, value_enum)]
        exit_on: Option<ExitOn>,

        #[command(flatten)]
        test: TestArgs,
    },
}

/// Status that ends `watch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExitOn {
    /// First time the command is healthy.
    Healthy,
    /// First time the command is unhealthy.
    Unhealthy,
}

impl ExitOn {
    const fn status(self) -> HealthStatus {
        match self {
            Self::Healthy => HealthStatus::Healthy,
            Self::Unhealthy => HealthStatus::Unhealthy,
        }
    }
}

/// The probe command and the context it runs in.
#[derive(Args, Debug, Clone)]
pub struct TestArgs {
    /// Working directory for the probe
    #[arg(long, env = "BOCK_HEALTH_WORKDIR")]
    pub workdir: Option<PathBuf>,

    /// Environment variables (KEY=VALUE)
    #[arg(short, long = "env", value_parser = parse_env)]
    pub env: Vec<(String, String)>,

    /// Run the command through /bin/sh -c
    #[arg(long)]
    pub shell: bool,

    /// Command and arguments
    #[arg(trailing_var_arg = true, required = true)]
    pub command: Vec<String>,
}

impl TestArgs {
    fn health_test(&self) -> HealthTest {
        if self.shell {
            HealthTest::CmdShell(self.command.join(" "))
        } else {
            HealthTest::Cmd(self.command.clone())
        }
    }

    fn target(&self) -> Result<MonitorTarget> {
        let mut target = MonitorTarget::new(ContainerId::new(HOST_ID)?).with_env(self.env.clone());
        if let Some(dir) = &self.workdir {
            target = target.with_working_dir(dir);
        }
        Ok(target)
    }
}

fn parse_env(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))
}

const fn exit_code_for(status: HealthStatus) -> ExitCode {
    match status {
        HealthStatus::Healthy => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// `probe` exits 0 when the probe succeeded; `watch` exits 0 when the
    /// last observed status is healthy.
    pub async fn execute(self) -> Result<ExitCode> {
        match self.command {
            Commands::Probe { timeout, test } => {
                let config = HealthConfig::new(test.health_test()).with_timeout(timeout);
                config.validate().wrap_err("Invalid probe")?;
                let config = config.with_defaults();

                let request = test.target()?.exec_request(&config);
                let executor = ProbeExecutor::new(
                    Arc::new(HostExec::new()),
                    RegistryConfig::default().max_output_bytes,
                );
                let result = executor.run(&request, config.timeout).await;

                println!("{}", serde_json::to_string_pretty(&result)?);
                Ok(if result.is_success() {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                })
            }

            Commands::Watch {
                interval,
                timeout,
                retries,
                start_period,
                start_interval,
                json,
                exit_on,
                test,
            } => {
                let config = HealthConfig::new(test.health_test())
                    .with_interval(interval.unwrap_or_default())
                    .with_timeout(timeout.unwrap_or_default())
                    .with_retries(retries.unwrap_or_default())
                    .with_start_period(start_period.unwrap_or_default())
                    .with_start_interval(start_interval.unwrap_or_default());

                let registry =
                    MonitorRegistry::new(Arc::new(HostExec::new()), RegistryConfig::default());
                let monitor = registry
                    .start(test.target()?, config)
                    .wrap_err("Failed to start health monitor")?;

                let mut updates = monitor.subscribe();
                let mut last = updates.borrow().status;
                let ctrl_c = tokio::signal::ctrl_c();
                tokio::pin!(ctrl_c);

                loop {
                    tokio::select! {
                        _ = &mut ctrl_c => break,
                        changed = updates.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            let state = updates.borrow_and_update().clone();

                            if json {
                                println!("{}", serde_json::to_string(&HealthStatusView::from(&state))?);
                            } else if state.status != last {
                                let exit_code = state.log.last().map_or(-1, |r| r.exit_code);
                                println!(
                                    "{} {} -> {} (failing streak {}, exit code {})",
                                    Utc::now().to_rfc3339(),
                                    last,
                                    state.status,
                                    state.failing_streak,
                                    exit_code
                                );
                            }
                            last = state.status;

                            if exit_on.is_some_and(|target| target.status() == last) {
                                break;
                            }
                        }
                    }
                }

                registry.shutdown().await;
                Ok(exit_code_for(last))
            }
        }
    }
}
