//! Health check configuration.
//!
//! A [`HealthConfig`] is supplied when a container is created and never
//! changes for the container's lifetime. Durations are written the way
//! operators write them (`"30s"`, `"50ms"`, `"1m30s"`).

use std::fmt;
use std::time::Duration;

use bock_common::{BockError, BockResult};
use serde::{Deserialize, Serialize};

/// Default time between the end of one probe and the start of the next.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Default bound on a single probe.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default consecutive-failure threshold.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default probe interval while inside the start period.
pub const DEFAULT_START_INTERVAL: Duration = Duration::from_secs(5);

/// Smallest non-zero duration accepted for any timing field.
pub const MIN_DURATION: Duration = Duration::from_millis(1);

/// Shell used for `CMD-SHELL` tests.
pub const SHELL: &[&str] = &["/bin/sh", "-c"];

/// The probe command.
///
/// Serialized in the array form used by container configs:
/// `[]`, `["NONE"]`, `["CMD", args...]` or `["CMD-SHELL", command]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub enum HealthTest {
    /// No test configured; the image default would apply.
    Inherit,
    /// Health checking explicitly disabled.
    None,
    /// Run the arguments directly.
    Cmd(Vec<String>),
    /// Run the command through the container's shell.
    CmdShell(String),
}

impl HealthTest {
    /// Whether this test never produces a probe.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Inherit | Self::None)
    }

    /// The argument vector handed to the exec mechanism.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        match self {
            Self::Inherit | Self::None => Vec::new(),
            Self::Cmd(args) => args.clone(),
            Self::CmdShell(cmd) => SHELL
                .iter()
                .map(|s| (*s).to_string())
                .chain(std::iter::once(cmd.clone()))
                .collect(),
        }
    }
}

impl TryFrom<Vec<String>> for HealthTest {
    type Error = BockError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        let Some((kind, rest)) = value.split_first() else {
            return Ok(Self::Inherit);
        };

        match kind.as_str() {
            "NONE" => Ok(Self::None),
            "CMD" => {
                if rest.is_empty() {
                    return Err(BockError::invalid_config(
                        "test",
                        "CMD requires at least one argument",
                    ));
                }
                Ok(Self::Cmd(rest.to_vec()))
            }
            "CMD-SHELL" => match rest {
                [cmd] if !cmd.trim().is_empty() => Ok(Self::CmdShell(cmd.clone())),
                _ => Err(BockError::invalid_config(
                    "test",
                    "CMD-SHELL requires exactly one non-empty command",
                )),
            },
            other => Err(BockError::invalid_config(
                "test",
                format!("unknown test type {other:?}"),
            )),
        }
    }
}

impl From<HealthTest> for Vec<String> {
    fn from(test: HealthTest) -> Self {
        match test {
            HealthTest::Inherit => Vec::new(),
            HealthTest::None => vec!["NONE".to_string()],
            HealthTest::Cmd(args) => std::iter::once("CMD".to_string()).chain(args).collect(),
            HealthTest::CmdShell(cmd) => vec!["CMD-SHELL".to_string(), cmd],
        }
    }
}

impl fmt::Display for HealthTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inherit => write!(f, "<inherit>"),
            Self::None => write!(f, "NONE"),
            Self::Cmd(args) => write!(f, "CMD {}", args.join(" ")),
            Self::CmdShell(cmd) => write!(f, "CMD-SHELL {cmd}"),
        }
    }
}

/// Per-container health check configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthConfig {
    /// The probe command.
    pub test: HealthTest,
    /// Time between probe completion and the next probe start.
    #[serde(default, with = "humantime_serde")]
    pub interval: Duration,
    /// Maximum duration of a single probe.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Duration,
    /// Consecutive failures before the container is unhealthy.
    #[serde(default)]
    pub retries: u32,
    /// Grace window after container start during which failures do not count.
    #[serde(default, with = "humantime_serde")]
    pub start_period: Duration,
    /// Probe interval used while still inside the start period.
    #[serde(default, with = "humantime_serde")]
    pub start_interval: Duration,
}

impl HealthConfig {
    /// Create a configuration with every timing field left at its default.
    #[must_use]
    pub fn new(test: HealthTest) -> Self {
        Self {
            test,
            interval: Duration::ZERO,
            timeout: Duration::ZERO,
            retries: 0,
            start_period: Duration::ZERO,
            start_interval: Duration::ZERO,
        }
    }

    /// Shorthand for a `CMD` test.
    #[must_use]
    pub fn cmd<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(HealthTest::Cmd(args.into_iter().map(Into::into).collect()))
    }

    /// Shorthand for a `CMD-SHELL` test.
    #[must_use]
    pub fn shell(command: impl Into<String>) -> Self {
        Self::new(HealthTest::CmdShell(command.into()))
    }

    /// Set the probe interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the probe timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry threshold.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the start period.
    #[must_use]
    pub fn with_start_period(mut self, start_period: Duration) -> Self {
        self.start_period = start_period;
        self
    }

    /// Set the start interval.
    #[must_use]
    pub fn with_start_interval(mut self, start_interval: Duration) -> Self {
        self.start_interval = start_interval;
        self
    }

    /// Whether this configuration never probes.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.test.is_disabled()
    }

    /// Check the configuration for values a monitor cannot honor.
    ///
    /// # Errors
    ///
    /// Returns [`BockError::InvalidHealthConfig`] naming the first bad field.
    pub fn validate(&self) -> BockResult<()> {
        let timings = [
            ("interval", self.interval),
            ("timeout", self.timeout),
            ("startPeriod", self.start_period),
            ("startInterval", self.start_interval),
        ];
        for (field, value) in timings {
            if !value.is_zero() && value < MIN_DURATION {
                return Err(BockError::invalid_config(
                    field,
                    format!(
                        "{} is below the minimum of {}",
                        humantime::format_duration(value),
                        humantime::format_duration(MIN_DURATION)
                    ),
                ));
            }
        }

        // Re-run the array parser so hand-built tests get the same checks.
        HealthTest::try_from(Vec::<String>::from(self.test.clone()))?;
        Ok(())
    }

    /// Replace every zero field with its default.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        if self.interval.is_zero() {
            self.interval = DEFAULT_INTERVAL;
        }
        if self.timeout.is_zero() {
            self.timeout = DEFAULT_TIMEOUT;
        }
        if self.retries == 0 {
            self.retries = DEFAULT_RETRIES;
        }
        if self.start_interval.is_zero() {
            self.start_interval = DEFAULT_START_INTERVAL;
        }
        self
    }
}
