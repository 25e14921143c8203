//! Namespace-joining backend built on `nsenter(1)`.

use std::path::PathBuf;

use async_trait::async_trait;
use bock_common::{BockError, BockResult, ContainerId};
use dashmap::DashMap;

use super::{ContainerExec, ExecOutput, ExecRequest, run_command};

/// Runs probe commands inside a container's namespaces.
///
/// The runtime registers each container's init PID when it starts and
/// forgets it when the container stops.
#[derive(Debug)]
pub struct NsenterExec {
    binary: PathBuf,
    pids: DashMap<ContainerId, u32>,
}

impl Default for NsenterExec {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("nsenter"),
            pids: DashMap::new(),
        }
    }
}

impl NsenterExec {
    /// Create a backend using `nsenter` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `nsenter` binary.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Record the init PID of a running container.
    pub fn register(&self, id: ContainerId, pid: u32) {
        self.pids.insert(id, pid);
    }

    /// Drop a container's PID. Returns the PID if one was registered.
    pub fn forget(&self, id: &ContainerId) -> Option<u32> {
        self.pids.remove(id).map(|(_, pid)| pid)
    }

    /// Arguments passed to `nsenter` for a request against `pid`.
    fn nsenter_args(pid: u32, request: &ExecRequest) -> Vec<String> {
        let mut args = vec![
            "--target".to_string(),
            pid.to_string(),
            "--all".to_string(),
            "--kill-child".to_string(),
        ];
        if let Some(dir) = &request.working_dir {
            args.push(format!("--wd={}", dir.display()));
        }
        args.push("--".to_string());
        args.extend(request.args.iter().cloned());
        args
    }
}

#[async_trait]
impl ContainerExec for NsenterExec {
    async fn exec(&self, request: &ExecRequest, output_limit: usize) -> BockResult<ExecOutput> {
        if request.args.is_empty() {
            return Err(BockError::exec(request.container_id.as_str(), "empty command"));
        }

        let pid = self
            .pids
            .get(&request.container_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| {
                BockError::exec(request.container_id.as_str(), "container is not running")
            })?;

        tracing::debug!(
            container_id = %request.container_id,
            pid,
            command = ?request.args,
            "Executing command in container namespaces"
        );

        let mut command = tokio::process::Command::new(&self.binary);
        command
            .args(Self::nsenter_args(pid, request))
            .envs(request.env.iter().cloned());

        run_command(&request.container_id, command, output_limit).await
    }
}
