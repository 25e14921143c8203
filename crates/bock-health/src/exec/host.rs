//! Host process backend.

use async_trait::async_trait;
use bock_common::{BockError, BockResult};

use super::{ContainerExec, ExecOutput, ExecRequest, run_command};

/// Runs probe commands directly on the host.
///
/// The container ID is only used for diagnostics. Useful for supervising
/// host services and for exercising monitors without a container runtime.
#[derive(Debug, Clone, Default)]
pub struct HostExec;

impl HostExec {
    /// Create a host backend.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContainerExec for HostExec {
    async fn exec(&self, request: &ExecRequest, output_limit: usize) -> BockResult<ExecOutput> {
        let (program, args) = request
            .args
            .split_first()
            .ok_or_else(|| BockError::exec(request.container_id.as_str(), "empty command"))?;

        let mut command = tokio::process::Command::new(program);
        command.args(args).envs(request.env.iter().cloned());
        if let Some(dir) = &request.working_dir {
            command.current_dir(dir);
        }

        tracing::trace!(
            container_id = %request.container_id,
            command = ?request.args,
            "Executing on host"
        );

        run_command(&request.container_id, command, output_limit).await
    }
}
