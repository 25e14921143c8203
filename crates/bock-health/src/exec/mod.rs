//! Command execution inside containers.
//!
//! The monitor never spawns processes itself; it hands an [`ExecRequest`] to
//! a [`ContainerExec`] backend. Two backends ship with the crate:
//! [`HostExec`] runs probes as host processes, [`NsenterExec`] joins a
//! container's namespaces first.

mod host;
mod nsenter;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bock_common::{BockError, BockResult, ContainerId};
use rustix::process::{self, Pid, Signal};
use tokio::io::{AsyncRead, AsyncReadExt};

pub use host::HostExec;
pub use nsenter::NsenterExec;

/// One command to run in a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Target container.
    pub container_id: ContainerId,
    /// Argument vector; `args[0]` is the program.
    pub args: Vec<String>,
    /// Working directory inside the container.
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

/// Result of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Process exit code (`128 + signal` when killed by a signal).
    pub exit_code: i64,
    /// Combined stdout and stderr.
    pub output: Vec<u8>,
}

/// Exec primitive provided by the container runtime.
///
/// Implementations must release the running command, including anything it
/// spawned, when the returned future is dropped; the probe executor relies
/// on this to enforce timeouts.
#[async_trait]
pub trait ContainerExec: Send + Sync {
    /// Run `request` to completion, keeping at most `output_limit` bytes of
    /// combined output.
    async fn exec(&self, request: &ExecRequest, output_limit: usize) -> BockResult<ExecOutput>;
}

/// Shared exec backend.
pub type DynContainerExec = Arc<dyn ContainerExec>;

/// Map a finished process status to an exit code.
pub(crate) fn exit_code_of(status: std::process::ExitStatus) -> i64 {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => i64::from(code),
        (None, Some(signal)) => 128 + i64::from(signal),
        (None, None) => 1,
    }
}

/// SIGKILLs a command's process group unless disarmed.
///
/// The command leads its own group, so this also reaches whatever a shell
/// test forked.
struct GroupKill {
    group: Option<Pid>,
}

impl GroupKill {
    fn new(leader: Option<u32>) -> Self {
        Self {
            group: leader
                .and_then(|pid| i32::try_from(pid).ok())
                .and_then(Pid::from_raw),
        }
    }

    fn disarm(&mut self) {
        self.group = None;
    }
}

impl Drop for GroupKill {
    fn drop(&mut self) {
        if let Some(group) = self.group.take() {
            if let Err(err) = process::kill_process_group(group, Signal::KILL) {
                tracing::debug!(pgid = ?group, error = %err, "Process group already gone");
            }
        }
    }
}

/// Drain `reader` to EOF, keeping the first `limit` bytes.
async fn read_capped<R>(reader: Option<R>, limit: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };

    let mut kept = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(kept);
        }
        let room = limit.saturating_sub(kept.len());
        kept.extend_from_slice(&chunk[..n.min(room)]);
    }
}

/// Run a prepared command, capturing stdout then stderr.
///
/// The command gets its own process group, which is killed if this future
/// is dropped before the command finishes. Output beyond `output_limit`
/// bytes is read and discarded.
pub(crate) async fn run_command(
    id: &ContainerId,
    mut command: tokio::process::Command,
    output_limit: usize,
) -> BockResult<ExecOutput> {
    command
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| BockError::exec(id.as_str(), e))?;
    // Declared after `child` so the group dies before the leader is reaped.
    let mut group = GroupKill::new(child.id());

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (mut combined, stderr, status) = tokio::try_join!(
        read_capped(stdout, output_limit),
        read_capped(stderr, output_limit),
        child.wait(),
    )
    .map_err(|e| BockError::exec(id.as_str(), e))?;
    group.disarm();

    combined.extend_from_slice(&stderr);
    combined.truncate(output_limit);

    Ok(ExecOutput {
        exit_code: exit_code_of(status),
        output: combined,
    })
}
