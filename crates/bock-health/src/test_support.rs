use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bock_common::{BockError, BockResult, ContainerId};
use parking_lot::Mutex;

use crate::exec::{ContainerExec, ExecOutput, ExecRequest};

#[derive(Debug, Clone)]
pub(crate) enum ExecAction {
    Exit {
        code: i64,
        output: String,
        delay: Duration,
    },
    Error(String),
    Hang,
}

impl ExecAction {
    pub(crate) fn exit(code: i64, output: impl Into<String>) -> Self {
        Self::Exit {
            code,
            output: output.into(),
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn slow_exit(code: i64, delay: Duration) -> Self {
        Self::Exit {
            code,
            output: String::new(),
            delay,
        }
    }
}

/// Counts an exec future dropped before it finished.
struct CancelGuard {
    counter: Arc<AtomicUsize>,
    armed: bool,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Replays queued actions, then repeats the fallback.
pub(crate) struct ScriptedExec {
    actions: Mutex<VecDeque<ExecAction>>,
    fallback: ExecAction,
    calls: AtomicUsize,
    cancelled: Arc<AtomicUsize>,
}

impl ScriptedExec {
    pub(crate) fn new(actions: Vec<ExecAction>) -> Self {
        Self {
            actions: Mutex::new(actions.into()),
            fallback: ExecAction::exit(0, ""),
            calls: AtomicUsize::new(0),
            cancelled: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn repeating(action: ExecAction) -> Self {
        let mut exec = Self::new(Vec::new());
        exec.fallback = action;
        exec
    }

    pub(crate) fn then_repeat(mut self, action: ExecAction) -> Self {
        self.fallback = action;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerExec for ScriptedExec {
    async fn exec(&self, request: &ExecRequest, _output_limit: usize) -> BockResult<ExecOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let action = self
            .actions
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        let mut guard = CancelGuard {
            counter: self.cancelled.clone(),
            armed: true,
        };

        let result = match action {
            ExecAction::Exit {
                code,
                output,
                delay,
            } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(ExecOutput {
                    exit_code: code,
                    output: output.into_bytes(),
                })
            }
            ExecAction::Error(message) => {
                Err(BockError::exec(request.container_id.as_str(), message))
            }
            ExecAction::Hang => std::future::pending().await,
        };

        guard.armed = false;
        result
    }
}

pub(crate) fn request(id: &str) -> ExecRequest {
    ExecRequest {
        container_id: ContainerId::new(id).unwrap(),
        args: vec!["/bin/check".into()],
        working_dir: None,
        env: Vec::new(),
    }
}
