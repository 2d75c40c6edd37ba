//! Scripted executors
//!
//! In-process stand-ins for a target service. Every invocation asks a script
//! what to do, so rounds can be made to succeed, fail, stall, reject or panic
//! deterministically. Combine with tokio's paused clock for exact timings.

use crate::driver::millis;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use volley_core::{InvocationOutcome, RequestSpec, Result, VolleyError, WorkerId};

use crate::executor::RequestExecutor;

/// What one scripted invocation does
#[derive(Clone, Debug)]
pub enum Step {
    /// Wait `delay`, then answer with `status` and an optional body
    Respond {
        delay: Duration,
        status: u16,
        body: Option<String>,
    },
    /// Executor error
    Error,
    /// Panic inside the worker
    Panic,
    /// URL refused before sending
    Reject,
}

impl Step {
    pub fn ok(delay: Duration, status: u16) -> Self {
        Step::Respond {
            delay,
            status,
            body: None,
        }
    }

    pub fn body(delay: Duration, body: impl Into<String>) -> Self {
        Step::Respond {
            delay,
            status: 200,
            body: Some(body.into()),
        }
    }
}

type Script = Box<dyn Fn(usize, WorkerId) -> Step + Send + Sync>;

/// Executor driven by a script of [`Step`]s
pub struct ScriptedExecutor {
    script: Script,
    calls: AtomicUsize,
    workers: Mutex<Vec<WorkerId>>,
}

impl ScriptedExecutor {
    /// `script(call_index, worker_id)` decides each invocation
    pub fn from_fn<F>(script: F) -> Self
    where
        F: Fn(usize, WorkerId) -> Step + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Every invocation waits `delay` and answers `status`
    pub fn constant(delay: Duration, status: u16) -> Self {
        Self::from_fn(move |_, _| Step::ok(delay, status))
    }

    /// Worker `i` follows `steps[i % steps.len()]`
    pub fn cycle(steps: Vec<Step>) -> Self {
        Self::from_fn(move |_, worker_id| {
            steps
                .get(worker_id % steps.len().max(1))
                .cloned()
                .unwrap_or(Step::Reject)
        })
    }

    /// Invocations started so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Worker ids in invocation order
    pub fn workers(&self) -> Vec<WorkerId> {
        self.workers.lock().clone()
    }
}

#[async_trait]
impl RequestExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        request: &RequestSpec,
        worker_id: WorkerId,
        _verbose: bool,
    ) -> Result<Option<InvocationOutcome>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.workers.lock().push(worker_id);

        match (self.script)(call, worker_id) {
            Step::Respond {
                delay,
                status,
                body,
            } => {
                let started_at = Utc::now();
                tokio::time::sleep(delay).await;
                Ok(Some(InvocationOutcome::completed(
                    worker_id,
                    request,
                    status,
                    body,
                    started_at,
                    millis(delay),
                )))
            }
            Step::Error => Err(VolleyError::Execution(format!(
                "scripted failure on call {}",
                call
            ))),
            Step::Panic => panic!("scripted panic on call {}", call),
            Step::Reject => Ok(None),
        }
    }
}
