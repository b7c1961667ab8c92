//! Background task executor.
//!
//! Runs one-shot and periodic callbacks on the tokio runtime, off the
//! foreground dispatch loop. A failing callback is logged and never
//! propagates: one bad task must not take down the others or the process.
//!
//! Cancellation is cooperative. Every task gets a child of the scheduler's
//! root token; [`TaskHandle::cancel`] stops that task (a no-op once a
//! one-shot has fired) and [`Scheduler::shutdown`] cancels the root without
//! waiting for in-flight work.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Handle to a scheduled task.
#[derive(Clone)]
pub struct TaskHandle {
    token: CancellationToken,
}

impl TaskHandle {
    /// Request cancellation. Safe to call at any time; cancelling a one-shot
    /// task that already fired does nothing.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// Delayed/periodic task executor backed by spawned tokio tasks.
pub struct Scheduler {
    root: CancellationToken,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
        }
    }

    /// Run a task as soon as the runtime gets to it.
    pub fn execute_now<F, Fut>(&self, name: &'static str, task: F) -> TaskHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.execute_delayed(Duration::ZERO, name, task)
    }

    /// Run a task once after `delay`.
    pub fn execute_delayed<F, Fut>(&self, delay: Duration, name: &'static str, task: F) -> TaskHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let token = self.root.child_token();
        let handle = TaskHandle {
            token: token.clone(),
        };

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = task().await {
                        warn!(task = name, error = %e, "scheduled task failed");
                    }
                }
            }
        });

        handle
    }

    /// Run a task every `period` until cancelled.
    ///
    /// `jitter` perturbs each fire time by up to the given bound in either
    /// direction, so periodic tasks created together don't all fire at once.
    pub fn execute_every<F, Fut>(
        &self,
        period: Duration,
        jitter: Option<Duration>,
        name: &'static str,
        task: F,
    ) -> TaskHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let token = self.root.child_token();
        let handle = TaskHandle {
            token: token.clone(),
        };

        tokio::spawn(async move {
            loop {
                let wait = match jitter {
                    Some(bound) if !bound.is_zero() => {
                        let spread = bound.as_millis() as i64;
                        let offset = rand::thread_rng().gen_range(-spread..=spread);
                        if offset.is_negative() {
                            period.saturating_sub(Duration::from_millis(offset.unsigned_abs()))
                        } else {
                            period + Duration::from_millis(offset as u64)
                        }
                    }
                    _ => period,
                };

                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(wait) => {
                        if let Err(e) = task().await {
                            warn!(task = name, error = %e, "periodic task failed");
                        }
                    }
                }
            }
        });

        handle
    }

    /// Cancel every scheduled task. In-flight callbacks are not waited for.
    pub fn shutdown(&self) {
        self.root.cancel();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
