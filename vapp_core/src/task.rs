//! Task waiting.
//!
//! Remote operations return a task handle that is polled until it reaches a
//! terminal state. The wait is a plain future: dropping it stops polling, and an
//! optional deadline turns a task that never finishes into
//! [`TaskOutcome::TimedOut`] instead of an endless loop.

use std::time::Duration;

use inventory_client_interface::{InventoryClient, TaskHandle, TaskState};
use reconciler_config::{BackoffKind, TaskWaitSettings};
use tracing::{debug, warn};
use vapp_shared_types::{MoRef, Result, TaskFault, VAppError};

/// Terminal result of a waited-on task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success(Option<MoRef>),
    Fault(TaskFault),
    TimedOut,
}

/// How the delay between polls grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Same delay between every poll.
    Fixed,
    /// 1x, 2x, 3x, ... the initial delay.
    Linear,
    /// 1x, 2x, 4x, ... the initial delay.
    Exponential,
}

impl From<BackoffKind> for BackoffStrategy {
    fn from(kind: BackoffKind) -> Self {
        match kind {
            BackoffKind::Fixed => BackoffStrategy::Fixed,
            BackoffKind::Linear => BackoffStrategy::Linear,
            BackoffKind::Exponential => BackoffStrategy::Exponential,
        }
    }
}

/// Polling policy for remote tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub backoff: BackoffStrategy,
    pub deadline: Option<Duration>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::from_settings(&TaskWaitSettings::default())
    }
}

impl WaitPolicy {
    pub fn from_settings(settings: &TaskWaitSettings) -> Self {
        Self {
            initial_interval: settings.initial_interval(),
            max_interval: settings.max_interval(),
            backoff: settings.backoff.into(),
            deadline: settings.deadline(),
        }
    }

    /// Poll the same interval forever.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial_interval: interval,
            max_interval: interval,
            backoff: BackoffStrategy::Fixed,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Delay after the `attempt`-th unfinished poll (0-indexed), capped at `max_interval`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            BackoffStrategy::Fixed => self.initial_interval,
            BackoffStrategy::Linear => self.initial_interval.saturating_mul(attempt.saturating_add(1)),
            BackoffStrategy::Exponential => {
                let multiplier = 2_u32.checked_pow(attempt.min(31)).unwrap_or(u32::MAX);
                self.initial_interval.saturating_mul(multiplier)
            }
        };
        delay.min(self.max_interval)
    }
}

/// Polls remote tasks to completion.
pub struct TaskWaiter<'a> {
    client: &'a dyn InventoryClient,
    policy: &'a WaitPolicy,
}

impl<'a> TaskWaiter<'a> {
    pub fn new(client: &'a dyn InventoryClient, policy: &'a WaitPolicy) -> Self {
        Self { client, policy }
    }

    /// Wait for `task` to finish. Errors only when the task itself cannot be read.
    pub async fn wait(&self, task: &TaskHandle) -> Result<TaskOutcome> {
        match self.policy.deadline {
            None => self.poll(task).await,
            Some(deadline) => match tokio::time::timeout(deadline, self.poll(task)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(task = %task, ?deadline, "Task did not finish before the deadline");
                    Ok(TaskOutcome::TimedOut)
                }
            },
        }
    }

    /// Wait for `task` and treat anything but success as an error naming `operation`.
    pub async fn wait_for_success(&self, operation: &str, task: &TaskHandle) -> Result<Option<MoRef>> {
        match self.wait(task).await? {
            TaskOutcome::Success(result) => Ok(result),
            TaskOutcome::Fault(fault) => Err(VAppError::RemoteTaskFault {
                operation: operation.to_string(),
                fault,
            }),
            TaskOutcome::TimedOut => Err(VAppError::Communication(format!(
                "{} did not finish within {:?}",
                operation,
                self.policy.deadline.unwrap_or_default()
            ))),
        }
    }

    async fn poll(&self, task: &TaskHandle) -> Result<TaskOutcome> {
        let mut attempt = 0;
        loop {
            let info = self.client.task_info(task).await?;
            match info.state {
                TaskState::Success { result } => {
                    debug!(task = %task, description = %info.description, "Task succeeded");
                    return Ok(TaskOutcome::Success(result));
                }
                TaskState::Error(fault) => {
                    debug!(task = %task, %fault, "Task failed");
                    return Ok(TaskOutcome::Fault(fault));
                }
                TaskState::Queued | TaskState::Running => {
                    tokio::time::sleep(self.policy.delay(attempt)).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}
