use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::task::AgentTask;

/// Process-level agent status
///
/// Distinct from per-task status: an agent is `running` while at least one
/// of its tasks is executing and drops back to `idle` once none remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Running,
    Paused,
    Error,
    Training,
    Offline,
}

/// Outcome of a successful domain execution step
///
/// Returned by [`Agent::execute`] instead of mutating the task directly; the
/// execution wrapper applies it to the canonical task under its lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutput {
    /// Opaque result document handed back to the caller
    pub result: Map<String, Value>,
    /// Self-assessed reliability of the result, 0-100
    pub confidence: Option<f64>,
}

impl TaskOutput {
    /// Creates an output without a confidence score
    pub fn new(result: Map<String, Value>) -> Self {
        Self {
            result,
            confidence: None,
        }
    }

    /// Creates an output carrying a confidence score
    pub fn with_confidence(result: Map<String, Value>, confidence: f64) -> Self {
        Self {
            result,
            confidence: Some(confidence),
        }
    }
}

/// Execution handle passed to the domain step
///
/// Exposes the input payload, progress reporting that is visible to
/// concurrent status polls, and the advisory cancellation token. Dropping
/// progress updates after the task left the running state is handled here,
/// the domain step does not need to re-check.
#[derive(Clone)]
pub struct TaskContext {
    task_id: String,
    agent_id: String,
    input: Arc<Map<String, Value>>,
    shared: Arc<Mutex<AgentTask>>,
    cancel: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(
        input: Arc<Map<String, Value>>,
        shared: Arc<Mutex<AgentTask>>,
        cancel: CancellationToken,
        task_id: String,
        agent_id: String,
    ) -> Self {
        Self {
            task_id,
            agent_id,
            input,
            shared,
            cancel,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// The caller-supplied input document
    pub fn input(&self) -> &Map<String, Value> {
        &self.input
    }

    /// Publishes a progress update on the canonical task
    ///
    /// Ignored once the task is no longer running.
    pub async fn report_progress(&self, percentage: u8, message: impl Into<String>) {
        let mut task = self.shared.lock().await;
        task.set_progress(percentage, Some(message.into()));
    }

    /// Whether cancellation has been requested for this task
    ///
    /// Cancellation is cooperative: the wrapper drops the domain future at
    /// its next suspension point, and long compute loops can poll this flag
    /// to exit earlier.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The advisory cancellation token, for domain steps that want to
    /// `select!` against it
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Capability set every concrete agent implements
///
/// The executor core supplies the surrounding lifecycle machinery
/// (admission, timeout, metrics, status); implementations only provide the
/// domain logic.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Acquires external resources (clients, models)
    ///
    /// A failure here prevents the agent from reaching a usable state; it is
    /// left in the `error` status.
    async fn initialize(&self) -> Result<()>;

    /// Performs the domain computation for one task
    ///
    /// Returns the result document and confidence score on success, or a
    /// domain error whose message is captured verbatim into the task.
    async fn execute(&self, ctx: TaskContext) -> Result<TaskOutput>;

    /// Validates an input payload before admission
    ///
    /// An empty list means the input is valid. Must not suspend; admission
    /// control runs it synchronously.
    fn validate(&self, input: &Map<String, Value>) -> Vec<String>;
}
