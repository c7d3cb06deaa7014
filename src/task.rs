use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Task execution status
///
/// Transitions are monotonic: `pending → running → {completed | failed |
/// cancelled}`, plus `pending → failed` (rejected at admission) and
/// `pending → cancelled`. No transition exits a terminal state; attempts to
/// re-enter one are no-ops so that cancellation stays idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether this status is terminal (no further transitions allowed)
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Task priority levels
///
/// Informational for the executor: the field round-trips through the core
/// untouched, no priority queueing is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// A unit of work submitted to an agent
///
/// The input payload is an opaque JSON document supplied by the caller; the
/// result document and confidence score are populated by the domain step on
/// success. Status, timestamps, result and error fields are write-once and
/// only mutated through the transition methods below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub task_id: String,
    pub agent_id: String,
    pub task_type: String,
    #[serde(default)]
    pub priority: TaskPriority,
    pub input_data: Map<String, Value>,
    pub status: TaskStatus,

    // Execution metadata
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    // Results
    pub result: Option<Map<String, Value>>,
    pub error_message: Option<String>,
    /// Self-assessed reliability of the result, 0-100
    pub confidence_score: Option<f64>,

    // Progress tracking, mutable only while running
    pub progress_percentage: u8,
    pub progress_message: Option<String>,
}

impl AgentTask {
    /// Creates a pending task with a fresh uuid id
    pub fn new(
        agent_id: impl Into<String>,
        task_type: impl Into<String>,
        input_data: Map<String, Value>,
    ) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            task_type: task_type.into(),
            priority: TaskPriority::default(),
            input_data,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error_message: None,
            confidence_score: None,
            progress_percentage: 0,
            progress_message: None,
        }
    }

    /// Sets the task priority, consuming and returning the task
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Transitions `pending → running` and stamps the start time
    ///
    /// Returns false without touching the task if it is not pending.
    pub fn mark_running(&mut self) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// Transitions `running → completed`, storing the result document and
    /// confidence score and stamping the completion time
    ///
    /// Returns false without touching the task if it is not running, so a
    /// late-finishing domain step can never clobber a cancelled or timed-out
    /// task.
    pub fn complete(&mut self, result: Map<String, Value>, confidence: Option<f64>) -> bool {
        if self.status != TaskStatus::Running {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.confidence_score = confidence;
        self.completed_at = Some(Utc::now());
        self.progress_percentage = 100;
        true
    }

    /// Transitions `pending | running → failed` with the given error message
    ///
    /// Returns false without touching the task if it is already terminal.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Failed;
        self.error_message = Some(message.into());
        self.completed_at = Some(Utc::now());
        true
    }

    /// Transitions `pending | running → cancelled`
    ///
    /// Idempotent: cancelling an already-terminal task is a no-op and
    /// returns false.
    pub fn cancel(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        true
    }

    /// Updates progress, clamped to 0-100; applies only while running
    pub fn set_progress(&mut self, percentage: u8, message: Option<String>) -> bool {
        if self.status != TaskStatus::Running {
            return false;
        }
        self.progress_percentage = percentage.min(100);
        if message.is_some() {
            self.progress_message = message;
        }
        true
    }

    /// Wall-clock execution time in seconds, available once both the start
    /// and completion timestamps are set
    pub fn execution_time(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => {
                Some((completed - started).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input() -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("product".into(), json!({"title": "USB-C Hub"}));
        map
    }

    #[test]
    fn test_new_task_is_pending() {
        let task = AgentTask::new("listing_generator", "generate_listing", input());
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert!(task.started_at.is_none());
        assert!(task.completed_at.is_none());
        assert!(task.result.is_none());
        assert!(!task.task_id.is_empty());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut task = AgentTask::new("a1", "t", input());
        assert!(task.mark_running());
        assert_eq!(task.status, TaskStatus::Running);
        assert!(task.started_at.is_some());

        assert!(task.complete(Map::new(), Some(92.0)));
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.confidence_score, Some(92.0));
        assert_eq!(task.progress_percentage, 100);
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        let mut task = AgentTask::new("a1", "t", input());
        task.mark_running();
        assert!(task.cancel());

        // No transition exits a terminal state.
        assert!(!task.mark_running());
        assert!(!task.complete(Map::new(), Some(50.0)));
        assert!(!task.fail("late failure"));
        assert!(!task.cancel());
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert!(task.result.is_none());
        assert!(task.error_message.is_none());
    }

    #[test]
    fn test_pending_can_fail_at_admission() {
        let mut task = AgentTask::new("a1", "t", input());
        assert!(task.fail("Validation errors: product is required"));
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.started_at.is_none());
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_progress_only_while_running() {
        let mut task = AgentTask::new("a1", "t", input());
        assert!(!task.set_progress(10, Some("too early".into())));

        task.mark_running();
        assert!(task.set_progress(250, Some("clamped".into())));
        assert_eq!(task.progress_percentage, 100);
        assert!(task.set_progress(70, None));
        assert_eq!(task.progress_message.as_deref(), Some("clamped"));

        task.cancel();
        assert!(!task.set_progress(90, None));
    }

    #[test]
    fn test_priority_round_trips() {
        let task = AgentTask::new("a1", "t", input()).with_priority(TaskPriority::Critical);
        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains("\"priority\":\"critical\""));
        let back: AgentTask = serde_json::from_str(&json).unwrap();
        assert_eq!(back.priority, TaskPriority::Critical);
        assert_eq!(back.status, TaskStatus::Pending);
    }

    #[test]
    fn test_execution_time() {
        let mut task = AgentTask::new("a1", "t", input());
        assert!(task.execution_time().is_none());
        task.mark_running();
        task.complete(Map::new(), None);
        let secs = task.execution_time().unwrap();
        assert!(secs >= 0.0 && secs < 1.0);
    }
}
