use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agent::{Agent, AgentStatus, TaskContext, TaskOutput};
use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::metrics::AgentMetrics;
use crate::task::AgentTask;

/// One live agent instance: a domain worker plus the lifecycle machinery
/// the core wraps around it
///
/// Owns the agent's in-flight task map and metrics exclusively; all mutation
/// goes through the per-field locks so concurrent completions cannot lose
/// updates. Configuration is hot-swappable and every decision reads the
/// configuration in effect at decision time.
pub struct ManagedAgent {
    agent_id: String,
    worker: Arc<dyn Agent>,
    config: RwLock<AgentConfig>,
    status: RwLock<AgentStatus>,
    tasks: Mutex<HashMap<String, TaskEntry>>,
    metrics: Mutex<AgentMetrics>,
    /// Admitted tasks that have not reached a terminal state. Admission
    /// counts this rather than the running-status census so a burst of
    /// submissions can never overshoot the ceiling while earlier tasks are
    /// still between admission and their first poll.
    in_flight: AtomicUsize,
    reaper: Mutex<Option<JoinHandle<()>>>,
    /// Self-handle for spawning the wrapper and reaper without keeping the
    /// agent alive from its own background tasks
    weak_self: Weak<Self>,
}

struct TaskEntry {
    task: Arc<Mutex<AgentTask>>,
    cancel: CancellationToken,
}

impl TaskEntry {
    fn new(task: AgentTask) -> Self {
        Self {
            task: Arc::new(Mutex::new(task)),
            cancel: CancellationToken::new(),
        }
    }
}

enum Outcome {
    Completed(TaskOutput),
    Failed(AgentError),
    TimedOut,
    Cancelled,
}

impl ManagedAgent {
    /// Creates a managed agent around a domain worker
    ///
    /// The agent starts in the `idle` status; call [`start`](Self::start)
    /// (or register it with an [`AgentManager`](crate::AgentManager), which
    /// starts enabled agents) before submitting work.
    pub fn new(config: AgentConfig, worker: Arc<dyn Agent>) -> Arc<Self> {
        let agent_id = config.agent_id.clone();
        Arc::new_cyclic(|weak_self| Self {
            agent_id,
            worker,
            config: RwLock::new(config),
            status: RwLock::new(AgentStatus::Idle),
            tasks: Mutex::new(HashMap::new()),
            metrics: Mutex::new(AgentMetrics::default()),
            in_flight: AtomicUsize::new(0),
            reaper: Mutex::new(None),
            weak_self: weak_self.clone(),
        })
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Snapshot of the current configuration
    pub async fn config(&self) -> AgentConfig {
        self.config.read().await.clone()
    }

    pub async fn status(&self) -> AgentStatus {
        *self.status.read().await
    }

    /// Snapshot of the rolling performance metrics
    pub async fn metrics(&self) -> AgentMetrics {
        self.metrics.lock().await.clone()
    }

    /// Number of admitted tasks that have not yet reached a terminal state
    pub fn active_tasks(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Whether a result with the given confidence may be applied without
    /// human review, per the configuration in effect right now
    pub async fn should_auto_execute(&self, confidence: f64) -> bool {
        self.config.read().await.should_auto_execute(confidence)
    }

    /// Initializes the worker and brings the agent into service
    ///
    /// On initialization failure the agent is left in the `error` status and
    /// false is returned.
    pub async fn start(&self) -> bool {
        info!(agent_id = %self.agent_id, "Starting agent");
        match self.worker.initialize().await {
            Ok(()) => {
                *self.status.write().await = AgentStatus::Idle;
                self.spawn_reaper().await;
                info!(agent_id = %self.agent_id, "Agent started successfully");
                true
            }
            Err(err) => {
                error!(agent_id = %self.agent_id, error = %err, "Failed to start agent");
                *self.status.write().await = AgentStatus::Error;
                false
            }
        }
    }

    /// Cancels every non-terminal task and takes the agent offline
    pub async fn stop(&self) -> bool {
        info!(agent_id = %self.agent_id, "Stopping agent");
        {
            let tasks = self.tasks.lock().await;
            for (task_id, entry) in tasks.iter() {
                let mut task = entry.task.lock().await;
                if task.cancel() {
                    entry.cancel.cancel();
                    info!(agent_id = %self.agent_id, task_id = %task_id, "Cancelled running task");
                }
            }
        }
        if let Some(handle) = self.reaper.lock().await.take() {
            handle.abort();
        }
        *self.status.write().await = AgentStatus::Offline;
        info!(agent_id = %self.agent_id, "Agent stopped");
        true
    }

    /// Pauses a running agent; in-flight tasks keep executing
    pub async fn pause(&self) -> bool {
        let mut status = self.status.write().await;
        if *status == AgentStatus::Running {
            *status = AgentStatus::Paused;
            info!(agent_id = %self.agent_id, "Agent paused");
            true
        } else {
            false
        }
    }

    /// Resumes a paused agent
    pub async fn resume(&self) -> bool {
        let mut status = self.status.write().await;
        if *status == AgentStatus::Paused {
            *status = AgentStatus::Idle;
            info!(agent_id = %self.agent_id, "Agent resumed");
            true
        } else {
            false
        }
    }

    /// Submits a task for asynchronous execution
    ///
    /// Admission control runs synchronously: a disabled or offline agent
    /// rejects outright with [`AgentError::Unavailable`]; validation errors
    /// and a full concurrency budget record the task as failed (observable
    /// via [`task`](Self::task) until retention expires) and still return
    /// its id. An admitted task is spawned and the id returned immediately;
    /// callers poll for completion.
    pub async fn submit(&self, mut task: AgentTask) -> Result<String> {
        let (enabled, max_concurrent) = {
            let config = self.config.read().await;
            (config.enabled, config.max_concurrent_tasks)
        };
        if !enabled || *self.status.read().await == AgentStatus::Offline {
            warn!(agent_id = %self.agent_id, "Rejected submission, agent is not available");
            return Err(AgentError::Unavailable);
        }

        let task_id = task.task_id.clone();

        let validation_errors = self.worker.validate(&task.input_data);
        if !validation_errors.is_empty() {
            let message = AgentError::Validation(validation_errors.join(", ")).to_string();
            warn!(agent_id = %self.agent_id, task_id = %task_id, error = %message, "Task rejected");
            task.fail(message);
            self.tasks.lock().await.insert(task_id.clone(), TaskEntry::new(task));
            return Ok(task_id);
        }

        // The map lock serializes the ceiling check against other
        // submissions; in_flight is only incremented while holding it.
        let mut tasks = self.tasks.lock().await;
        if self.in_flight.load(Ordering::SeqCst) >= max_concurrent {
            let message = AgentError::ConcurrencyLimit.to_string();
            warn!(agent_id = %self.agent_id, task_id = %task_id, "Task rejected, concurrency ceiling reached");
            task.fail(message);
            tasks.insert(task_id.clone(), TaskEntry::new(task));
            return Ok(task_id);
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        let entry = TaskEntry::new(task);
        let shared = Arc::clone(&entry.task);
        let cancel = entry.cancel.clone();
        tasks.insert(task_id.clone(), entry);
        drop(tasks);

        let weak = self.weak_self.clone();
        tokio::spawn(async move {
            if let Some(agent) = weak.upgrade() {
                agent.run_task(shared, cancel).await;
            }
        });

        Ok(task_id)
    }

    /// Snapshot of a task by id
    pub async fn task(&self, task_id: &str) -> Option<AgentTask> {
        let tasks = self.tasks.lock().await;
        match tasks.get(task_id) {
            Some(entry) => Some(entry.task.lock().await.clone()),
            None => None,
        }
    }

    /// Snapshots of every retained task
    pub async fn tasks(&self) -> Vec<AgentTask> {
        let tasks = self.tasks.lock().await;
        let mut snapshots = Vec::with_capacity(tasks.len());
        for entry in tasks.values() {
            snapshots.push(entry.task.lock().await.clone());
        }
        snapshots
    }

    /// Requests cancellation of a pending or running task
    ///
    /// Returns true if the task transitioned to cancelled; cancelling an
    /// unknown or already-terminal task is a no-op returning false. The
    /// domain future is dropped at its next suspension point.
    pub async fn cancel_task(&self, task_id: &str) -> bool {
        let tasks = self.tasks.lock().await;
        let Some(entry) = tasks.get(task_id) else {
            return false;
        };
        let mut task = entry.task.lock().await;
        if task.cancel() {
            entry.cancel.cancel();
            info!(agent_id = %self.agent_id, task_id = %task_id, "Task cancelled");
            true
        } else {
            false
        }
    }

    /// Replaces the configuration; rejected (returning false) if the new
    /// configuration fails validation
    pub async fn update_config(&self, new_config: AgentConfig) -> bool {
        if let Err(err) = new_config.validate() {
            warn!(agent_id = %self.agent_id, error = %err, "Rejected configuration update");
            return false;
        }
        *self.config.write().await = new_config;
        info!(agent_id = %self.agent_id, "Agent configuration updated");
        true
    }

    /// Drops terminal tasks whose retention window has elapsed at `now`;
    /// returns how many were removed
    ///
    /// Driven by the background reaper, but callable directly with a
    /// synthetic clock.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let retention = self.config.read().await.task_retention;
        let retention = chrono::Duration::from_std(retention)
            .unwrap_or_else(|_| chrono::Duration::seconds(3600));

        let mut tasks = self.tasks.lock().await;
        let mut expired = Vec::new();
        for (task_id, entry) in tasks.iter() {
            let task = entry.task.lock().await;
            if task.status.is_terminal() {
                if let Some(completed_at) = task.completed_at {
                    if completed_at + retention <= now {
                        expired.push(task_id.clone());
                    }
                }
            }
        }
        for task_id in &expired {
            tasks.remove(task_id);
            debug!(agent_id = %self.agent_id, task_id = %task_id, "Removed expired task");
        }
        expired.len()
    }

    async fn spawn_reaper(&self) {
        let mut reaper = self.reaper.lock().await;
        if let Some(handle) = reaper.take() {
            handle.abort();
        }
        let interval = self.config.read().await.cleanup_interval;
        let agent = self.weak_self.clone();
        *reaper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(agent) = agent.upgrade() else {
                    break;
                };
                agent.sweep_expired(Utc::now()).await;
            }
        }));
    }

    /// Execution wrapper: races the domain step against cancellation and
    /// the configured timeout, then applies the outcome exactly once
    async fn run_task(self: Arc<Self>, shared: Arc<Mutex<AgentTask>>, cancel: CancellationToken) {
        let (task_id, task_type, input) = {
            let task = shared.lock().await;
            (
                task.task_id.clone(),
                task.task_type.clone(),
                Arc::new(task.input_data.clone()),
            )
        };
        let timeout = self.config.read().await.task_timeout;

        let started = shared.lock().await.mark_running();
        if started {
            *self.status.write().await = AgentStatus::Running;
            info!(agent_id = %self.agent_id, task_id = %task_id, task_type = %task_type, "Executing task");

            let ctx = TaskContext::new(
                input,
                Arc::clone(&shared),
                cancel.clone(),
                task_id.clone(),
                self.agent_id.clone(),
            );
            let outcome = tokio::select! {
                () = cancel.cancelled() => Outcome::Cancelled,
                result = tokio::time::timeout(timeout, self.worker.execute(ctx)) => match result {
                    Err(_elapsed) => Outcome::TimedOut,
                    Ok(Ok(output)) => Outcome::Completed(output),
                    Ok(Err(err)) => Outcome::Failed(err),
                },
            };
            self.settle(&shared, &task_id, outcome).await;
        } else {
            debug!(agent_id = %self.agent_id, task_id = %task_id, "Task no longer pending, skipping execution");
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.in_flight.load(Ordering::SeqCst) == 0 {
            let mut status = self.status.write().await;
            if *status == AgentStatus::Running {
                *status = AgentStatus::Idle;
            }
        }
    }

    /// Applies a terminal outcome under the task lock. The transition
    /// methods refuse to touch an already-terminal task, so a late finisher
    /// racing a timeout or cancellation can neither clobber the task nor
    /// double-record metrics.
    async fn settle(&self, shared: &Arc<Mutex<AgentTask>>, task_id: &str, outcome: Outcome) {
        match outcome {
            Outcome::Completed(output) => {
                let (applied, execution_secs, confidence) = {
                    let mut task = shared.lock().await;
                    let applied = task.complete(output.result, output.confidence);
                    (applied, task.execution_time().unwrap_or(0.0), task.confidence_score)
                };
                if applied {
                    self.metrics.lock().await.record_success(execution_secs, confidence);
                    info!(
                        agent_id = %self.agent_id,
                        task_id = %task_id,
                        execution_secs,
                        confidence = confidence.unwrap_or(0.0),
                        "Task completed"
                    );
                } else {
                    debug!(agent_id = %self.agent_id, task_id = %task_id, "Discarded late result");
                }
            }
            Outcome::TimedOut => {
                let applied = shared.lock().await.fail(AgentError::Timeout.to_string());
                if applied {
                    self.metrics.lock().await.record_failure(None);
                    warn!(agent_id = %self.agent_id, task_id = %task_id, "Task execution timed out");
                }
            }
            Outcome::Failed(err) => {
                let applied = shared.lock().await.fail(err.to_string());
                if applied {
                    self.metrics.lock().await.record_failure(None);
                    error!(agent_id = %self.agent_id, task_id = %task_id, error = %err, "Task execution failed");
                }
            }
            Outcome::Cancelled => {
                debug!(agent_id = %self.agent_id, task_id = %task_id, "Task cancelled during execution");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;
    use crate::testing::ScriptedAgent;
    use serde_json::Map;
    use std::time::Duration;

    fn config(max_concurrent: usize) -> AgentConfig {
        let mut config = AgentConfig::new("test_agent", "scripted", "Test Agent");
        config.max_concurrent_tasks = max_concurrent;
        config.task_timeout = Duration::from_secs(5);
        config
    }

    fn task() -> AgentTask {
        AgentTask::new("test_agent", "scripted_op", Map::new())
    }

    #[tokio::test]
    async fn test_disabled_agent_rejects_submission() {
        let mut cfg = config(5);
        cfg.enabled = false;
        let agent = ManagedAgent::new(cfg, Arc::new(ScriptedAgent::succeeding(None)));

        let result = agent.submit(task()).await;
        assert!(matches!(result, Err(AgentError::Unavailable)));
        assert!(agent.tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_offline_agent_rejects_submission() {
        let agent = ManagedAgent::new(config(5), Arc::new(ScriptedAgent::succeeding(None)));
        agent.start().await;
        agent.stop().await;

        let result = agent.submit(task()).await;
        assert!(matches!(result, Err(AgentError::Unavailable)));
    }

    #[tokio::test]
    async fn test_validation_failure_is_observable_and_consumes_no_slot() {
        let worker = ScriptedAgent::succeeding(None)
            .with_validation_errors(vec!["product is required".into(), "title is required".into()]);
        let agent = ManagedAgent::new(config(5), Arc::new(worker));
        agent.start().await;

        let task_id = agent.submit(task()).await.unwrap();
        let rejected = agent.task(&task_id).await.unwrap();
        assert_eq!(rejected.status, TaskStatus::Failed);
        assert_eq!(
            rejected.error_message.as_deref(),
            Some("Validation errors: product is required, title is required")
        );
        assert!(rejected.started_at.is_none());
        assert_eq!(agent.active_tasks(), 0);
        // Admission failures record no metrics sample.
        assert_eq!(agent.metrics().await.total_tasks, 0);
    }

    #[tokio::test]
    async fn test_failed_initialization_leaves_error_status() {
        let worker = ScriptedAgent::succeeding(None).with_init_error("model endpoint unreachable");
        let agent = ManagedAgent::new(config(5), Arc::new(worker));

        assert!(!agent.start().await);
        assert_eq!(agent.status().await, AgentStatus::Error);
    }

    #[tokio::test]
    async fn test_domain_error_captured_verbatim() {
        let worker = ScriptedAgent::failing("upstream returned 503");
        let agent = ManagedAgent::new(config(5), Arc::new(worker));
        agent.start().await;

        let task_id = agent.submit(task()).await.unwrap();
        let failed = wait_terminal(&agent, &task_id).await;
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("upstream returned 503"));
        assert!(failed.completed_at.is_some());

        let metrics = agent.metrics().await;
        assert_eq!(metrics.total_tasks, 1);
        assert_eq!(metrics.failed_tasks, 1);
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let agent = ManagedAgent::new(config(5), Arc::new(ScriptedAgent::succeeding(None)));
        agent.start().await;

        // Only a running agent can be paused.
        assert!(!agent.pause().await);
        *agent.status.write().await = AgentStatus::Running;
        assert!(agent.pause().await);
        assert_eq!(agent.status().await, AgentStatus::Paused);
        assert!(agent.resume().await);
        assert_eq!(agent.status().await, AgentStatus::Idle);
        assert!(!agent.resume().await);
    }

    #[tokio::test]
    async fn test_sweep_expired_respects_retention_window() {
        let agent = ManagedAgent::new(config(5), Arc::new(ScriptedAgent::succeeding(Some(90.0))));
        agent.start().await;

        let task_id = agent.submit(task()).await.unwrap();
        let done = wait_terminal(&agent, &task_id).await;
        assert_eq!(done.status, TaskStatus::Completed);

        // Still inside the retention window.
        assert_eq!(agent.sweep_expired(Utc::now()).await, 0);
        assert!(agent.task(&task_id).await.is_some());

        // One hour and a bit later the task is gone.
        let later = Utc::now() + chrono::Duration::seconds(3601);
        assert_eq!(agent.sweep_expired(later).await, 1);
        assert!(agent.task(&task_id).await.is_none());
    }

    #[tokio::test]
    async fn test_config_hot_swap_changes_gating() {
        let agent = ManagedAgent::new(config(5), Arc::new(ScriptedAgent::succeeding(None)));
        assert!(!agent.should_auto_execute(99.0).await);

        let mut updated = config(5);
        updated.automation_level = 75;
        updated.confidence_threshold = 80;
        assert!(agent.update_config(updated).await);
        assert!(agent.should_auto_execute(99.0).await);
        assert!(!agent.should_auto_execute(79.0).await);
    }

    #[tokio::test]
    async fn test_update_config_rejects_invalid() {
        let agent = ManagedAgent::new(config(5), Arc::new(ScriptedAgent::succeeding(None)));
        let mut bad = config(5);
        bad.max_concurrent_tasks = 0;
        assert!(!agent.update_config(bad).await);
        assert_eq!(agent.config().await.max_concurrent_tasks, 5);
    }

    async fn wait_terminal(agent: &Arc<ManagedAgent>, task_id: &str) -> AgentTask {
        for _ in 0..200 {
            if let Some(task) = agent.task(task_id).await {
                if task.status.is_terminal() {
                    return task;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {task_id} did not reach a terminal state");
    }
}
