use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::agent::AgentStatus;
use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::metrics::{AgentMetrics, AgentSnapshot, SystemMetrics};
use crate::runtime::ManagedAgent;
use crate::task::AgentTask;

/// Registry of live agents and the facade the API layer talks to
///
/// Constructed explicitly at process start and passed by handle to
/// consumers; there is no ambient global instance. Registration and removal
/// are serialized against concurrent lookups by the registry lock.
#[derive(Default)]
pub struct AgentManager {
    agents: RwLock<HashMap<String, Arc<ManagedAgent>>>,
}

impl AgentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an agent into the registry, replacing (and logging) any
    /// previous holder of the same id, and starts it if its configuration
    /// marks it enabled
    ///
    /// Returns false when the enabled agent failed to start; it stays
    /// registered in the `error` status.
    pub async fn register(&self, agent: Arc<ManagedAgent>) -> bool {
        let agent_id = agent.agent_id().to_string();
        let enabled = agent.config().await.enabled;

        {
            let mut agents = self.agents.write().await;
            if agents.insert(agent_id.clone(), Arc::clone(&agent)).is_some() {
                warn!(agent_id = %agent_id, "Agent already registered, replacing");
            }
        }

        let started = if enabled { agent.start().await } else { true };
        info!(agent_id = %agent_id, enabled, "Agent registered");
        started
    }

    /// Stops an agent (cancelling its running tasks) and removes it
    ///
    /// Returns false for an unknown agent id.
    pub async fn unregister(&self, agent_id: &str) -> bool {
        let agent = {
            let mut agents = self.agents.write().await;
            agents.remove(agent_id)
        };
        match agent {
            Some(agent) => {
                agent.stop().await;
                info!(agent_id = %agent_id, "Agent unregistered");
                true
            }
            None => false,
        }
    }

    /// Looks up an agent by id
    pub async fn get(&self, agent_id: &str) -> Option<Arc<ManagedAgent>> {
        self.agents.read().await.get(agent_id).cloned()
    }

    /// Lists registered agents, optionally filtered by type tag
    pub async fn list(&self, agent_type: Option<&str>) -> Vec<Arc<ManagedAgent>> {
        let agents = self.agents.read().await;
        let mut listed = Vec::new();
        for agent in agents.values() {
            if let Some(wanted) = agent_type {
                if agent.config().await.agent_type != wanted {
                    continue;
                }
            }
            listed.push(Arc::clone(agent));
        }
        listed
    }

    /// Routes a task to the addressed agent's submission path
    ///
    /// An unknown agent id is the only submission failure surfaced as an
    /// error to the caller besides an unavailable agent; every other
    /// admission failure yields a task id addressing a failed task.
    pub async fn submit(&self, agent_id: &str, task: AgentTask) -> Result<String> {
        let agent = self
            .get(agent_id)
            .await
            .ok_or_else(|| AgentError::UnknownAgent(agent_id.to_string()))?;
        agent.submit(task).await
    }

    /// Snapshot of a task on the addressed agent
    pub async fn task_status(&self, agent_id: &str, task_id: &str) -> Option<AgentTask> {
        self.get(agent_id).await?.task(task_id).await
    }

    /// Requests cancellation of a task on the addressed agent
    pub async fn cancel(&self, agent_id: &str, task_id: &str) -> bool {
        match self.get(agent_id).await {
            Some(agent) => agent.cancel_task(task_id).await,
            None => false,
        }
    }

    /// Rolling metrics of the addressed agent
    pub async fn agent_metrics(&self, agent_id: &str) -> Option<AgentMetrics> {
        match self.get(agent_id).await {
            Some(agent) => Some(agent.metrics().await),
            None => None,
        }
    }

    /// Replaces the addressed agent's configuration
    pub async fn update_config(&self, agent_id: &str, new_config: AgentConfig) -> bool {
        match self.get(agent_id).await {
            Some(agent) => agent.update_config(new_config).await,
            None => false,
        }
    }

    /// Aggregates metrics across the registry
    pub async fn system_metrics(&self) -> SystemMetrics {
        let agents = {
            let registry = self.agents.read().await;
            registry
                .iter()
                .map(|(id, agent)| (id.clone(), Arc::clone(agent)))
                .collect::<Vec<_>>()
        };

        let mut snapshots = HashMap::with_capacity(agents.len());
        let mut active_agents = 0;
        let mut total_tasks = 0;
        let mut successful_tasks = 0;

        for (agent_id, agent) in agents {
            let status = agent.status().await;
            let metrics = agent.metrics().await;
            if status == AgentStatus::Running {
                active_agents += 1;
            }
            total_tasks += metrics.total_tasks;
            successful_tasks += metrics.successful_tasks;
            snapshots.insert(
                agent_id,
                AgentSnapshot {
                    agent_type: agent.config().await.agent_type,
                    status,
                    metrics,
                },
            );
        }

        let success_rate = if total_tasks > 0 {
            successful_tasks as f64 / total_tasks as f64 * 100.0
        } else {
            0.0
        };

        SystemMetrics {
            total_agents: snapshots.len(),
            active_agents,
            total_tasks,
            successful_tasks,
            success_rate,
            agents: snapshots,
        }
    }

    /// Stops every registered agent; used at process shutdown
    pub async fn shutdown(&self) {
        let agents = {
            let registry = self.agents.read().await;
            registry.values().cloned().collect::<Vec<_>>()
        };
        futures::future::join_all(agents.iter().map(|agent| agent.stop())).await;
        info!(agents = agents.len(), "All agents stopped");
    }
}
