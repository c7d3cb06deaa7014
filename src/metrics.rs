use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentStatus;

/// Rolling performance metrics for one agent
///
/// Averages are maintained incrementally with the streaming-mean update
/// `new_avg = (old_avg * (n - 1) + sample) / n`; full task history is never
/// retained. Execution time averages over successful tasks only; confidence
/// averages over all terminal tasks, substituting 0 when a task carried no
/// confidence score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub failed_tasks: u64,
    /// Mean wall-clock execution time of successful tasks, in seconds
    pub average_execution_time: f64,
    /// Mean confidence score across all terminal tasks, 0-100
    pub average_confidence: f64,
    pub last_active: Option<DateTime<Utc>>,
    pub uptime_percentage: f64,
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self {
            total_tasks: 0,
            successful_tasks: 0,
            failed_tasks: 0,
            average_execution_time: 0.0,
            average_confidence: 0.0,
            last_active: None,
            uptime_percentage: 100.0,
        }
    }
}

impl AgentMetrics {
    /// Records a successfully completed task
    pub fn record_success(&mut self, execution_secs: f64, confidence: Option<f64>) {
        self.total_tasks += 1;
        self.successful_tasks += 1;

        let n = self.successful_tasks as f64;
        self.average_execution_time =
            (self.average_execution_time * (n - 1.0) + execution_secs) / n;

        self.record_confidence(confidence);
        self.last_active = Some(Utc::now());
    }

    /// Records a failed task; failures never contribute to the execution
    /// time average
    pub fn record_failure(&mut self, confidence: Option<f64>) {
        self.total_tasks += 1;
        self.failed_tasks += 1;

        self.record_confidence(confidence);
        self.last_active = Some(Utc::now());
    }

    fn record_confidence(&mut self, confidence: Option<f64>) {
        let sample = confidence.unwrap_or(0.0);
        let n = self.total_tasks as f64;
        self.average_confidence = (self.average_confidence * (n - 1.0) + sample) / n;
    }

    /// Fraction of terminal tasks that succeeded, as a percentage;
    /// 0 when no tasks have run
    pub fn success_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        self.successful_tasks as f64 / self.total_tasks as f64 * 100.0
    }
}

/// Point-in-time view of one agent inside the system-wide summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub agent_type: String,
    pub status: AgentStatus,
    pub metrics: AgentMetrics,
}

/// System-wide metrics aggregated across the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub total_agents: usize,
    /// Agents currently executing at least one task
    pub active_agents: usize,
    pub total_tasks: u64,
    pub successful_tasks: u64,
    /// Derived success rate as a percentage; 0 when no tasks have run
    pub success_rate: f64,
    pub agents: HashMap<String, AgentSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_default_metrics() {
        let metrics = AgentMetrics::default();
        assert_eq!(metrics.total_tasks, 0);
        assert_eq!(metrics.uptime_percentage, 100.0);
        assert_eq!(metrics.success_rate(), 0.0);
        assert!(metrics.last_active.is_none());
    }

    #[test]
    fn test_execution_time_is_arithmetic_mean_of_successes() {
        let mut metrics = AgentMetrics::default();
        let samples = [1.5, 0.25, 4.0, 2.25];
        for secs in samples {
            metrics.record_success(secs, None);
        }
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        assert!((metrics.average_execution_time - mean).abs() < EPSILON);
    }

    #[test]
    fn test_failures_do_not_skew_execution_time() {
        let mut metrics = AgentMetrics::default();
        metrics.record_success(2.0, Some(90.0));
        metrics.record_failure(None);
        metrics.record_success(4.0, Some(80.0));

        assert_eq!(metrics.total_tasks, 3);
        assert_eq!(metrics.successful_tasks, 2);
        assert_eq!(metrics.failed_tasks, 1);
        assert!((metrics.average_execution_time - 3.0).abs() < EPSILON);
    }

    #[test]
    fn test_confidence_averages_over_total_tasks() {
        let mut metrics = AgentMetrics::default();
        // Absent confidence counts as 0, and the denominator is the total
        // task count rather than the successful count.
        metrics.record_success(1.0, Some(90.0));
        metrics.record_failure(Some(60.0));
        metrics.record_failure(None);

        let expected = (90.0 + 60.0 + 0.0) / 3.0;
        assert!((metrics.average_confidence - expected).abs() < EPSILON);
    }

    #[test]
    fn test_success_rate() {
        let mut metrics = AgentMetrics::default();
        metrics.record_success(1.0, None);
        metrics.record_success(1.0, None);
        metrics.record_failure(None);
        assert!((metrics.success_rate() - 200.0 / 3.0).abs() < EPSILON);
    }

    #[test]
    fn test_last_active_updates_on_every_sample() {
        let mut metrics = AgentMetrics::default();
        metrics.record_failure(None);
        let first = metrics.last_active.unwrap();
        metrics.record_success(0.5, Some(70.0));
        assert!(metrics.last_active.unwrap() >= first);
    }
}
