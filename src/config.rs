use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AgentError, Result};

/// Declarative policy for one agent instance
///
/// The configuration can be hot-swapped while tasks are in flight; automation
/// decisions always read the configuration in effect when they are evaluated,
/// not the one in effect at submission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_id: String,
    pub agent_type: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    // Automation settings
    /// How aggressively the agent may act without human confirmation, 0-100
    #[serde(default)]
    pub automation_level: u8,
    /// Minimum confidence score required to auto-apply a result, 0-100
    #[serde(default)]
    pub confidence_threshold: u8,

    // Resource limits
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    #[serde(default = "default_task_timeout")]
    pub task_timeout: Duration,
    /// Attempt budget recorded for the orchestrating caller; the core itself
    /// runs each admitted task exactly once
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    // Retention of terminal tasks in the in-flight map
    #[serde(default = "default_task_retention")]
    pub task_retention: Duration,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: Duration,

    /// Agent-specific settings (model parameters, marketplace lists, ...)
    #[serde(default)]
    pub settings: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

fn default_max_concurrent_tasks() -> usize {
    5
}

fn default_task_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_task_retention() -> Duration {
    Duration::from_secs(3600)
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(60)
}

impl AgentConfig {
    /// Creates a configuration with default limits and automation knobs at 0
    pub fn new(
        agent_id: impl Into<String>,
        agent_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_type: agent_type.into(),
            name: name.into(),
            description: String::new(),
            enabled: default_enabled(),
            automation_level: 0,
            confidence_threshold: 0,
            max_concurrent_tasks: default_max_concurrent_tasks(),
            task_timeout: default_task_timeout(),
            retry_attempts: default_retry_attempts(),
            task_retention: default_task_retention(),
            cleanup_interval: default_cleanup_interval(),
            settings: Map::new(),
        }
    }

    /// Validates the range invariants on every knob
    pub fn validate(&self) -> Result<()> {
        if self.agent_id.is_empty() {
            return Err(AgentError::Config("agent_id must not be empty".into()));
        }
        if self.automation_level > 100 {
            return Err(AgentError::Config(format!(
                "automation_level {} out of range 0-100",
                self.automation_level
            )));
        }
        if self.confidence_threshold > 100 {
            return Err(AgentError::Config(format!(
                "confidence_threshold {} out of range 0-100",
                self.confidence_threshold
            )));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(AgentError::Config(
                "max_concurrent_tasks must be at least 1".into(),
            ));
        }
        if self.task_timeout.is_zero() {
            return Err(AgentError::Config("task_timeout must be non-zero".into()));
        }
        Ok(())
    }

    /// Decides whether a completed result may be applied without human review
    ///
    /// True iff `automation_level > 50` and `confidence` meets the configured
    /// threshold. Confidence and threshold share one 0-100 scale. Pure
    /// decision function, no side effects.
    pub fn should_auto_execute(&self, confidence: f64) -> bool {
        self.automation_level > 50 && confidence >= f64::from(self.confidence_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn config() -> AgentConfig {
        AgentConfig::new("listing_generator", "listing_generator", "Listing Agent")
    }

    #[test]
    fn test_defaults() {
        let config = config();
        assert!(config.enabled);
        assert_eq!(config.max_concurrent_tasks, 5);
        assert_eq!(config.task_timeout, Duration::from_secs(300));
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.task_retention, Duration::from_secs(3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut bad = config();
        bad.automation_level = 101;
        assert!(bad.validate().is_err());

        let mut bad = config();
        bad.confidence_threshold = 200;
        assert!(bad.validate().is_err());

        let mut bad = config();
        bad.max_concurrent_tasks = 0;
        assert!(bad.validate().is_err());

        let mut bad = config();
        bad.task_timeout = Duration::ZERO;
        assert!(bad.validate().is_err());
    }

    // automation_level uses a strict comparison, confidence a non-strict one.
    #[test_case(75, 80, 79.0 => false ; "below threshold")]
    #[test_case(75, 80, 80.0 => true ; "at threshold")]
    #[test_case(75, 80, 81.0 => true ; "above threshold")]
    #[test_case(50, 80, 95.0 => false ; "automation at boundary")]
    #[test_case(51, 80, 95.0 => true ; "automation just above boundary")]
    #[test_case(0, 0, 0.0 => false ; "automation disabled")]
    #[test_case(100, 0, 0.0 => true ; "zero threshold accepts anything")]
    fn test_should_auto_execute(automation: u8, threshold: u8, confidence: f64) -> bool {
        let mut config = config();
        config.automation_level = automation;
        config.confidence_threshold = threshold;
        config.should_auto_execute(confidence)
    }

    #[test]
    fn test_serde_round_trip_with_defaults() {
        let json = r#"{
            "agent_id": "pricing_agent",
            "agent_type": "pricing_agent",
            "name": "Pricing Agent",
            "automation_level": 60,
            "confidence_threshold": 85
        }"#;
        let config: AgentConfig = serde_json::from_str(json).unwrap();
        assert!(config.enabled);
        assert_eq!(config.max_concurrent_tasks, 5);
        assert_eq!(config.automation_level, 60);

        let serialized = serde_json::to_string(&config).unwrap();
        let back: AgentConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(back.confidence_threshold, 85);
        assert_eq!(back.task_timeout, Duration::from_secs(300));
    }
}
