//! Test support: a scriptable agent for exercising the execution core
//! without any real domain logic behind it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::agent::{Agent, TaskContext, TaskOutput};
use crate::error::{AgentError, Result};

/// A programmable [`Agent`] whose behavior is fixed at construction and can
/// be overridden per task through the input payload:
///
/// - `"delay_ms"` (number): sleep this long before finishing
/// - `"confidence"` (number): confidence score attached to the result
/// - `"error"` (string): fail with this message instead of succeeding
pub struct ScriptedAgent {
    delay: Duration,
    confidence: Option<f64>,
    failure: Option<String>,
    validation_errors: Vec<String>,
    init_error: Option<String>,
    executions: AtomicUsize,
}

impl ScriptedAgent {
    /// An agent that succeeds immediately with the given confidence
    pub fn succeeding(confidence: Option<f64>) -> Self {
        Self {
            delay: Duration::ZERO,
            confidence,
            failure: None,
            validation_errors: Vec::new(),
            init_error: None,
            executions: AtomicUsize::new(0),
        }
    }

    /// An agent whose every execution fails with the given message
    pub fn failing(message: impl Into<String>) -> Self {
        let mut agent = Self::succeeding(None);
        agent.failure = Some(message.into());
        agent
    }

    /// Sleeps for `delay` inside every execution
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Rejects every input with the given validation errors
    pub fn with_validation_errors(mut self, errors: Vec<String>) -> Self {
        self.validation_errors = errors;
        self
    }

    /// Fails `initialize` with the given message
    pub fn with_init_error(mut self, message: impl Into<String>) -> Self {
        self.init_error = Some(message.into());
        self
    }

    /// How many executions actually started
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn initialize(&self) -> Result<()> {
        match &self.init_error {
            Some(message) => Err(AgentError::Initialization(message.clone())),
            None => Ok(()),
        }
    }

    async fn execute(&self, ctx: TaskContext) -> Result<TaskOutput> {
        self.executions.fetch_add(1, Ordering::SeqCst);

        let delay = ctx
            .input()
            .get("delay_ms")
            .and_then(Value::as_u64)
            .map_or(self.delay, Duration::from_millis);
        let confidence = ctx
            .input()
            .get("confidence")
            .and_then(Value::as_f64)
            .or(self.confidence);
        let failure = ctx
            .input()
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .or_else(|| self.failure.clone());

        ctx.report_progress(25, "scripted step running").await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = failure {
            return Err(AgentError::execution(message));
        }

        let mut result = Map::new();
        result.insert("echo".into(), Value::Object(ctx.input().clone()));
        Ok(TaskOutput {
            result,
            confidence,
        })
    }

    fn validate(&self, _input: &Map<String, Value>) -> Vec<String> {
        self.validation_errors.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::AgentTask;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    fn context(input: Map<String, Value>) -> TaskContext {
        let task = AgentTask::new("a1", "scripted", input.clone());
        TaskContext::new(
            Arc::new(input),
            Arc::new(Mutex::new(task)),
            CancellationToken::new(),
            "t1".into(),
            "a1".into(),
        )
    }

    #[tokio::test]
    async fn test_input_overrides_script() {
        let agent = ScriptedAgent::succeeding(Some(50.0));

        let mut input = Map::new();
        input.insert("confidence".into(), json!(97.5));
        let output = agent.execute(context(input)).await.unwrap();
        assert_eq!(output.confidence, Some(97.5));

        let mut input = Map::new();
        input.insert("error".into(), json!("scripted failure"));
        let err = agent.execute(context(input)).await.unwrap_err();
        assert_eq!(err.to_string(), "scripted failure");

        assert_eq!(agent.executions(), 2);
    }
}
