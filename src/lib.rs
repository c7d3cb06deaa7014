#![doc = include_str!("../README.md")]
#![warn(clippy::all)]

/// Capability trait and execution context for domain agents
pub mod agent;
/// Concrete agent implementations
pub mod agents;
/// Declarative per-agent configuration
pub mod config;
/// Error handling types and utilities
pub mod error;
/// Logging configuration and utilities
pub mod logging;
/// Registry of live agents and system-wide views
pub mod manager;
/// Rolling per-agent metrics and aggregated summaries
pub mod metrics;
/// Admission control, execution wrapper, and task retention
pub mod runtime;
/// Task model and lifecycle state machine
pub mod task;
/// Scriptable agent for tests
pub mod testing;

// Re-export common types
pub use agent::{Agent, AgentStatus, TaskContext, TaskOutput};
pub use config::AgentConfig;
pub use error::{AgentError, Result};
pub use manager::AgentManager;
pub use metrics::{AgentMetrics, AgentSnapshot, SystemMetrics};
pub use runtime::ManagedAgent;
pub use task::{AgentTask, TaskPriority, TaskStatus};
