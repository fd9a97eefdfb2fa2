//! Collaborator interfaces consumed by the engine.
//!
//! The engine never executes tools, talks to agents, or audits steps itself:
//! those live behind these traits and are injected at construction, so tests
//! can substitute fakes and production can wire in real adapters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Executes named tools on behalf of `tool` steps.
///
/// The result is opaque to the engine: whatever JSON the tool returns is
/// stored verbatim as the step's result.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute a named tool with the given (already interpolated) parameters.
    async fn execute_tool(&self, name: &str, params: serde_json::Value) -> Result<serde_json::Value>;
}

/// A task handed off to the agent collaborator.
///
/// Completion is signaled separately, via a
/// [`TaskCompleted`](crate::bus::EngineEvent::TaskCompleted) event carrying
/// this task's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegatedTask {
    /// Unique task identifier, matched against completion events.
    pub id: Uuid,
    /// Human-readable title.
    pub title: String,
}

/// Creates delegated tasks on behalf of `agent` steps.
#[async_trait]
pub trait AgentDelegate: Send + Sync {
    /// Create a task for the agent to work on.
    async fn create_task(
        &self,
        title: &str,
        description: &str,
        required_skills: &[String],
        priority: u8,
    ) -> Result<DelegatedTask>;
}

/// The verdict of a pre-run security audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    /// Whether the workflow is safe to run.
    pub safe: bool,
    /// Issues found.  Populated when `safe` is false; may carry warnings
    /// otherwise.
    pub issues: Vec<String>,
}

/// Audits a workflow's serialized steps before any run starts.
#[async_trait]
pub trait SecurityAuditor: Send + Sync {
    /// Audit the serialized steps in the context of the named workflow.
    async fn audit(&self, steps: &serde_json::Value, context: &str) -> Result<AuditReport>;
}
