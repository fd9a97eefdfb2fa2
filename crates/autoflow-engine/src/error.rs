//! Engine error types.
//!
//! All workflow subsystems surface errors through [`EngineError`].  Step
//! failures are not exceptions: the interpreter records them per-step and
//! routes execution through the step's failure edge when one exists, so most
//! variants here only surface when no failure edge absorbs them.

use uuid::Uuid;

/// Unified error type for the workflow engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // -- Pre-run errors ------------------------------------------------------
    /// The security audit refused to let the run start.
    #[error("security audit rejected workflow: {}", issues.join("; "))]
    AuditRejected { issues: Vec<String> },

    /// The referenced workflow does not exist.
    #[error("workflow not found: {workflow_id}")]
    WorkflowNotFound { workflow_id: Uuid },

    /// The referenced run does not exist or is no longer active.
    #[error("run not found: {run_id}")]
    RunNotFound { run_id: Uuid },

    /// The workflow definition is not executable.
    #[error("invalid workflow: {reason}")]
    InvalidWorkflow { reason: String },

    /// A schedule trigger carries an invalid cron expression.
    #[error("invalid cron expression `{expression}`: {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    // -- Step errors ---------------------------------------------------------
    /// A step's config is missing or has a malformed required key.
    #[error("invalid config for step `{step_id}`: {reason}")]
    InvalidStepConfig { step_id: String, reason: String },

    /// A step exceeded its timeout.  The message is load-bearing: per-step
    /// results record it verbatim.
    #[error("Step timeout")]
    StepTimeout,

    /// The tool collaborator rejected a delegated call.
    #[error("tool `{tool}` failed: {reason}")]
    ToolFailed { tool: String, reason: String },

    /// The agent collaborator reported a failed task.
    #[error("agent task failed: {reason}")]
    AgentFailed { reason: String },

    /// No completion event arrived for a delegated agent task in time.
    #[error("agent task timed out after {timeout_ms}ms")]
    AgentTimeout { timeout_ms: u64 },

    // -- Upstream crate errors -----------------------------------------------
    /// An error propagated from the persistence layer.
    #[error("store error: {0}")]
    Store(#[from] autoflow_store::StoreError),

    /// An error propagated from the intent engine.
    #[error("intent error: {0}")]
    Intent(#[from] autoflow_intent::IntentError),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // -- Generic -------------------------------------------------------------
    /// Catch-all for unexpected internal errors.
    #[error("internal engine error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;
