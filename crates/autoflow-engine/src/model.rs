//! Workflow data model.
//!
//! A workflow is a graph of typed steps linked by success/failure edges, not
//! an ordered list: the first declared step is the entry point and everything
//! after that is reached through edges.  A run is one execution instance of a
//! workflow with its own variable scope and result trail.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// The kind of work a step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Delegate to the tool collaborator.
    Tool,
    /// Delegate a sub-task to the agent collaborator and await completion.
    Agent,
    /// Evaluate a restricted boolean condition against the variable scope.
    Condition,
    /// Execute a nested body step once per element of a sequence variable.
    Loop,
    /// Execute nested steps concurrently and collect all results.
    Parallel,
    /// Suspend for a fixed duration.
    Wait,
    /// Request a value from an external input producer.
    Input,
    /// Interpolate a template against the variable scope.
    Output,
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Tool => "tool",
            Self::Agent => "agent",
            Self::Condition => "condition",
            Self::Loop => "loop",
            Self::Parallel => "parallel",
            Self::Wait => "wait",
            Self::Input => "input",
            Self::Output => "output",
        };
        write!(f, "{s}")
    }
}

/// A single step within a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Identifier, unique within the owning workflow.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// What kind of work this step performs.
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Type-dependent configuration (a JSON object).
    #[serde(default)]
    pub config: serde_json::Value,
    /// Step to enter when this one succeeds.  `None` ends the run
    /// successfully.
    #[serde(default)]
    pub next_on_success: Option<String>,
    /// Step to enter when this one fails.  `None` fails the whole run.
    #[serde(default)]
    pub next_on_failure: Option<String>,
    /// Per-step timeout in milliseconds.  Defaults to the engine-wide step
    /// timeout (agent steps default to the longer agent timeout).
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl WorkflowStep {
    /// Create a step with the given id, name, and type.
    pub fn new(id: impl Into<String>, name: impl Into<String>, step_type: StepType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            step_type,
            config: serde_json::Value::Object(serde_json::Map::new()),
            next_on_success: None,
            next_on_failure: None,
            timeout_ms: None,
        }
    }

    /// Builder: set the type-dependent configuration.
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Builder: set the success edge.
    pub fn on_success(mut self, step_id: impl Into<String>) -> Self {
        self.next_on_success = Some(step_id.into());
        self
    }

    /// Builder: set the failure edge.
    pub fn on_failure(mut self, step_id: impl Into<String>) -> Self {
        self.next_on_failure = Some(step_id.into());
        self
    }

    /// Builder: override the step timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

/// How a workflow is started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Trigger {
    /// Started only by explicit invocation.
    Manual,

    /// Started by the scheduler, via a cron expression or a fixed interval.
    ///
    /// Cron expressions use the standard 5-field format (a 6/7-field form
    /// with seconds is also accepted).  When both `cron` and `interval_ms`
    /// are present, `cron` wins.
    Schedule {
        /// Cron expression, if schedule is cron-based.
        #[serde(default)]
        cron: Option<String>,
        /// Fixed interval in milliseconds since the last run.
        #[serde(default)]
        interval_ms: Option<u64>,
    },

    /// Started when a named engine event is fired.
    Event {
        /// The event name to listen for.
        event_name: String,
    },

    /// Started proactively when a bound intent's confidence and cooldown
    /// permit it.
    Intent,
}

impl Default for Trigger {
    fn default() -> Self {
        Self::Manual
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Schedule { cron, interval_ms } => match (cron, interval_ms) {
                (Some(expr), _) => write!(f, "schedule(cron {expr})"),
                (None, Some(ms)) => write!(f, "schedule(every {ms}ms)"),
                (None, None) => write!(f, "schedule(unconfigured)"),
            },
            Self::Event { event_name } => write!(f, "event({event_name})"),
            Self::Intent => write!(f, "intent"),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

/// A complete workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier.
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// How this workflow is triggered.
    pub trigger: Trigger,
    /// The step graph.  The first element is the entry step; order beyond
    /// that is carried by edges, not position.
    pub steps: Vec<WorkflowStep>,
    /// Initial variable scope for every run.
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    /// Whether this workflow is eligible for scheduling.
    pub enabled: bool,
    /// When the workflow was created.
    pub created_at: DateTime<Utc>,
    /// When the workflow last started a run.
    pub last_run_at: Option<DateTime<Utc>>,
    /// Total runs started.
    pub run_count: u64,
    /// Runs that completed successfully.
    pub success_count: u64,
}

impl Workflow {
    /// Create a new manual workflow with the given name and steps.
    pub fn new(name: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: None,
            trigger: Trigger::Manual,
            steps,
            variables: HashMap::new(),
            enabled: true,
            created_at: Utc::now(),
            last_run_at: None,
            run_count: 0,
            success_count: 0,
        }
    }

    /// Builder: set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builder: set the trigger.
    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Builder: set the initial variable scope.
    pub fn with_variables(mut self, variables: HashMap<String, serde_json::Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Look up a step by id.  A `None` here is a dangling edge, which the
    /// interpreter treats as graph end rather than an error.
    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// The entry step, if any steps are declared.
    pub fn entry_step(&self) -> Option<&WorkflowStep> {
        self.steps.first()
    }
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// The execution status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run is executing.
    Running,
    /// Every visited step succeeded and the graph ended.
    Completed,
    /// A step failed with no failure edge to absorb it.
    Failed,
    /// The run was cancelled between steps.
    Cancelled,
}

impl RunStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One execution instance of a workflow.
///
/// Runs live in process memory only; the owning workflow's counters are the
/// durable trace of past executions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Unique run identifier (distinct from the workflow id).
    pub id: Uuid,
    /// The workflow this run executes.
    pub workflow_id: Uuid,
    /// Current status.
    pub status: RunStatus,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// The last step entered.
    pub current_step: Option<String>,
    /// Per-step results keyed by step id, in visitation order.  A failed
    /// step records `{"error": message}`.  Entries are never overwritten.
    pub results: serde_json::Map<String, serde_json::Value>,
    /// The error that failed the run, if any.
    pub error: Option<String>,
}

impl WorkflowRun {
    /// Create a fresh running record for the given workflow.
    pub fn new(workflow_id: Uuid) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_id,
            status: RunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            current_step: None,
            results: serde_json::Map::new(),
            error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_builder_sets_edges_and_timeout() {
        let step = WorkflowStep::new("fetch", "Fetch page", StepType::Tool)
            .with_config(json!({"tool": "web_fetch", "params": {"url": "{{url}}"}}))
            .on_success("notify")
            .on_failure("alert")
            .with_timeout_ms(5_000);

        assert_eq!(step.next_on_success.as_deref(), Some("notify"));
        assert_eq!(step.next_on_failure.as_deref(), Some("alert"));
        assert_eq!(step.timeout_ms, Some(5_000));
    }

    #[test]
    fn workflow_entry_is_first_declared_step() {
        let wf = Workflow::new(
            "two-step",
            vec![
                WorkflowStep::new("a", "A", StepType::Wait),
                WorkflowStep::new("b", "B", StepType::Wait),
            ],
        );
        assert_eq!(wf.entry_step().unwrap().id, "a");
        assert!(wf.step("b").is_some());
        assert!(wf.step("missing").is_none());
    }

    #[test]
    fn trigger_serde_is_tagged() {
        let trigger = Trigger::Schedule {
            cron: None,
            interval_ms: Some(1_000),
        };
        let json = serde_json::to_value(&trigger).unwrap();
        assert_eq!(json["type"], "schedule");
        assert_eq!(json["interval_ms"], 1_000);

        let back: Trigger = serde_json::from_value(json).unwrap();
        assert_eq!(back, trigger);
    }

    #[test]
    fn step_type_serde_is_snake_case() {
        let json = serde_json::to_value(StepType::Parallel).unwrap();
        assert_eq!(json, "parallel");
    }

    #[test]
    fn run_starts_running_with_empty_results() {
        let run = WorkflowRun::new(Uuid::now_v7());
        assert_eq!(run.status, RunStatus::Running);
        assert!(!run.status.is_terminal());
        assert!(run.results.is_empty());
        assert!(run.completed_at.is_none());
    }
}
