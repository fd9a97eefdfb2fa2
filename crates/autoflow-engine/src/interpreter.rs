//! Step interpreter — executes one run of one workflow.
//!
//! The interpreter walks the step graph from the workflow's entry step,
//! consulting each step's success/failure edges.  Step failures are routed,
//! not thrown: a failing step with a `next_on_failure` edge continues the
//! run there, and only an unrecovered failure marks the run failed.  Every
//! step (nested ones included) races its own timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::bus::{EngineEvent, EventBus};
use crate::error::{EngineError, Result};
use crate::expr::{ConditionOutcome, evaluate_condition, interpolate, interpolate_value};
use crate::model::{RunStatus, StepType, Workflow, WorkflowRun, WorkflowStep};
use crate::traits::{AgentDelegate, ToolExecutor};

/// Priority handed to the agent collaborator when a step does not set one.
const DEFAULT_TASK_PRIORITY: u8 = 128;

/// Executes workflow runs against injected collaborators.
pub struct StepInterpreter {
    tools: Arc<dyn ToolExecutor>,
    agent: Arc<dyn AgentDelegate>,
    bus: EventBus,
    default_step_timeout_ms: u64,
    default_agent_timeout_ms: u64,
}

impl StepInterpreter {
    /// Create an interpreter with the given collaborators and default
    /// timeouts.
    pub fn new(
        tools: Arc<dyn ToolExecutor>,
        agent: Arc<dyn AgentDelegate>,
        bus: EventBus,
        default_step_timeout_ms: u64,
        default_agent_timeout_ms: u64,
    ) -> Self {
        Self {
            tools,
            agent,
            bus,
            default_step_timeout_ms,
            default_agent_timeout_ms,
        }
    }

    /// Execute one run of `workflow`, mutating `run` in place.
    ///
    /// `input` is merged over the workflow's declared variables.  `cancel`
    /// is checked between steps only — an in-flight step is bounded by its
    /// timeout, not interrupted.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        run: &mut WorkflowRun,
        input: HashMap<String, Value>,
        cancel: &AtomicBool,
    ) {
        let mut variables = workflow.variables.clone();
        variables.extend(input);

        let mut current = workflow.entry_step().map(|s| s.id.clone());

        while let Some(step_id) = current.take() {
            if cancel.load(Ordering::SeqCst) {
                info!(run_id = %run.id, "run cancelled between steps");
                run.status = RunStatus::Cancelled;
                break;
            }

            // A dangling edge is graph end, not an error.
            let Some(step) = workflow.step(&step_id) else {
                debug!(
                    run_id = %run.id,
                    step_id = %step_id,
                    "edge points at a missing step, ending run"
                );
                break;
            };

            run.current_step = Some(step.id.clone());
            debug!(
                run_id = %run.id,
                step_id = %step.id,
                step_type = %step.step_type,
                "executing step"
            );

            match self.run_with_timeout(workflow, step, &variables).await {
                Ok(value) => {
                    variables.insert(format!("step_{}", step.id), value.clone());
                    run.results.entry(step.id.clone()).or_insert(value);
                    current = step.next_on_success.clone();
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!(
                        run_id = %run.id,
                        step_id = %step.id,
                        error = %message,
                        "step failed"
                    );
                    run.results
                        .entry(step.id.clone())
                        .or_insert(json!({ "error": message }));
                    match &step.next_on_failure {
                        Some(next) => current = Some(next.clone()),
                        None => {
                            run.status = RunStatus::Failed;
                            run.error = Some(message);
                            break;
                        }
                    }
                }
            }
        }

        if run.status == RunStatus::Running {
            run.status = RunStatus::Completed;
        }
        run.completed_at = Some(Utc::now());
        info!(
            run_id = %run.id,
            status = ?run.status,
            steps = run.results.len(),
            "run finished"
        );
    }

    /// Race a step (nested ones included) against its timeout.
    async fn run_with_timeout(
        &self,
        workflow: &Workflow,
        step: &WorkflowStep,
        variables: &HashMap<String, Value>,
    ) -> Result<Value> {
        let timeout_ms = self.step_timeout_ms(step);
        match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.execute_step(workflow, step, variables),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(EngineError::StepTimeout),
        }
    }

    /// The timeout for a step: its own override, or the agent default for
    /// agent steps (their work is legitimately long), or the generic step
    /// default.
    fn step_timeout_ms(&self, step: &WorkflowStep) -> u64 {
        step.timeout_ms.unwrap_or(match step.step_type {
            StepType::Agent => self.default_agent_timeout_ms,
            _ => self.default_step_timeout_ms,
        })
    }

    /// Dispatch one step by type.  Boxed because loop and parallel steps
    /// recurse into nested steps.
    fn execute_step<'a>(
        &'a self,
        workflow: &'a Workflow,
        step: &'a WorkflowStep,
        variables: &'a HashMap<String, Value>,
    ) -> BoxFuture<'a, Result<Value>> {
        async move {
            match step.step_type {
                StepType::Tool => self.run_tool(step, variables).await,
                StepType::Agent => self.run_agent(step, variables).await,
                StepType::Condition => self.run_condition(step, variables),
                StepType::Loop => self.run_loop(workflow, step, variables).await,
                StepType::Parallel => self.run_parallel(workflow, step, variables).await,
                StepType::Wait => self.run_wait(step).await,
                StepType::Input => self.run_input(workflow, step, variables),
                StepType::Output => self.run_output(step, variables),
            }
        }
        .boxed()
    }

    /// `tool`: interpolate params, delegate, return the result verbatim.
    async fn run_tool(
        &self,
        step: &WorkflowStep,
        variables: &HashMap<String, Value>,
    ) -> Result<Value> {
        let tool = require_str(step, "tool")?;
        let params = step.config.get("params").cloned().unwrap_or_else(|| json!({}));
        let params = interpolate_value(&params, variables);
        self.tools.execute_tool(tool, params).await
    }

    /// `agent`: create a delegated task, then suspend until a matching
    /// completion event arrives or the agent timeout elapses.
    async fn run_agent(
        &self,
        step: &WorkflowStep,
        variables: &HashMap<String, Value>,
    ) -> Result<Value> {
        let prompt = interpolate(require_str(step, "prompt")?, variables);
        let skills: Vec<String> = step
            .config
            .get("skills")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let priority = step
            .config
            .get("priority")
            .and_then(Value::as_u64)
            .unwrap_or(u64::from(DEFAULT_TASK_PRIORITY)) as u8;
        let timeout_ms = step
            .config
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(self.default_agent_timeout_ms);

        // Subscribe before creating the task so a fast completion cannot
        // slip past us.
        let mut rx = self.bus.subscribe();
        let task = self
            .agent
            .create_task(&step.name, &prompt, &skills, priority)
            .await?;
        debug!(step_id = %step.id, task_id = %task.id, "agent task created, awaiting completion");

        let deadline = tokio::time::sleep(Duration::from_millis(timeout_ms));
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => return Err(EngineError::AgentTimeout { timeout_ms }),
                event = rx.recv() => match event {
                    Ok(event) => {
                        if let EngineEvent::TaskCompleted { task_id, success, output } = &*event
                            && *task_id == task.id
                        {
                            if *success {
                                return Ok(output.clone());
                            }
                            let reason = output
                                .as_str()
                                .unwrap_or("agent reported failure")
                                .to_string();
                            return Err(EngineError::AgentFailed { reason });
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            step_id = %step.id,
                            skipped,
                            "event bus lagged while awaiting agent task"
                        );
                    }
                    Err(RecvError::Closed) => {
                        return Err(EngineError::Internal("event bus closed".into()));
                    }
                },
            }
        }
    }

    /// `condition`: interpolate, evaluate, return the boolean.  Denied
    /// inputs (rejected or unparseable) are logged so they stay
    /// distinguishable from a legitimate `false`.
    fn run_condition(
        &self,
        step: &WorkflowStep,
        variables: &HashMap<String, Value>,
    ) -> Result<Value> {
        let expr = interpolate(require_str(step, "condition")?, variables);
        let outcome = evaluate_condition(&expr, variables);
        if matches!(
            outcome,
            ConditionOutcome::Rejected | ConditionOutcome::Unparseable
        ) {
            warn!(
                step_id = %step.id,
                condition = %expr,
                ?outcome,
                "condition denied without evaluating"
            );
        }
        Ok(Value::Bool(outcome.as_bool()))
    }

    /// `loop`: execute the body once per element of the named sequence,
    /// with `item` bound in a copy of the scope.  Iterations are strictly
    /// sequential.
    async fn run_loop(
        &self,
        workflow: &Workflow,
        step: &WorkflowStep,
        variables: &HashMap<String, Value>,
    ) -> Result<Value> {
        let items_var = require_str(step, "items")?;
        let body = nested_step(step, step.config.get("body"), "body")?;

        let Some(items) = variables.get(items_var).and_then(Value::as_array).cloned() else {
            return Err(EngineError::InvalidStepConfig {
                step_id: step.id.clone(),
                reason: format!("variable `{items_var}` is not a sequence"),
            });
        };

        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let mut scope = variables.clone();
            scope.insert("item".into(), item);
            let value = self.run_with_timeout(workflow, &body, &scope).await?;
            results.push(value);
        }
        Ok(Value::Array(results))
    }

    /// `parallel`: fan out every nested step against the same scope, fan in
    /// once all complete.  The first failure aborts the aggregate.
    async fn run_parallel(
        &self,
        workflow: &Workflow,
        step: &WorkflowStep,
        variables: &HashMap<String, Value>,
    ) -> Result<Value> {
        let configs = step
            .config
            .get("steps")
            .and_then(Value::as_array)
            .ok_or_else(|| EngineError::InvalidStepConfig {
                step_id: step.id.clone(),
                reason: "missing `steps`".into(),
            })?;

        let mut nested = Vec::with_capacity(configs.len());
        for config in configs {
            nested.push(nested_step(step, Some(config), "steps")?);
        }

        let results = try_join_all(
            nested
                .iter()
                .map(|s| self.run_with_timeout(workflow, s, variables)),
        )
        .await?;
        Ok(Value::Array(results))
    }

    /// `wait`: suspend for the configured duration, nothing else.
    async fn run_wait(&self, step: &WorkflowStep) -> Result<Value> {
        let duration_ms = step
            .config
            .get("duration")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        Ok(json!({ "waited_ms": duration_ms }))
    }

    /// `input`: announce that a value is needed, then return whatever the
    /// external producer has placed under `input_<step id>`.
    fn run_input(
        &self,
        workflow: &Workflow,
        step: &WorkflowStep,
        variables: &HashMap<String, Value>,
    ) -> Result<Value> {
        let prompt = interpolate(
            step.config
                .get("prompt")
                .and_then(Value::as_str)
                .unwrap_or_default(),
            variables,
        );
        self.bus.publish(EngineEvent::InputRequired {
            workflow_id: workflow.id,
            step_id: step.id.clone(),
            prompt,
        });
        Ok(variables
            .get(&format!("input_{}", step.id))
            .cloned()
            .unwrap_or_else(|| Value::String(String::new())))
    }

    /// `output`: interpolate the template against the scope.
    fn run_output(
        &self,
        step: &WorkflowStep,
        variables: &HashMap<String, Value>,
    ) -> Result<Value> {
        let template = require_str(step, "template")?;
        Ok(Value::String(interpolate(template, variables)))
    }
}

/// Fetch a required string config key.
fn require_str<'a>(step: &'a WorkflowStep, key: &str) -> Result<&'a str> {
    step.config
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::InvalidStepConfig {
            step_id: step.id.clone(),
            reason: format!("missing `{key}`"),
        })
}

/// Deserialize a nested step definition from a parent step's config.
fn nested_step(parent: &WorkflowStep, value: Option<&Value>, key: &str) -> Result<WorkflowStep> {
    let value = value.ok_or_else(|| EngineError::InvalidStepConfig {
        step_id: parent.id.clone(),
        reason: format!("missing `{key}`"),
    })?;
    serde_json::from_value(value.clone()).map_err(|e| EngineError::InvalidStepConfig {
        step_id: parent.id.clone(),
        reason: format!("malformed `{key}`: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
