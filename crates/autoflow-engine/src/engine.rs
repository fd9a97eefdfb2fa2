//! Engine facade.
//!
//! [`Engine`] owns the workflow store, the intent engine, the interpreter,
//! and the event bus, and exposes the public surface: workflow CRUD, run
//! management, event firing, and intent operations.  It also runs the two
//! background tickers — the scheduler pass over schedule triggers and the
//! proactive pass over high-confidence intents.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use autoflow_intent::{IntentEngine, IntentMatch, MemoryRecall, UserIntent};
use autoflow_store::JsonStore;

use crate::bus::{EngineEvent, EventBus};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::interpreter::StepInterpreter;
use crate::model::{RunStatus, Trigger, Workflow, WorkflowRun};
use crate::scheduler;
use crate::store::WorkflowStore;
use crate::traits::{AgentDelegate, SecurityAuditor, ToolExecutor};

/// The workflow engine facade.
///
/// Construct with [`Engine::new`], then call [`Engine::initialize`] to load
/// persisted state and start the background tickers.
pub struct Engine {
    config: EngineConfig,
    workflows: WorkflowStore,
    intents: IntentEngine,
    interpreter: StepInterpreter,
    auditor: Arc<dyn SecurityAuditor>,
    memory: Option<Arc<dyn MemoryRecall>>,
    bus: EventBus,
    /// Cancel flags for in-flight runs, keyed by run id.
    active: Mutex<HashMap<Uuid, Arc<AtomicBool>>>,
    running: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Create an engine from config and injected collaborators.  No state is
    /// loaded and no tickers run until [`Engine::initialize`].
    pub fn new(
        config: EngineConfig,
        tools: Arc<dyn ToolExecutor>,
        agent: Arc<dyn AgentDelegate>,
        auditor: Arc<dyn SecurityAuditor>,
    ) -> Self {
        let bus = EventBus::new(config.event_capacity);
        let workflows = WorkflowStore::new(JsonStore::new(config.workflows_path()));
        let intents = IntentEngine::new(JsonStore::new(config.intents_path()));
        let interpreter = StepInterpreter::new(
            tools,
            agent,
            bus.clone(),
            config.default_step_timeout_ms,
            config.default_agent_timeout_ms,
        );
        Self {
            config,
            workflows,
            intents,
            interpreter,
            auditor,
            memory: None,
            bus,
            active: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Builder: attach a memory collaborator for pattern analysis.
    pub fn with_memory(mut self, memory: Arc<dyn MemoryRecall>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Handle to the engine's event bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Whether the background tickers are running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // -- Lifecycle -----------------------------------------------------------

    /// Load persisted workflows and intents, run one immediate scheduler
    /// pass, and start the scheduler and proactive tickers.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("engine already initialized");
            return Ok(());
        }

        self.workflows.load().await?;
        self.intents.load().await?;
        info!(
            workflows = self.workflows.count().await,
            data_dir = %self.config.data_dir().display(),
            "engine initialized"
        );

        // Anything already due should not wait a full tick.
        self.scheduler_pass(Utc::now()).await;

        let scheduler_handle = {
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                let mut tick =
                    tokio::time::interval(Duration::from_millis(engine.config.scheduler_tick_ms));
                tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
                tick.tick().await;
                while engine.running.load(Ordering::SeqCst) {
                    tick.tick().await;
                    engine.scheduler_pass(Utc::now()).await;
                }
            })
        };

        let proactive_handle = {
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                let mut tick =
                    tokio::time::interval(Duration::from_millis(engine.config.proactive_tick_ms));
                tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
                tick.tick().await;
                while engine.running.load(Ordering::SeqCst) {
                    tick.tick().await;
                    engine.proactive_pass(Utc::now()).await;
                }
            })
        };

        let mut tasks = self.tasks.lock().await;
        tasks.push(scheduler_handle);
        tasks.push(proactive_handle);
        Ok(())
    }

    /// Stop the tickers.  In-flight runs are not interrupted; cancel them
    /// individually via [`Engine::cancel_run`] if needed.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for handle in self.tasks.lock().await.drain(..) {
            handle.abort();
        }
        info!("engine shut down");
    }

    /// One scheduler pass: dispatch every schedule-triggered workflow due at
    /// `now` as an independent task.  Per-workflow failures are logged, never
    /// propagated.
    async fn scheduler_pass(self: &Arc<Self>, now: DateTime<Utc>) {
        let due = scheduler::due_workflows(&self.workflows.list().await, now);
        for workflow_id in due {
            info!(workflow_id = %workflow_id, "schedule trigger due");
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = engine.run_workflow(workflow_id, HashMap::new()).await {
                    warn!(workflow_id = %workflow_id, error = %e, "scheduled run failed");
                }
            });
        }
    }

    /// One proactive pass: fire the bound workflow of every intent whose
    /// confidence and cooldown permit it at `now`.
    async fn proactive_pass(self: &Arc<Self>, now: DateTime<Utc>) {
        for intent in self.intents.proactive_due(now).await {
            let Some(workflow_id) = intent.workflow_id else {
                continue;
            };
            if let Err(e) = self.intents.mark_triggered(intent.id, now).await {
                warn!(intent_id = %intent.id, error = %e, "failed to mark intent triggered");
                continue;
            }
            info!(
                intent_id = %intent.id,
                workflow_id = %workflow_id,
                confidence = intent.confidence,
                "proactive intent firing"
            );
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = engine.run_workflow(workflow_id, HashMap::new()).await {
                    warn!(workflow_id = %workflow_id, error = %e, "proactive run failed");
                }
            });
        }
    }

    // -- Workflow CRUD -------------------------------------------------------

    /// Create a workflow.
    pub async fn create_workflow(&self, workflow: Workflow) -> Result<Workflow> {
        self.workflows.create(workflow).await
    }

    /// Replace a workflow definition.  A changed schedule takes effect on
    /// the next tick.
    pub async fn update_workflow(&self, workflow: Workflow) -> Result<()> {
        self.workflows.update(workflow).await
    }

    /// Delete a workflow.
    pub async fn delete_workflow(&self, workflow_id: Uuid) -> Result<()> {
        self.workflows.delete(workflow_id).await
    }

    /// Enable or disable a workflow's scheduling eligibility.
    pub async fn set_enabled(&self, workflow_id: Uuid, enabled: bool) -> Result<()> {
        self.workflows.set_enabled(workflow_id, enabled).await
    }

    /// Fetch a workflow by id.
    pub async fn get_workflow(&self, workflow_id: Uuid) -> Option<Workflow> {
        self.workflows.get(workflow_id).await
    }

    /// Fetch a workflow by name.
    pub async fn get_workflow_by_name(&self, name: &str) -> Option<Workflow> {
        self.workflows.get_by_name(name).await
    }

    /// All workflows, most recently created first.
    pub async fn list_workflows(&self) -> Vec<Workflow> {
        self.workflows.list().await
    }

    // -- Runs ----------------------------------------------------------------

    /// Execute one run of a workflow to completion and return the final run
    /// record.
    ///
    /// The security auditor sees the serialized steps first; an unsafe
    /// verdict means no run record is ever created.
    pub async fn run_workflow(
        &self,
        workflow_id: Uuid,
        input: HashMap<String, Value>,
    ) -> Result<WorkflowRun> {
        let workflow = self
            .workflows
            .get(workflow_id)
            .await
            .ok_or(EngineError::WorkflowNotFound { workflow_id })?;

        let steps = serde_json::to_value(&workflow.steps)?;
        let report = self.auditor.audit(&steps, &workflow.name).await?;
        if !report.safe {
            warn!(
                workflow_id = %workflow_id,
                issues = ?report.issues,
                "security audit rejected workflow"
            );
            return Err(EngineError::AuditRejected {
                issues: report.issues,
            });
        }

        let mut run = WorkflowRun::new(workflow.id);
        let cancel = Arc::new(AtomicBool::new(false));
        self.active.lock().await.insert(run.id, Arc::clone(&cancel));
        self.workflows.put_run(run.clone()).await;
        info!(workflow_id = %workflow_id, run_id = %run.id, "run started");

        self.interpreter
            .execute(&workflow, &mut run, input, &cancel)
            .await;

        self.active.lock().await.remove(&run.id);
        self.workflows.put_run(run.clone()).await;
        self.workflows
            .record_run_outcome(
                workflow.id,
                run.status == RunStatus::Completed,
                run.started_at,
            )
            .await?;
        self.bus
            .publish(EngineEvent::WorkflowCompleted { run: run.clone() });

        Ok(run)
    }

    /// Request cancellation of an in-flight run.  Takes effect at the next
    /// step boundary; the current step runs to completion (or timeout).
    pub async fn cancel_run(&self, run_id: Uuid) -> Result<()> {
        let active = self.active.lock().await;
        let cancel = active
            .get(&run_id)
            .ok_or(EngineError::RunNotFound { run_id })?;
        cancel.store(true, Ordering::SeqCst);
        info!(run_id = %run_id, "run cancellation requested");
        Ok(())
    }

    /// Fetch a run record by id.
    pub async fn get_run(&self, run_id: Uuid) -> Option<WorkflowRun> {
        self.workflows.get_run(run_id).await
    }

    /// Run records, optionally filtered by workflow, most recent first.
    pub async fn list_runs(&self, workflow_id: Option<Uuid>) -> Vec<WorkflowRun> {
        self.workflows.list_runs(workflow_id).await
    }

    /// Fire a named event: dispatch every enabled workflow listening for it
    /// as an independent run, returning the ids of the workflows dispatched.
    pub async fn fire_event(self: &Arc<Self>, event_name: &str) -> Vec<Uuid> {
        let mut dispatched = Vec::new();
        for workflow in self.workflows.list().await {
            let listening = matches!(
                &workflow.trigger,
                Trigger::Event { event_name: name } if name == event_name
            );
            if !listening || !workflow.enabled {
                continue;
            }
            info!(workflow_id = %workflow.id, event_name, "event trigger fired");
            dispatched.push(workflow.id);
            let engine = Arc::clone(self);
            let workflow_id = workflow.id;
            tokio::spawn(async move {
                if let Err(e) = engine.run_workflow(workflow_id, HashMap::new()).await {
                    warn!(workflow_id = %workflow_id, error = %e, "event-triggered run failed");
                }
            });
        }
        dispatched
    }

    // -- Intents -------------------------------------------------------------

    /// Learn (or reinforce) an intent from an utterance.
    pub async fn learn_intent(
        &self,
        utterance: &str,
        action: &str,
        workflow_id: Option<Uuid>,
    ) -> Result<UserIntent> {
        Ok(self.intents.learn(utterance, action, workflow_id).await?)
    }

    /// Match an utterance against learned intents.
    pub async fn match_intent(&self, utterance: &str) -> Option<IntentMatch> {
        self.intents.find_match(utterance).await
    }

    /// All learned intents in insertion order.
    pub async fn list_intents(&self) -> Vec<UserIntent> {
        self.intents.list().await
    }

    /// Surface candidate automation patterns from the memory collaborator.
    /// Returns no candidates when no memory collaborator is attached.
    pub async fn analyze_patterns(&self, limit: usize) -> Result<Vec<String>> {
        match &self.memory {
            Some(memory) => Ok(self.intents.analyze_patterns(memory.as_ref(), limit).await?),
            None => {
                debug!("no memory collaborator attached, skipping pattern analysis");
                Ok(Vec::new())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
