//! Workflow and run storage.
//!
//! Workflow definitions live in an in-memory map backed by `workflows.json`;
//! every mutation rewrites the file in full.  Run records live in memory
//! only — the owning workflow's counters are the durable trace of past
//! executions.  Callers are expected to serialize mutations through the
//! engine facade.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use autoflow_store::JsonStore;

use crate::error::{EngineError, Result};
use crate::model::{Trigger, Workflow, WorkflowRun};
use crate::scheduler::parse_schedule;

/// CRUD operations on workflow definitions and run records.
pub struct WorkflowStore {
    workflows: RwLock<HashMap<Uuid, Workflow>>,
    runs: RwLock<HashMap<Uuid, WorkflowRun>>,
    store: JsonStore,
}

impl WorkflowStore {
    /// Create a store backed by the given `workflows.json` store.  Call
    /// [`Self::load`] before use to pick up persisted definitions.
    pub fn new(store: JsonStore) -> Self {
        Self {
            workflows: RwLock::new(HashMap::new()),
            runs: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Load persisted workflows from disk, replacing the in-memory map.
    pub async fn load(&self) -> Result<()> {
        let loaded: Vec<Workflow> = self.store.load().await?;
        info!(workflows = loaded.len(), "workflows loaded");
        *self.workflows.write().await = loaded.into_iter().map(|w| (w.id, w)).collect();
        Ok(())
    }

    /// Create a new workflow.
    ///
    /// Rejects definitions with no steps and schedule triggers with invalid
    /// cron expressions — both would otherwise surface much later, at run or
    /// tick time.
    pub async fn create(&self, workflow: Workflow) -> Result<Workflow> {
        validate(&workflow)?;

        info!(workflow_id = %workflow.id, name = %workflow.name, "workflow created");
        let mut workflows = self.workflows.write().await;
        workflows.insert(workflow.id, workflow.clone());
        self.persist(&workflows).await?;
        Ok(workflow)
    }

    /// Replace an existing workflow definition.
    ///
    /// The caller passes the full updated record; counters travel with it.
    /// A changed schedule takes effect on the next tick because the
    /// scheduler reads the live map.
    pub async fn update(&self, workflow: Workflow) -> Result<()> {
        validate(&workflow)?;

        let mut workflows = self.workflows.write().await;
        if !workflows.contains_key(&workflow.id) {
            return Err(EngineError::WorkflowNotFound {
                workflow_id: workflow.id,
            });
        }
        debug!(workflow_id = %workflow.id, "workflow updated");
        workflows.insert(workflow.id, workflow);
        self.persist(&workflows).await
    }

    /// Delete a workflow.  Already-started runs are unaffected.
    pub async fn delete(&self, workflow_id: Uuid) -> Result<()> {
        let mut workflows = self.workflows.write().await;
        if workflows.remove(&workflow_id).is_none() {
            return Err(EngineError::WorkflowNotFound { workflow_id });
        }
        info!(workflow_id = %workflow_id, "workflow deleted");
        self.persist(&workflows).await
    }

    /// Fetch a workflow by id.
    pub async fn get(&self, workflow_id: Uuid) -> Option<Workflow> {
        self.workflows.read().await.get(&workflow_id).cloned()
    }

    /// Fetch a workflow by name.
    pub async fn get_by_name(&self, name: &str) -> Option<Workflow> {
        self.workflows
            .read()
            .await
            .values()
            .find(|w| w.name == name)
            .cloned()
    }

    /// Snapshot of all workflows, most recently created first.
    pub async fn list(&self) -> Vec<Workflow> {
        let mut workflows: Vec<Workflow> = self.workflows.read().await.values().cloned().collect();
        workflows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        workflows
    }

    /// Toggle a workflow's scheduling eligibility.
    pub async fn set_enabled(&self, workflow_id: Uuid, enabled: bool) -> Result<()> {
        let mut workflows = self.workflows.write().await;
        let workflow = workflows
            .get_mut(&workflow_id)
            .ok_or(EngineError::WorkflowNotFound { workflow_id })?;
        workflow.enabled = enabled;
        debug!(workflow_id = %workflow_id, enabled, "workflow toggled");
        self.persist(&workflows).await
    }

    /// Number of stored workflows.
    pub async fn count(&self) -> usize {
        self.workflows.read().await.len()
    }

    /// Record the outcome of a finished run on the owning workflow's
    /// counters and persist the collection.
    pub async fn record_run_outcome(
        &self,
        workflow_id: Uuid,
        success: bool,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut workflows = self.workflows.write().await;
        let workflow = workflows
            .get_mut(&workflow_id)
            .ok_or(EngineError::WorkflowNotFound { workflow_id })?;
        workflow.run_count += 1;
        if success {
            workflow.success_count += 1;
        }
        workflow.last_run_at = Some(started_at);
        self.persist(&workflows).await
    }

    // -- Runs ----------------------------------------------------------------

    /// Record a new (or updated) run.
    pub async fn put_run(&self, run: WorkflowRun) {
        self.runs.write().await.insert(run.id, run);
    }

    /// Fetch a run by id.
    pub async fn get_run(&self, run_id: Uuid) -> Option<WorkflowRun> {
        self.runs.read().await.get(&run_id).cloned()
    }

    /// Snapshot of run records, optionally filtered by workflow, most
    /// recently started first.
    pub async fn list_runs(&self, workflow_id: Option<Uuid>) -> Vec<WorkflowRun> {
        let mut runs: Vec<WorkflowRun> = self
            .runs
            .read()
            .await
            .values()
            .filter(|r| workflow_id.is_none_or(|id| r.workflow_id == id))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs
    }

    /// Rewrite `workflows.json` with the current collection.
    async fn persist(&self, workflows: &HashMap<Uuid, Workflow>) -> Result<()> {
        let records: Vec<&Workflow> = workflows.values().collect();
        self.store.save(&records).await?;
        Ok(())
    }
}

/// Creation/update-time validation: a workflow must have steps, and a
/// cron-based schedule must parse.
fn validate(workflow: &Workflow) -> Result<()> {
    if workflow.steps.is_empty() {
        return Err(EngineError::InvalidWorkflow {
            reason: "workflow has no steps".into(),
        });
    }
    if let Trigger::Schedule {
        cron: Some(expr), ..
    } = &workflow.trigger
    {
        parse_schedule(expr)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
