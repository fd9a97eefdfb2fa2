//! Engine event bus.
//!
//! A lightweight publish/subscribe mechanism built on
//! [`tokio::sync::broadcast`].  Events are wrapped in [`Arc`] so broadcasting
//! to many subscribers does not clone payloads.  The bus carries both
//! outbound notifications (run completed, input required) and the inbound
//! agent-task completion signals the interpreter suspends on.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::model::WorkflowRun;

/// An event that flows through the engine bus.
#[derive(Debug, Clone, Serialize)]
pub enum EngineEvent {
    /// A run reached a terminal status.
    WorkflowCompleted {
        /// The full run record.
        run: WorkflowRun,
    },

    /// An `input` step needs a value from an external producer.
    InputRequired {
        /// The workflow being executed.
        workflow_id: Uuid,
        /// The requesting step.
        step_id: String,
        /// The (interpolated) prompt to show.
        prompt: String,
    },

    /// The agent collaborator finished a delegated task.  Published by the
    /// external agent runtime; consumed by suspended `agent` steps.
    TaskCompleted {
        /// The task that finished.
        task_id: Uuid,
        /// Whether the task succeeded.
        success: bool,
        /// The task's result payload.
        output: serde_json::Value,
    },
}

/// Publish/subscribe event bus backed by [`tokio::sync::broadcast`].
///
/// Cheaply cloneable and `Send + Sync`.  Subscribers receive
/// [`Arc<EngineEvent>`] references.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<EngineEvent>>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<EngineEvent>> {
        self.sender.subscribe()
    }

    /// Publish an event, returning the number of subscribers that received
    /// it.  Publishing with no subscribers is not an error — notifications
    /// are fire-and-forget.
    pub fn publish(&self, event: EngineEvent) -> usize {
        self.sender.send(Arc::new(event)).unwrap_or(0)
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
