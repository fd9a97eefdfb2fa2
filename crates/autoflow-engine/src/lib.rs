//! Workflow automation engine.
//!
//! Workflows are graphs of typed steps linked by success/failure edges,
//! executed by a step interpreter against injected collaborators (tool
//! executor, agent delegate, security auditor).  Triggers — manual,
//! schedule (cron or interval), event, and learned intent — decide when a
//! run starts; the [`Engine`] facade ties the pieces together and owns the
//! background tickers.
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use autoflow_engine::{Engine, EngineConfig, StepType, Workflow, WorkflowStep};
//! # use autoflow_engine::{AgentDelegate, SecurityAuditor, ToolExecutor};
//! # async fn demo(
//! #     tools: Arc<dyn ToolExecutor>,
//! #     agent: Arc<dyn AgentDelegate>,
//! #     auditor: Arc<dyn SecurityAuditor>,
//! # ) -> autoflow_engine::Result<()> {
//! let engine = Arc::new(Engine::new(
//!     EngineConfig::with_data_dir("data"),
//!     tools,
//!     agent,
//!     auditor,
//! ));
//! engine.initialize().await?;
//!
//! let workflow = engine
//!     .create_workflow(Workflow::new(
//!         "greet",
//!         vec![
//!             WorkflowStep::new("say", "Say hello", StepType::Output)
//!                 .with_config(serde_json::json!({"template": "hello {{name}}"})),
//!         ],
//!     ))
//!     .await?;
//!
//! let input = HashMap::from([("name".into(), serde_json::json!("world"))]);
//! let run = engine.run_workflow(workflow.id, input).await?;
//! println!("{:?}", run.results);
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod expr;
pub mod interpreter;
pub mod model;
pub mod scheduler;
pub mod store;
pub mod traits;

pub use bus::{EngineEvent, EventBus};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use expr::{ConditionOutcome, evaluate_condition, interpolate, interpolate_value};
pub use interpreter::StepInterpreter;
pub use model::{RunStatus, StepType, Trigger, Workflow, WorkflowRun, WorkflowStep};
pub use store::WorkflowStore;
pub use traits::{AgentDelegate, AuditReport, DelegatedTask, SecurityAuditor, ToolExecutor};

// Re-exported so downstreams wiring intents do not need a direct dependency.
pub use autoflow_intent::{IntentEngine, IntentMatch, MemoryRecall, MemoryRecord, UserIntent};
