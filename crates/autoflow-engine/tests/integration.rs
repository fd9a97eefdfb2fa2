//! Integration tests for the autoflow-engine crate.
//!
//! These tests exercise the engine facade end to end: workflow CRUD and
//! persistence, interpreter routing through real multi-step graphs, the
//! scheduler and proactive tickers, event triggers, and agent delegation
//! over the event bus.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

use autoflow_engine::{
    AgentDelegate, AuditReport, DelegatedTask, Engine, EngineConfig, EngineError, EngineEvent,
    EventBus, Result, RunStatus, SecurityAuditor, StepType, ToolExecutor, Trigger, Workflow,
    WorkflowRun, WorkflowStep,
};

// ═══════════════════════════════════════════════════════════════════════
//  Fakes
// ═══════════════════════════════════════════════════════════════════════

/// Tool fake: `echo` returns its params, `sleep` waits `params.ms`,
/// `fail` always rejects.
struct FakeTools;

#[async_trait]
impl ToolExecutor for FakeTools {
    async fn execute_tool(&self, name: &str, params: Value) -> Result<Value> {
        match name {
            "echo" => Ok(params),
            "sleep" => {
                let ms = params.get("ms").and_then(Value::as_u64).unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(json!({ "slept_ms": ms }))
            }
            "fail" => Err(EngineError::ToolFailed {
                tool: "fail".into(),
                reason: "forced failure".into(),
            }),
            other => Err(EngineError::ToolFailed {
                tool: other.into(),
                reason: "unknown tool".into(),
            }),
        }
    }
}

/// Agent fake that publishes a successful completion for every created task
/// on the engine bus after a short delay.  The bus is attached after engine
/// construction because the engine owns it.
#[derive(Default)]
struct StubAgent {
    bus: OnceLock<EventBus>,
}

impl StubAgent {
    fn attach(&self, bus: EventBus) {
        let _ = self.bus.set(bus);
    }
}

#[async_trait]
impl AgentDelegate for StubAgent {
    async fn create_task(
        &self,
        title: &str,
        description: &str,
        _required_skills: &[String],
        _priority: u8,
    ) -> Result<DelegatedTask> {
        let task = DelegatedTask {
            id: Uuid::now_v7(),
            title: title.into(),
        };
        let bus = self
            .bus
            .get()
            .cloned()
            .ok_or_else(|| EngineError::Internal("agent bus not attached".into()))?;
        let task_id = task.id;
        let summary = format!("done: {description}");
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            bus.publish(EngineEvent::TaskCompleted {
                task_id,
                success: true,
                output: json!(summary),
            });
        });
        Ok(task)
    }
}

struct AllowAuditor;

#[async_trait]
impl SecurityAuditor for AllowAuditor {
    async fn audit(&self, _steps: &Value, _context: &str) -> Result<AuditReport> {
        Ok(AuditReport {
            safe: true,
            issues: vec![],
        })
    }
}

fn engine_at(dir: &std::path::Path) -> (Arc<Engine>, Arc<StubAgent>) {
    let mut config = EngineConfig::with_data_dir(dir);
    config.scheduler_tick_ms = 50;
    config.proactive_tick_ms = 50;

    let agent = Arc::new(StubAgent::default());
    let engine = Arc::new(Engine::new(
        config,
        Arc::new(FakeTools),
        Arc::clone(&agent) as Arc<dyn AgentDelegate>,
        Arc::new(AllowAuditor),
    ));
    agent.attach(engine.bus().clone());
    (engine, agent)
}

fn engine() -> (Arc<Engine>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _agent) = engine_at(dir.path());
    (engine, dir)
}

/// Wait for the next completion of the given workflow on the bus.
async fn await_completion(
    rx: &mut tokio::sync::broadcast::Receiver<Arc<EngineEvent>>,
    workflow_id: Uuid,
) -> WorkflowRun {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.unwrap();
            if let EngineEvent::WorkflowCompleted { run } = &*event
                && run.workflow_id == workflow_id
            {
                return run.clone();
            }
        }
    })
    .await
    .expect("workflow did not complete in time")
}

// ═══════════════════════════════════════════════════════════════════════
//  Graph execution through the facade
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn pipeline_routes_through_condition_and_interpolates() {
    let (engine, _dir) = engine();

    let wf = engine
        .create_workflow(
            Workflow::new(
                "triage",
                vec![
                    WorkflowStep::new("fetch", "Fetch", StepType::Tool)
                        .with_config(json!({"tool": "echo", "params": {"severity": "{{severity}}"}}))
                        .on_success("urgent?"),
                    WorkflowStep::new("urgent?", "Urgent?", StepType::Condition)
                        .with_config(json!({"condition": "severity == \"high\""}))
                        .on_success("page"),
                    WorkflowStep::new("page", "Page on-call", StepType::Output)
                        .with_config(json!({"template": "paging for {{severity}} severity"})),
                ],
            )
            .with_variables(HashMap::from([("severity".into(), json!("high"))])),
        )
        .await
        .unwrap();

    let run = engine.run_workflow(wf.id, HashMap::new()).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    let visited: Vec<&String> = run.results.keys().collect();
    assert_eq!(visited, ["fetch", "urgent?", "page"]);
    assert_eq!(run.results["urgent?"], true);
    assert_eq!(run.results["page"], "paging for high severity");
}

#[tokio::test]
async fn run_input_overrides_workflow_variables() {
    let (engine, _dir) = engine();

    let wf = engine
        .create_workflow(
            Workflow::new(
                "greeter",
                vec![
                    WorkflowStep::new("say", "Say", StepType::Output)
                        .with_config(json!({"template": "hello {{name}}"})),
                ],
            )
            .with_variables(HashMap::from([("name".into(), json!("default"))])),
        )
        .await
        .unwrap();

    let input = HashMap::from([("name".to_string(), json!("override"))]);
    let run = engine.run_workflow(wf.id, input).await.unwrap();
    assert_eq!(run.results["say"], "hello override");
}

#[tokio::test]
async fn loop_and_parallel_nest_inside_one_run() {
    let (engine, _dir) = engine();

    let wf = engine
        .create_workflow(
            Workflow::new(
                "batcher",
                vec![
                    WorkflowStep::new("per-host", "Per host", StepType::Loop)
                        .with_config(json!({
                            "items": "hosts",
                            "body": {
                                "id": "probe",
                                "name": "Probe",
                                "type": "parallel",
                                "config": {"steps": [
                                    {"id": "ping", "name": "Ping", "type": "tool",
                                     "config": {"tool": "echo", "params": {"host": "{{item}}", "probe": "ping"}}},
                                    {"id": "dns", "name": "DNS", "type": "tool",
                                     "config": {"tool": "echo", "params": {"host": "{{item}}", "probe": "dns"}}}
                                ]}
                            }
                        }))
                        .on_success("summary"),
                    WorkflowStep::new("summary", "Summary", StepType::Output)
                        .with_config(json!({"template": "probed {{step_per-host}}"})),
                ],
            )
            .with_variables(HashMap::from([("hosts".into(), json!(["a", "b"]))])),
        )
        .await
        .unwrap();

    let run = engine.run_workflow(wf.id, HashMap::new()).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(
        run.results["per-host"],
        json!([
            [{"host": "a", "probe": "ping"}, {"host": "a", "probe": "dns"}],
            [{"host": "b", "probe": "ping"}, {"host": "b", "probe": "dns"}]
        ])
    );
}

#[tokio::test]
async fn failure_edge_recovers_and_run_counts_as_success() {
    let (engine, _dir) = engine();

    let wf = engine
        .create_workflow(Workflow::new(
            "resilient",
            vec![
                WorkflowStep::new("risky", "Risky", StepType::Tool)
                    .with_config(json!({"tool": "fail"}))
                    .on_success("skip")
                    .on_failure("fallback"),
                WorkflowStep::new("fallback", "Fallback", StepType::Tool)
                    .with_config(json!({"tool": "echo", "params": {"recovered": true}})),
                WorkflowStep::new("skip", "Skip", StepType::Tool)
                    .with_config(json!({"tool": "echo", "params": {}})),
            ],
        ))
        .await
        .unwrap();

    let run = engine.run_workflow(wf.id, HashMap::new()).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.results["risky"]["error"].is_string());
    assert_eq!(run.results["fallback"], json!({"recovered": true}));

    let wf = engine.get_workflow(wf.id).await.unwrap();
    assert_eq!(wf.run_count, 1);
    assert_eq!(wf.success_count, 1);
}

#[tokio::test]
async fn step_timeout_fails_run_and_counts_against_success() {
    let (engine, _dir) = engine();

    let wf = engine
        .create_workflow(Workflow::new(
            "too-slow",
            vec![
                WorkflowStep::new("slow", "Slow", StepType::Tool)
                    .with_config(json!({"tool": "sleep", "params": {"ms": 500}}))
                    .with_timeout_ms(50),
            ],
        ))
        .await
        .unwrap();

    let run = engine.run_workflow(wf.id, HashMap::new()).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error.as_deref(), Some("Step timeout"));
    assert_eq!(run.results["slow"]["error"], "Step timeout");

    let wf = engine.get_workflow(wf.id).await.unwrap();
    assert_eq!(wf.run_count, 1);
    assert_eq!(wf.success_count, 0);
}

// ═══════════════════════════════════════════════════════════════════════
//  Agent delegation
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn agent_step_completes_over_the_bus() {
    let (engine, _dir) = engine();

    let wf = engine
        .create_workflow(
            Workflow::new(
                "research",
                vec![
                    WorkflowStep::new("dig", "Dig in", StepType::Agent)
                        .with_config(json!({"prompt": "investigate {{topic}}", "skills": ["research"]}))
                        .on_success("report"),
                    WorkflowStep::new("report", "Report", StepType::Output)
                        .with_config(json!({"template": "agent said: {{step_dig}}"})),
                ],
            )
            .with_variables(HashMap::from([("topic".into(), json!("latency"))])),
        )
        .await
        .unwrap();

    let run = engine.run_workflow(wf.id, HashMap::new()).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.results["dig"], "done: investigate latency");
    assert_eq!(run.results["report"], "agent said: done: investigate latency");
}

// ═══════════════════════════════════════════════════════════════════════
//  Triggers
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn interval_schedule_fires_repeatedly() {
    let (engine, _dir) = engine();

    let wf = engine
        .create_workflow(
            Workflow::new(
                "heartbeat",
                vec![
                    WorkflowStep::new("beat", "Beat", StepType::Tool)
                        .with_config(json!({"tool": "echo", "params": {"beat": true}})),
                ],
            )
            .with_trigger(Trigger::Schedule {
                cron: None,
                interval_ms: Some(20),
            }),
        )
        .await
        .unwrap();

    let mut rx = engine.bus().subscribe();
    engine.initialize().await.unwrap();

    // Immediate pass plus at least one tick.
    await_completion(&mut rx, wf.id).await;
    await_completion(&mut rx, wf.id).await;
    engine.shutdown().await;

    let wf = engine.get_workflow(wf.id).await.unwrap();
    assert!(wf.run_count >= 2, "run_count was {}", wf.run_count);
    assert!(wf.last_run_at.is_some());
}

#[tokio::test]
async fn fire_event_runs_listening_workflow() {
    let (engine, _dir) = engine();

    let wf = engine
        .create_workflow(
            Workflow::new(
                "on-upload",
                vec![
                    WorkflowStep::new("handle", "Handle", StepType::Tool)
                        .with_config(json!({"tool": "echo", "params": {"handled": true}})),
                ],
            )
            .with_trigger(Trigger::Event {
                event_name: "upload".into(),
            }),
        )
        .await
        .unwrap();

    let mut rx = engine.bus().subscribe();
    let dispatched = engine.fire_event("upload").await;
    assert_eq!(dispatched, vec![wf.id]);

    let run = await_completion(&mut rx, wf.id).await;
    assert_eq!(run.status, RunStatus::Completed);
    assert!(engine.fire_event("unrelated").await.is_empty());
}

#[tokio::test]
async fn proactive_intent_fires_its_bound_workflow() {
    let (engine, _dir) = engine();

    let wf = engine
        .create_workflow(
            Workflow::new(
                "morning-summary",
                vec![
                    WorkflowStep::new("summarize", "Summarize", StepType::Tool)
                        .with_config(json!({"tool": "echo", "params": {"summary": true}})),
                ],
            )
            .with_trigger(Trigger::Intent),
        )
        .await
        .unwrap();

    // Learn once, then reinforce past the 0.8 proactive bar.
    let intent = engine
        .learn_intent("summarize inbox every morning", "summarize", Some(wf.id))
        .await
        .unwrap();
    for _ in 0..3 {
        engine
            .learn_intent("summarize inbox every morning", "summarize", None)
            .await
            .unwrap();
    }

    let mut rx = engine.bus().subscribe();
    engine.initialize().await.unwrap();

    let run = await_completion(&mut rx, wf.id).await;
    assert_eq!(run.status, RunStatus::Completed);
    engine.shutdown().await;

    let intents = engine.list_intents().await;
    assert_eq!(intents[0].id, intent.id);
    assert!(intents[0].trigger_count >= 1);
    assert!(intents[0].last_triggered.is_some());
}

// ═══════════════════════════════════════════════════════════════════════
//  Persistence
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn workflows_and_intents_survive_engine_restart() {
    let dir = tempfile::tempdir().unwrap();

    let (first, _agent) = engine_at(dir.path());
    let wf = first
        .create_workflow(
            Workflow::new(
                "durable",
                vec![
                    WorkflowStep::new("only", "Only", StepType::Tool)
                        .with_config(json!({"tool": "echo", "params": {}})),
                ],
            )
            .with_description("survives restarts"),
        )
        .await
        .unwrap();
    first
        .learn_intent("archive old reports weekly", "archive", Some(wf.id))
        .await
        .unwrap();
    first.run_workflow(wf.id, HashMap::new()).await.unwrap();
    first.shutdown().await;
    drop(first);

    let (second, _agent) = engine_at(dir.path());
    second.initialize().await.unwrap();
    second.shutdown().await;

    let restored = second.get_workflow(wf.id).await.unwrap();
    assert_eq!(restored.name, "durable");
    assert_eq!(restored.description.as_deref(), Some("survives restarts"));
    assert_eq!(restored.run_count, 1);

    let intents = second.list_intents().await;
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].action, "archive");
    assert_eq!(intents[0].workflow_id, Some(wf.id));

    // Run records are memory-only and do not survive the restart.
    assert!(second.list_runs(Some(wf.id)).await.is_empty());
}
