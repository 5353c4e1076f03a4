//! End-to-end orchestration tests.
//!
//! Drives a full [`Runtime`]: tasks enter through the task manager, the
//! coordinator dispatches execute-task requests over the broker, workers
//! report task results back and the coordinator records them.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use taskmesh_agent::{worker_agent, Agent, AgentBehavior};
use taskmesh_core::{Message, NewTask, Task, TaskStatus, TaskmeshResult};
use taskmesh_orchestrator::*;
use tokio::sync::Semaphore;

// ---------------------------------------------------------------------------
// Test worker: blocks each execution until the test hands out a permit
// ---------------------------------------------------------------------------

struct Gated {
    gate: Arc<Semaphore>,
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl AgentBehavior for Gated {
    async fn on_initialize(&self, _agent: &Arc<Agent>) -> TaskmeshResult<()> {
        Ok(())
    }

    async fn on_terminate(&self, _agent: &Arc<Agent>) -> TaskmeshResult<()> {
        Ok(())
    }

    async fn on_execute(&self, agent: &Arc<Agent>, task: &Task) -> TaskmeshResult<serde_json::Value> {
        self.seen.lock().push(format!("{}:{}", agent.id(), task.task_type));
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| taskmesh_core::TaskmeshError::Agent(e.to_string()))?;
        permit.forget();
        Ok(json!({ "handledBy": agent.id() }))
    }

    async fn on_message(&self, _agent: &Arc<Agent>, _message: Message) -> TaskmeshResult<()> {
        Ok(())
    }
}

struct Harness {
    runtime: Arc<Runtime>,
    gate: Arc<Semaphore>,
    seen: Arc<Mutex<Vec<String>>>,
}

async fn harness() -> Harness {
    let gate = Arc::new(Semaphore::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut factories = FactoryRegistry::new();
    let (g, s) = (gate.clone(), seen.clone());
    factories.register("gated", WorkerDefaults::default(), move |config| {
        worker_agent(
            config,
            Gated {
                gate: g.clone(),
                seen: s.clone(),
            },
        )
    });
    taskmesh_workers::register_workers(&mut factories);

    let runtime = Runtime::start(RuntimeConfig::default(), factories).await.unwrap();
    Harness { runtime, gate, seen }
}

fn gated(id: &str, capabilities: &[&str]) -> AgentSpec {
    AgentSpec::new(id, id, "gated").with_capabilities(capabilities.iter().map(|c| (*c).to_string()).collect())
}

async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("timed out waiting for: {what}");
}

fn status_of(runtime: &Runtime, task: &Task) -> TaskStatus {
    runtime.tasks().get_task(task.id).unwrap().status
}

// ---------------------------------------------------------------------------
// 1. Assignment and result round trip
// ---------------------------------------------------------------------------

#[tokio::test]
async fn task_runs_on_capable_agent_and_load_returns_to_zero() {
    let h = harness().await;
    let rt = &h.runtime;
    rt.register_agent(gated("a", &["x"])).await.unwrap();
    eventually("a registered with coordinator", || rt.coordinator().agent_load("a") == Some(0)).await;

    let task = rt.create_task(NewTask::new("x", 5)).unwrap();

    eventually("a receives the task", || h.seen.lock().len() == 1).await;
    assert_eq!(rt.coordinator().agent_load("a"), Some(1));
    assert_eq!(status_of(rt, &task), TaskStatus::InProgress);
    assert_eq!(
        rt.tasks().get_task(task.id).unwrap().assigned_agent.as_deref(),
        Some("a")
    );

    h.gate.add_permits(1);
    eventually("task completes", || status_of(rt, &task) == TaskStatus::Completed).await;
    eventually("load released", || rt.coordinator().agent_load("a") == Some(0)).await;

    let done = rt.tasks().get_task(task.id).unwrap();
    assert_eq!(done.result, Some(json!({ "handledBy": "a" })));
    assert!(done.completed_at.is_some());
}

#[tokio::test]
async fn least_loaded_agent_wins_and_ties_go_to_first_registered() {
    let h = harness().await;
    let rt = &h.runtime;
    rt.register_agent(gated("first", &["x"])).await.unwrap();
    rt.register_agent(gated("second", &["x"])).await.unwrap();
    eventually("both registered", || rt.coordinator().registry().len() == 2).await;

    rt.create_task(NewTask::new("x", 5)).unwrap();
    eventually("first dispatch", || h.seen.lock().len() == 1).await;
    assert_eq!(h.seen.lock()[0], "first:x");

    rt.create_task(NewTask::new("x", 5)).unwrap();
    eventually("second dispatch", || h.seen.lock().len() == 2).await;
    assert_eq!(h.seen.lock()[1], "second:x");

    assert_eq!(rt.coordinator().agent_load("first"), Some(1));
    assert_eq!(rt.coordinator().agent_load("second"), Some(1));
    h.gate.add_permits(2);
}

// ---------------------------------------------------------------------------
// 2. Tasks without a capable agent wait
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unmatched_task_stays_pending_until_capable_agent_registers() {
    let h = harness().await;
    let rt = &h.runtime;
    rt.register_agent(gated("a", &["x"])).await.unwrap();

    let task = rt.create_task(NewTask::new("y", 1)).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(status_of(rt, &task), TaskStatus::Pending);
    assert!(h.seen.lock().is_empty());

    rt.register_agent(gated("b", &["y"])).await.unwrap();
    eventually("y assigned to b", || {
        rt.tasks().get_task(task.id).unwrap().assigned_agent.as_deref() == Some("b")
    })
    .await;
    h.gate.add_permits(1);
    eventually("y completes", || status_of(rt, &task) == TaskStatus::Completed).await;
}

// ---------------------------------------------------------------------------
// 3. Dependencies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dependent_task_waits_for_dependency_then_runs() {
    let h = harness().await;
    let rt = &h.runtime;

    let resolved = Arc::new(Mutex::new(Vec::new()));
    let sink = resolved.clone();
    rt.tasks().on_event(move |event| {
        if let TaskEvent::DependencyResolved {
            task_id,
            dependency_id,
            ..
        } = event
        {
            sink.lock().push((*task_id, *dependency_id));
        }
    });

    let a = rt.create_task(NewTask::new("x", 5)).unwrap();
    let b = rt
        .create_task(NewTask::new("x", 9).with_dependencies(vec![a.id]))
        .unwrap();

    rt.register_agent(gated("w", &["x"])).await.unwrap();
    eventually("a dispatched", || h.seen.lock().len() == 1).await;
    assert_eq!(status_of(rt, &a), TaskStatus::InProgress);
    assert_eq!(status_of(rt, &b), TaskStatus::Pending);

    h.gate.add_permits(1);
    eventually("a completes", || status_of(rt, &a) == TaskStatus::Completed).await;
    assert!(resolved.lock().contains(&(b.id, a.id)));

    eventually("b dispatched", || status_of(rt, &b) == TaskStatus::InProgress).await;
    h.gate.add_permits(1);
    eventually("b completes", || status_of(rt, &b) == TaskStatus::Completed).await;
}

// ---------------------------------------------------------------------------
// 4. Built-in workers through the runtime
// ---------------------------------------------------------------------------

#[tokio::test]
async fn text_and_data_workers_complete_real_jobs() {
    let h = harness().await;
    let rt = &h.runtime;
    rt.register_agent(AgentSpec::new("text-1", "Text", "text-processor"))
        .await
        .unwrap();
    rt.register_agent(AgentSpec::new("data-1", "Data", "data-transformer"))
        .await
        .unwrap();

    let summary = rt
        .create_task(
            NewTask::new("text-summarization", 7)
                .with_payload(json!({"action": "summarize", "text": "a b c d", "options": {"maxLength": 2}})),
        )
        .unwrap();
    let sorted = rt
        .create_task(NewTask::new("data-mapping", 3).with_payload(json!({
            "action": "sort",
            "data": [{"n": 3}, {"n": 1}, {"n": 2}],
            "options": {"sortKey": "n"}
        })))
        .unwrap();

    eventually("both complete", || {
        status_of(rt, &summary) == TaskStatus::Completed && status_of(rt, &sorted) == TaskStatus::Completed
    })
    .await;

    assert_eq!(
        rt.tasks().get_task(summary.id).unwrap().result,
        Some(json!({"summary": "a b..."}))
    );
    assert_eq!(
        rt.tasks().get_task(sorted.id).unwrap().result,
        Some(json!({"sorted": [{"n": 1}, {"n": 2}, {"n": 3}]}))
    );
}

#[tokio::test]
async fn failing_job_marks_task_failed() {
    let h = harness().await;
    let rt = &h.runtime;
    rt.register_agent(AgentSpec::new("text-1", "Text", "text-processor"))
        .await
        .unwrap();

    let task = rt
        .create_task(NewTask::new("text-analysis", 5).with_payload(json!({"action": "translate", "text": "x"})))
        .unwrap();
    eventually("task fails", || status_of(rt, &task) == TaskStatus::Failed).await;
    let failed = rt.tasks().get_task(task.id).unwrap();
    assert!(failed.error.unwrap().contains("translate"));
    eventually("load released", || rt.coordinator().agent_load("text-1") == Some(0)).await;
}

// ---------------------------------------------------------------------------
// 5. Unregistration and system status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unregistered_agent_leaves_registry_and_keeps_its_task() {
    let h = harness().await;
    let rt = &h.runtime;
    rt.register_agent(gated("a", &["x"])).await.unwrap();
    let task = rt.create_task(NewTask::new("x", 5)).unwrap();
    eventually("dispatched", || h.seen.lock().len() == 1).await;

    rt.unregister_agent("a").await.unwrap();
    eventually("registry empty", || rt.coordinator().registry().is_empty()).await;
    assert_eq!(status_of(rt, &task), TaskStatus::InProgress);
    assert!(rt.agents().get_agent("a").is_none());
    h.gate.add_permits(1);
}

#[tokio::test]
async fn system_status_reports_registry_and_metrics() {
    let h = harness().await;
    let rt = &h.runtime;
    rt.register_agent(gated("a", &["x"])).await.unwrap();
    rt.create_task(NewTask::new("nobody", 2)).unwrap();
    eventually("registered", || rt.coordinator().registry().len() == 1).await;

    let status = rt.system_status();
    assert_eq!(status.coordinator.id, COORDINATOR_ID);
    assert_eq!(status.agents[0].agent_id, "a");
    assert_eq!(status.tasks.total_pending, 1);
    assert_eq!(status.tasks.by_priority[&2u8].pending, 1);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["coordinator"]["status"], "idle");
    assert_eq!(json["tasks"]["totalPending"], 1);
}
