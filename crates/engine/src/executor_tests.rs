//! End-to-end tests for the workflow execution engine.
//!
//! Every collaborator is in memory: workflows, step checkpoints,
//! credentials, the status bus, and a scripted HTTP transport. No network
//! or database is touched.

use std::sync::Arc;

use nodes::credentials::{Credential, CredentialType, MemoryCredentialStore};
use nodes::mock::{MockNode, MockTransport};
use nodes::status::NodeStatus;
use nodes::transport::InboundResponse;
use nodes::NodeError;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{Connection, Node, NodeType, Workflow};
use crate::registry::{ExecutorRegistry, ExecutorServices};
use crate::status::{StatusBoard, StatusBus, StatusEvent};
use crate::step::MemoryStepStore;
use crate::store::MemoryWorkflowStore;
use crate::{EngineError, ExecutorConfig, RunRequest, WorkflowExecutor};

const USER: &str = "user-1";

struct Harness {
    transport: Arc<MockTransport>,
    store: Arc<MemoryWorkflowStore>,
    steps: Arc<MemoryStepStore>,
    bus: Arc<StatusBus>,
    executor: WorkflowExecutor,
}

impl Harness {
    fn new(transport: MockTransport) -> Self {
        Self::with_registry(transport, |registry| registry)
    }

    fn with_registry(
        transport: MockTransport,
        customise: impl FnOnce(ExecutorRegistry) -> ExecutorRegistry,
    ) -> Self {
        let transport = Arc::new(transport);
        let credentials = Arc::new(MemoryCredentialStore::from_credentials([Credential {
            id: "openai-key".into(),
            owner_id: USER.into(),
            kind: CredentialType::OpenAi,
            value: "sk-test".into(),
        }]));
        let registry = customise(ExecutorRegistry::new(&ExecutorServices {
            transport: transport.clone(),
            credentials,
        }));
        let store = Arc::new(MemoryWorkflowStore::new());
        let steps = Arc::new(MemoryStepStore::new());
        let bus = Arc::new(StatusBus::new(256));
        let config = ExecutorConfig::default();

        let executor = WorkflowExecutor::new(
            store.clone(),
            registry,
            steps.clone(),
            bus.clone(),
            config,
        );

        Self {
            transport,
            store,
            steps,
            bus,
            executor,
        }
    }

    fn save(&self, workflow: &Workflow) -> Uuid {
        self.store.insert(workflow.clone());
        workflow.id
    }
}

fn trigger(id: &str) -> Node {
    Node::new(id, NodeType::ManualTrigger, json!({}))
}

fn http_get(id: &str, variable_name: &str, endpoint: &str) -> Node {
    Node::new(
        id,
        NodeType::HttpRequest,
        json!({ "variableName": variable_name, "endpoint": endpoint, "method": "GET" }),
    )
}

/// `ids[0] → ids[1] → … → ids[n-1]`
fn chain(ids: &[&str]) -> Vec<Connection> {
    ids.windows(2).map(|w| Connection::new(w[0], w[1])).collect()
}

fn drain(rx: &mut broadcast::Receiver<StatusEvent>) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn statuses_for(events: &[StatusEvent], node_id: &str) -> Vec<NodeStatus> {
    events
        .iter()
        .filter(|e| e.update.data.node_id == node_id)
        .map(|e| e.update.data.status)
        .collect()
}

// ============================================================
// Happy path
// ============================================================

#[tokio::test]
async fn manual_trigger_then_http_request_yields_response() {
    let h = Harness::new(
        MockTransport::new().respond(InboundResponse::json(200, &json!({ "ok": true }))),
    );
    let wf = Workflow::new(
        "fetch",
        USER,
        vec![trigger("t"), http_get("h", "resp", "https://api.test/ping")],
        chain(&["t", "h"]),
    );
    let id = h.save(&wf);

    let result = h.executor.run(RunRequest::new(id, USER)).await.unwrap();

    assert_eq!(result.executed, vec!["t", "h"]);
    assert_eq!(result.context.len(), 1);
    assert_eq!(
        result.context.get("resp"),
        Some(&json!({ "httpResponse": { "status": 200, "statusText": "OK", "data": { "ok": true } } }))
    );
    assert_eq!(
        h.steps.committed(result.run_id),
        vec!["h/http-request", "load-workflow", "t/manual-trigger"]
    );
}

#[tokio::test]
async fn each_node_publishes_loading_then_success_on_its_channel() {
    let h = Harness::new(MockTransport::new());
    let wf = Workflow::new(
        "statuses",
        USER,
        vec![trigger("t"), http_get("h", "resp", "https://api.test")],
        chain(&["t", "h"]),
    );
    let id = h.save(&wf);
    let mut rx = h.bus.subscribe();

    let result = h.executor.run(RunRequest::new(id, USER)).await.unwrap();
    let events = drain(&mut rx);

    assert_eq!(statuses_for(&events, "t"), vec![NodeStatus::Loading, NodeStatus::Success]);
    assert_eq!(statuses_for(&events, "h"), vec![NodeStatus::Loading, NodeStatus::Success]);
    assert!(events.iter().all(|e| e.update.run_id == result.run_id));

    let mut board = StatusBoard::new(result.run_id);
    for event in &events {
        board.apply(event);
    }
    assert_eq!(board.status("manual-trigger-execution", "t"), NodeStatus::Success);
    assert_eq!(board.status("http-request-execution", "h"), NodeStatus::Success);
}

#[tokio::test]
async fn data_flows_between_nodes_through_templates() {
    let h = Harness::new(
        MockTransport::new()
            .respond(InboundResponse::json(201, &json!({ "id": 77 })))
            .respond(InboundResponse::text(204, "")),
    );
    let wf = Workflow::new(
        "signup",
        USER,
        vec![
            Node::new("form", NodeType::GoogleFormTrigger, json!({})),
            Node::new(
                "create",
                NodeType::HttpRequest,
                json!({
                    "variableName": "created",
                    "endpoint": "https://crm.test/contacts",
                    "method": "POST",
                    "body": "{{json googleForm.responses}}"
                }),
            ),
            Node::new(
                "notify",
                NodeType::Slack,
                json!({
                    "variableName": "notified",
                    "webhookUrl": "https://hooks.slack.test/abc",
                    "content": "New contact {{created.httpResponse.data.id}} from {{googleForm.responses.email}}"
                }),
            ),
        ],
        chain(&["form", "create", "notify"]),
    );
    let id = h.save(&wf);

    let request = RunRequest::new(id, USER).with_initial_data(json!({
        "googleForm": { "responses": { "email": "ana@example.test", "plan": "pro" } }
    }));
    let result = h.executor.run(request).await.unwrap();

    let sent = h.transport.requests();
    assert_eq!(
        sent[0].body_json(),
        Some(json!({ "email": "ana@example.test", "plan": "pro" }))
    );
    assert_eq!(
        sent[1].body_json(),
        Some(json!({ "content": "New contact 77 from ana@example.test" }))
    );
    assert_eq!(
        result.context.get_path("notified.sent"),
        Some(&json!(true))
    );
    assert!(result.context.contains_key("googleForm"));
}

#[tokio::test]
async fn text_generation_resolves_credentials_for_the_run_owner() {
    let h = Harness::new(MockTransport::new().respond(InboundResponse::json(
        200,
        &json!({ "choices": [{ "message": { "content": "Hi Ana!" } }] }),
    )));
    let wf = Workflow::new(
        "greet",
        USER,
        vec![
            trigger("t"),
            Node::new(
                "ai",
                NodeType::OpenAi,
                json!({ "variableName": "greeting", "credentialId": "openai-key", "userPrompt": "Greet {{name}}" }),
            ),
        ],
        chain(&["t", "ai"]),
    );
    let id = h.save(&wf);

    let ok = h
        .executor
        .run(RunRequest::new(id, USER).with_initial_data(json!({ "name": "Ana" })))
        .await
        .unwrap();
    assert_eq!(ok.context.get_path("greeting.text"), Some(&json!("Hi Ana!")));

    let err = h.executor.run(RunRequest::new(id, "someone-else")).await.unwrap_err();
    assert!(matches!(
        err.error,
        EngineError::Node { source: NodeError::Credential(_), .. }
    ));
    assert_eq!(h.transport.call_count(), 1);
}

#[tokio::test]
async fn nodes_of_the_same_type_do_not_share_checkpoints() {
    let h = Harness::new(MockTransport::new());
    let wf = Workflow::new(
        "twice",
        USER,
        vec![http_get("a", "first", "https://api.test/a"), http_get("b", "second", "https://api.test/b")],
        chain(&["a", "b"]),
    );
    let id = h.save(&wf);

    let result = h.executor.run(RunRequest::new(id, USER)).await.unwrap();

    assert_eq!(h.transport.call_count(), 2);
    assert!(result.context.contains_key("first"));
    assert!(result.context.contains_key("second"));
}

#[tokio::test]
async fn later_writes_to_the_same_key_win_at_run_time() {
    let h = Harness::new(
        MockTransport::new()
            .respond(InboundResponse::json(200, &json!(1)))
            .respond(InboundResponse::json(200, &json!(2))),
    );
    let wf = Workflow::new(
        "collide",
        USER,
        vec![http_get("a", "resp", "https://api.test/1"), http_get("b", "resp", "https://api.test/2")],
        chain(&["a", "b"]),
    );
    let id = h.save(&wf);

    let result = h.executor.run(RunRequest::new(id, USER)).await.unwrap();
    assert_eq!(result.context.get_path("resp.httpResponse.data"), Some(&json!(2)));
}

#[tokio::test]
async fn mock_nodes_receive_the_accumulated_context() {
    let first = Arc::new(MockNode::inserting("first", "a"));
    let h = Harness::with_registry(MockTransport::new(), |registry| {
        registry.with(NodeType::ManualTrigger, first.clone())
    });
    let wf = Workflow::new("mocked", USER, vec![trigger("t")], vec![]);
    let id = h.save(&wf);

    let result = h
        .executor
        .run(RunRequest::new(id, USER).with_initial_data(json!({ "seed": 1 })))
        .await
        .unwrap();

    assert_eq!(first.call_count(), 1);
    assert_eq!(first.calls()[0].get("seed"), Some(&json!(1)));
    assert_eq!(result.context.get("a"), Some(&json!({ "node": "first" })));
}

// ============================================================
// Failures
// ============================================================

#[tokio::test]
async fn failing_node_stops_the_run_and_keeps_the_partial_context() {
    let h = Harness::new(
        MockTransport::new()
            .respond(InboundResponse::json(200, &json!({ "step": 1 })))
            .respond(InboundResponse::text(404, "no such thing")),
    );
    let wf = Workflow::new(
        "broken",
        USER,
        vec![
            http_get("ok", "first", "https://api.test/1"),
            http_get("boom", "second", "https://api.test/2"),
            http_get("never", "third", "https://api.test/3"),
        ],
        chain(&["ok", "boom", "never"]),
    );
    let id = h.save(&wf);
    let mut rx = h.bus.subscribe();

    let failure = h.executor.run(RunRequest::new(id, USER)).await.unwrap_err();
    let events = drain(&mut rx);

    assert!(matches!(
        &failure.error,
        EngineError::Node { node_id, source: NodeError::Fatal(_) } if node_id == "boom"
    ));
    assert_eq!(failure.failed_node.as_deref(), Some("boom"));
    assert!(failure.context.contains_key("first"));
    assert!(!failure.context.contains_key("second"));
    assert!(!failure.is_retryable());

    // 'never' was never executed.
    assert_eq!(h.transport.call_count(), 2);
    assert_eq!(statuses_for(&events, "boom"), vec![NodeStatus::Loading, NodeStatus::Error]);
    assert!(statuses_for(&events, "never").is_empty());
}

#[tokio::test]
async fn configuration_errors_fail_before_any_request() {
    let h = Harness::new(MockTransport::new());
    let wf = Workflow::new(
        "misconfigured",
        USER,
        vec![
            trigger("t"),
            Node::new("h", NodeType::HttpRequest, json!({ "variableName": "resp", "method": "GET" })),
        ],
        chain(&["t", "h"]),
    );
    let id = h.save(&wf);

    let failure = h.executor.run(RunRequest::new(id, USER)).await.unwrap_err();

    assert!(matches!(
        failure.error,
        EngineError::Node { source: NodeError::Configuration(_), .. }
    ));
    assert_eq!(h.transport.call_count(), 0);
}

#[tokio::test]
async fn cycles_fail_before_any_node_runs() {
    let h = Harness::new(MockTransport::new());
    let wf = Workflow::new(
        "loop",
        USER,
        vec![http_get("a", "x", "https://api.test"), http_get("b", "y", "https://api.test")],
        vec![Connection::new("a", "b"), Connection::new("b", "a")],
    );
    let id = h.save(&wf);
    let mut rx = h.bus.subscribe();

    let failure = h.executor.run(RunRequest::new(id, USER)).await.unwrap_err();

    assert!(matches!(failure.error, EngineError::CycleDetected { .. }));
    assert_eq!(failure.failed_node, None);
    assert_eq!(h.transport.call_count(), 0);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn unknown_node_type_is_a_dispatch_error() {
    let h = Harness::new(MockTransport::new());
    let mut placeholder = trigger("p");
    placeholder.node_type = "INITIAL".into();
    let wf = Workflow::new("placeholder", USER, vec![placeholder], vec![]);
    let id = h.save(&wf);

    let failure = h.executor.run(RunRequest::new(id, USER)).await.unwrap_err();

    assert!(matches!(
        failure.error,
        EngineError::Dispatch { ref node_type, .. } if node_type == "INITIAL"
    ));
    assert_eq!(failure.failed_node.as_deref(), Some("p"));
}

#[tokio::test]
async fn unregistered_node_type_is_a_dispatch_error() {
    let h = Harness::with_registry(MockTransport::new(), |_| {
        ExecutorRegistry::empty()
            .with(NodeType::ManualTrigger, Arc::new(MockNode::inserting("t", "k")))
    });
    let wf = Workflow::new(
        "partial",
        USER,
        vec![trigger("t"), http_get("h", "resp", "https://api.test")],
        chain(&["t", "h"]),
    );
    let id = h.save(&wf);

    let failure = h.executor.run(RunRequest::new(id, USER)).await.unwrap_err();

    assert!(matches!(failure.error, EngineError::Dispatch { .. }));
    assert!(failure.context.contains_key("k"));
}

#[tokio::test]
async fn missing_workflow_is_reported() {
    let h = Harness::new(MockTransport::new());
    let id = Uuid::new_v4();

    let failure = h.executor.run(RunRequest::new(id, USER)).await.unwrap_err();

    assert!(matches!(failure.error, EngineError::WorkflowNotFound(missing) if missing == id));
}

#[tokio::test]
async fn non_object_initial_data_is_rejected() {
    let h = Harness::new(MockTransport::new());
    let wf = Workflow::new("any", USER, vec![trigger("t")], vec![]);
    let id = h.save(&wf);

    let failure = h
        .executor
        .run(RunRequest::new(id, USER).with_initial_data(json!([1, 2, 3])))
        .await
        .unwrap_err();

    assert!(matches!(failure.error, EngineError::InvalidInitialData));
}

// ============================================================
// Durability
// ============================================================

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_inside_the_step() {
    let h = Harness::new(
        MockTransport::new()
            .respond(InboundResponse::text(503, "busy"))
            .fail(NodeError::transient("connection reset"))
            .respond(InboundResponse::json(200, &json!("finally"))),
    );
    let wf = Workflow::new("flaky", USER, vec![http_get("h", "resp", "https://api.test")], vec![]);
    let id = h.save(&wf);
    let mut rx = h.bus.subscribe();

    let result = h.executor.run(RunRequest::new(id, USER)).await.unwrap();

    assert_eq!(h.transport.call_count(), 3);
    assert_eq!(result.context.get_path("resp.httpResponse.data"), Some(&json!("finally")));
    // Retries are invisible to observers.
    assert_eq!(
        statuses_for(&drain(&mut rx), "h"),
        vec![NodeStatus::Loading, NodeStatus::Success]
    );
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_the_run() {
    let h = Harness::new(MockTransport::always(InboundResponse::text(503, "down")));
    let wf = Workflow::new("down", USER, vec![http_get("h", "resp", "https://api.test")], vec![]);
    let id = h.save(&wf);

    let failure = h.executor.run(RunRequest::new(id, USER)).await.unwrap_err();

    let max_retries = h.executor.config().max_retries;
    assert!(matches!(
        failure.error,
        EngineError::Node { source: NodeError::RetriesExhausted { attempts, .. }, .. }
            if attempts == max_retries + 1
    ));
    assert_eq!(h.transport.call_count(), (max_retries + 1) as usize);
}

#[tokio::test]
async fn resuming_a_run_skips_committed_steps() {
    let h = Harness::new(
        MockTransport::new()
            .respond(InboundResponse::json(200, &json!("a-done")))
            .respond(InboundResponse::text(404, "not yet"))
            .respond(InboundResponse::json(200, &json!("b-done"))),
    );
    let wf = Workflow::new(
        "resume",
        USER,
        vec![http_get("a", "first", "https://api.test/a"), http_get("b", "second", "https://api.test/b")],
        chain(&["a", "b"]),
    );
    let id = h.save(&wf);
    let request = RunRequest::new(id, USER);

    let failure = h.executor.run(request.clone()).await.unwrap_err();
    assert_eq!(failure.failed_node.as_deref(), Some("b"));
    assert_eq!(h.transport.call_count(), 2);

    let result = h.executor.run(request).await.unwrap();

    // Only 'b' hit the network again.
    assert_eq!(h.transport.call_count(), 3);
    assert_eq!(h.transport.requests()[2].url, "https://api.test/b");
    assert_eq!(result.context.get_path("first.httpResponse.data"), Some(&json!("a-done")));
    assert_eq!(result.context.get_path("second.httpResponse.data"), Some(&json!("b-done")));
}

#[tokio::test]
async fn resumed_runs_use_the_checkpointed_snapshot() {
    let h = Harness::new(
        MockTransport::new()
            .respond(InboundResponse::text(404, "first attempt"))
            .respond(InboundResponse::json(200, &json!("ok"))),
    );
    let wf = Workflow::new("pinned", USER, vec![http_get("h", "resp", "https://api.test/v1")], vec![]);
    let id = h.save(&wf);
    let request = RunRequest::new(id, USER);

    h.executor.run(request.clone()).await.unwrap_err();

    // Edit the saved workflow between attempts.
    let mut edited = wf.clone();
    edited.nodes = vec![http_get("h", "resp", "https://api.test/v2")];
    h.save(&edited);

    h.executor.run(request).await.unwrap();
    assert_eq!(h.transport.requests()[1].url, "https://api.test/v1");

    // A fresh run picks up the edit.
    h.executor.run(RunRequest::new(id, USER)).await.unwrap();
    assert_eq!(h.transport.requests()[2].url, "https://api.test/v2");
}

#[tokio::test]
async fn runs_are_isolated() {
    let h = Harness::new(MockTransport::new());
    let wf = Workflow::new("iso", USER, vec![http_get("h", "resp", "https://api.test")], vec![]);
    let id = h.save(&wf);

    let first = h.executor.run(RunRequest::new(id, USER)).await.unwrap();
    let second = h.executor.run(RunRequest::new(id, USER)).await.unwrap();

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(h.transport.call_count(), 2);
    assert_eq!(h.steps.committed(first.run_id), h.steps.committed(second.run_id));
}

#[test]
fn run_requests_use_camel_case_on_the_wire() {
    let request = RunRequest::new(Uuid::nil(), USER).with_run_id(Uuid::nil());
    let wire = serde_json::to_value(&request).unwrap();
    assert_eq!(
        wire,
        json!({ "runId": Uuid::nil(), "workflowId": Uuid::nil(), "userId": USER })
    );
    let back: RunRequest = serde_json::from_value(wire).unwrap();
    assert_eq!(back.initial_data, None::<Value>);
}
