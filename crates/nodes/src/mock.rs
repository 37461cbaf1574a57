//! Test doubles for executors and the services they are handed.
//!
//! Useful in unit and integration tests where real networking, storage or
//! realtime delivery is either unavailable or irrelevant.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::status::{NodeStatus, PublishError, StatusPublisher, StatusUpdate};
use crate::step::{run_step, StepRunner, StepWork};
use crate::transport::{HttpTransport, InboundResponse, OutboundRequest};
use crate::{Context, ExecutableNode, NodeError, NodeParams, NodeResult};

/// Behaviour injected into `MockNode` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Add `key` → `value` to the context.
    Insert { key: String, value: Value },
    /// Fail with the given error.
    Fail(NodeError),
}

/// A mock node that records every context it receives and follows the
/// executor contract: `loading`, then one terminal status, with its effect
/// wrapped in a step named `mock`.
#[derive(Debug)]
pub struct MockNode {
    /// Label used in test assertions.
    pub name: String,
    pub channel: &'static str,
    pub behaviour: MockBehaviour,
    calls: Mutex<Vec<Context>>,
}

impl MockNode {
    /// A mock that adds `{ "node": name }` under `key`.
    pub fn inserting(name: impl Into<String>, key: impl Into<String>) -> Self {
        let name = name.into();
        let value = json!({ "node": name.clone() });
        Self::new(name, MockBehaviour::Insert { key: key.into(), value })
    }

    pub fn failing(name: impl Into<String>, error: NodeError) -> Self {
        Self::new(name, MockBehaviour::Fail(error))
    }

    pub fn new(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            channel: "mock-execution",
            behaviour,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Contexts seen by this node, in call order.
    pub fn calls(&self) -> Vec<Context> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of times this node has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl ExecutableNode for MockNode {
    fn channel(&self) -> &'static str {
        self.channel
    }

    async fn execute(&self, params: NodeParams<'_>) -> NodeResult<Context> {
        let NodeParams { node_id, context, step, publish, .. } = params;
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(context.clone());

        let behaviour = &self.behaviour;
        publish
            .reporter(self.channel, node_id)
            .track(async move {
                let out: Value = run_step(step, "mock", move || async move {
                    match behaviour {
                        MockBehaviour::Insert { value, .. } => Ok(value.clone()),
                        MockBehaviour::Fail(err) => Err(err.clone()),
                    }
                })
                .await?;
                match behaviour {
                    MockBehaviour::Insert { key, .. } => Ok(context.with(key.clone(), out)),
                    MockBehaviour::Fail(err) => Err(err.clone()),
                }
            })
            .await
    }
}

/// Scripted [`HttpTransport`].
///
/// Responses are consumed in order; once the script runs out every request
/// gets the fallback (`200` with `{}` unless replaced).
#[derive(Debug)]
pub struct MockTransport {
    script: Mutex<VecDeque<NodeResult<InboundResponse>>>,
    fallback: InboundResponse,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: InboundResponse::json(200, &json!({})),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every unscripted request with `response`.
    pub fn always(response: InboundResponse) -> Self {
        Self {
            fallback: response,
            ..Self::default()
        }
    }

    pub fn respond(self, response: InboundResponse) -> Self {
        self.push(Ok(response))
    }

    pub fn fail(self, error: NodeError) -> Self {
        self.push(Err(error))
    }

    fn push(self, outcome: NodeResult<InboundResponse>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
        self
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: OutboundRequest) -> NodeResult<InboundResponse> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// A non-durable [`StepRunner`] that runs each step once and records its name.
#[derive(Debug, Default)]
pub struct RecordingSteps {
    names: Mutex<Vec<String>>,
}

impl RecordingSteps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<String> {
        self.names.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl StepRunner for RecordingSteps {
    async fn run(&self, name: &str, work: StepWork<'_>) -> NodeResult<Value> {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.to_string());
        work().await
    }
}

/// [`StatusPublisher`] that keeps every update, or rejects them all.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    updates: Mutex<Vec<StatusUpdate>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn statuses_for(&self, node_id: &str) -> Vec<NodeStatus> {
        self.updates()
            .into_iter()
            .filter(|u| u.data.node_id == node_id)
            .map(|u| u.data.status)
            .collect()
    }
}

#[async_trait]
impl StatusPublisher for RecordingPublisher {
    async fn publish(&self, update: StatusUpdate) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError("realtime unavailable".into()));
        }
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(update);
        Ok(())
    }
}
