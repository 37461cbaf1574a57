//! The `ExecutableNode` trait: the contract every node type fulfils.

use async_trait::async_trait;
use serde_json::Value;

use crate::{Context, NodeResult, StatusFn, StepRunner};

/// Everything an executor receives for one node of one run.
pub struct NodeParams<'a> {
    /// The node's opaque configuration blob.
    pub data: &'a Value,
    pub node_id: &'a str,
    /// Context accumulated by the nodes that ran before this one.
    pub context: Context,
    /// Owner of the run; credential lookups are scoped to it.
    pub user_id: &'a str,
    pub step: &'a dyn StepRunner,
    pub publish: &'a StatusFn,
}

/// The core node trait.
///
/// An implementation must, in order:
/// 1. publish `loading` on its channel;
/// 2. validate required configuration, failing with
///    [`NodeError::Configuration`](crate::NodeError::Configuration) before any side effect;
/// 3. render templated fields against `context`;
/// 4. perform its effect inside one or more named steps;
/// 5. return `context` plus one new key and publish `success`, or publish
///    `error` and return the failure.
///
/// [`StatusReporter::track`](crate::status::StatusReporter::track) takes care
/// of steps 1 and 5.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    /// Realtime channel carrying this node type's status messages.
    fn channel(&self) -> &'static str;

    async fn execute(&self, params: NodeParams<'_>) -> NodeResult<Context>;
}
