//! Node type → executor table.
//!
//! [`builtin`] is an exhaustive match over [`NodeType`], so a new variant
//! without an executor does not compile. Tests swap individual entries for
//! mocks through [`ExecutorRegistry::register`].

use std::collections::HashMap;
use std::sync::Arc;

use nodes::credentials::CredentialStore;
use nodes::executors::{
    AiProvider, ChatPlatform, ChatWebhookNode, HttpRequestNode, TextGenerationNode, TriggerKind,
    TriggerNode,
};
use nodes::transport::HttpTransport;
use nodes::ExecutableNode;
use strum::IntoEnumIterator;

use crate::models::{Node, NodeType};
use crate::EngineError;

/// Clients shared by the built-in executors.
#[derive(Clone)]
pub struct ExecutorServices {
    pub transport: Arc<dyn HttpTransport>,
    pub credentials: Arc<dyn CredentialStore>,
}

/// Build the executor for one node type.
pub fn builtin(node_type: NodeType, services: &ExecutorServices) -> Arc<dyn ExecutableNode> {
    let transport = services.transport.clone();
    let credentials = services.credentials.clone();
    match node_type {
        NodeType::ManualTrigger => Arc::new(TriggerNode::new(TriggerKind::Manual)),
        NodeType::GoogleFormTrigger => Arc::new(TriggerNode::new(TriggerKind::GoogleForm)),
        NodeType::StripeTrigger => Arc::new(TriggerNode::new(TriggerKind::Stripe)),
        NodeType::HttpRequest => Arc::new(HttpRequestNode::new(transport)),
        NodeType::OpenAi => Arc::new(TextGenerationNode::new(AiProvider::OpenAi, transport, credentials)),
        NodeType::Anthropic => {
            Arc::new(TextGenerationNode::new(AiProvider::Anthropic, transport, credentials))
        }
        NodeType::Gemini => Arc::new(TextGenerationNode::new(AiProvider::Gemini, transport, credentials)),
        NodeType::Discord => Arc::new(ChatWebhookNode::new(ChatPlatform::Discord, transport)),
        NodeType::Slack => Arc::new(ChatWebhookNode::new(ChatPlatform::Slack, transport)),
    }
}

/// Maps node types to shared `ExecutableNode` implementations.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<NodeType, Arc<dyn ExecutableNode>>,
}

impl ExecutorRegistry {
    /// A registry with every built-in node type.
    pub fn new(services: &ExecutorServices) -> Self {
        Self {
            executors: NodeType::iter()
                .map(|node_type| (node_type, builtin(node_type, services)))
                .collect(),
        }
    }

    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Register `executor` for `node_type`, returning the one it replaced.
    pub fn register(
        &mut self,
        node_type: NodeType,
        executor: Arc<dyn ExecutableNode>,
    ) -> Option<Arc<dyn ExecutableNode>> {
        self.executors.insert(node_type, executor)
    }

    pub fn with(mut self, node_type: NodeType, executor: Arc<dyn ExecutableNode>) -> Self {
        self.register(node_type, executor);
        self
    }

    pub fn get(&self, node_type: NodeType) -> Option<&Arc<dyn ExecutableNode>> {
        self.executors.get(&node_type)
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Find the executor for `node`.
    ///
    /// # Errors
    /// [`EngineError::Dispatch`] when the node's type tag is unknown to this
    /// build or has nothing registered.
    pub fn resolve(&self, node: &Node) -> Result<Arc<dyn ExecutableNode>, EngineError> {
        node.kind()
            .and_then(|kind| self.executors.get(&kind))
            .cloned()
            .ok_or_else(|| EngineError::Dispatch {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            })
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&str> = self.executors.keys().map(|t| t.as_ref()).collect();
        types.sort_unstable();
        f.debug_struct("ExecutorRegistry").field("types", &types).finish()
    }
}
