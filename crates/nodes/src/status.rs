//! Per-node execution status and the publish contract.
//!
//! Every node type owns one realtime channel with a single `status` topic.
//! An executor publishes exactly `loading` followed by one of `success` or
//! `error` for each node it runs; [`StatusReporter::track`] enforces that
//! sequence. Publishing is telemetry: failures are logged and swallowed.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::NodeResult;

/// The only topic carried by node status channels.
pub const STATUS_TOPIC: &str = "status";

/// Status of one node within one run, as seen by an observer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Nothing has been published for the node yet.
    #[default]
    Initial,
    Loading,
    Success,
    Error,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// Wire payload of the `status` topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    pub node_id: String,
    pub status: NodeStatus,
}

/// A status message addressed to a channel and topic of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub run_id: Uuid,
    pub channel: String,
    pub topic: String,
    pub data: StatusMessage,
}

#[derive(Debug, Error)]
#[error("status publish failed: {0}")]
pub struct PublishError(pub String);

/// Realtime publish side of the status stream.
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish(&self, update: StatusUpdate) -> Result<(), PublishError>;
}

/// Publish handle bound to one run, handed to every executor.
#[derive(Clone)]
pub struct StatusFn {
    publisher: Arc<dyn StatusPublisher>,
    run_id: Uuid,
}

impl StatusFn {
    pub fn new(publisher: Arc<dyn StatusPublisher>, run_id: Uuid) -> Self {
        Self { publisher, run_id }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Publish one status on `channel`. Failures are logged, never returned.
    pub async fn status(&self, channel: &str, node_id: &str, status: NodeStatus) {
        let update = StatusUpdate {
            run_id: self.run_id,
            channel: channel.to_string(),
            topic: STATUS_TOPIC.to_string(),
            data: StatusMessage {
                node_id: node_id.to_string(),
                status,
            },
        };

        if let Err(err) = self.publisher.publish(update).await {
            warn!(
                run_id = %self.run_id,
                node_id,
                channel,
                ?status,
                error = %err,
                "dropping status update"
            );
        }
    }

    pub fn reporter<'a>(&'a self, channel: &'static str, node_id: &'a str) -> StatusReporter<'a> {
        StatusReporter {
            publish: self,
            channel,
            node_id,
        }
    }
}

impl std::fmt::Debug for StatusFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusFn").field("run_id", &self.run_id).finish_non_exhaustive()
    }
}

/// A [`StatusFn`] narrowed to one channel and one node.
pub struct StatusReporter<'a> {
    publish: &'a StatusFn,
    channel: &'static str,
    node_id: &'a str,
}

impl StatusReporter<'_> {
    pub async fn loading(&self) {
        self.publish.status(self.channel, self.node_id, NodeStatus::Loading).await;
    }

    pub async fn success(&self) {
        self.publish.status(self.channel, self.node_id, NodeStatus::Success).await;
    }

    pub async fn error(&self) {
        self.publish.status(self.channel, self.node_id, NodeStatus::Error).await;
    }

    /// Publish `loading`, drive `work`, then publish exactly one terminal
    /// status matching its outcome. The error is passed through untouched.
    pub async fn track<T, Fut>(&self, work: Fut) -> NodeResult<T>
    where
        Fut: Future<Output = NodeResult<T>>,
    {
        self.loading().await;
        match work.await {
            Ok(value) => {
                self.success().await;
                Ok(value)
            }
            Err(err) => {
                self.error().await;
                Err(err)
            }
        }
    }
}
