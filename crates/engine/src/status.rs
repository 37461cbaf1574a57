//! In-process status broadcasting and resolution.
//!
//! [`StatusBus`] is the realtime side of the status stream: every published
//! update is stamped with a sequence number and a UTC timestamp and fanned
//! out to all subscribers. Delivery is best effort. A subscriber that falls
//! behind skips ahead, and nothing is replayed to late subscribers.
//!
//! Subscribers resolve a node's status with [`NodeStatusWatch`] (one node)
//! or [`StatusBoard`] (every node of a run). Both keep the event with the
//! greatest `(created_at, sequence)` and ignore anything older, so duplicate
//! or reordered delivery cannot move a node backwards.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nodes::status::{NodeStatus, PublishError, StatusPublisher, StatusUpdate, STATUS_TOPIC};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// A status update as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub update: StatusUpdate,
}

impl StatusEvent {
    fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.sequence)
    }
}

/// Broadcast bus for status events.
#[derive(Debug)]
pub struct StatusBus {
    sender: broadcast::Sender<StatusEvent>,
    sequence: AtomicU64,
}

impl StatusBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }

    /// Follow one node of one run on `channel`.
    pub fn watch(&self, run_id: Uuid, channel: &str, node_id: &str) -> NodeStatusWatch {
        NodeStatusWatch::new(self.subscribe(), run_id, channel, node_id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn stamp(&self, update: StatusUpdate) -> StatusEvent {
        StatusEvent {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            created_at: Utc::now(),
            update,
        }
    }
}

#[async_trait]
impl StatusPublisher for StatusBus {
    async fn publish(&self, update: StatusUpdate) -> Result<(), PublishError> {
        let event = self.stamp(update);
        // No subscribers is not an error: nobody is watching this run.
        if self.sender.send(event).is_err() {
            debug!("status event dropped, no subscribers");
        }
        Ok(())
    }
}

/// Latest resolved status for one `(run, channel, node)`.
#[derive(Debug, Clone, Default)]
struct Resolved {
    status: NodeStatus,
    key: Option<(DateTime<Utc>, u64)>,
}

impl Resolved {
    fn apply(&mut self, event: &StatusEvent) -> bool {
        let key = event.order_key();
        if self.key.is_some_and(|current| current >= key) {
            return false;
        }
        self.key = Some(key);
        self.status = event.update.data.status;
        true
    }
}

/// Tracks the status of a single node, starting at `initial`.
#[derive(Debug)]
pub struct NodeStatusWatch {
    receiver: broadcast::Receiver<StatusEvent>,
    run_id: Uuid,
    channel: String,
    node_id: String,
    resolved: Resolved,
}

impl NodeStatusWatch {
    pub fn new(
        receiver: broadcast::Receiver<StatusEvent>,
        run_id: Uuid,
        channel: impl Into<String>,
        node_id: impl Into<String>,
    ) -> Self {
        Self {
            receiver,
            run_id,
            channel: channel.into(),
            node_id: node_id.into(),
            resolved: Resolved::default(),
        }
    }

    pub fn status(&self) -> NodeStatus {
        self.resolved.status
    }

    fn matches(&self, event: &StatusEvent) -> bool {
        let update = &event.update;
        update.run_id == self.run_id
            && update.channel == self.channel
            && update.topic == STATUS_TOPIC
            && update.data.node_id == self.node_id
    }

    /// Fold `event` into the watch. Returns `true` if the status changed
    /// hands to a newer event.
    pub fn apply(&mut self, event: &StatusEvent) -> bool {
        self.matches(event) && self.resolved.apply(event)
    }

    /// Wait for the next accepted event and return the resolved status.
    /// `None` once the bus is gone.
    pub async fn changed(&mut self) -> Option<NodeStatus> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.apply(&event) {
                        return Some(self.resolved.status);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(node_id = %self.node_id, skipped, "status watch lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Wait until the node reaches `success` or `error`.
    pub async fn terminal(&mut self) -> Option<NodeStatus> {
        while !self.resolved.status.is_terminal() {
            self.changed().await?;
        }
        Some(self.resolved.status)
    }
}

/// Resolved statuses for every node of one run, keyed by `(channel, node)`.
#[derive(Debug, Clone)]
pub struct StatusBoard {
    run_id: Uuid,
    nodes: HashMap<(String, String), Resolved>,
}

impl StatusBoard {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            nodes: HashMap::new(),
        }
    }

    /// Fold `event` into the board, ignoring other runs and topics.
    pub fn apply(&mut self, event: &StatusEvent) -> bool {
        let update = &event.update;
        if update.run_id != self.run_id || update.topic != STATUS_TOPIC {
            return false;
        }
        self.nodes
            .entry((update.channel.clone(), update.data.node_id.clone()))
            .or_default()
            .apply(event)
    }

    /// Status of `node_id` on `channel`; `initial` if nothing arrived yet.
    pub fn status(&self, channel: &str, node_id: &str) -> NodeStatus {
        self.nodes
            .get(&(channel.to_string(), node_id.to_string()))
            .map(|r| r.status)
            .unwrap_or_default()
    }

    /// Drain whatever `receiver` has buffered into the board.
    pub fn drain(&mut self, receiver: &mut broadcast::Receiver<StatusEvent>) {
        loop {
            match receiver.try_recv() {
                Ok(event) => {
                    self.apply(&event);
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(run_id = %self.run_id, skipped, "status board lagged");
                }
                Err(_) => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
