//! Trigger nodes: the entry points of a workflow.
//!
//! A trigger performs no effect of its own. Its payload (if any) was merged
//! into the run's initial data by whatever started the run, so execution is
//! a checkpointed pass-through of the incoming context.

use async_trait::async_trait;
use tracing::debug;

use crate::step::run_step;
use crate::{Context, ExecutableNode, NodeParams, NodeResult};

pub const MANUAL_TRIGGER_CHANNEL: &str = "manual-trigger-execution";
pub const GOOGLE_FORM_TRIGGER_CHANNEL: &str = "google-form-trigger-execution";
pub const STRIPE_TRIGGER_CHANNEL: &str = "stripe-trigger-execution";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    Manual,
    GoogleForm,
    Stripe,
}

impl TriggerKind {
    pub fn channel(self) -> &'static str {
        match self {
            Self::Manual => MANUAL_TRIGGER_CHANNEL,
            Self::GoogleForm => GOOGLE_FORM_TRIGGER_CHANNEL,
            Self::Stripe => STRIPE_TRIGGER_CHANNEL,
        }
    }

    pub fn step_name(self) -> &'static str {
        match self {
            Self::Manual => "manual-trigger",
            Self::GoogleForm => "google-form-trigger",
            Self::Stripe => "stripe-trigger",
        }
    }

    /// Context key under which the webhook receiver seeds its payload.
    pub fn payload_key(self) -> Option<&'static str> {
        match self {
            Self::Manual => None,
            Self::GoogleForm => Some("googleForm"),
            Self::Stripe => Some("stripe"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TriggerNode {
    kind: TriggerKind,
}

impl TriggerNode {
    pub fn new(kind: TriggerKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> TriggerKind {
        self.kind
    }
}

#[async_trait]
impl ExecutableNode for TriggerNode {
    fn channel(&self) -> &'static str {
        self.kind.channel()
    }

    async fn execute(&self, params: NodeParams<'_>) -> NodeResult<Context> {
        let NodeParams { node_id, context, step, publish, .. } = params;
        let kind = self.kind;

        publish
            .reporter(kind.channel(), node_id)
            .track(async move {
                if let Some(key) = kind.payload_key() {
                    if !context.contains_key(key) {
                        debug!(node_id, key, "trigger payload absent from initial data");
                    }
                }
                let context = &context;
                run_step(step, kind.step_name(), move || async move { Ok(context.clone()) }).await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{RecordingPublisher, RecordingSteps};
    use crate::status::{NodeStatus, StatusFn};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use uuid::Uuid;

    #[tokio::test]
    async fn triggers_pass_the_context_through() {
        let steps = RecordingSteps::new();
        let publisher = Arc::new(RecordingPublisher::new());
        let publish = StatusFn::new(publisher.clone(), Uuid::new_v4());
        let context = Context::new().with("stripe", json!({ "amount": 1200 }));

        let out = TriggerNode::new(TriggerKind::Stripe)
            .execute(NodeParams {
                data: &Value::Null,
                node_id: "t1",
                context: context.clone(),
                user_id: "u1",
                step: &steps,
                publish: &publish,
            })
            .await
            .unwrap();

        assert_eq!(out, context);
        assert_eq!(steps.names(), vec!["stripe-trigger"]);
        assert_eq!(
            publisher.statuses_for("t1"),
            vec![NodeStatus::Loading, NodeStatus::Success]
        );
        assert!(publisher
            .updates()
            .iter()
            .all(|u| u.channel == STRIPE_TRIGGER_CHANNEL));
    }

    #[test]
    fn channels_are_distinct() {
        let kinds = [TriggerKind::Manual, TriggerKind::GoogleForm, TriggerKind::Stripe];
        let channels: std::collections::HashSet<_> = kinds.iter().map(|k| k.channel()).collect();
        assert_eq!(channels.len(), kinds.len());
        assert_eq!(TriggerKind::GoogleForm.payload_key(), Some("googleForm"));
    }
}
