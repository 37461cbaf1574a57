//! Chat webhook nodes (Discord, Slack).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config;
use crate::step::{run_step, StepRunner};
use crate::template;
use crate::transport::{HttpMethod, HttpTransport, OutboundRequest};
use crate::{Context, ExecutableNode, NodeError, NodeParams, NodeResult};

/// Discord rejects messages longer than this many characters.
pub const DISCORD_MAX_CONTENT: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatPlatform {
    Discord,
    Slack,
}

impl ChatPlatform {
    pub fn label(self) -> &'static str {
        match self {
            Self::Discord => "Discord",
            Self::Slack => "Slack",
        }
    }

    pub fn channel(self) -> &'static str {
        match self {
            Self::Discord => "discord-execution",
            Self::Slack => "slack-execution",
        }
    }

    pub fn step_name(self) -> &'static str {
        match self {
            Self::Discord => "discord-webhook",
            Self::Slack => "slack-webhook",
        }
    }

    fn prepare_content(self, content: String) -> String {
        match self {
            Self::Discord if content.chars().count() > DISCORD_MAX_CONTENT => {
                content.chars().take(DISCORD_MAX_CONTENT).collect()
            }
            _ => content,
        }
    }

    fn payload(self, content: &str, username: Option<&str>) -> Value {
        match self {
            Self::Discord => match username {
                Some(username) => json!({ "content": content, "username": username }),
                None => json!({ "content": content }),
            },
            Self::Slack => json!({ "content": content }),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatWebhookData {
    pub variable_name: Option<String>,
    pub webhook_url: Option<String>,
    pub content: Option<String>,
    /// Display name override; Discord only.
    pub username: Option<String>,
}

/// What the node stores under `<variableName>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDelivery {
    pub sent: bool,
    pub message_content: String,
}

pub struct ChatWebhookNode {
    platform: ChatPlatform,
    transport: Arc<dyn HttpTransport>,
}

impl ChatWebhookNode {
    pub fn new(platform: ChatPlatform, transport: Arc<dyn HttpTransport>) -> Self {
        Self { platform, transport }
    }

    pub fn platform(&self) -> ChatPlatform {
        self.platform
    }

    async fn deliver(
        &self,
        data: &Value,
        mut context: Context,
        step: &dyn StepRunner,
    ) -> NodeResult<Context> {
        let platform = self.platform;
        let label = platform.label();

        let cfg: ChatWebhookData = config::parse(label, data)?;
        let variable_name = config::require(&cfg.variable_name, label, "variable name")?;
        let webhook_url = config::require(&cfg.webhook_url, label, "webhook URL")?;
        let content_template = config::require(&cfg.content, label, "content")?;

        let content = platform.prepare_content(template::render(content_template, &context)?);
        let username = match config::optional(&cfg.username) {
            Some(u) => Some(template::render(u, &context)?),
            None => None,
        };

        let request = OutboundRequest::new(HttpMethod::Post, webhook_url)
            .json(&platform.payload(&content, username.as_deref()));
        let transport = &self.transport;
        let request = &request;
        let content = &content;
        let delivery: WebhookDelivery = run_step(step, platform.step_name(), move || async move {
            let response = transport.send(request.clone()).await?;
            response.error_for_status(platform.label())?;
            Ok::<_, NodeError>(WebhookDelivery {
                sent: true,
                message_content: content.clone(),
            })
        })
        .await?;

        context.insert(variable_name, json!(delivery));
        Ok(context)
    }
}

#[async_trait]
impl ExecutableNode for ChatWebhookNode {
    fn channel(&self) -> &'static str {
        self.platform.channel()
    }

    async fn execute(&self, params: NodeParams<'_>) -> NodeResult<Context> {
        let NodeParams { data, node_id, context, step, publish, .. } = params;
        publish
            .reporter(self.platform.channel(), node_id)
            .track(self.deliver(data, context, step))
            .await
    }
}
