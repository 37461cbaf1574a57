//! Text generation nodes for the supported model providers.
//!
//! One executor serves all three providers. [`AiProvider`] holds everything
//! provider-specific: channel, step name, default model, credential type, and
//! the shape of the request and response.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config;
use crate::credentials::{require_credential, CredentialStore, CredentialType};
use crate::step::{run_step, StepRunner};
use crate::template;
use crate::transport::{HttpMethod, HttpTransport, InboundResponse, OutboundRequest};
use crate::{Context, ExecutableNode, NodeError, NodeParams, NodeResult};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AiProvider {
    OpenAi,
    Anthropic,
    Gemini,
}

impl AiProvider {
    pub fn label(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Gemini => "Gemini",
        }
    }

    pub fn channel(self) -> &'static str {
        match self {
            Self::OpenAi => "openai-execution",
            Self::Anthropic => "anthropic-execution",
            Self::Gemini => "gemini-execution",
        }
    }

    pub fn step_name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai-generate-text",
            Self::Anthropic => "anthropic-generate-text",
            Self::Gemini => "gemini-generate-text",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4",
            Self::Anthropic => "claude-sonnet-4-5",
            Self::Gemini => "gemini-2.0-flash",
        }
    }

    pub fn credential_type(self) -> CredentialType {
        match self {
            Self::OpenAi => CredentialType::OpenAi,
            Self::Anthropic => CredentialType::Anthropic,
            Self::Gemini => CredentialType::Gemini,
        }
    }

    fn base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    fn build_request(self, api_key: &str, prompt: &Prompt) -> OutboundRequest {
        let base_url = self.base_url();
        match self {
            Self::OpenAi => OutboundRequest::new(HttpMethod::Post, format!("{base_url}/chat/completions"))
                .header("Authorization", format!("Bearer {api_key}"))
                .json(&json!({
                    "model": prompt.model,
                    "messages": [
                        { "role": "system", "content": prompt.system },
                        { "role": "user", "content": prompt.user },
                    ],
                })),
            Self::Anthropic => OutboundRequest::new(HttpMethod::Post, format!("{base_url}/messages"))
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&json!({
                    "model": prompt.model,
                    "max_tokens": ANTHROPIC_MAX_TOKENS,
                    "system": prompt.system,
                    "messages": [{ "role": "user", "content": prompt.user }],
                })),
            Self::Gemini => OutboundRequest::new(
                HttpMethod::Post,
                format!("{base_url}/models/{}:generateContent", prompt.model),
            )
            .header("x-goog-api-key", api_key)
            .json(&json!({
                "systemInstruction": { "parts": [{ "text": prompt.system }] },
                "contents": [{ "role": "user", "parts": [{ "text": prompt.user }] }],
            })),
        }
    }

    /// Pull the generated text out of a provider response body.
    ///
    /// A response without any text part yields the empty string.
    fn extract_text(self, body: &Value) -> String {
        let parts: Vec<&str> = match self {
            Self::OpenAi => body
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .into_iter()
                .collect(),
            Self::Anthropic => body
                .get("content")
                .and_then(Value::as_array)
                .map(|blocks| {
                    blocks
                        .iter()
                        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                        .filter_map(|b| b.get("text").and_then(Value::as_str))
                        .collect()
                })
                .unwrap_or_default(),
            Self::Gemini => body
                .pointer("/candidates/0/content/parts")
                .and_then(Value::as_array)
                .map(|parts| parts.iter().filter_map(|p| p.get("text").and_then(Value::as_str)).collect())
                .unwrap_or_default(),
        };
        parts.concat()
    }

    /// Classify a failed provider response. Rejected keys are credential
    /// problems rather than generic client errors.
    fn check_response(self, response: &InboundResponse) -> NodeResult<()> {
        if matches!(response.status, 401 | 403) {
            return Err(NodeError::credential(format!(
                "{} rejected the credential ({} {})",
                self.label(),
                response.status,
                response.status_text
            )));
        }
        response.error_for_status(self.label())
    }
}

/// Node data as saved by the editor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextGenerationData {
    pub variable_name: Option<String>,
    pub credential_id: Option<String>,
    pub system_prompt: Option<String>,
    pub user_prompt: Option<String>,
    /// Overrides the provider's default model.
    pub model: Option<String>,
}

#[derive(Debug)]
struct Prompt {
    model: String,
    system: String,
    user: String,
}

/// What the node stores under `<variableName>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedText {
    pub text: String,
}

pub struct TextGenerationNode {
    provider: AiProvider,
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<dyn CredentialStore>,
}

impl TextGenerationNode {
    pub fn new(
        provider: AiProvider,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            provider,
            transport,
            credentials,
        }
    }

    pub fn provider(&self) -> AiProvider {
        self.provider
    }

    async fn generate(
        &self,
        data: &Value,
        mut context: Context,
        user_id: &str,
        step: &dyn StepRunner,
    ) -> NodeResult<Context> {
        let provider = self.provider;
        let label = provider.label();

        let cfg: TextGenerationData = config::parse(label, data)?;
        let variable_name = config::require(&cfg.variable_name, label, "variable name")?;
        let credential_id = config::require(&cfg.credential_id, label, "credential")?;
        let user_template = config::require(&cfg.user_prompt, label, "user prompt")?;

        let prompt = Prompt {
            model: config::optional(&cfg.model)
                .unwrap_or(provider.default_model())
                .to_string(),
            system: match config::optional(&cfg.system_prompt) {
                Some(system) => template::render(system, &context)?,
                None => DEFAULT_SYSTEM_PROMPT.to_string(),
            },
            user: template::render(user_template, &context)?,
        };

        let credential = require_credential(
            self.credentials.as_ref(),
            credential_id,
            user_id,
            provider.credential_type(),
        )
        .await?;

        let request = provider.build_request(&credential.value, &prompt);
        let transport = &self.transport;
        let request = &request;
        let generated: GeneratedText = run_step(step, provider.step_name(), move || async move {
            let response = transport.send(request.clone()).await?;
            provider.check_response(&response)?;
            let body: Value = serde_json::from_str(&response.body).map_err(|e| {
                NodeError::fatal(format!("{} returned an unreadable body: {e}", provider.label()))
            })?;
            Ok::<_, NodeError>(GeneratedText {
                text: provider.extract_text(&body),
            })
        })
        .await?;

        context.insert(variable_name, json!(generated));
        Ok(context)
    }
}

#[async_trait]
impl ExecutableNode for TextGenerationNode {
    fn channel(&self) -> &'static str {
        self.provider.channel()
    }

    async fn execute(&self, params: NodeParams<'_>) -> NodeResult<Context> {
        let NodeParams { data, node_id, context, user_id, step, publish } = params;
        publish
            .reporter(self.provider.channel(), node_id)
            .track(self.generate(data, context, user_id, step))
            .await
    }
}
