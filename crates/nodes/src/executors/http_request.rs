//! HTTP Request node.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config;
use crate::step::{run_step, StepRunner};
use crate::template;
use crate::transport::{HttpMethod, HttpTransport, OutboundRequest};
use crate::{Context, ExecutableNode, NodeError, NodeParams, NodeResult};

pub const HTTP_REQUEST_CHANNEL: &str = "http-request-execution";

const LABEL: &str = "HTTP Request";
const STEP: &str = "http-request";

/// Node data as saved by the editor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestData {
    pub variable_name: Option<String>,
    pub endpoint: Option<String>,
    pub method: Option<HttpMethod>,
    /// JSON template, only sent for methods that carry a body.
    pub body: Option<String>,
}

/// What the node stores under `<variableName>.httpResponse`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponsePayload {
    pub status: u16,
    pub status_text: String,
    pub data: Value,
}

pub struct HttpRequestNode {
    transport: Arc<dyn HttpTransport>,
}

impl HttpRequestNode {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    async fn call(
        &self,
        data: &Value,
        mut context: Context,
        step: &dyn StepRunner,
    ) -> NodeResult<Context> {
        let cfg: HttpRequestData = config::parse(LABEL, data)?;
        let endpoint = config::require(&cfg.endpoint, LABEL, "endpoint")?;
        let variable_name = config::require(&cfg.variable_name, LABEL, "variable name")?;
        let method = cfg
            .method
            .ok_or_else(|| NodeError::configuration(format!("{LABEL} node: method is missing")))?;

        let url = template::render(endpoint, &context)?;
        let mut request = OutboundRequest::new(method, url);
        if method.has_body() {
            let rendered = template::render(cfg.body.as_deref().unwrap_or("{}"), &context)?;
            let body: Value = serde_json::from_str(&rendered).map_err(|e| {
                NodeError::fatal(format!("{LABEL} node: rendered body is not valid JSON: {e}"))
            })?;
            request = request.json(&body);
        }

        let transport = &self.transport;
        let request = &request;
        let payload: HttpResponsePayload = run_step(step, STEP, move || async move {
            let response = transport.send(request.clone()).await?;
            response.error_for_status(LABEL)?;
            Ok::<_, NodeError>(HttpResponsePayload {
                status: response.status,
                status_text: response.status_text.clone(),
                data: response.data(),
            })
        })
        .await?;

        context.insert(variable_name, json!({ "httpResponse": payload }));
        Ok(context)
    }
}

#[async_trait]
impl ExecutableNode for HttpRequestNode {
    fn channel(&self) -> &'static str {
        HTTP_REQUEST_CHANNEL
    }

    async fn execute(&self, params: NodeParams<'_>) -> NodeResult<Context> {
        let NodeParams { data, node_id, context, step, publish, .. } = params;
        publish
            .reporter(HTTP_REQUEST_CHANNEL, node_id)
            .track(self.call(data, context, step))
            .await
    }
}
