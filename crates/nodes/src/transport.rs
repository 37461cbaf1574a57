//! Outbound HTTP used by every action node.
//!
//! Executors never talk to `reqwest` directly; they build an
//! [`OutboundRequest`] and hand it to an injected [`HttpTransport`], which
//! keeps the network out of unit tests and lets tests count calls.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{NodeError, NodeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Methods whose request carries a JSON body.
    pub fn has_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl OutboundRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the body and mark it `application/json`.
    pub fn json(self, value: &Value) -> Self {
        self.header("Content-Type", "application/json")
            .body(value.to_string())
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_json(&self) -> Option<Value> {
        self.body.as_deref().and_then(|b| serde_json::from_str(b).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundResponse {
    pub status: u16,
    pub status_text: String,
    pub content_type: Option<String>,
    pub body: String,
}

impl InboundResponse {
    /// A response carrying a JSON body.
    pub fn json(status: u16, value: &Value) -> Self {
        Self {
            status,
            status_text: reason_phrase(status).to_string(),
            content_type: Some("application/json".into()),
            body: value.to_string(),
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            status_text: reason_phrase(status).to_string(),
            content_type: Some("text/plain".into()),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("application/json"))
    }

    /// Body as JSON when the content type says so, otherwise as a string.
    pub fn data(&self) -> Value {
        if self.is_json() {
            if let Ok(value) = serde_json::from_str(&self.body) {
                return value;
            }
        }
        Value::String(self.body.clone())
    }

    /// Map a non-2xx response onto the error taxonomy.
    ///
    /// 408, 429 and 5xx are transient; every other non-2xx is fatal.
    pub fn error_for_status(&self, what: &str) -> NodeResult<()> {
        if self.is_success() {
            return Ok(());
        }
        let message = format!(
            "{what} returned {} {}: {}",
            self.status,
            self.status_text,
            snippet(&self.body)
        );
        if self.status == 408 || self.status == 429 || self.status >= 500 {
            Err(NodeError::Transient(message))
        } else {
            Err(NodeError::Fatal(message))
        }
    }
}

fn snippet(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let head: String = body.chars().take(MAX).collect();
        format!("{head}…")
    }
}

fn reason_phrase(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
}

/// Sends HTTP requests on behalf of executors.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform the request. Network failures are `Transient`; malformed
    /// requests (bad URL, bad header) are `Configuration`. Non-2xx
    /// responses are returned, not raised.
    async fn send(&self, request: OutboundRequest) -> NodeResult<InboundResponse>;
}

/// Per-request budget when none is configured.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
///
/// Every request is bounded by a timeout; one that expires surfaces as
/// [`NodeError::Transient`] so the step runner retries it.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Client with an overall per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> NodeResult<InboundResponse> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        debug!(method = request.method.as_str(), url = %request.url, "sending request");

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await.map_err(classify)?;

        Ok(InboundResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            content_type,
            body,
        })
    }
}

fn classify(err: reqwest::Error) -> NodeError {
    if err.is_builder() {
        NodeError::Configuration(format!("invalid request: {err}"))
    } else if err.is_timeout() {
        NodeError::Transient(format!("request timed out: {err}"))
    } else {
        NodeError::Transient(format!("request failed: {err}"))
    }
}
