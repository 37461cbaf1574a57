//! Built-in node executors.
//!
//! Each family shares one implementation parameterised by a small provider
//! or trigger enum; the engine's registry instantiates one executor per
//! node type.

pub mod chat_webhook;
pub mod http_request;
pub mod text_generation;
pub mod trigger;

pub use chat_webhook::{ChatPlatform, ChatWebhookNode};
pub use http_request::{HttpRequestNode, HTTP_REQUEST_CHANNEL};
pub use text_generation::{AiProvider, TextGenerationNode};
pub use trigger::{TriggerKind, TriggerNode};
