//! Engine Client Strategy Pattern
//!
//! Defines the common interface every engine adapter (Ollama, OpenAI, Gemini)
//! implements, so the dispatcher never needs to know which provider it is
//! talking to.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dispatch_core::provider::{ChatOptions, Client};
//!
//! let client = OllamaClient::new(config)?;
//! let reply = client.chat("llama3.2", &history, &tools, &ChatOptions::default()).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;
use crate::message::Message;
use crate::session::SessionConfig;
use crate::tool::Tool;

/// Timeout applied to chat requests
pub const CHAT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout applied to connectivity probes
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

/// Per-request generation options
///
/// Adapters silently ignore options their provider does not support.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Context window hint, in tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
}

impl From<&SessionConfig> for ChatOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            temperature: Some(config.temperature),
            context_window: Some(config.context_window),
        }
    }
}

/// Information about a model exposed by an engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Registry id, `engine:name`
    pub id: String,

    /// Provider-side model name
    pub name: String,

    pub engine_id: String,

    /// Whether the model may be given tools
    #[serde(default)]
    pub supports_tools: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u32>,

    /// Raw provider metadata
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Model {
    pub fn new(engine_id: impl Into<String>, name: impl Into<String>) -> Self {
        let engine_id = engine_id.into();
        let name = name.into();
        Self {
            id: format!("{engine_id}:{name}"),
            name,
            engine_id,
            supports_tools: false,
            context_length: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_tools(mut self, supports_tools: bool) -> Self {
        self.supports_tools = supports_tools;
        self
    }
}

/// Strategy trait for engine adapters
///
/// Implementations are stateless across calls and safe to share between
/// sessions.
#[async_trait]
pub trait Client: Send + Sync {
    /// Send the whole history and return the assistant's reply
    ///
    /// An empty `tools` slice means the tool field is left out of the request.
    async fn chat(
        &self,
        model: &str,
        history: &[Message],
        tools: &[Tool],
        options: &ChatOptions,
    ) -> Result<Message>;

    /// List the models this engine exposes
    async fn models(&self) -> Result<Vec<Model>>;

    /// Metadata for one model
    async fn info(&self, name: &str) -> Result<Model>;

    /// Short liveness probe; never errors
    async fn connected(&self) -> bool;
}
